//! One match between two clients and the task that drives its turns.
//!
//! The [`Game`] value lives in the session pool behind the server lock and
//! holds the turn state the dispatcher validates commands against. The turn
//! loop ([`run_turn_loop`]) runs as its own task: it announces each turn,
//! then sleeps on a [`TurnSignal`] channel until the dispatcher has seen the
//! full attacker -> defender -> attacker round trip, or the game is over.

use crate::client_manager::ClientId;
use crate::state::SharedState;
use log::{debug, error, info};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

pub type GameId = u32;

/// How a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// `loser` reported its whole fleet sunk.
    Defeated { winner: ClientId, loser: ClientId },
    /// `leaver` disconnected before the game was decided; nobody wins.
    Killed { leaver: ClientId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePhase {
    /// Clients notified, nobody has placed a fleet yet.
    Created,
    /// One client is ready.
    ReadyWait,
    /// Turn loop running.
    Active,
    Ended(SessionEnd),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    AwaitingCoordinates,
    AwaitingOutcome,
    /// Outcome relayed to the attacker; the turn may advance.
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Turn {
    /// 1-based turn counter.
    pub number: u32,
    pub attacker: ClientId,
    pub defender: ClientId,
    pub phase: TurnPhase,
    released: bool,
}

/// Wake-up sent to a game's turn loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnSignal {
    Advance,
    Stop(SessionEnd),
}

/// Why a strike command does not fit the current turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TurnViolation {
    #[error("the game is not running")]
    NotRunning,
    #[error("client {0} is not attacking this turn")]
    NotAttacker(ClientId),
    #[error("client {0} is not defending this turn")]
    NotDefender(ClientId),
    #[error("turn is in phase {0:?}")]
    WrongPhase(TurnPhase),
}

/// What a finished turn loop hands back to the acceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameReport {
    pub game: GameId,
    /// Attacker of every turn that was announced, in order.
    pub attackers: Vec<ClientId>,
    /// `None` if the loop lost its signal channel without being stopped.
    pub end: Option<SessionEnd>,
}

#[derive(Debug)]
pub struct Game {
    pub id: GameId,
    clients: [ClientId; 2],
    phase: GamePhase,
    turn: Option<Turn>,
    turns_announced: u32,
    signals: Option<mpsc::UnboundedSender<TurnSignal>>,
}

impl Game {
    pub fn new(id: GameId, first: ClientId, second: ClientId) -> Self {
        Self {
            id,
            clients: [first, second],
            phase: GamePhase::Created,
            turn: None,
            turns_announced: 0,
            signals: None,
        }
    }

    pub fn clients(&self) -> [ClientId; 2] {
        self.clients
    }

    /// The other participant, or `None` if `client` does not play here.
    pub fn opponent_of(&self, client: ClientId) -> Option<ClientId> {
        match self.clients {
            [first, second] if first == client => Some(second),
            [first, second] if second == client => Some(first),
            _ => None,
        }
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn turn(&self) -> Option<Turn> {
        self.turn
    }

    pub fn is_running(&self) -> bool {
        self.phase == GamePhase::Active
    }

    pub fn has_started(&self) -> bool {
        matches!(self.phase, GamePhase::Active | GamePhase::Ended(_))
    }

    pub fn mark_ready_wait(&mut self) {
        if self.phase == GamePhase::Created {
            self.phase = GamePhase::ReadyWait;
        }
    }

    /// Switches to `Active` and returns the receiving end the turn loop
    /// waits on. `None` if the game already started.
    pub fn start(&mut self) -> Option<mpsc::UnboundedReceiver<TurnSignal>> {
        if self.has_started() {
            return None;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.signals = Some(tx);
        self.phase = GamePhase::Active;
        Some(rx)
    }

    /// Opens the next turn with `clients[attacker_index]` attacking.
    pub fn begin_turn(&mut self, attacker_index: usize) -> Option<Turn> {
        if !self.is_running() {
            return None;
        }
        let attacker = self.clients[attacker_index % 2];
        let defender = self.clients[(attacker_index + 1) % 2];
        self.turns_announced += 1;

        let turn = Turn {
            number: self.turns_announced,
            attacker,
            defender,
            phase: TurnPhase::AwaitingCoordinates,
            released: false,
        };
        self.turn = Some(turn);
        Some(turn)
    }

    /// Accepts attack coordinates from `from`; returns the defender to relay
    /// them to.
    pub fn record_coordinates(&mut self, from: ClientId) -> Result<ClientId, TurnViolation> {
        let turn = self.current_turn_mut()?;
        if turn.attacker != from {
            return Err(TurnViolation::NotAttacker(from));
        }
        if turn.phase != TurnPhase::AwaitingCoordinates {
            return Err(TurnViolation::WrongPhase(turn.phase));
        }
        turn.phase = TurnPhase::AwaitingOutcome;
        Ok(turn.defender)
    }

    /// Accepts the defender's report (hit, miss or defeat); returns the
    /// attacker to relay it to.
    pub fn record_outcome(&mut self, from: ClientId) -> Result<ClientId, TurnViolation> {
        let turn = self.current_turn_mut()?;
        if turn.defender != from {
            return Err(TurnViolation::NotDefender(from));
        }
        if turn.phase != TurnPhase::AwaitingOutcome {
            return Err(TurnViolation::WrongPhase(turn.phase));
        }
        turn.phase = TurnPhase::Resolved;
        Ok(turn.attacker)
    }

    /// Lets the turn loop move on. Only a resolved turn can be released,
    /// and only once, so repeated readiness never skips a turn.
    pub fn release_turn(&mut self) -> bool {
        let Some(turn) = self.turn.as_mut() else {
            return false;
        };
        if turn.phase != TurnPhase::Resolved || turn.released {
            return false;
        }
        turn.released = true;
        self.signal(TurnSignal::Advance)
    }

    /// Ends the game and interrupts the turn loop.
    pub fn finish(&mut self, end: SessionEnd) {
        self.phase = GamePhase::Ended(end);
        self.signal(TurnSignal::Stop(end));
        self.signals = None;
    }

    fn current_turn_mut(&mut self) -> Result<&mut Turn, TurnViolation> {
        if !self.is_running() {
            return Err(TurnViolation::NotRunning);
        }
        self.turn.as_mut().ok_or(TurnViolation::NotRunning)
    }

    fn signal(&self, signal: TurnSignal) -> bool {
        match &self.signals {
            Some(tx) => tx.send(signal).is_ok(),
            None => false,
        }
    }
}

/// Drives the turns of one game until it is stopped.
///
/// Attackers alternate strictly: after each `Advance` the other client
/// attacks. The wait between turns is a channel receive, so a kill wakes
/// the loop immediately.
pub async fn run_turn_loop(
    state: SharedState,
    game: GameId,
    mut signals: mpsc::UnboundedReceiver<TurnSignal>,
) -> GameReport {
    let mut attackers = Vec::new();
    let mut attacker_index = 0;

    let end = loop {
        {
            let mut state = state.write().await;
            match state.announce_turn(game, attacker_index) {
                Some(attacker) => attackers.push(attacker),
                None => break None,
            }
        }

        match signals.recv().await {
            Some(TurnSignal::Advance) => attacker_index = (attacker_index + 1) % 2,
            Some(TurnSignal::Stop(end)) => break Some(end),
            None => break None,
        }
    };

    // A stop may already be queued when announce_turn found the game gone.
    let end = match end {
        Some(end) => Some(end),
        None => drain_stop(&mut signals),
    };

    info!("Game {} has finished after {} turns", game, attackers.len());
    GameReport {
        game,
        attackers,
        end,
    }
}

fn drain_stop(signals: &mut mpsc::UnboundedReceiver<TurnSignal>) -> Option<SessionEnd> {
    while let Ok(signal) = signals.try_recv() {
        if let TurnSignal::Stop(end) = signal {
            return Some(end);
        }
    }
    None
}

/// Spawns the turn loop plus a watcher that forwards its report, or logs
/// its panic, instead of letting either surface in another task.
pub fn spawn_turn_loop(
    state: SharedState,
    game: GameId,
    signals: mpsc::UnboundedReceiver<TurnSignal>,
) {
    debug!("Spawning turn loop for game {}", game);
    let handle = tokio::spawn(run_turn_loop(Arc::clone(&state), game, signals));

    tokio::spawn(async move {
        match handle.await {
            Ok(report) => state.read().await.report(report),
            Err(e) => error!("Turn loop of game {} panicked: {}", game, e),
        }
    });
}
