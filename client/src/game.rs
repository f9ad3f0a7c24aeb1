use log::debug;
use shared::{Command, Coordinate, StrikeOutcome};

/// Where the local player stands in the protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// Waiting to be paired.
    Lobby,
    /// Paired; fleet placement and the ready exchange happen here.
    Matched { opponent: String },
    /// Our turn to pick a target.
    Attacking,
    /// Opponent's turn; we report what their strike hit.
    Defending,
    /// Target sent, waiting for the opponent's report.
    AwaitingResult,
    Won,
    Lost,
    OpponentLeft,
}

/// Protocol-level view of one client's game. Holds no board: whether a
/// strike hit is decided by whoever owns the fleet.
#[derive(Debug, Clone)]
pub struct ClientGameState {
    phase: Phase,
    opponent: Option<String>,
    turns: u32,
    last_target: Option<Coordinate>,
    /// Incoming strike that still needs a report.
    incoming: Option<Coordinate>,
    /// Our strikes and what they hit, in order.
    shots: Vec<(Coordinate, StrikeOutcome)>,
}

impl ClientGameState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Lobby,
            opponent: None,
            turns: 0,
            last_target: None,
            incoming: None,
            shots: Vec::new(),
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn opponent(&self) -> Option<&str> {
        self.opponent.as_deref()
    }

    /// Turns announced to either side since the match started.
    pub fn turns(&self) -> u32 {
        self.turns
    }

    pub fn shots(&self) -> &[(Coordinate, StrikeOutcome)] {
        &self.shots
    }

    pub fn can_fire(&self) -> bool {
        self.phase == Phase::Attacking
    }

    /// The opponent's strike awaiting our hit/miss report.
    pub fn pending_report(&self) -> Option<Coordinate> {
        match self.phase {
            Phase::Defending => self.incoming,
            _ => None,
        }
    }

    pub fn is_over(&self) -> bool {
        matches!(self.phase, Phase::Won | Phase::Lost | Phase::OpponentLeft)
    }

    /// Applies a command received from the server.
    pub fn on_received(&mut self, command: &Command) {
        match command {
            Command::Game { opponent } => {
                *self = Self::new();
                self.opponent = Some(opponent.clone());
                self.phase = Phase::Matched {
                    opponent: opponent.clone(),
                };
            }
            Command::StrikeTurn => {
                self.turns += 1;
                self.phase = Phase::Attacking;
            }
            Command::Defend => {
                self.turns += 1;
                self.incoming = None;
                self.phase = Phase::Defending;
            }
            Command::StrikeAt(target) => self.incoming = Some(*target),
            Command::StrikeResult(outcome) => {
                if let Some(target) = self.last_target.take() {
                    self.shots.push((target, *outcome));
                }
            }
            Command::Defeat => {
                self.last_target = None;
                self.phase = Phase::Won;
            }
            Command::Left => self.phase = Phase::OpponentLeft,
            other => debug!("No state change for {}", other),
        }
    }

    /// Applies a command this client sent.
    pub fn on_sent(&mut self, command: &Command) {
        match command {
            Command::StrikeAt(target) if self.can_fire() => {
                self.last_target = Some(*target);
                self.phase = Phase::AwaitingResult;
            }
            Command::StrikeResult(_) => self.incoming = None,
            Command::Defeat => {
                self.incoming = None;
                self.phase = Phase::Lost;
            }
            _ => {}
        }
    }

    /// Back to the lobby after a finished game.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for ClientGameState {
    fn default() -> Self {
        Self::new()
    }
}
