//! Per-connection command routing.
//!
//! Every decoded [`Command`] from one client goes through
//! [`Dispatcher::handle`], which applies it to the registry, the client's
//! game or the matchmaking queue under the shared write lock. Commands that
//! do not fit the client's current state are logged and dropped; the
//! connection stays open.

use crate::client_manager::ClientId;
use crate::game::{spawn_turn_loop, GameId, SessionEnd, TurnPhase, TurnSignal};
use crate::state::{ServerState, SharedState};
use log::{debug, info, warn};
use shared::{Command, Coordinate, StrikeOutcome};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Whether the connection's receive loop keeps reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub struct Dispatcher {
    state: SharedState,
    client_id: ClientId,
}

impl Dispatcher {
    pub fn new(state: SharedState, client_id: ClientId) -> Self {
        Self { state, client_id }
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Applies one command from this connection's client.
    pub async fn handle(&self, command: Command) -> Flow {
        let mut state = self.state.write().await;
        let connected = state
            .clients
            .get(self.client_id)
            .map(|client| client.connected)
            .unwrap_or(false);
        if !connected {
            debug!("Client {} is gone, dropping {}", self.client_id, command);
            return Flow::Exit;
        }
        debug!("<- client {}: {}", self.client_id, command);

        match command {
            Command::Left => {
                leave(&mut state, self.client_id);
                return Flow::Exit;
            }
            Command::Ready { marker } => {
                if let Some((game, signals)) = on_ready(&mut state, self.client_id, &marker) {
                    spawn_turn_loop(Arc::clone(&self.state), game, signals);
                }
            }
            Command::Stay => on_stay(&mut state, self.client_id),
            Command::StrikeTurn => on_strike_turn(&mut state, self.client_id),
            Command::StrikeAt(target) => on_strike_at(&mut state, self.client_id, target),
            Command::StrikeResult(outcome) => on_strike_result(&mut state, self.client_id, outcome),
            Command::Defeat => on_defeat(&mut state, self.client_id),
            Command::Defend => debug!("Client {} acknowledged its defence", self.client_id),
            other @ (Command::Username(_) | Command::Game { .. }) => {
                warn!("Ignoring unexpected {} from client {}", other, self.client_id)
            }
        }
        Flow::Continue
    }

    /// Cleanup for a connection that ended without `left`: EOF, a reset or
    /// a fatal framing error.
    pub async fn disconnect(&self) {
        let mut state = self.state.write().await;
        if state.clients.contains(self.client_id) {
            info!("Client {} disconnected without leaving", self.client_id);
            leave(&mut state, self.client_id);
        }
    }
}

/// Marks the client gone, kills its game if it had one and removes it from
/// the registry.
fn leave(state: &mut ServerState, client_id: ClientId) {
    let Some(client) = state.clients.get_mut(client_id) else {
        return;
    };
    client.connected = false;

    if let Some(game) = client.game() {
        if let Some(opponent) = state.games.get(game).and_then(|g| g.opponent_of(client_id)) {
            state.clients.notify(opponent, Command::Left);
        }
        warn!("Game {} killed: client {} left", game, client_id);
        if let Err(e) = state.end_game(game, SessionEnd::Killed { leaver: client_id }) {
            warn!("Could not end game {}: {}", game, e);
        }
    }

    state.clients.remove_client(client_id);
}

/// Records readiness. Returns the turn signal receiver when this call made
/// both clients ready before the match started.
fn on_ready(
    state: &mut ServerState,
    client_id: ClientId,
    marker: &str,
) -> Option<(GameId, mpsc::UnboundedReceiver<TurnSignal>)> {
    let Some(game_id) = state.clients.get(client_id).and_then(|client| client.game()) else {
        warn!("Client {} is ready but not in a game", client_id);
        return None;
    };
    let game = state.games.get(game_id)?;
    let started = game.has_started();
    let opponent = game.opponent_of(client_id)?;

    if !started && marker.is_empty() {
        debug!("Client {} sent an empty ready marker before the match", client_id);
        return None;
    }

    if let Some(client) = state.clients.get_mut(client_id) {
        client.ready = true;
    }
    let opponent_ready = state
        .clients
        .get(opponent)
        .map(|client| client.ready)
        .unwrap_or(false);

    let game = state.games.get_mut(game_id)?;
    if !opponent_ready {
        game.mark_ready_wait();
        return None;
    }

    for id in [client_id, opponent] {
        if let Some(client) = state.clients.get_mut(id) {
            client.ready = false;
        }
    }
    let game = state.games.get_mut(game_id)?;
    if started {
        if game.release_turn() {
            debug!("Game {}: both clients ready, turn released", game_id);
        }
        None
    } else {
        info!("Game {}: both fleets placed, starting", game_id);
        game.start().map(|signals| (game_id, signals))
    }
}

fn on_stay(state: &mut ServerState, client_id: ClientId) {
    let in_lobby = state
        .clients
        .get(client_id)
        .map(|client| client.in_lobby())
        .unwrap_or(false);
    if in_lobby {
        state.clients.move_to_back(client_id);
        debug!("Client {} moved to the back of the lobby", client_id);
    } else {
        warn!("Client {} sent stay while in a game", client_id);
    }
}

/// Re-announces the current turn when the attacker asks for it again.
fn on_strike_turn(state: &mut ServerState, client_id: ClientId) {
    let turn = state
        .clients
        .get(client_id)
        .and_then(|client| client.game())
        .and_then(|game| state.games.get(game))
        .and_then(|game| game.turn());

    match turn {
        Some(turn) if turn.attacker == client_id && turn.phase == TurnPhase::AwaitingCoordinates => {
            state.clients.notify(turn.attacker, Command::StrikeTurn);
            state.clients.notify(turn.defender, Command::Defend);
        }
        _ => warn!("Client {} asked for a turn it does not have", client_id),
    }
}

fn on_strike_at(state: &mut ServerState, client_id: ClientId, target: Coordinate) {
    let Some(game_id) = state.clients.get(client_id).and_then(|client| client.game()) else {
        warn!("Client {} struck {} outside a game", client_id, target);
        return;
    };
    let Some(game) = state.games.get_mut(game_id) else {
        return;
    };

    match game.record_coordinates(client_id) {
        Ok(defender) => state.clients.notify(defender, Command::StrikeAt(target)),
        Err(e) => warn!("Ignoring strike {} from client {}: {}", target, client_id, e),
    }
}

fn on_strike_result(state: &mut ServerState, client_id: ClientId, outcome: StrikeOutcome) {
    let Some(game_id) = state.clients.get(client_id).and_then(|client| client.game()) else {
        warn!("Client {} reported {:?} outside a game", client_id, outcome);
        return;
    };
    let Some(game) = state.games.get_mut(game_id) else {
        return;
    };

    let attacker = match game.record_outcome(client_id) {
        Ok(attacker) => attacker,
        Err(e) => {
            warn!("Ignoring {:?} from client {}: {}", outcome, client_id, e);
            return;
        }
    };
    game.release_turn();
    state.clients.notify(attacker, Command::StrikeResult(outcome));
}

fn on_defeat(state: &mut ServerState, client_id: ClientId) {
    let Some(game_id) = state.clients.get(client_id).and_then(|client| client.game()) else {
        warn!("Client {} reported defeat outside a game", client_id);
        return;
    };
    let Some(game) = state.games.get_mut(game_id) else {
        return;
    };

    let attacker = match game.record_outcome(client_id) {
        Ok(attacker) => attacker,
        Err(e) => {
            warn!("Ignoring defeat from client {}: {}", client_id, e);
            return;
        }
    };
    state.clients.notify(attacker, Command::Defeat);

    info!("Game {}: client {} defeated client {}", game_id, attacker, client_id);
    let end = SessionEnd::Defeated {
        winner: attacker,
        loser: client_id,
    };
    if let Err(e) = state.end_game(game_id, end) {
        warn!("Could not end game {}: {}", game_id, e);
    }
}
