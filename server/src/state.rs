//! State shared by the acceptor, every connection task and every turn loop.
//!
//! Client registry and session pool sit behind one coarse `RwLock`, so
//! pairing, removal and turn bookkeeping are atomic with respect to each
//! other. Per-client and per-game fields are only touched under that lock.

use crate::client_manager::{ClientId, ClientManager};
use crate::game::{GameId, GameReport};
use crate::matchmaking::SessionPool;
use log::{debug, warn};
use shared::Command;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

pub type SharedState = Arc<RwLock<ServerState>>;

pub struct ServerState {
    pub clients: ClientManager,
    pub games: SessionPool,
    reports: mpsc::UnboundedSender<GameReport>,
}

impl ServerState {
    /// `reports` receives one [`GameReport`] per finished turn loop.
    pub fn new(max_games: usize, reports: mpsc::UnboundedSender<GameReport>) -> Self {
        Self {
            clients: ClientManager::new(),
            games: SessionPool::new(max_games),
            reports,
        }
    }

    pub fn shared(self) -> SharedState {
        Arc::new(RwLock::new(self))
    }

    pub fn report(&self, report: GameReport) {
        if self.reports.send(report).is_err() {
            warn!("Game report dropped, nobody is listening");
        }
    }

    /// Opens the next turn of `game` and tells both sides their role.
    /// Returns the attacker, or `None` once the game is no longer running.
    pub(crate) fn announce_turn(&mut self, game: GameId, attacker_index: usize) -> Option<ClientId> {
        let turn = self.games.get_mut(game)?.begin_turn(attacker_index)?;
        debug!(
            "Game {} turn {}: client {} attacks client {}",
            game, turn.number, turn.attacker, turn.defender
        );

        self.clients.notify(turn.attacker, Command::StrikeTurn);
        self.clients.notify(turn.defender, Command::Defend);
        Some(turn.attacker)
    }
}
