//! Session pool and the pairing of lobby clients into games.

use crate::client_manager::ClientId;
use crate::error::ServerError;
use crate::game::{Game, GameId, SessionEnd};
use crate::state::ServerState;
use log::{debug, info};
use shared::Command;

/// Concurrent games allowed unless configured otherwise.
pub const DEFAULT_MAX_GAMES: usize = 2;

/// Bounded collection of active games
///
/// A game occupies a slot from pairing until it ends, whichever way it
/// ends. No new game is created while every slot is taken.
pub struct SessionPool {
    /// Active games, oldest first
    games: Vec<Game>,
    /// Maximum number of concurrent games
    capacity: usize,
    /// Next available game ID
    next_game_id: GameId,
}

impl SessionPool {
    /// Creates an empty pool with room for `capacity` games
    ///
    /// Game IDs start from 1 and are never reused.
    pub fn new(capacity: usize) -> Self {
        Self {
            games: Vec::new(),
            capacity,
            next_game_id: 1,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True while another game fits.
    pub fn available(&self) -> bool {
        self.games.len() < self.capacity
    }

    /// Registers a new game for the two clients
    ///
    /// The game starts in its created phase; nothing is sent to either
    /// client here. Fails with `PoolFull` when no slot is free.
    pub fn create(&mut self, first: ClientId, second: ClientId) -> Result<GameId, ServerError> {
        if !self.available() {
            return Err(ServerError::PoolFull(self.games.len()));
        }
        let id = self.next_game_id;
        self.next_game_id += 1;
        self.games.push(Game::new(id, first, second));
        Ok(id)
    }

    /// Frees the game's slot and hands the game back to the caller, which
    /// is responsible for finishing it.
    pub fn remove(&mut self, id: GameId) -> Option<Game> {
        let index = self.games.iter().position(|game| game.id == id)?;
        Some(self.games.remove(index))
    }

    pub fn get(&self, id: GameId) -> Option<&Game> {
        self.games.iter().find(|game| game.id == id)
    }

    pub fn get_mut(&mut self, id: GameId) -> Option<&mut Game> {
        self.games.iter_mut().find(|game| game.id == id)
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }
}

impl ServerState {
    /// Pairs two lobby clients into a new game and tells each who it plays.
    ///
    /// Anything but two distinct, connected lobby clients, or a full pool,
    /// leaves all state untouched.
    pub fn new_game(&mut self, pair: &[ClientId]) -> Result<GameId, ServerError> {
        let &[first, second] = pair else {
            return Err(ServerError::MatchmakingPrecondition(format!(
                "expected 2 clients, got {}",
                pair.len()
            )));
        };
        if first == second {
            return Err(ServerError::MatchmakingPrecondition(format!(
                "client {} cannot play against itself",
                first
            )));
        }
        for id in [first, second] {
            let client = self.clients.get(id).ok_or(ServerError::UnknownClient(id))?;
            if !client.connected || !client.in_lobby() {
                return Err(ServerError::MatchmakingPrecondition(format!(
                    "client {} is not waiting in the lobby",
                    id
                )));
            }
        }

        let game = self.games.create(first, second)?;
        let mut usernames = Vec::with_capacity(2);
        for id in [first, second] {
            if let Some(client) = self.clients.get_mut(id) {
                client.join_game(game);
                usernames.push(client.username.clone());
            }
        }
        if let [first_name, second_name] = usernames.as_slice() {
            self.clients.notify(first, Command::Game {
                opponent: second_name.clone(),
            });
            self.clients.notify(second, Command::Game {
                opponent: first_name.clone(),
            });
        }

        info!(
            "Game {} created for clients {} and {} ({}/{} slots used)",
            game,
            first,
            second,
            self.games.len(),
            self.games.capacity()
        );
        Ok(game)
    }

    /// Stops the game's turn loop, returns both clients to the lobby and
    /// frees the slot.
    pub fn end_game(&mut self, game: GameId, end: SessionEnd) -> Result<(), ServerError> {
        let mut finished = self.games.remove(game).ok_or(ServerError::UnknownGame(game))?;
        finished.finish(end);

        for id in finished.clients() {
            if let Some(client) = self.clients.get_mut(id) {
                client.return_to_lobby();
            }
        }

        info!("Game {} ended: {:?}", game, end);
        Ok(())
    }

    /// Pairs the two longest-waiting lobby clients when a slot is free.
    pub fn try_matchmake(&mut self) -> Option<GameId> {
        if !self.games.available() {
            return None;
        }
        let pair = self.clients.peek_lobby(2);
        if pair.is_empty() {
            return None;
        }

        match self.new_game(&pair) {
            Ok(game) => Some(game),
            Err(e) => {
                debug!("Matchmaking deferred: {}", e);
                None
            }
        }
    }
}
