//! Registry of connected players for the battleship server
//!
//! This module tracks every admitted connection, including:
//! - Client identity (server-assigned ID, peer address, username)
//! - Lobby / in-game location and the per-client readiness flag
//! - Arrival order, which doubles as the matchmaking queue
//! - The outbound command channel drained by the connection's writer task
//!
//! The registry itself is not synchronised; it lives inside the server's
//! single coarse lock together with the session pool.

use crate::error::ServerError;
use crate::game::GameId;
use log::{debug, info, warn};
use shared::Command;
use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use tokio::sync::mpsc;

pub type ClientId = u32;

/// Where a client currently is. Being in a game and being in the lobby are
/// mutually exclusive, and the game id exists exactly while in a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    Lobby,
    InGame(GameId),
}

/// A connected player
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: ClientId,
    /// Peer address, for logging
    pub addr: SocketAddr,
    /// Name sent during identification; may be empty
    pub username: String,
    /// Cleared when the client leaves so late commands are ignored
    pub connected: bool,
    /// Readiness gate, used once for fleet placement and then per turn
    pub ready: bool,
    location: Location,
    sender: mpsc::UnboundedSender<Command>,
}

impl Client {
    /// Creates a connected client waiting in the lobby.
    pub fn new(
        id: ClientId,
        addr: SocketAddr,
        username: String,
        sender: mpsc::UnboundedSender<Command>,
    ) -> Self {
        Self {
            id,
            addr,
            username,
            connected: true,
            ready: false,
            location: Location::Lobby,
            sender,
        }
    }

    pub fn in_game(&self) -> bool {
        matches!(self.location, Location::InGame(_))
    }

    pub fn in_lobby(&self) -> bool {
        self.location == Location::Lobby
    }

    /// The game this client plays in, if any.
    pub fn game(&self) -> Option<GameId> {
        match self.location {
            Location::InGame(game) => Some(game),
            Location::Lobby => None,
        }
    }

    pub fn join_game(&mut self, game: GameId) {
        self.location = Location::InGame(game);
        self.ready = false;
    }

    pub fn return_to_lobby(&mut self) {
        self.location = Location::Lobby;
        self.ready = false;
    }

    /// Queues a command for this client's writer task.
    ///
    /// Fails only when the writer is gone, i.e. the connection already ended.
    pub fn send(&self, command: Command) -> Result<(), ServerError> {
        debug!("-> {}: {}", self, command);
        self.sender
            .send(command)
            .map_err(|_| ServerError::ClientUnreachable(self.id))
    }
}

impl fmt::Display for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client {} ({:?} @ {})", self.id, self.username, self.addr)
    }
}

/// Arrival-ordered collection of connected clients
///
/// Insertion order is preserved, so the lobby view is a FIFO queue: the
/// clients that waited longest are matched first.
pub struct ClientManager {
    /// Connected clients, oldest first
    clients: VecDeque<Client>,
    /// Next available client ID for new connections
    next_client_id: ClientId,
}

impl ClientManager {
    /// Creates an empty registry
    ///
    /// Client IDs start from 1 and increment for each admitted connection;
    /// an ID is never reused while the server runs.
    pub fn new() -> Self {
        Self {
            clients: VecDeque::new(),
            next_client_id: 1,
        }
    }

    /// Admits a client at the back of the queue
    ///
    /// The client starts in the lobby, not ready, with `sender` as the
    /// channel its connection's writer task drains. Returns the new ID.
    pub fn add_client(
        &mut self,
        addr: SocketAddr,
        username: String,
        sender: mpsc::UnboundedSender<Command>,
    ) -> ClientId {
        let client_id = self.next_client_id;
        self.next_client_id += 1;

        let client = Client::new(client_id, addr, username, sender);
        info!("{} joined the lobby", client);
        self.clients.push_back(client);

        client_id
    }

    /// Removes a client from the registry
    ///
    /// Dropping the client drops its outbound sender, which ends the
    /// connection's writer task. Returns true if the client was found and
    /// removed, false if it was already gone.
    pub fn remove_client(&mut self, client_id: ClientId) -> bool {
        match self.position(client_id) {
            Some(index) => {
                if let Some(client) = self.clients.remove(index) {
                    info!("{} removed from registry", client);
                }
                true
            }
            None => false,
        }
    }

    /// Moves a client to the back of the arrival order
    ///
    /// The client gives up its matchmaking priority: every other lobby
    /// client is now considered before it. Returns false for unknown
    /// clients.
    pub fn move_to_back(&mut self, client_id: ClientId) -> bool {
        let Some(client) = self
            .position(client_id)
            .and_then(|index| self.clients.remove(index))
        else {
            return false;
        };
        self.clients.push_back(client);
        true
    }

    /// Looks up a client by ID
    pub fn get(&self, client_id: ClientId) -> Option<&Client> {
        self.clients.iter().find(|client| client.id == client_id)
    }

    pub fn get_mut(&mut self, client_id: ClientId) -> Option<&mut Client> {
        self.clients.iter_mut().find(|client| client.id == client_id)
    }

    /// True while the client is registered, i.e. until it left or its
    /// connection failed.
    pub fn contains(&self, client_id: ClientId) -> bool {
        self.position(client_id).is_some()
    }

    /// Lobby clients in arrival order.
    pub fn clients_in_lobby(&self) -> Vec<ClientId> {
        self.clients
            .iter()
            .filter(|client| client.in_lobby())
            .map(|client| client.id)
            .collect()
    }

    /// In-game clients in arrival order.
    pub fn clients_in_game(&self) -> Vec<ClientId> {
        self.clients
            .iter()
            .filter(|client| client.in_game())
            .map(|client| client.id)
            .collect()
    }

    /// The first `n` lobby clients in arrival order
    ///
    /// Returns an empty list when fewer than `n` clients wait, so callers
    /// never see a partial pairing.
    pub fn peek_lobby(&self, n: usize) -> Vec<ClientId> {
        let lobby: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|client| client.in_lobby())
            .map(|client| client.id)
            .take(n)
            .collect();

        if lobby.len() < n {
            Vec::new()
        } else {
            lobby
        }
    }

    /// Queues a command for a client by ID
    ///
    /// Fails with `UnknownClient` if no such client is registered and with
    /// `ClientUnreachable` once its writer task has ended.
    pub fn send_to(&self, client_id: ClientId, command: Command) -> Result<(), ServerError> {
        self.get(client_id)
            .ok_or(ServerError::UnknownClient(client_id))?
            .send(command)
    }

    /// Like [`send_to`](Self::send_to), but a failure is only logged. The
    /// unreachable client's own connection task cleans it up.
    pub fn notify(&self, client_id: ClientId, command: Command) {
        if let Err(e) = self.send_to(client_id, command) {
            warn!("Could not notify client {}: {}", client_id, e);
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    fn position(&self, client_id: ClientId) -> Option<usize> {
        self.clients.iter().position(|client| client.id == client_id)
    }
}

impl Default for ClientManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:10000".parse().unwrap()
    }

    fn add(manager: &mut ClientManager, name: &str) -> (ClientId, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (manager.add_client(test_addr(), name.to_string(), tx), rx)
    }

    #[test]
    fn test_client_creation() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let client = Client::new(1, test_addr(), "karl".to_string(), tx);

        assert_eq!(client.id, 1);
        assert!(client.connected);
        assert!(!client.ready);
        assert!(client.in_lobby());
        assert!(!client.in_game());
        assert_eq!(client.game(), None);
    }

    #[test]
    fn test_location_flags_stay_exclusive() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut client = Client::new(1, test_addr(), String::new(), tx);

        client.ready = true;
        client.join_game(7);
        assert!(client.in_game());
        assert!(!client.in_lobby());
        assert_eq!(client.game(), Some(7));
        assert!(!client.ready);

        client.ready = true;
        client.return_to_lobby();
        assert!(client.in_lobby());
        assert!(!client.in_game());
        assert_eq!(client.game(), None);
        assert!(!client.ready);
    }

    #[test]
    fn test_client_send_reaches_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let client = Client::new(3, test_addr(), String::new(), tx);

        client.send(Command::Defend).unwrap();
        assert_eq!(rx.try_recv().unwrap(), Command::Defend);

        drop(rx);
        assert!(matches!(
            client.send(Command::Defend),
            Err(ServerError::ClientUnreachable(3))
        ));
    }

    #[test]
    fn test_add_clients_assigns_sequential_ids() {
        let mut manager = ClientManager::new();
        let (first, _rx1) = add(&mut manager, "a");
        let (second, _rx2) = add(&mut manager, "b");

        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(manager.len(), 2);
        assert!(!manager.is_empty());
    }

    #[test]
    fn test_remove_client() {
        let mut manager = ClientManager::new();
        let (id, _rx) = add(&mut manager, "a");

        assert!(manager.remove_client(id));
        assert!(manager.is_empty());
        assert!(!manager.remove_client(id));
    }

    #[test]
    fn test_remove_nonexistent_client() {
        let mut manager = ClientManager::new();
        assert!(!manager.remove_client(999));
    }

    #[test]
    fn test_lobby_and_game_views_preserve_order() {
        let mut manager = ClientManager::new();
        let (a, _ra) = add(&mut manager, "a");
        let (b, _rb) = add(&mut manager, "b");
        let (c, _rc) = add(&mut manager, "c");
        let (d, _rd) = add(&mut manager, "d");

        manager.get_mut(b).unwrap().join_game(1);
        manager.get_mut(d).unwrap().join_game(1);

        assert_eq!(manager.clients_in_lobby(), vec![a, c]);
        assert_eq!(manager.clients_in_game(), vec![b, d]);
    }

    #[test]
    fn test_peek_lobby_requires_full_pair() {
        let mut manager = ClientManager::new();
        assert!(manager.peek_lobby(2).is_empty());

        let (a, _ra) = add(&mut manager, "a");
        assert!(manager.peek_lobby(2).is_empty());

        let (b, _rb) = add(&mut manager, "b");
        let (_c, _rc) = add(&mut manager, "c");
        assert_eq!(manager.peek_lobby(2), vec![a, b]);
    }

    #[test]
    fn test_peek_lobby_skips_clients_in_game() {
        let mut manager = ClientManager::new();
        let (a, _ra) = add(&mut manager, "a");
        let (b, _rb) = add(&mut manager, "b");
        let (c, _rc) = add(&mut manager, "c");

        manager.get_mut(a).unwrap().join_game(1);
        assert_eq!(manager.peek_lobby(2), vec![b, c]);
    }

    #[test]
    fn test_move_to_back_defers_priority() {
        let mut manager = ClientManager::new();
        let (a, _ra) = add(&mut manager, "a");
        let (b, _rb) = add(&mut manager, "b");
        let (c, _rc) = add(&mut manager, "c");

        assert!(manager.move_to_back(a));
        assert_eq!(manager.peek_lobby(2), vec![b, c]);
        assert_eq!(manager.clients_in_lobby(), vec![b, c, a]);
        assert!(!manager.move_to_back(42));
    }

    #[test]
    fn test_send_to_unknown_client() {
        let manager = ClientManager::new();
        assert!(matches!(
            manager.send_to(5, Command::Left),
            Err(ServerError::UnknownClient(5))
        ));
    }
}
