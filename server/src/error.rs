use crate::client_manager::ClientId;
use crate::game::GameId;
use shared::ProtocolError;
use std::time::Duration;
use thiserror::Error;

/// Failures inside the session layer.
///
/// None of these are fatal to the server: each one is contained in the task
/// that hit it and logged there.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The socket was reset, closed, or refused a write.
    #[error("connection failure: {0}")]
    ConnectionFailure(#[from] std::io::Error),

    /// The client's outbound channel is gone; its writer task has ended.
    #[error("client {0} can no longer be reached")]
    ClientUnreachable(ClientId),

    #[error("unknown client {0}")]
    UnknownClient(ClientId),

    #[error("unknown game {0}")]
    UnknownGame(GameId),

    /// A game needs exactly two distinct clients waiting in the lobby.
    #[error("matchmaking precondition failed: {0}")]
    MatchmakingPrecondition(String),

    #[error("session pool is full ({0} active games)")]
    PoolFull(usize),

    #[error("no username received within {0:?}")]
    UsernameTimeout(Duration),

    /// The first frame of a connection was something other than `username`.
    #[error("expected a username, got {0}")]
    NotIdentified(String),

    #[error("protocol error: {0}")]
    Protocol(#[source] ProtocolError),
}

impl From<ProtocolError> for ServerError {
    fn from(error: ProtocolError) -> Self {
        match error {
            ProtocolError::Io(io) => ServerError::ConnectionFailure(io),
            other => ServerError::Protocol(other),
        }
    }
}
