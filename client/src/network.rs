//! Client side of the battleship connection
//!
//! [`Connection`] owns two background tasks: a reader that decodes frames
//! from the server into an inbox queue, and a writer that drains intents
//! submitted through the connection's methods. Front-ends never touch the
//! socket; they poll the inbox once per frame (or await it) and call
//! [`Connection::strike_at`], [`Connection::report`] and friends.

use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{Command, CommandCodec, Coordinate, ProtocolError, StrikeOutcome, FLEET_READY_MARKER};
use std::io;
use thiserror::Error;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection failure: {0}")]
    ConnectionFailure(#[from] io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[source] ProtocolError),

    /// The writer task is gone, so nothing more can be sent.
    #[error("connection closed")]
    Closed,
}

impl From<ProtocolError> for ClientError {
    fn from(error: ProtocolError) -> Self {
        match error {
            ProtocolError::Io(io) => ClientError::ConnectionFailure(io),
            other => ClientError::Protocol(other),
        }
    }
}

/// An identified connection to the server.
pub struct Connection {
    username: String,
    outbound: mpsc::UnboundedSender<Command>,
    inbox: mpsc::UnboundedReceiver<Command>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl Connection {
    /// Connects and identifies as `username`. The server puts the client in
    /// its lobby right away; a `game` message follows once it is paired.
    pub async fn connect(addr: impl ToSocketAddrs, username: &str) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        let peer = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();

        let mut sink = FramedWrite::new(write_half, CommandCodec::new());
        sink.send(Command::Username(username.to_string())).await?;
        info!("Connected to {} as {:?}", peer, username);

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Command>();
        let writer = tokio::spawn(async move {
            while let Some(command) = outbound_rx.recv().await {
                debug!("-> {}", command);
                if let Err(e) = sink.send(command).await {
                    error!("Failed to send to server: {}", e);
                    break;
                }
            }
        });

        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        let reader = tokio::spawn(async move {
            let mut frames = FramedRead::new(read_half, CommandCodec::new());
            while let Some(frame) = frames.next().await {
                let message = match frame {
                    Ok(message) => message,
                    Err(e) => {
                        error!("Connection to server failed: {}", e);
                        break;
                    }
                };
                match Command::try_from(message) {
                    Ok(command) => {
                        debug!("<- {}", command);
                        if inbox_tx.send(command).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Ignoring message from server: {}", e),
                }
            }
            info!("Server connection closed");
        });

        Ok(Connection {
            username: username.to_string(),
            outbound,
            inbox,
            writer,
            reader,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Next queued message, without waiting.
    pub fn poll_message(&mut self) -> Option<Command> {
        self.inbox.try_recv().ok()
    }

    /// Everything received since the last call, in order.
    pub fn poll_messages(&mut self) -> Vec<Command> {
        let mut messages = Vec::new();
        while let Some(message) = self.poll_message() {
            messages.push(message);
        }
        messages
    }

    /// Waits for the next message. `None` once the server closed the
    /// connection and the queue is drained.
    pub async fn next_message(&mut self) -> Option<Command> {
        self.inbox.recv().await
    }

    pub fn send(&self, command: Command) -> Result<(), ClientError> {
        self.outbound.send(command).map_err(|_| ClientError::Closed)
    }

    pub fn ready(&self, marker: &str) -> Result<(), ClientError> {
        self.send(Command::Ready {
            marker: marker.to_string(),
        })
    }

    /// Tells the server the fleet is placed.
    pub fn ready_fleet(&self) -> Result<(), ClientError> {
        self.ready(FLEET_READY_MARKER)
    }

    pub fn strike_at(&self, row: u8, col: u8) -> Result<(), ClientError> {
        self.send(Command::StrikeAt(Coordinate::new(row, col)))
    }

    /// Reports what the opponent's last strike hit.
    pub fn report(&self, outcome: StrikeOutcome) -> Result<(), ClientError> {
        self.send(Command::StrikeResult(outcome))
    }

    /// Reports the whole fleet sunk, conceding the game.
    pub fn report_defeat(&self) -> Result<(), ClientError> {
        self.send(Command::Defeat)
    }

    pub fn stay(&self) -> Result<(), ClientError> {
        self.send(Command::Stay)
    }

    pub fn left(&self) -> Result<(), ClientError> {
        self.send(Command::Left)
    }

    /// Flushes pending intents and closes the socket.
    pub async fn close(self) {
        let Connection {
            outbound,
            writer,
            reader,
            ..
        } = self;
        drop(outbound);
        if let Err(e) = writer.await {
            error!("Writer task panicked: {}", e);
        }
        reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_connect_sends_username_first() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let connection = Connection::connect(addr, "anna").await.unwrap();
        assert_eq!(connection.username(), "anna");
        let (stream, _) = listener.accept().await.unwrap();
        let mut lines = BufReader::new(stream).lines();

        assert_eq!(lines.next_line().await.unwrap().unwrap(), "-username;anna");

        connection.strike_at(2, 7).unwrap();
        connection.report(StrikeOutcome::Miss).unwrap();
        connection.report_defeat().unwrap();
        connection.ready_fleet().unwrap();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "-strike;2|7");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "-strike;-1");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "-strike;all");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "-ready;fleet");

        connection.close().await;
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_inbox_receives_decoded_commands() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut connection = Connection::connect(addr, "karl").await.unwrap();
        assert_eq!(connection.poll_message(), None);

        let (mut stream, _) = listener.accept().await.unwrap();
        stream
            .write_all(b"-game;anna\n-bogus;\n-defend;\n-strike;3|5\n")
            .await
            .unwrap();

        let first = timeout(Duration::from_secs(1), connection.next_message())
            .await
            .unwrap();
        assert_eq!(
            first,
            Some(Command::Game {
                opponent: "anna".to_string()
            })
        );
        assert_eq!(
            timeout(Duration::from_secs(1), connection.next_message())
                .await
                .unwrap(),
            Some(Command::Defend)
        );
        assert_eq!(
            timeout(Duration::from_secs(1), connection.next_message())
                .await
                .unwrap(),
            Some(Command::StrikeAt(Coordinate::new(3, 5)))
        );

        drop(stream);
        assert_eq!(
            timeout(Duration::from_secs(1), connection.next_message())
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_poll_messages_drains_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut connection = Connection::connect(addr, "lena").await.unwrap();
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(b"-game;otto\n-strike;\n").await.unwrap();

        let mut received = Vec::new();
        for _ in 0..100 {
            received.extend(connection.poll_messages());
            if received.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(
            received,
            vec![
                Command::Game {
                    opponent: "otto".to_string()
                },
                Command::StrikeTurn,
            ]
        );
        assert!(connection.poll_messages().is_empty());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        assert!(matches!(
            Connection::connect(addr, "x").await,
            Err(ClientError::ConnectionFailure(_))
        ));
    }
}
