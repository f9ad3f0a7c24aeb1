//! TCP acceptor and per-connection tasks
//!
//! The acceptor owns the listening socket and runs a single `select!` loop
//! over new connections, the matchmaking tick and finished-game reports.
//! Each accepted socket gets its own task which:
//! - waits (bounded) for the `username` frame that identifies the player
//! - registers the client in the lobby
//! - spawns a writer task draining the client's outbound channel
//! - feeds every decoded frame to a [`Dispatcher`] until the client leaves
//!
//! Failures in a connection task end that connection only.

use crate::client_manager::ClientId;
use crate::dispatcher::{Dispatcher, Flow};
use crate::error::ServerError;
use crate::game::GameReport;
use crate::matchmaking::DEFAULT_MAX_GAMES;
use crate::state::{ServerState, SharedState};
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{
    Command, CommandCodec, ProtocolError, DEFAULT_PORT, LISTEN_BACKLOG, USERNAME_TIMEOUT_SECS,
};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::time::{self, interval, MissedTickBehavior};
use tokio_util::codec::{FramedRead, FramedWrite};

/// How often waiting lobby clients are re-checked for a pairing.
pub const DEFAULT_MATCHMAKING_INTERVAL: Duration = Duration::from_millis(250);

/// Runtime settings for [`Server`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    /// `0` picks a free port; see [`Server::local_addr`].
    pub port: u16,
    pub backlog: u32,
    pub max_games: usize,
    pub username_timeout: Duration,
    pub matchmaking_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            backlog: LISTEN_BACKLOG,
            max_games: DEFAULT_MAX_GAMES,
            username_timeout: Duration::from_secs(USERNAME_TIMEOUT_SECS),
            matchmaking_interval: DEFAULT_MATCHMAKING_INTERVAL,
        }
    }
}

/// The battleship acceptor
pub struct Server {
    listener: TcpListener,
    state: SharedState,
    reports: mpsc::UnboundedReceiver<GameReport>,
    config: ServerConfig,
}

impl Server {
    /// Binds the listening socket with the configured backlog.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let addr = tokio::net::lookup_host((config.host.as_str(), config.port))
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("{}:{} did not resolve", config.host, config.port),
                )
            })?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(config.backlog)?;
        info!("Server listening on {}", listener.local_addr()?);

        let (reports_tx, reports) = mpsc::unbounded_channel();
        let state = ServerState::new(config.max_games, reports_tx).shared();

        Ok(Server {
            listener,
            state,
            reports,
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle to the shared registry and session pool.
    pub fn state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    /// Accepts connections until the task is dropped.
    pub async fn run(mut self) -> Result<(), ServerError> {
        let mut matchmaking = interval(self.config.matchmaking_interval);
        matchmaking.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Server started: up to {} games, username timeout {:?}",
            self.config.max_games, self.config.username_timeout
        );

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.spawn_connection(stream, addr),
                        Err(e) => error!("Failed to accept connection: {}", e),
                    }
                },

                _ = matchmaking.tick() => {
                    self.state.write().await.try_matchmake();
                },

                Some(report) = self.reports.recv() => log_report(&report),
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr) {
        info!("Accepted connection from {}", addr);
        let state = Arc::clone(&self.state);
        let username_timeout = self.config.username_timeout;

        tokio::spawn(async move {
            let (reader, writer) = stream.into_split();
            if let Err(e) = handle_connection(state, reader, writer, addr, username_timeout).await {
                warn!("Connection from {} closed: {}", addr, e);
            }
        });
    }
}

fn log_report(report: &GameReport) {
    match report.end {
        Some(end) => info!(
            "Game {} report: {:?} after {} turns",
            report.game,
            end,
            report.attackers.len()
        ),
        None => warn!(
            "Game {} turn loop stopped without a result after {} turns",
            report.game,
            report.attackers.len()
        ),
    }
}

/// Admits one client and runs its receive loop until it leaves.
///
/// The connection ends when the client sends `left`, when its socket stops
/// delivering frames, or when a write to it fails. The last two count as a
/// disconnect: the client's game is killed and the opponent told.
async fn handle_connection<R, W>(
    state: SharedState,
    reader: R,
    writer: W,
    addr: SocketAddr,
    username_timeout: Duration,
) -> Result<(), ServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut frames = FramedRead::new(reader, CommandCodec::new());
    let sink = FramedWrite::new(writer, CommandCodec::new());

    let username = time::timeout(username_timeout, read_username(&mut frames))
        .await
        .map_err(|_| ServerError::UsernameTimeout(username_timeout))??;

    let (tx, rx) = mpsc::unbounded_channel();
    let client_id = {
        let mut state = state.write().await;
        let client_id = state.clients.add_client(addr, username, tx);
        state.try_matchmake();
        client_id
    };
    let mut writer = tokio::spawn(write_commands(client_id, rx, sink));

    let dispatcher = Dispatcher::new(state, client_id);
    let (result, writer_finished) = tokio::select! {
        received = receive_commands(&dispatcher, &mut frames) => (received, false),
        written = &mut writer => (flatten_writer(client_id, written), true),
    };
    if result.is_err() {
        dispatcher.disconnect().await;
    }

    // The writer ends once the registry dropped the client's sender.
    if !writer_finished {
        if let Err(e) = flatten_writer(client_id, writer.await) {
            debug!("Writer of client {} stopped: {}", client_id, e);
        }
    }
    result
}

fn flatten_writer(
    client_id: ClientId,
    written: Result<Result<(), ServerError>, JoinError>,
) -> Result<(), ServerError> {
    match written {
        Ok(result) => result,
        Err(e) => {
            error!("Writer task of client {} panicked: {}", client_id, e);
            Err(io::Error::from(e).into())
        }
    }
}

/// The first frame must identify the player.
async fn read_username<R>(frames: &mut FramedRead<R, CommandCodec>) -> Result<String, ServerError>
where
    R: AsyncRead + Unpin,
{
    let message = match frames.next().await {
        Some(message) => message?,
        None => return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
    };

    match Command::try_from(message)? {
        // A name the codec cannot write back could never be sent to an opponent.
        Command::Username(name) if name.contains('\r') => {
            Err(ProtocolError::LineBreakInPayload.into())
        }
        Command::Username(name) => Ok(name),
        other => Err(ServerError::NotIdentified(other.to_string())),
    }
}

async fn receive_commands<R>(
    dispatcher: &Dispatcher,
    frames: &mut FramedRead<R, CommandCodec>,
) -> Result<(), ServerError>
where
    R: AsyncRead + Unpin,
{
    let client_id = dispatcher.client_id();
    while let Some(frame) = frames.next().await {
        let message = frame?;
        match Command::try_from(message) {
            Ok(command) => {
                if dispatcher.handle(command).await == Flow::Exit {
                    return Ok(());
                }
            }
            Err(e) => warn!("Ignoring command from client {}: {}", client_id, e),
        }
    }

    debug!("Client {} closed its connection", client_id);
    Err(io::Error::from(io::ErrorKind::UnexpectedEof).into())
}

/// Drains the client's outbound channel into the socket.
///
/// Returns `Ok` once the channel closes, which happens when the client is
/// removed from the registry. A command the codec refuses is skipped; a
/// failed write ends the writer with a connection failure.
async fn write_commands<W>(
    client_id: ClientId,
    mut outbound: mpsc::UnboundedReceiver<Command>,
    mut sink: FramedWrite<W, CommandCodec>,
) -> Result<(), ServerError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(command) = outbound.recv().await {
        match sink.send(command).await {
            Ok(()) => {}
            Err(ProtocolError::Io(e)) => {
                error!("Failed to write to client {}: {}", client_id, e);
                return Err(ServerError::ConnectionFailure(e));
            }
            Err(e) => warn!("Not sending to client {}: {}", client_id, e),
        }
    }
    debug!("Writer for client {} finished", client_id);
    Ok(())
}
