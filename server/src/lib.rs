//! # Battleship Session Server Library
//!
//! This library implements the server side of a two-player naval combat game
//! played over persistent TCP connections. It does not know anything about
//! boards or ships: clients keep their own fleets and only report what a
//! strike hit. The server pairs players, decides whose turn it is, and relays
//! strikes and outcomes between the two sides of each match.
//!
//! ## Core Responsibilities
//!
//! ### Client Lifecycle
//! Every connection identifies itself with a username, then waits in the
//! lobby. Players are tracked from admission until they send `left` or their
//! socket closes; in both cases their game, if any, is killed and the
//! opponent is told.
//!
//! ### Matchmaking
//! The two longest-waiting lobby clients are paired whenever the session pool
//! has a free slot. Pairing is retried after every admission and on a short
//! periodic tick, so a pairing deferred by a full pool happens as soon as a
//! game ends.
//!
//! ### Turn Refereeing
//! Each game runs its own turn loop task. Attackers alternate strictly; a
//! turn only advances after the full attacker -> defender -> attacker round
//! trip has been relayed. A defender reporting `all` ends the game.
//!
//! ## Architecture Design
//!
//! ### One Coarse Lock
//! Registry and session pool live together in [`state::ServerState`] behind
//! one `tokio::sync::RwLock`. Connection tasks and turn loops take the write
//! lock for every state transition, so pairing, removal and turn bookkeeping
//! never interleave.
//!
//! ### Channels Instead of Polling
//! Outbound commands go through an unbounded channel per client, drained by
//! a writer task. Turn loops sleep on a [`game::TurnSignal`] channel and wake
//! immediately on an advance or a kill. Finished loops send a
//! [`game::GameReport`] back to the acceptor.
//!
//! ## Module Organization
//!
//! ### Client Manager Module (`client_manager`)
//! Arrival-ordered registry of connected clients and their lobby/game
//! location.
//!
//! ### Matchmaking Module (`matchmaking`)
//! Bounded session pool plus game creation and teardown.
//!
//! ### Game Module (`game`)
//! Per-game turn state machine and the turn loop task.
//!
//! ### Dispatcher Module (`dispatcher`)
//! Routes each decoded command of a connection to the operations above.
//!
//! ### Network Module (`network`)
//! TCP acceptor, username handshake and per-connection reader/writer tasks.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind(ServerConfig::default()).await?;
//!     println!("Listening on {}", server.local_addr()?);
//!
//!     // Accepts players, pairs them and referees their games until the
//!     // task is dropped.
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod dispatcher;
pub mod error;
pub mod game;
pub mod matchmaking;
pub mod network;
pub mod state;

pub use error::ServerError;
pub use network::{Server, ServerConfig};
