//! # Battleship Client Library
//!
//! This library is the client half of the battleship session protocol. It
//! connects to the server, identifies the player, and turns the server's
//! command stream into a small protocol-level game state that a front-end
//! can render against.
//!
//! ## Architecture Overview
//!
//! The client never decides the outcome of a strike on its own behalf: the
//! fleet owner reports hits and misses, and the server only relays. What the
//! client tracks is therefore whose turn it is and what has been reported,
//! not any board geometry.
//!
//! ### Inbox Queue
//! A reader task decodes every frame from the server into a queue. Frame-
//! driven front-ends drain it with [`network::Connection::poll_messages`];
//! async front-ends await [`network::Connection::next_message`].
//!
//! ### Intents
//! Readiness, strikes and reports are submitted through methods on the
//! connection and written to the socket by a dedicated writer task, so a
//! front-end never blocks on the network.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! Connection handle, username handshake, reader/writer tasks and the
//! client error type.
//!
//! ### Game Module (`game`)
//! Protocol-level state: lobby, matched, attacking, defending, and how the
//! game ended.
//!
//! ### Input Module (`input`)
//! Parses terminal lines such as `fire 2 7` or `hit 1` into intents.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::game::ClientGameState;
//! use client::network::Connection;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut connection = Connection::connect("127.0.0.1:10000", "anna").await?;
//!     let mut game = ClientGameState::new();
//!
//!     while let Some(command) = connection.next_message().await {
//!         game.on_received(&command);
//!         if game.can_fire() {
//!             connection.strike_at(2, 7)?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod input;
pub mod network;
