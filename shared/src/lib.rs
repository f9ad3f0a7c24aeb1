//! Wire protocol shared by the battleship server and its clients.
//!
//! Every message is a line of UTF-8 text shaped as `-{key};{payload}\n`.
//! The payload is opaque at this level; some commands carry `|`-joined
//! sub-fields (strike coordinates `3|5`). [`protocol`] holds the text codec
//! and the tagged [`Command`] enum, [`codec`] the framing used on sockets.

pub mod codec;
pub mod protocol;

pub use codec::CommandCodec;
pub use protocol::{decode, encode, Command, Coordinate, Message, ProtocolError, StrikeOutcome};

/// TCP port the server listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 10000;
/// Pending-connection backlog for the listening socket.
pub const LISTEN_BACKLOG: u32 = 5;
/// Seconds a freshly accepted connection has to identify itself.
pub const USERNAME_TIMEOUT_SECS: u64 = 10;
/// Longest accepted line, terminator excluded.
pub const MAX_FRAME_LENGTH: usize = 1024;

/// Ready marker sent once the fleet has been placed.
pub const FLEET_READY_MARKER: &str = "fleet";
/// Strike payload a defender sends when its whole fleet is sunk.
pub const DEFEAT_PAYLOAD: &str = "all";
/// Strike outcome code for a shot that hit no boat.
pub const MISS_CODE: i64 = -1;

pub const KEY_GAME: &str = "game";
pub const KEY_READY: &str = "ready";
pub const KEY_STRIKE: &str = "strike";
pub const KEY_LEFT: &str = "left";
pub const KEY_STAY: &str = "stay";
pub const KEY_DEFEND: &str = "defend";
pub const KEY_USERNAME: &str = "username";
