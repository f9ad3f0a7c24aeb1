//! Text codec for protocol messages and the tagged command set built on it.

use crate::{
    DEFEAT_PAYLOAD, KEY_DEFEND, KEY_GAME, KEY_LEFT, KEY_READY, KEY_STAY, KEY_STRIKE, KEY_USERNAME,
    MISS_CODE,
};
use std::fmt;
use thiserror::Error;

/// Errors raised while turning bytes into commands or commands into bytes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown command key `{0}`")]
    UnknownCommand(String),

    #[error("invalid payload `{payload}` for command `{key}`")]
    InvalidPayload { key: String, payload: String },

    #[error("line exceeds {max} bytes without a terminator")]
    FrameTooLong { max: usize },

    #[error("payload contains a line break")]
    LineBreakInPayload,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A raw `(key, payload)` pair as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub key: String,
    pub payload: String,
}

impl Message {
    pub fn new(key: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            payload: payload.into(),
        }
    }

    pub fn encode(&self) -> String {
        encode(&self.key, &self.payload)
    }
}

/// Encodes a message as `-{key};{payload}`.
pub fn encode(key: &str, payload: &str) -> String {
    format!("-{};{}", key, payload)
}

/// Decodes `-{key};{payload}`, splitting on the first `;`.
///
/// Anything that does not have that shape (missing dash, missing
/// separator, empty key, empty input) is "no message" and yields `None`.
pub fn decode(raw: &str) -> Option<Message> {
    let body = raw.strip_prefix('-')?;
    let (key, payload) = body.split_once(';')?;
    if key.is_empty() {
        return None;
    }
    Some(Message::new(key, payload))
}

/// Target cell of an attack.
///
/// Each axis is a `u8` in decimal. Coordinates are re-encoded when relayed,
/// so `02|7` reaches the defender as `2|7`; the cell is the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coordinate {
    pub row: u8,
    pub col: u8,
}

impl Coordinate {
    pub fn new(row: u8, col: u8) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.row, self.col)
    }
}

/// What the defender found at the attacked cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrikeOutcome {
    Miss,
    /// A boat was hit; `boat` is the boat-type index.
    Hit { boat: u32 },
}

impl StrikeOutcome {
    /// Numeric code used on the wire.
    pub fn code(&self) -> i64 {
        match self {
            StrikeOutcome::Miss => MISS_CODE,
            StrikeOutcome::Hit { boat } => i64::from(*boat),
        }
    }

    /// Negative codes all mean "no boat"; non-negative codes are boat types.
    ///
    /// Boat types above `u32::MAX` are not representable and yield `None`.
    pub fn from_code(code: i64) -> Option<Self> {
        if code < 0 {
            return Some(StrikeOutcome::Miss);
        }
        u32::try_from(code).ok().map(|boat| StrikeOutcome::Hit { boat })
    }
}

/// A protocol message decoded into the shape its payload describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Client identification, first frame of every connection.
    Username(String),
    /// A match was created; carries the opponent's username.
    Game { opponent: String },
    /// Readiness; a non-empty marker (usually `fleet`) before the match,
    /// empty for per-turn synchronisation.
    Ready { marker: String },
    /// Lobby client asks to be moved to the back of the queue.
    Stay,
    /// Participant leaves; also tells the opponent the match is over.
    Left,
    /// The receiver defends this turn.
    Defend,
    /// `strike` without payload: the receiver attacks this turn.
    StrikeTurn,
    /// `strike` with two values: attack coordinates.
    StrikeAt(Coordinate),
    /// `strike` with one number: the defender's hit or miss report.
    StrikeResult(StrikeOutcome),
    /// `strike;all`: the defender lost its whole fleet.
    Defeat,
}

impl Command {
    pub fn key(&self) -> &'static str {
        match self {
            Command::Username(_) => KEY_USERNAME,
            Command::Game { .. } => KEY_GAME,
            Command::Ready { .. } => KEY_READY,
            Command::Stay => KEY_STAY,
            Command::Left => KEY_LEFT,
            Command::Defend => KEY_DEFEND,
            Command::StrikeTurn
            | Command::StrikeAt(_)
            | Command::StrikeResult(_)
            | Command::Defeat => KEY_STRIKE,
        }
    }

    pub fn payload(&self) -> String {
        match self {
            Command::Username(name) => name.clone(),
            Command::Game { opponent } => opponent.clone(),
            Command::Ready { marker } => marker.clone(),
            Command::Stay | Command::Left | Command::Defend | Command::StrikeTurn => String::new(),
            Command::StrikeAt(coordinate) => coordinate.to_string(),
            Command::StrikeResult(outcome) => outcome.code().to_string(),
            Command::Defeat => DEFEAT_PAYLOAD.to_string(),
        }
    }

    pub fn to_message(&self) -> Message {
        Message::new(self.key(), self.payload())
    }

    pub fn encode(&self) -> String {
        encode(self.key(), &self.payload())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl TryFrom<Message> for Command {
    type Error = ProtocolError;

    fn try_from(message: Message) -> Result<Self, Self::Error> {
        let Message { key, payload } = message;
        match key.as_str() {
            KEY_USERNAME => Ok(Command::Username(payload)),
            KEY_GAME => Ok(Command::Game { opponent: payload }),
            KEY_READY => Ok(Command::Ready { marker: payload }),
            KEY_STAY => Ok(Command::Stay),
            KEY_LEFT => Ok(Command::Left),
            KEY_DEFEND => Ok(Command::Defend),
            KEY_STRIKE => parse_strike(&payload).ok_or(ProtocolError::InvalidPayload {
                key: key.clone(),
                payload: payload.clone(),
            }),
            _ => Err(ProtocolError::UnknownCommand(key)),
        }
    }
}

fn parse_strike(payload: &str) -> Option<Command> {
    let payload = payload.trim();
    if payload.is_empty() {
        return Some(Command::StrikeTurn);
    }
    if payload == DEFEAT_PAYLOAD {
        return Some(Command::Defeat);
    }
    if let Some((row, col)) = payload.split_once('|') {
        let row = row.trim().parse::<u8>().ok()?;
        let col = col.trim().parse::<u8>().ok()?;
        return Some(Command::StrikeAt(Coordinate::new(row, col)));
    }
    let code = payload.parse::<i64>().ok()?;
    StrikeOutcome::from_code(code).map(Command::StrikeResult)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<Command, ProtocolError> {
        Command::try_from(decode(raw).expect("well-formed message"))
    }

    #[test]
    fn test_encode_shapes() {
        assert_eq!(encode("strike", "3|5"), "-strike;3|5");
        assert_eq!(encode("left", ""), "-left;");
        assert_eq!(encode("game", "alice"), "-game;alice");
    }

    #[test]
    fn test_decode_roundtrip() {
        let pairs = [
            ("game", "bob"),
            ("ready", "fleet"),
            ("ready", ""),
            ("strike", "2|7"),
            ("strike", "all"),
            ("username", "name;with;semicolons"),
        ];

        for (key, payload) in pairs {
            let decoded = decode(&encode(key, payload)).unwrap();
            assert_eq!(decoded, Message::new(key, payload));
        }
    }

    #[test]
    fn test_decode_splits_on_first_separator() {
        let message = decode("-username;a;b").unwrap();
        assert_eq!(message.key, "username");
        assert_eq!(message.payload, "a;b");
    }

    #[test]
    fn test_decode_malformed_is_no_message() {
        assert_eq!(decode(""), None);
        assert_eq!(decode("-strike"), None);
        assert_eq!(decode("strike;1"), None);
        assert_eq!(decode("-;payload"), None);
    }

    #[test]
    fn test_strike_variants() {
        assert_eq!(parse("-strike;").unwrap(), Command::StrikeTurn);
        assert_eq!(
            parse("-strike;2|7").unwrap(),
            Command::StrikeAt(Coordinate::new(2, 7))
        );
        assert_eq!(
            parse("-strike;1").unwrap(),
            Command::StrikeResult(StrikeOutcome::Hit { boat: 1 })
        );
        assert_eq!(
            parse("-strike;0").unwrap(),
            Command::StrikeResult(StrikeOutcome::Hit { boat: 0 })
        );
        assert_eq!(
            parse("-strike;-2").unwrap(),
            Command::StrikeResult(StrikeOutcome::Miss)
        );
        assert_eq!(parse("-strike;all").unwrap(), Command::Defeat);
    }

    #[test]
    fn test_large_boat_codes_are_accepted() {
        assert_eq!(
            parse("-strike;999").unwrap(),
            Command::StrikeResult(StrikeOutcome::Hit { boat: 999 })
        );
        assert_eq!(
            parse("-strike;-70000").unwrap(),
            Command::StrikeResult(StrikeOutcome::Miss)
        );
    }

    #[test]
    fn test_coordinates_are_normalised() {
        let command = parse("-strike;02| 7").unwrap();
        assert_eq!(command, Command::StrikeAt(Coordinate::new(2, 7)));
        assert_eq!(command.encode(), "-strike;2|7");
    }

    #[test]
    fn test_invalid_strike_payloads() {
        for raw in ["-strike;x", "-strike;1|y", "-strike;1|2|3", "-strike;-1|2", "-strike;4294967296"] {
            match parse(raw) {
                Err(ProtocolError::InvalidPayload { key, .. }) => assert_eq!(key, "strike"),
                other => panic!("expected invalid payload for {}, got {:?}", raw, other),
            }
        }
    }

    #[test]
    fn test_unknown_command() {
        match parse("-dance;now") {
            Err(ProtocolError::UnknownCommand(key)) => assert_eq!(key, "dance"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_defeat_never_collides_with_boat_codes() {
        for code in -5..=20 {
            let outcome = StrikeOutcome::from_code(code).unwrap();
            let command = Command::StrikeResult(outcome);
            assert_ne!(command.payload(), DEFEAT_PAYLOAD);
            assert_ne!(parse(&command.encode()).unwrap(), Command::Defeat);
        }
    }

    #[test]
    fn test_command_roundtrip() {
        let commands = vec![
            Command::Username("karl".to_string()),
            Command::Username(String::new()),
            Command::Game {
                opponent: "anna".to_string(),
            },
            Command::Ready {
                marker: "fleet".to_string(),
            },
            Command::Ready {
                marker: String::new(),
            },
            Command::Stay,
            Command::Left,
            Command::Defend,
            Command::StrikeTurn,
            Command::StrikeAt(Coordinate::new(9, 0)),
            Command::StrikeResult(StrikeOutcome::Miss),
            Command::StrikeResult(StrikeOutcome::Hit { boat: 4 }),
            Command::Defeat,
        ];

        for command in commands {
            assert_eq!(parse(&command.encode()).unwrap(), command);
        }
    }

    #[test]
    fn test_miss_encodes_as_miss_code() {
        assert_eq!(
            Command::StrikeResult(StrikeOutcome::Miss).encode(),
            "-strike;-1"
        );
    }
}
