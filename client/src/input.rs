//! Terminal input parsing into player intents

use shared::{Command, Coordinate, StrikeOutcome};
use std::str::FromStr;
use thiserror::Error;

/// What the player asked for on one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Fleet placed.
    Ready,
    Fire(Coordinate),
    /// Report the opponent's last strike.
    Report(StrikeOutcome),
    /// Whole fleet sunk.
    Lost,
    /// Give up the place in the matchmaking queue.
    Stay,
    Quit,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("empty input")]
    Empty,
    #[error("unknown command {0:?}, type `help`")]
    Unknown(String),
    #[error("`{0}` needs more arguments")]
    MissingArgument(&'static str),
    #[error("{0:?} is not a valid number")]
    InvalidNumber(String),
}

pub const HELP: &str = "\
ready          fleet placed, ready to play
fire ROW COL   strike the opponent's grid
hit BOAT       report a hit on boat type BOAT
miss           report a miss
lost           report the whole fleet sunk
stay           move to the back of the lobby queue
quit           leave the server";

impl Intent {
    /// The protocol command this intent sends, if any.
    pub fn to_command(&self) -> Option<Command> {
        match self {
            Intent::Ready => Some(Command::Ready {
                marker: shared::FLEET_READY_MARKER.to_string(),
            }),
            Intent::Fire(target) => Some(Command::StrikeAt(*target)),
            Intent::Report(outcome) => Some(Command::StrikeResult(*outcome)),
            Intent::Lost => Some(Command::Defeat),
            Intent::Stay => Some(Command::Stay),
            Intent::Quit => Some(Command::Left),
            Intent::Help => None,
        }
    }
}

pub fn parse_line(line: &str) -> Result<Intent, InputError> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err(InputError::Empty);
    };

    match verb.to_ascii_lowercase().as_str() {
        "ready" => Ok(Intent::Ready),
        "fire" | "f" => {
            let row = number(words.next(), "fire")?;
            let col = number(words.next(), "fire")?;
            Ok(Intent::Fire(Coordinate::new(row, col)))
        }
        "hit" => Ok(Intent::Report(StrikeOutcome::Hit {
            boat: number(words.next(), "hit")?,
        })),
        "miss" => Ok(Intent::Report(StrikeOutcome::Miss)),
        "lost" => Ok(Intent::Lost),
        "stay" => Ok(Intent::Stay),
        "quit" | "exit" => Ok(Intent::Quit),
        "help" | "?" => Ok(Intent::Help),
        other => Err(InputError::Unknown(other.to_string())),
    }
}

fn number<T: FromStr>(word: Option<&str>, verb: &'static str) -> Result<T, InputError> {
    let word = word.ok_or(InputError::MissingArgument(verb))?;
    word.parse()
        .map_err(|_| InputError::InvalidNumber(word.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fire() {
        assert_eq!(
            parse_line("fire 2 7"),
            Ok(Intent::Fire(Coordinate::new(2, 7)))
        );
        assert_eq!(
            parse_line("  F 0   9 "),
            Ok(Intent::Fire(Coordinate::new(0, 9)))
        );
        assert_eq!(parse_line("fire 2"), Err(InputError::MissingArgument("fire")));
        assert_eq!(
            parse_line("fire a 1"),
            Err(InputError::InvalidNumber("a".to_string()))
        );
    }

    #[test]
    fn test_parse_reports() {
        assert_eq!(
            parse_line("hit 3"),
            Ok(Intent::Report(StrikeOutcome::Hit { boat: 3 }))
        );
        assert_eq!(parse_line("miss"), Ok(Intent::Report(StrikeOutcome::Miss)));
        assert_eq!(parse_line("lost"), Ok(Intent::Lost));
        assert_eq!(
            parse_line("hit -1"),
            Err(InputError::InvalidNumber("-1".to_string()))
        );
    }

    #[test]
    fn test_parse_misc() {
        assert_eq!(parse_line("READY"), Ok(Intent::Ready));
        assert_eq!(parse_line("stay"), Ok(Intent::Stay));
        assert_eq!(parse_line("quit"), Ok(Intent::Quit));
        assert_eq!(parse_line("?"), Ok(Intent::Help));
        assert_eq!(parse_line("   "), Err(InputError::Empty));
        assert_eq!(
            parse_line("dance"),
            Err(InputError::Unknown("dance".to_string()))
        );
    }

    #[test]
    fn test_intents_map_to_wire_commands() {
        assert_eq!(
            Intent::Ready.to_command().unwrap().encode(),
            "-ready;fleet"
        );
        assert_eq!(
            Intent::Fire(Coordinate::new(2, 7)).to_command().unwrap().encode(),
            "-strike;2|7"
        );
        assert_eq!(
            Intent::Report(StrikeOutcome::Hit { boat: 1 })
                .to_command()
                .unwrap()
                .encode(),
            "-strike;1"
        );
        assert_eq!(Intent::Lost.to_command().unwrap().encode(), "-strike;all");
        assert_eq!(Intent::Quit.to_command().unwrap().encode(), "-left;");
        assert_eq!(Intent::Help.to_command(), None);
    }
}
