//! Newline-delimited framing for protocol messages.
//!
//! Each message occupies exactly one line. The decoder keeps partial reads
//! in its buffer until the terminating `\n` arrives, so several messages
//! coalesced into one read, or one message split across reads, decode the
//! same way.

use crate::protocol::{decode, Command, Message, ProtocolError};
use crate::MAX_FRAME_LENGTH;
use bytes::{BufMut, BytesMut};
use log::warn;
use tokio_util::codec::{Decoder, Encoder};

#[derive(Debug, Clone)]
pub struct CommandCodec {
    /// Index already scanned for a terminator in the pending buffer.
    next_index: usize,
    max_length: usize,
}

impl CommandCodec {
    pub fn new() -> Self {
        Self::with_max_length(MAX_FRAME_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            next_index: 0,
            max_length,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for CommandCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for CommandCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
        loop {
            let terminator = buf[self.next_index..].iter().position(|b| *b == b'\n');

            let Some(offset) = terminator else {
                if buf.len() > self.max_length {
                    return Err(ProtocolError::FrameTooLong {
                        max: self.max_length,
                    });
                }
                self.next_index = buf.len();
                return Ok(None);
            };

            let newline = self.next_index + offset;
            self.next_index = 0;
            let frame = buf.split_to(newline + 1);
            let line = &frame[..newline];
            let line = line.strip_suffix(b"\r").unwrap_or(line);

            if line.len() > self.max_length {
                return Err(ProtocolError::FrameTooLong {
                    max: self.max_length,
                });
            }
            if line.is_empty() {
                continue;
            }

            let Ok(text) = std::str::from_utf8(line) else {
                warn!("Dropping frame that is not valid UTF-8 ({} bytes)", line.len());
                continue;
            };

            match decode(text) {
                Some(message) => return Ok(Some(message)),
                None => warn!("Dropping malformed frame: {:?}", text),
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
        if let Some(message) = self.decode(buf)? {
            return Ok(Some(message));
        }

        // Peer closed mid-line; nothing after the last terminator is usable.
        if !buf.is_empty() {
            warn!("Discarding {} bytes of unterminated frame", buf.len());
            buf.clear();
            self.next_index = 0;
        }
        Ok(None)
    }
}

impl Encoder<Message> for CommandCodec {
    type Error = ProtocolError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let is_line_break = |c: char| c == '\n' || c == '\r';
        if message.key.contains(is_line_break) || message.payload.contains(is_line_break) {
            return Err(ProtocolError::LineBreakInPayload);
        }

        let text = message.encode();
        if text.len() > self.max_length {
            return Err(ProtocolError::FrameTooLong {
                max: self.max_length,
            });
        }

        dst.reserve(text.len() + 1);
        dst.put_slice(text.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

impl Encoder<Command> for CommandCodec {
    type Error = ProtocolError;

    fn encode(&mut self, command: Command, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        Encoder::<Message>::encode(self, command.to_message(), dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Coordinate, StrikeOutcome};
    use futures::StreamExt;
    use tokio_util::codec::FramedRead;

    fn decode_all(codec: &mut CommandCodec, buf: &mut BytesMut) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Some(message) = codec.decode(buf).unwrap() {
            messages.push(message);
        }
        messages
    }

    #[test]
    fn test_coalesced_messages_are_split() {
        let mut codec = CommandCodec::new();
        let mut buf = BytesMut::from("-strike;2|7\n-ready;\n-left;\n");

        let messages = decode_all(&mut codec, &mut buf);
        assert_eq!(
            messages,
            vec![
                Message::new("strike", "2|7"),
                Message::new("ready", ""),
                Message::new("left", ""),
            ]
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_read_waits_for_terminator() {
        let mut codec = CommandCodec::new();
        let mut buf = BytesMut::from("-strike;");

        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"4|1");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"\r\n-sta");
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Message::new("strike", "4|1"))
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(&buf[..], b"-sta");
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let mut codec = CommandCodec::new();
        let mut buf = BytesMut::from("garbage\n\n-nosep\n-ready;fleet\n");

        assert_eq!(
            decode_all(&mut codec, &mut buf),
            vec![Message::new("ready", "fleet")]
        );
    }

    #[test]
    fn test_oversized_line_is_rejected() {
        let mut codec = CommandCodec::with_max_length(8);
        let mut buf = BytesMut::from("-username;far-too-long");

        assert_eq!(codec.max_length(), 8);
        match codec.decode(&mut buf) {
            Err(ProtocolError::FrameTooLong { max }) => assert_eq!(max, 8),
            other => panic!("expected FrameTooLong, got {:?}", other),
        }
    }

    #[test]
    fn test_encode_appends_terminator() {
        let mut codec = CommandCodec::new();
        let mut buf = BytesMut::new();

        codec
            .encode(Command::StrikeAt(Coordinate::new(3, 5)), &mut buf)
            .unwrap();
        codec
            .encode(Command::StrikeResult(StrikeOutcome::Hit { boat: 1 }), &mut buf)
            .unwrap();

        assert_eq!(&buf[..], b"-strike;3|5\n-strike;1\n");
    }

    #[test]
    fn test_encode_rejects_line_breaks() {
        let mut codec = CommandCodec::new();
        let mut buf = BytesMut::new();

        let result = codec.encode(Command::Username("two\nlines".to_string()), &mut buf);
        assert!(matches!(result, Err(ProtocolError::LineBreakInPayload)));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_encode_rejects_carriage_returns() {
        let mut codec = CommandCodec::new();
        let mut buf = BytesMut::new();

        for message in [
            Message::new("username", "bob\r"),
            Message::new("username", "b\rob"),
            Message::new("ready\r", ""),
        ] {
            let result = codec.encode(message, &mut buf);
            assert!(matches!(result, Err(ProtocolError::LineBreakInPayload)));
        }
        assert!(buf.is_empty());

        // Whatever does encode decodes back to the same message.
        let message = Message::new("username", "bob");
        codec.encode(message.clone(), &mut buf).unwrap();
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(message));
    }

    #[test]
    fn test_only_one_carriage_return_is_stripped() {
        let mut codec = CommandCodec::new();
        let mut buf = BytesMut::from("-username;bob\r\r\n");

        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Message::new("username", "bob\r"))
        );
    }

    #[tokio::test]
    async fn test_framed_read_over_fragmented_stream() {
        let stream = tokio_test::io::Builder::new()
            .read(b"-username;ka")
            .read(b"rl\n-ready;fl")
            .read(b"eet\n-strike;all\n")
            .build();
        let mut reader = FramedRead::new(stream, CommandCodec::new());

        let mut commands = Vec::new();
        while let Some(frame) = reader.next().await {
            commands.push(Command::try_from(frame.unwrap()).unwrap());
        }

        assert_eq!(
            commands,
            vec![
                Command::Username("karl".to_string()),
                Command::Ready {
                    marker: "fleet".to_string()
                },
                Command::Defeat,
            ]
        );
    }

    #[tokio::test]
    async fn test_eof_mid_line_ends_stream() {
        let stream = tokio_test::io::Builder::new()
            .read(b"-left;\n-stri")
            .build();
        let mut reader = FramedRead::new(stream, CommandCodec::new());

        assert_eq!(reader.next().await.unwrap().unwrap(), Message::new("left", ""));
        assert!(reader.next().await.is_none());
    }
}
