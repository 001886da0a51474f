use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandError, CommandParser};
use crate::frame::Frame;
use crate::store::Store;

/// Returns PONG if no argument is provided, otherwise echoes the argument back as a simple
/// string. Payloads a simple string cannot carry (CR, LF, invalid UTF-8) come back as a bulk.
///
/// Ref: <https://redis.io/docs/latest/commands/ping>
#[derive(Debug, PartialEq)]
pub struct Ping {
    pub payload: Option<Bytes>,
}

impl Executable for Ping {
    fn exec(self, _store: &Store) -> Frame {
        let Some(payload) = self.payload else {
            return Frame::Simple("PONG".to_string());
        };

        match std::str::from_utf8(&payload) {
            Ok(s) if !s.contains(['\r', '\n']) => Frame::Simple(s.to_string()),
            _ => Frame::Bulk(payload),
        }
    }
}

impl TryFrom<&mut CommandParser> for Ping {
    type Error = CommandError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let payload = if parser.has_next() {
            Some(parser.next_bytes()?)
        } else {
            None
        };

        Ok(Self { payload })
    }
}
