use itertools::Itertools;

use crate::commands::executable::Executable;
use crate::commands::{CommandError, CommandParser};
use crate::frame::Frame;
use crate::store::Store;

/// Returns all fields and values of the hash stored at `key` as a flat array, fields in sorted
/// order. A missing key gives an empty array.
///
/// Ref: <https://redis.io/docs/latest/commands/hgetall/>
#[derive(Debug, PartialEq)]
pub struct Hgetall {
    pub key: String,
}

impl Executable for Hgetall {
    fn exec(self, store: &Store) -> Frame {
        let frames = store
            .hgetall(&self.key)
            .into_iter()
            .sorted_by(|(a, _), (b, _)| a.cmp(b))
            .flat_map(|(field, value)| [Frame::Bulk(field.into()), Frame::Bulk(value)])
            .collect();

        Frame::Array(frames)
    }
}

impl TryFrom<&mut CommandParser> for Hgetall {
    type Error = CommandError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        Ok(Self { key })
    }
}
