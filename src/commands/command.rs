use crate::commands::executable::Executable;
use crate::commands::{CommandError, CommandParser};
use crate::frame::Frame;
use crate::store::Store;

/// Command introspection. Clients such as `redis-cli` query `COMMAND DOCS` when connecting; an
/// empty array tells them there is nothing to learn and lets them carry on.
///
/// Ref: <https://redis.io/docs/latest/commands/command/>
#[derive(Debug, PartialEq)]
pub struct Command {}

impl Executable for Command {
    fn exec(self, _store: &Store) -> Frame {
        Frame::Array(vec![])
    }
}

impl TryFrom<&mut CommandParser> for Command {
    type Error = CommandError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        parser.skip_rest();
        Ok(Self {})
    }
}
