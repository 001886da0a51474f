pub mod command;
pub mod executable;
pub mod get;
pub mod hget;
pub mod hgetall;
pub mod hset;
pub mod ping;
pub mod set;

use bytes::Bytes;
use std::str::{self, FromStr};
use std::vec;
use strum_macros::{EnumString, IntoStaticStr};
use thiserror::Error as ThisError;

use crate::commands::executable::Executable;
use crate::frame::Frame;
use crate::store::Store;

use command::Command as Command_;
use get::Get;
use hget::Hget;
use hgetall::Hgetall;
use hset::Hset;
use ping::Ping;
use set::Set;

#[derive(Debug, PartialEq)]
pub enum Command {
    Get(Get),
    Hget(Hget),
    Hgetall(Hgetall),
    Hset(Hset),
    Set(Set),

    Command(Command_),
    Ping(Ping),
}

impl Command {
    /// Whether the command changes the store. Only these are recorded in the append-only file.
    pub fn is_write(&self) -> bool {
        matches!(self, Command::Set(_) | Command::Hset(_))
    }
}

impl Executable for Command {
    fn exec(self, store: &Store) -> Frame {
        match self {
            Command::Command(cmd) => cmd.exec(store),
            Command::Get(cmd) => cmd.exec(store),
            Command::Hget(cmd) => cmd.exec(store),
            Command::Hgetall(cmd) => cmd.exec(store),
            Command::Hset(cmd) => cmd.exec(store),
            Command::Ping(cmd) => cmd.exec(store),
            Command::Set(cmd) => cmd.exec(store),
        }
    }
}

/// Every command the server knows, matched case-insensitively against the first element of a
/// request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
enum CommandName {
    Command,
    Get,
    Hget,
    Hgetall,
    Hset,
    Ping,
    Set,
}

impl TryFrom<Frame> for Command {
    type Error = CommandError;

    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        // Clients send commands to the server as RESP arrays.
        let frames = match frame {
            Frame::Array(array) => array,
            frame => {
                return Err(CommandError::InvalidFrame {
                    expected: "array".to_string(),
                    actual: frame,
                })
            }
        };

        let mut parts = frames.into_iter();
        let name = parse_command_name(&mut parts)?;
        let parser = &mut CommandParser {
            command: name.into(),
            parts,
        };

        // COMMAND takes subcommands clients may vary freely, every other command has a fixed
        // arity and must consume all of its arguments.
        let command = match name {
            CommandName::Command => return Command_::try_from(parser).map(Command::Command),
            CommandName::Get => Get::try_from(&mut *parser).map(Command::Get),
            CommandName::Hget => Hget::try_from(&mut *parser).map(Command::Hget),
            CommandName::Hgetall => Hgetall::try_from(&mut *parser).map(Command::Hgetall),
            CommandName::Hset => Hset::try_from(&mut *parser).map(Command::Hset),
            CommandName::Ping => Ping::try_from(&mut *parser).map(Command::Ping),
            CommandName::Set => Set::try_from(&mut *parser).map(Command::Set),
        }?;

        parser.finish()?;

        Ok(command)
    }
}

fn parse_command_name(parts: &mut vec::IntoIter<Frame>) -> Result<CommandName, CommandError> {
    let name = match parts.next() {
        Some(Frame::Simple(s)) => s,
        Some(Frame::Bulk(bytes)) => str::from_utf8(&bytes[..])?.to_string(),
        Some(frame) => {
            return Err(CommandError::InvalidFrame {
                expected: "simple or bulk string".to_string(),
                actual: frame,
            })
        }
        None => return Err(CommandError::EmptyCommand),
    };

    CommandName::from_str(&name).map_err(|_| CommandError::UnknownCommand { command: name })
}

/// Hands out the arguments of a single command, in order. Running out of arguments is reported
/// as an arity error for the command being parsed.
pub(crate) struct CommandParser {
    command: &'static str,
    parts: vec::IntoIter<Frame>,
}

impl CommandParser {
    fn next_frame(&mut self) -> Result<Frame, CommandError> {
        self.parts.next().ok_or(CommandError::WrongArity {
            command: self.command,
        })
    }

    fn next_string(&mut self) -> Result<String, CommandError> {
        match self.next_frame()? {
            // Both `Simple` and `Bulk` representation may be strings. Strings are parsed to UTF-8.
            // While errors are stored as strings, they are considered separate types.
            Frame::Simple(s) => Ok(s),
            Frame::Bulk(bytes) => Ok(str::from_utf8(&bytes[..])?.to_string()),
            frame => Err(CommandError::InvalidFrame {
                expected: "simple or bulk string".to_string(),
                actual: frame,
            }),
        }
    }

    fn next_bytes(&mut self) -> Result<Bytes, CommandError> {
        match self.next_frame()? {
            Frame::Simple(s) => Ok(Bytes::from(s)),
            Frame::Bulk(bytes) => Ok(bytes),
            frame => Err(CommandError::InvalidFrame {
                expected: "simple or bulk string".to_string(),
                actual: frame,
            }),
        }
    }

    fn has_next(&self) -> bool {
        self.parts.len() > 0
    }

    /// Drops whatever arguments are left without looking at them.
    fn skip_rest(&mut self) {
        self.parts.by_ref().for_each(drop);
    }

    fn finish(&self) -> Result<(), CommandError> {
        if self.has_next() {
            return Err(CommandError::WrongArity {
                command: self.command,
            });
        }
        Ok(())
    }
}

/// Problems with a well-formed frame that is not a valid command. These are answered with an
/// error frame and the connection stays usable.
#[derive(Debug, ThisError, PartialEq)]
pub enum CommandError {
    #[error("ERR wrong number of arguments for '{command}' command")]
    WrongArity { command: &'static str },
    #[error("ERR unknown command '{command}'")]
    UnknownCommand { command: String },
    #[error("ERR empty command")]
    EmptyCommand,
    #[error("ERR protocol error; invalid frame, expected {expected}, got {actual}")]
    InvalidFrame { expected: String, actual: Frame },
    #[error("ERR protocol error; invalid UTF-8 string")]
    InvalidUTF8String(#[from] str::Utf8Error),
}

impl From<CommandError> for Frame {
    fn from(err: CommandError) -> Frame {
        Frame::Error(err.to_string())
    }
}
