// https://redis.io/docs/reference/protocol-spec

use std::fmt;
use std::io::Cursor;

use bytes::{Buf, Bytes};
use thiserror::Error as ThisError;

static CRLF: &[u8; 2] = b"\r\n";

/// Arrays nested deeper than this are rejected instead of recursing further.
const MAX_DEPTH: usize = 128;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("not enough data is available to parse an entire frame")]
    Incomplete,
    #[error("protocol error; unknown frame type byte {0:#04x}")]
    UnknownType(u8),
    #[error("protocol error; malformed integer {0:?}")]
    MalformedInteger(String),
    #[error("protocol error; invalid length {0}")]
    InvalidLength(i64),
    #[error("protocol error; bulk string is not terminated by CRLF")]
    MissingTerminator,
    #[error("protocol error; invalid UTF-8 in line")]
    InvalidUtf8,
    #[error("protocol error; arrays nested too deeply")]
    TooDeep,
    #[error("protocol error; stream ended in the middle of a frame")]
    Truncated,
    #[error("protocol error; frame size exceeds limit of {0} bytes")]
    FrameTooLarge(usize),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A single RESP value. Requests are arrays of bulk strings, responses may be any variant, and
/// the append-only log stores requests in exactly this shape.
///
/// `Null` is the null bulk string (`$-1\r\n`), distinct from an empty `Bulk`.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Null,
    Array(Vec<Frame>),
}

// Protocol specification: https://redis.io/docs/reference/protocol-spec/
impl Frame {
    /// Parses one frame starting at the cursor position. On success the cursor is left right
    /// after the frame. `Error::Incomplete` means the buffer holds a prefix of a valid frame and
    /// more bytes are needed; the cursor position is meaningless in that case.
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Self, Error> {
        Self::parse_nested(src, 0)
    }

    fn parse_nested(src: &mut Cursor<&[u8]>, depth: usize) -> Result<Self, Error> {
        // The first byte in an RESP-serialized payload always identifies its type.
        // Subsequent bytes constitute the type's contents.
        let first_byte = get_byte(src)?;
        let data_type = DataType::try_from(first_byte)?;

        match data_type {
            DataType::SimpleString => {
                let line = get_line(src)?;
                Ok(Frame::Simple(line_to_string(line)?))
            }
            DataType::SimpleError => {
                let line = get_line(src)?;
                Ok(Frame::Error(line_to_string(line)?))
            }
            DataType::Integer => Ok(Frame::Integer(get_integer(src)?)),
            // $<length>\r\n<data>\r\n
            DataType::BulkString => {
                let length = get_integer(src)?;

                if length == -1 {
                    return Ok(Frame::Null);
                }
                let length = usize::try_from(length).map_err(|_| Error::InvalidLength(length))?;

                // The payload may itself contain CRLF, so it is read by length, never by scanning.
                if src.remaining() < length + CRLF.len() {
                    return Err(Error::Incomplete);
                }

                let start = src.position() as usize;
                let data = Bytes::copy_from_slice(&src.get_ref()[start..start + length]);
                src.advance(length);

                if &src.chunk()[..CRLF.len()] != CRLF {
                    return Err(Error::MissingTerminator);
                }
                src.advance(CRLF.len());

                Ok(Frame::Bulk(data))
            }
            // *<number-of-elements>\r\n<element-1>...<element-n>
            DataType::Array => {
                let length = get_integer(src)?;

                if length == -1 {
                    return Ok(Frame::Null);
                }
                let length = usize::try_from(length).map_err(|_| Error::InvalidLength(length))?;

                if depth >= MAX_DEPTH {
                    return Err(Error::TooDeep);
                }

                // Every element takes at least three bytes, so the claimed length cannot be
                // trusted for the allocation until they have arrived.
                let mut frames = Vec::with_capacity(length.min(src.remaining() / 3));
                for _ in 0..length {
                    frames.push(Self::parse_nested(src, depth + 1)?);
                }

                Ok(Frame::Array(frames))
            }
        }
    }

    /// Checks that a whole frame is buffered starting at the cursor position, without copying or
    /// allocating anything. Leaves the cursor right after the frame, so its position is the frame
    /// length. Reports the same errors `parse` would for the bytes it inspects.
    pub fn check(src: &mut Cursor<&[u8]>) -> Result<(), Error> {
        Self::check_nested(src, 0)
    }

    fn check_nested(src: &mut Cursor<&[u8]>, depth: usize) -> Result<(), Error> {
        match DataType::try_from(get_byte(src)?)? {
            DataType::SimpleString | DataType::SimpleError => {
                get_line(src)?;
                Ok(())
            }
            DataType::Integer => {
                get_integer(src)?;
                Ok(())
            }
            DataType::BulkString => {
                let length = get_integer(src)?;
                if length == -1 {
                    return Ok(());
                }
                let length = usize::try_from(length).map_err(|_| Error::InvalidLength(length))?;

                if src.remaining() < length + CRLF.len() {
                    return Err(Error::Incomplete);
                }
                src.advance(length);

                if &src.chunk()[..CRLF.len()] != CRLF {
                    return Err(Error::MissingTerminator);
                }
                src.advance(CRLF.len());
                Ok(())
            }
            DataType::Array => {
                let length = get_integer(src)?;
                if length == -1 {
                    return Ok(());
                }
                let length = usize::try_from(length).map_err(|_| Error::InvalidLength(length))?;

                if depth >= MAX_DEPTH {
                    return Err(Error::TooDeep);
                }
                for _ in 0..length {
                    Self::check_nested(src, depth + 1)?;
                }
                Ok(())
            }
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        self.write_to(&mut bytes);
        bytes
    }

    fn write_to(&self, bytes: &mut Vec<u8>) {
        match self {
            Frame::Simple(s) => {
                bytes.push(u8::from(DataType::SimpleString));
                bytes.extend_from_slice(s.as_bytes());
                bytes.extend_from_slice(CRLF);
            }
            Frame::Error(s) => {
                bytes.push(u8::from(DataType::SimpleError));
                bytes.extend_from_slice(s.as_bytes());
                bytes.extend_from_slice(CRLF);
            }
            Frame::Integer(i) => {
                bytes.push(u8::from(DataType::Integer));
                bytes.extend_from_slice(i.to_string().as_bytes());
                bytes.extend_from_slice(CRLF);
            }
            Frame::Bulk(data) => {
                bytes.reserve(1 + 20 + CRLF.len() + data.len() + CRLF.len());
                bytes.push(u8::from(DataType::BulkString));
                bytes.extend_from_slice(data.len().to_string().as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes.extend_from_slice(data);
                bytes.extend_from_slice(CRLF);
            }
            Frame::Null => bytes.extend_from_slice(b"$-1\r\n"),
            Frame::Array(arr) => {
                bytes.push(u8::from(DataType::Array));
                bytes.extend_from_slice(arr.len().to_string().as_bytes());
                bytes.extend_from_slice(CRLF);
                for frame in arr {
                    frame.write_to(bytes);
                }
            }
        }
    }

    /// Builds the request frame a client would send for `args`, one bulk string per argument.
    pub fn command<I, T>(args: I) -> Frame
    where
        I: IntoIterator<Item = T>,
        T: Into<Bytes>,
    {
        Frame::Array(args.into_iter().map(|arg| Frame::Bulk(arg.into())).collect())
    }
}

impl From<Frame> for Vec<u8> {
    fn from(frame: Frame) -> Self {
        frame.serialize()
    }
}

// Meant for logs, not for the wire.
impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Simple(s) => write!(f, "+{}", s),
            Frame::Error(s) => write!(f, "-{}", s),
            Frame::Integer(i) => write!(f, ":{}", i),
            Frame::Bulk(bytes) => write!(f, "${}", String::from_utf8_lossy(bytes)),
            Frame::Null => write!(f, "$-1"),
            Frame::Array(arr) => {
                write!(f, "[")?;
                for (i, frame) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", frame)?;
                }
                write!(f, "]")
            }
        }
    }
}

fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], Error> {
    let start = src.position() as usize;
    let buf: &'a [u8] = *src.get_ref();

    let end = buf[start..]
        .windows(2)
        .position(|window| window == CRLF)
        .map(|index| start + index)
        .ok_or(Error::Incomplete)?;

    src.set_position((end + CRLF.len()) as u64);

    Ok(&buf[start..end])
}

fn get_integer(src: &mut Cursor<&[u8]>) -> Result<i64, Error> {
    let line = get_line(src)?;
    let line = std::str::from_utf8(line)
        .map_err(|_| Error::MalformedInteger(String::from_utf8_lossy(line).into_owned()))?;

    line.parse::<i64>()
        .map_err(|_| Error::MalformedInteger(line.to_string()))
}

fn get_byte(src: &mut Cursor<&[u8]>) -> Result<u8, Error> {
    if !src.has_remaining() {
        return Err(Error::Incomplete);
    }
    Ok(src.get_u8())
}

fn line_to_string(line: &[u8]) -> Result<String, Error> {
    String::from_utf8(line.to_vec()).map_err(|_| Error::InvalidUtf8)
}

#[derive(Debug)]
enum DataType {
    SimpleString, // '+'
    SimpleError,  // '-'
    Integer,      // ':'
    BulkString,   // '$'
    Array,        // '*'
}

impl TryFrom<u8> for DataType {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            b'+' => Ok(Self::SimpleString),
            b'-' => Ok(Self::SimpleError),
            b':' => Ok(Self::Integer),
            b'$' => Ok(Self::BulkString),
            b'*' => Ok(Self::Array),
            _ => Err(Error::UnknownType(byte)),
        }
    }
}

impl From<DataType> for u8 {
    fn from(value: DataType) -> Self {
        match value {
            DataType::SimpleString => b'+',
            DataType::SimpleError => b'-',
            DataType::Integer => b':',
            DataType::BulkString => b'$',
            DataType::Array => b'*',
        }
    }
}
