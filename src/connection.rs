use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};
use uuid::Uuid;

use crate::codec::FrameCodec;
use crate::frame::{Error, Frame};

/// A client connection. Bytes read from the socket are buffered by the codec until a whole frame
/// is available; written frames are flushed before `write_frame` returns.
pub struct Connection {
    pub id: Uuid,
    pub client_address: Option<SocketAddr>,
    reader: FramedRead<OwnedReadHalf, FrameCodec>,
    writer: FramedWrite<OwnedWriteHalf, FrameCodec>,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Connection {
        Connection::with_codec(stream, FrameCodec::new())
    }

    pub fn with_codec(stream: TcpStream, codec: FrameCodec) -> Connection {
        let client_address = stream.peer_addr().ok();
        let (reader, writer) = stream.into_split();

        Connection {
            id: Uuid::new_v4(),
            client_address,
            reader: FramedRead::new(reader, codec.clone()),
            writer: FramedWrite::new(writer, codec),
        }
    }

    /// Reads the next frame. `Ok(None)` means the peer closed the connection on a frame boundary;
    /// closing it in the middle of a frame is `Error::Truncated`.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, Error> {
        self.reader.next().await.transpose()
    }

    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), Error> {
        self.writer.send(frame).await
    }
}
