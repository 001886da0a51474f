use std::future::Future;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{self, Duration};
use tracing::{debug, error, info, instrument, warn};

use crate::codec::FrameCodec;
use crate::config::Config;
use crate::connection::Connection;
use crate::db::Db;
use crate::frame::{self, Frame};
use crate::Error;

// Bounds for the pause after a failed accept, e.g. when the process is out of file descriptors.
const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(1);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Replays the append-only file, then serves clients until `shutdown` completes.
pub async fn run<F>(config: Config, shutdown: F) -> Result<(), Error>
where
    F: Future,
{
    let _ = tracing_subscriber::fmt()
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));

    // No client may observe the store before replay is done.
    let db = Db::open(&config).await?;

    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!("Server listening on {}", listener.local_addr()?);

    let codec = FrameCodec::with_max_frame_size(config.max_frame_size);
    serve(listener, db, codec, shutdown).await
}

/// Accepts connections on `listener`, one task each, until `shutdown` completes. Then every
/// connection finishes the request it is handling, and the database is closed.
pub async fn serve<F>(
    listener: TcpListener,
    db: Db,
    codec: FrameCodec,
    shutdown: F,
) -> Result<(), Error>
where
    F: Future,
{
    let (notify_shutdown, _) = watch::channel(false);
    let mut connections = JoinSet::new();

    let mut backoff = ACCEPT_BACKOFF_MIN;

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            res = listener.accept() => {
                let (socket, client_address) = match res {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("Failed to accept connection, retrying in {:?}: {}", backoff, e);
                        time::sleep(backoff).await;
                        backoff = next_backoff(backoff);
                        continue;
                    }
                };
                backoff = ACCEPT_BACKOFF_MIN;
                info!("Accepted connection from {:?}", client_address);

                let db = db.clone();
                let codec = codec.clone();
                let shutdown = notify_shutdown.subscribe();

                connections.spawn(async move {
                    if let Err(e) = handle_connection(socket, db, codec, shutdown).await {
                        error!("Connection error: {}", e);
                    }
                });
            }
            // Reap finished connections as we go.
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = &mut shutdown => {
                info!("Shutdown signal received, draining {} connections", connections.len());
                break;
            }
        }
    }

    let _ = notify_shutdown.send(true);
    while connections.join_next().await.is_some() {}

    db.close().await?;
    info!("Server shutdown complete");

    Ok(())
}

#[instrument(
    name = "connection",
    skip(stream, db, codec, shutdown),
    fields(connection_id, client_address)
)]
async fn handle_connection(
    stream: TcpStream,
    db: Db,
    codec: FrameCodec,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Error> {
    let mut conn = Connection::with_codec(stream, codec);

    let client_address = conn
        .client_address
        .map(|addr| addr.to_string())
        .unwrap_or_default();
    tracing::Span::current()
        .record("connection_id", conn.id.to_string())
        .record("client_address", client_address);

    loop {
        let frame = tokio::select! {
            res = conn.read_frame() => res,
            _ = shutdown.changed() => break,
        };

        let frame = match frame {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(frame::Error::Io(e)) => return Err(e.into()),
            // A byte stream cannot be resynchronized after a framing error; tell the client why
            // and hang up.
            Err(e) => {
                warn!("Closing connection after protocol error: {}", e);
                let _ = conn.write_frame(&Frame::Error(format!("ERR {}", e))).await;
                return Ok(());
            }
        };

        debug!("Received frame from client: {}", frame);
        let res = db.dispatch(frame).await;
        debug!("Sending response to client: {}", res);

        conn.write_frame(&res).await?;
    }

    info!("Connection closed");
    Ok(())
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(ACCEPT_BACKOFF_MAX)
}
