//! Append-only file.
//!
//! Every command that changes the store is written here, serialized exactly as it arrived on the
//! wire, before it is applied. The file has no header, separators or checksums: records are RESP
//! frames and delimit themselves. Replaying the file from the start through the normal command
//! path rebuilds the store.
//!
//! Appends are not synced individually. A background task syncs the file on a fixed period, so a
//! crash loses at most the writes of the last period.

use futures::StreamExt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, Weak};
use thiserror::Error as ThisError;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, MissedTickBehavior};
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info};

use crate::codec::FrameCodec;
use crate::frame::{self, Frame};

pub const DEFAULT_FSYNC_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("cannot open append-only file {}: {source}", path.display())]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("append-only file is corrupt after {record} valid records: {source}")]
    CorruptLog {
        record: usize,
        #[source]
        source: frame::Error,
    },
    #[error("append-only file is closed")]
    Closed,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Handle to an open append-only file. Clones share the same file, lock and flusher.
#[derive(Clone)]
pub struct Aof {
    shared: Arc<Shared>,
}

struct Shared {
    path: PathBuf,
    // Appends, periodic syncs, replay and close all go through this lock, so records never
    // interleave and a sync always sees whole records.
    file: Mutex<Option<File>>,
    shutdown: watch::Sender<bool>,
    flusher: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Aof {
    /// Opens the file at `path` for appending, creating it if needed, and starts syncing it to
    /// disk every `fsync_interval`.
    pub async fn open(path: impl AsRef<Path>, fsync_interval: Duration) -> Result<Aof, Error> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| Error::StorageUnavailable {
                path: path.clone(),
                source,
            })?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let shared = Arc::new(Shared {
            path,
            file: Mutex::new(Some(file)),
            shutdown,
            flusher: std::sync::Mutex::new(None),
        });

        let flusher = tokio::spawn(sync_periodically(
            Arc::downgrade(&shared),
            fsync_interval,
            shutdown_rx,
        ));
        *shared
            .flusher
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(flusher);

        debug!(path = %shared.path.display(), "opened append-only file");

        Ok(Aof { shared })
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Appends `frame` to the file.
    pub async fn append(&self, frame: &Frame) -> Result<(), Error> {
        self.append_then(frame, || ()).await
    }

    /// Appends `frame` and then runs `apply` before any other record can be appended. Running the
    /// mutation under the same lock keeps the order of records in the file identical to the order
    /// their effects reached the store, so replay ends in the same state. `apply` is not called
    /// if the write fails.
    pub async fn append_then<F, R>(&self, frame: &Frame, apply: F) -> Result<R, Error>
    where
        F: FnOnce() -> R,
    {
        let bytes = frame.serialize();

        let mut file = self.shared.file.lock().await;
        let file = file.as_mut().ok_or(Error::Closed)?;

        file.write_all(&bytes).await?;
        // Waits until the bytes reached the OS so write errors surface here, not on the next call.
        file.flush().await?;

        Ok(apply())
    }

    /// Reads every record from the start of the file and hands it to `apply`, in order. Returns
    /// the number of records applied. A record that cannot be decoded, including one cut short at
    /// the end of the file, is `Error::CorruptLog`. Records were size-checked when they were
    /// accepted, so no frame size limit applies here.
    pub async fn replay<F>(&self, mut apply: F) -> Result<usize, Error>
    where
        F: FnMut(Frame),
    {
        let _guard = self.shared.file.lock().await;

        let file = File::open(&self.shared.path).await?;
        let mut records = FramedRead::new(file, FrameCodec::unbounded());
        let mut count = 0;

        while let Some(record) = records.next().await {
            let frame = match record {
                Ok(frame) => frame,
                Err(frame::Error::Io(err)) => return Err(Error::Io(err)),
                Err(source) => {
                    return Err(Error::CorruptLog {
                        record: count,
                        source,
                    })
                }
            };

            apply(frame);
            count += 1;
        }

        Ok(count)
    }

    /// Syncs buffered writes to disk now.
    pub async fn sync(&self) -> Result<(), Error> {
        self.shared.sync().await
    }

    /// Stops the background flusher, syncs the file and releases it. Appends after this fail with
    /// `Error::Closed`; closing twice is a no-op.
    pub async fn close(&self) -> Result<(), Error> {
        let _ = self.shared.shutdown.send(true);

        let flusher = self
            .shared
            .flusher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(flusher) = flusher {
            let _ = flusher.await;
        }

        let mut file = self.shared.file.lock().await;
        if let Some(mut file) = file.take() {
            file.flush().await?;
            file.sync_all().await?;
            info!(path = %self.shared.path.display(), "closed append-only file");
        }

        Ok(())
    }
}

impl Shared {
    async fn sync(&self) -> Result<(), Error> {
        let file = self.file.lock().await;
        match file.as_ref() {
            Some(file) => Ok(file.sync_data().await?),
            None => Err(Error::Closed),
        }
    }
}

// Holds a weak reference so dropping every `Aof` handle also ends the task.
async fn sync_periodically(
    shared: Weak<Shared>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => {
                debug!("append-only file flusher received shutdown signal");
                return;
            }
        }

        let Some(shared) = shared.upgrade() else {
            return;
        };

        match shared.sync().await {
            Ok(()) => {}
            Err(Error::Closed) => return,
            Err(err) => error!(error = %err, "failed to sync append-only file"),
        }
    }
}
