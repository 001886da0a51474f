use tracing::{debug, error, info, warn};

use crate::aof::{self, Aof};
use crate::commands::executable::Executable;
use crate::commands::Command;
use crate::config::Config;
use crate::frame::Frame;
use crate::store::Store;

/// Executes request frames against the store. Live traffic goes through `dispatch`, which records
/// write commands in the append-only file before applying them; replay goes through `apply`,
/// which runs the very same parser and handlers without recording anything.
#[derive(Clone)]
pub struct Db {
    store: Store,
    aof: Option<Aof>,
}

impl Db {
    /// A database that keeps nothing on disk.
    pub fn new(store: Store) -> Db {
        Db { store, aof: None }
    }

    /// Opens the append-only file named in `config` and replays it into an empty store. The
    /// returned database records every write to that file.
    pub async fn open(config: &Config) -> Result<Db, aof::Error> {
        let aof = Aof::open(&config.aof_path, config.fsync_interval).await?;
        let db = Db::new(Store::new());

        let applied = aof
            .replay(|frame| {
                if let Frame::Error(err) = db.apply(frame) {
                    warn!(error = %err, "skipped invalid record in append-only file");
                }
            })
            .await?;

        info!(
            applied,
            path = %config.aof_path.display(),
            "replayed append-only file"
        );

        Ok(Db {
            aof: Some(aof),
            ..db
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Runs one client request and returns the reply. Command errors become error frames; a write
    /// that cannot be recorded is not applied and the client is told so.
    pub async fn dispatch(&self, frame: Frame) -> Frame {
        let record = frame.clone();

        let command = match Command::try_from(frame) {
            Ok(command) => command,
            Err(err) => {
                debug!(error = %err, "rejected command");
                return err.into();
            }
        };

        match &self.aof {
            Some(aof) if command.is_write() => {
                match aof.append_then(&record, || command.exec(&self.store)).await {
                    Ok(res) => res,
                    Err(err) => {
                        error!(error = %err, "failed to append command to append-only file");
                        Frame::Error(format!("ERR failed to persist command: {}", err))
                    }
                }
            }
            _ => command.exec(&self.store),
        }
    }

    /// Runs a request without recording it.
    pub fn apply(&self, frame: Frame) -> Frame {
        match Command::try_from(frame) {
            Ok(command) => command.exec(&self.store),
            Err(err) => err.into(),
        }
    }

    /// Syncs and closes the append-only file, if there is one.
    pub async fn close(&self) -> Result<(), aof::Error> {
        match &self.aof {
            Some(aof) => aof.close().await,
            None => Ok(()),
        }
    }
}
