use std::path::PathBuf;
use std::time::Duration;

use crate::aof::DEFAULT_FSYNC_INTERVAL;
use crate::codec::DEFAULT_MAX_FRAME_SIZE;

pub const DEFAULT_PORT: u16 = 6379;

/// Server settings. The binary fills this from command line flags and environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Append-only file replayed at startup and appended to for every write.
    pub aof_path: PathBuf,
    /// How often buffered appends are synced to disk.
    pub fsync_interval: Duration,
    /// Largest frame a client may send before its connection is dropped.
    pub max_frame_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            aof_path: PathBuf::from("appendonly.aof"),
            fsync_interval: DEFAULT_FSYNC_INTERVAL,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}
