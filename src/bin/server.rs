use clap::Parser;
use respdb::codec::DEFAULT_MAX_FRAME_SIZE;
use respdb::config::{Config, DEFAULT_PORT};
use respdb::{server, Error};
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// The address to bind to
    #[arg(long, env = "RESPDB_HOST", default_value = "127.0.0.1")]
    host: String,

    /// The port to listen on
    #[arg(short, long, env = "RESPDB_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Append-only file to replay at startup and record writes to
    #[arg(long, env = "RESPDB_AOF", default_value = "appendonly.aof")]
    aof: PathBuf,

    /// How often, in milliseconds, the append-only file is synced to disk
    #[arg(
        long,
        env = "RESPDB_FSYNC_INTERVAL_MS",
        default_value_t = 1000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    fsync_interval_ms: u64,

    /// Largest request, in bytes, a client may send
    #[arg(long, env = "RESPDB_MAX_FRAME_SIZE", default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    max_frame_size: usize,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Config {
            host: args.host,
            port: args.port,
            aof_path: args.aof,
            fsync_interval: Duration::from_millis(args.fsync_interval_ms),
            max_frame_size: args.max_frame_size,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    server::run(args.into(), signal::ctrl_c()).await
}
