//! stream-bench: an HTTP/2 request-processing benchmark server
//!
//! Every inbound HTTP/2 stream is handled by its own task in one of two
//! modes:
//! - `drain` (default): read and discard the request body, reply `Hello World!`
//! - `echo`: stream the request body back as the response body
//!
//! Features:
//! - Bounded memory per stream via a shared pool of fixed-size buffers
//! - Failed streams are cancelled without disturbing their siblings
//! - Configuration via CLI arguments or TOML file

mod config;
mod dispatch;
mod handlers;
mod runtime;
mod server;
mod transport;

use config::Config;
use server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let workers = config.worker_threads();
    info!(
        listen = %config.listen,
        mode = ?config.mode,
        workers,
        buffer_size = config.buffers.buffer_size,
        "Starting stream-bench server"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers)
        .enable_all()
        .build()?;

    let server = Server::new(config);
    runtime.block_on(server.run())?;
    Ok(())
}
