//! TCP accept loop for HTTP/2 connections.
//!
//! Accepts sockets forever, hands each one to its own connection task and
//! goes straight back to accepting. Streams on those connections are
//! dispatched by the shared [`StreamDispatcher`].

use crate::config::Config;
use crate::dispatch::StreamDispatcher;
use crate::runtime::BufferPool;
use crate::transport::http2;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, info_span, warn, Instrument};

/// Server instance
pub struct Server {
    config: Config,
    pool: Arc<BufferPool>,
    dispatcher: Arc<StreamDispatcher>,
    /// Sequence number for the next accepted connection.
    next_connection_id: AtomicU64,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Self {
        let pool = Arc::new(BufferPool::new(
            config.buffers.buffer_size,
            config.buffers.max_retained,
        ));
        let dispatcher = Arc::new(StreamDispatcher::new(config.mode, Arc::clone(&pool)));

        Server {
            config,
            pool,
            dispatcher,
            next_connection_id: AtomicU64::new(0),
        }
    }

    /// Bind the listener and accept connections until accepting fails.
    pub async fn run(&self) -> io::Result<()> {
        let listener = self.bind()?;
        info!(
            address = %listener.local_addr()?,
            mode = ?self.dispatcher.mode(),
            "Server listening"
        );
        self.serve(listener).await
    }

    /// Create the listening socket.
    pub fn bind(&self) -> io::Result<TcpListener> {
        let addr: SocketAddr = self
            .config
            .listen
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        TcpListener::from_std(create_listener(addr, self.config.backlog)?)
    }

    /// Accept loop. Never waits on a connection or stream; an accept error
    /// ends the loop and is returned to the caller.
    pub async fn serve(&self, listener: TcpListener) -> io::Result<()> {
        loop {
            let (socket, peer) = listener.accept().await?;

            if let Err(e) = socket.set_nodelay(self.config.nodelay) {
                warn!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
            }

            let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
            let dispatcher = Arc::clone(&self.dispatcher);
            let pool = Arc::clone(&self.pool);
            let settings = self.config.http2.clone();

            tokio::spawn(
                async move {
                    debug!(peer = %peer, "New connection");
                    let result =
                        http2::serve_connection(socket, &settings, Arc::clone(&dispatcher)).await;
                    if let Err(e) = result {
                        debug!(error = %e, "Connection error");
                    }
                    debug!(
                        streams = ?dispatcher.stats(),
                        buffers = ?pool.stats(),
                        "Connection closed"
                    );
                }
                .instrument(info_span!("conn", id)),
            );
        }
    }

    /// Shared buffer pool for testing
    #[cfg(test)]
    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Shared stream dispatcher for testing
    #[cfg(test)]
    pub fn dispatcher(&self) -> &Arc<StreamDispatcher> {
        &self.dispatcher
    }
}

/// Create a non-blocking TCP listener with SO_REUSEADDR.
fn create_listener(addr: SocketAddr, backlog: i32) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    Ok(socket.into())
}
