//! # Listener
//!
//! Accepts TCP connections and turns each into a [`Session`] feeding one
//! shared [`EventQueue`]. Accept errors are logged and the loop keeps going;
//! only shutdown stops it.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{error, info, instrument, warn};

use crate::config::NetworkConfig;
use crate::error::Result;
use crate::protocol::event::EventQueue;
use crate::service::session::Session;
use crate::transport::connection::ConnectionLimits;
use crate::utils::crypto::Cipher;
use crate::utils::metrics::Metrics;

pub struct Server {
    listener: TcpListener,
    cipher: Arc<Cipher>,
    events: Arc<EventQueue>,
    limits: ConnectionLimits,
    metrics: Arc<Metrics>,
    max_connections: usize,
}

impl Server {
    /// Bind `addr`. Sessions push onto `events`.
    pub async fn bind<A: ToSocketAddrs>(
        addr: A,
        cipher: Arc<Cipher>,
        events: Arc<EventQueue>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(address = %listener.local_addr()?, "Listening");
        Ok(Self {
            listener,
            cipher,
            events,
            limits: ConnectionLimits::default(),
            metrics: Arc::new(Metrics::new()),
            max_connections: usize::MAX,
        })
    }

    /// Bind using the server address, limits and key from `config`.
    pub async fn from_config(config: &NetworkConfig, events: Arc<EventQueue>) -> Result<Self> {
        config.validate_strict()?;
        let cipher = Arc::new(config.cipher()?);
        let server = Self::bind(config.server.address.as_str(), cipher, events).await?;
        Ok(server
            .with_limits(config.transport.limits())
            .with_max_connections(config.server.max_connections))
    }

    pub fn with_limits(mut self, limits: ConnectionLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Accept connections forever.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Accept connections until ctrl-c.
    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Received CTRL+C signal, shutting down");
            }
        })
        .await
    }

    /// Accept connections until `shutdown` completes, then close every live
    /// session.
    #[instrument(skip_all, fields(address = ?self.listener.local_addr().ok()))]
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut sessions: Vec<Weak<Session>> = Vec::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down server");
                    break;
                }

                accept_result = self.listener.accept() => {
                    let (stream, peer) = match accept_result {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            self.metrics.connection_error();
                            error!(error = %e, "Error accepting connection");
                            continue;
                        }
                    };

                    sessions.retain(|s| s.upgrade().is_some_and(|s| !s.is_closed()));
                    if sessions.len() >= self.max_connections {
                        warn!(peer = %peer, limit = self.max_connections, "Connection limit reached, refusing");
                        continue;
                    }

                    match Session::start(
                        stream,
                        Arc::clone(&self.cipher),
                        Arc::clone(&self.events),
                        self.limits,
                        Arc::clone(&self.metrics),
                    ) {
                        Ok(session) => sessions.push(Arc::downgrade(&session)),
                        Err(e) => {
                            self.metrics.connection_error();
                            error!(error = %e, peer = %peer, "Failed to start session");
                        }
                    }
                }
            }
        }

        let mut closed = 0usize;
        for session in sessions.iter().filter_map(Weak::upgrade) {
            session.close();
            closed += 1;
        }
        info!(closed, "Server stopped");
        self.metrics.log_metrics();
        Ok(())
    }
}
