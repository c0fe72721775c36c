//! The Locksmith server: listener, accept loop, session spawning.

mod session;
pub(crate) mod tls;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use crate::config::Config;
use crate::engine::Engine;
use crate::metrics;

/// A bound, ready-to-run Locksmith instance.
///
/// `bind` brings up the engine and the listener so that startup failures
/// (bad certificates, occupied port) surface before any client is accepted;
/// `run` then serves connections until the caller drops the future, which
/// is how the daemon implements signal-driven shutdown.
///
/// # Example
///
/// ```rust,ignore
/// use locksmith_core::{config::Config, Locksmith};
///
/// let server = Locksmith::bind(Config::from_env()?).await?;
/// server.run().await?;
/// ```
pub struct Locksmith {
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    engine: Arc<Engine>,
    metrics_enabled: bool,
}

impl Locksmith {
    /// Start the engine and bind the listener described by `config`.
    pub async fn bind(config: Config) -> Result<Self> {
        let engine = Arc::new(Engine::new(&config.queue));

        let tls = if config.server.tls {
            log::info!("TLS enabled, loading certificates");
            Some(tls::build_acceptor(&config.server)?)
        } else {
            None
        };

        let addr: SocketAddr = ([0, 0, 0, 0], config.server.port).into();
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind to {}", addr))?;
        log::info!("listening on {}", listener.local_addr()?);

        Ok(Self { listener, tls, engine, metrics_enabled: config.metrics.enabled })
    }

    /// The address the listener actually bound; useful with port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The engine backing this server.
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Accept and serve connections forever. Dropping the returned future
    /// stops the accept loop; sessions already running are left to drain.
    pub async fn run(self) -> Result<()> {
        if self.metrics_enabled {
            tokio::spawn(async {
                if let Err(err) = metrics::serve().await {
                    log::error!("metrics endpoint failed: {}", err);
                }
            });
        }

        loop {
            let (socket, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    log::error!("failed to accept connection: {}", err);
                    continue;
                }
            };
            log::debug!("listener accepted connection from {}", addr);

            let engine = self.engine.clone();
            match &self.tls {
                Some(acceptor) => {
                    let acceptor = acceptor.clone();
                    tokio::spawn(async move {
                        match acceptor.accept(socket).await {
                            Ok(stream) => session::serve(engine, stream, addr).await,
                            Err(err) => {
                                log::error!("TLS handshake with {} failed: {}", addr, err);
                            }
                        }
                    });
                }
                None => {
                    tokio::spawn(session::serve(engine, socket, addr));
                }
            }
        }
    }
}
