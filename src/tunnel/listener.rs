//! Local TCP listener and accept loop.
//!
//! The listener owns the local end of the tunnel: it binds
//! `127.0.0.1:<local_port>`, accepts client connections, and spawns one
//! forwarder task per connection. The accept loop observes the session
//! cancellation token at every wait, and drains every forwarder it spawned
//! before returning, so the listener task finishing means no connection
//! tasks remain.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::error::TunnelError;

/// Registry entry for one live forwarded connection.
#[derive(Debug, Clone)]
pub struct ForwardedConnection {
    pub peer: SocketAddr,
    pub opened_at: DateTime<Utc>,
}

/// Live connections, keyed by a per-connection id. Inserted by the accept
/// loop, removed by each forwarder as it finishes.
pub(crate) type ConnectionRegistry = Arc<DashMap<Uuid, ForwardedConnection>>;

/// Pause after a failed accept so a persistent error cannot spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub(crate) struct TunnelListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TunnelListener {
    /// Bind the local forwarding port. Failure (port in use, permission
    /// denied) is a fatal setup error.
    pub(crate) async fn bind(local_port: u16) -> Result<Self, TunnelError> {
        let addr = format!("127.0.0.1:{local_port}");
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| TunnelError::Bind {
                port: local_port,
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| TunnelError::Bind {
            port: local_port,
            source,
        })?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until cancelled, handing each socket to a
    /// forwarder task built by `forward`.
    ///
    /// Errors accepting an individual connection are logged and the loop
    /// continues; only cancellation stops it. On the way out the loop waits
    /// for every forwarder (they observe the same token) and clears the
    /// registry.
    pub(crate) async fn accept_loop<F, Fut>(
        self,
        cancel: CancellationToken,
        registry: ConnectionRegistry,
        forward: F,
    ) where
        F: Fn(TcpStream, CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(u64, u64), TunnelError>> + Send + 'static,
    {
        let mut forwarders: JoinSet<()> = JoinSet::new();
        debug!("tunnel listening on {}", self.local_addr);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((local, peer)) => {
                            let id = Uuid::new_v4();
                            debug!(%peer, %id, "accepted tunnel connection");
                            registry.insert(id, ForwardedConnection {
                                peer,
                                opened_at: Utc::now(),
                            });

                            let connection = forward(local, cancel.clone());
                            let registry = registry.clone();
                            forwarders.spawn(async move {
                                match connection.await {
                                    Ok((sent, received)) => {
                                        trace!(%id, sent, received, "tunnel connection finished");
                                    }
                                    Err(e) => debug!(%id, "tunnel connection error: {e}"),
                                }
                                registry.remove(&id);
                            });
                        }
                        Err(e) => {
                            warn!("error accepting tunnel connection: {e}");
                            tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        }
                    }
                }

                // Reap finished forwarders so the set does not grow over a
                // long-lived session.
                Some(_) = forwarders.join_next(), if !forwarders.is_empty() => {}
            }
        }

        while forwarders.join_next().await.is_some() {}
        registry.clear();
    }
}
