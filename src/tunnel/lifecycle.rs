//! Tunnel lifecycle: open, readiness probe, idempotent teardown.
//!
//! `open()` runs the startup sequence in order — SSH connect and
//! authenticate, bind the local listener, let the listener settle, then
//! probe readiness with one throwaway HTTP request. A failure at any step
//! unwinds the steps already taken and returns a typed error, so an `Err`
//! never leaks a live session.
//!
//! `close()` is the single teardown path: it is idempotent, never returns
//! an error (cleanup failures are logged and swallowed), and must be called
//! on every exit path — success, error and interrupt alike. `Drop` cancels
//! the token as a last resort, but only `close()` waits for the listener
//! and forwarders to drain.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use russh::client;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::connect_with_retry;
use super::error::TunnelError;
use super::forward::forward_connection;
use super::listener::{ConnectionRegistry, ForwardedConnection, TunnelListener};
use super::session::TunnelHandler;

/// Far-side destination the tunnel points at.
pub const DEFAULT_REMOTE_TARGET_HOST: &str = "localhost";
pub const DEFAULT_REMOTE_TARGET_PORT: u16 = 9200;

/// Bridges the gap between "listener task spawned" and the first client
/// connecting. Not a correctness dependency; the readiness probe decides.
const LISTENER_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// How long `close()` waits for the accept loop and forwarders to drain
/// before abandoning them.
const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything needed to open one tunnel. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    pub ssh_host: String,
    pub ssh_port: u16,
    pub username: String,
    pub password: Option<String>,
    pub key_path: Option<PathBuf>,
    /// Local port the listener binds on `127.0.0.1`.
    pub local_port: u16,
    /// Destination host as seen from the SSH server.
    pub remote_target_host: String,
    pub remote_target_port: u16,
    pub connect_timeout: Duration,
    pub readiness_timeout: Duration,
    /// Retries for transient SSH connect failures. Authentication failures
    /// are never retried.
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl TunnelConfig {
    pub fn new(ssh_host: impl Into<String>, username: impl Into<String>, local_port: u16) -> Self {
        Self {
            ssh_host: ssh_host.into(),
            ssh_port: 22,
            username: username.into(),
            password: None,
            key_path: None,
            local_port,
            remote_target_host: DEFAULT_REMOTE_TARGET_HOST.to_string(),
            remote_target_port: DEFAULT_REMOTE_TARGET_PORT,
            connect_timeout: Duration::from_secs(30),
            readiness_timeout: Duration::from_secs(10),
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
        }
    }
}

/// A live tunnel. Owns the SSH session, the listener task and the
/// connection registry.
pub struct TunnelSession {
    handle: Arc<client::Handle<TunnelHandler>>,
    cancel: CancellationToken,
    accept_task: Option<JoinHandle<()>>,
    connections: ConnectionRegistry,
    local_port: u16,
    running: bool,
}

impl TunnelSession {
    /// Open a tunnel: connect, bind, settle, probe. Fully unwinds on
    /// failure at any step.
    pub async fn open(config: TunnelConfig) -> Result<TunnelSession, TunnelError> {
        info!(
            "opening tunnel: {}@{}:{} -> {}:{} via 127.0.0.1:{}",
            config.username,
            config.ssh_host,
            config.ssh_port,
            config.remote_target_host,
            config.remote_target_port,
            config.local_port
        );

        let handle = Arc::new(connect_with_retry(&config).await?);

        // A bind failure must release the SSH session before surfacing.
        let listener = match TunnelListener::bind(config.local_port).await {
            Ok(listener) => listener,
            Err(e) => {
                disconnect(&handle).await;
                return Err(e);
            }
        };

        let cancel = CancellationToken::new();
        let connections: ConnectionRegistry = Arc::new(DashMap::new());

        let forward = {
            let handle = handle.clone();
            let target_host = config.remote_target_host.clone();
            let target_port = config.remote_target_port;
            move |local, cancel| {
                forward_connection(
                    handle.clone(),
                    local,
                    target_host.clone(),
                    target_port,
                    cancel,
                )
            }
        };
        let accept_task = tokio::spawn(listener.accept_loop(
            cancel.clone(),
            connections.clone(),
            forward,
        ));

        let mut session = TunnelSession {
            handle,
            cancel,
            accept_task: Some(accept_task),
            connections,
            local_port: config.local_port,
            running: true,
        };

        tokio::time::sleep(LISTENER_SETTLE_DELAY).await;

        if let Err(e) = probe_readiness(config.local_port, config.readiness_timeout).await {
            session.close().await;
            return Err(e);
        }

        info!("tunnel ready on 127.0.0.1:{}", config.local_port);
        Ok(session)
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Number of connections currently being forwarded.
    pub fn active_connections(&self) -> usize {
        self.connections.len()
    }

    /// Connections currently being forwarded, for diagnostics.
    pub fn connection_snapshot(&self) -> Vec<ForwardedConnection> {
        self.connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Tear the tunnel down: stop the accept loop, drain forwarders, close
    /// the SSH session. Idempotent, and never fails — teardown errors are
    /// logged and swallowed.
    pub async fn close(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;

        info!("closing tunnel on 127.0.0.1:{}", self.local_port);
        self.cancel.cancel();

        if let Some(mut task) = self.accept_task.take() {
            match tokio::time::timeout(CLOSE_DRAIN_TIMEOUT, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("tunnel accept loop ended abnormally: {e}"),
                Err(_) => {
                    warn!("tunnel accept loop did not drain in time, aborting it");
                    task.abort();
                }
            }
        }
        self.connections.clear();

        disconnect(&self.handle).await;
    }
}

impl Drop for TunnelSession {
    fn drop(&mut self) {
        if self.running {
            // Last-resort: wake every loop so tasks exit. The orderly path
            // is close().
            warn!("tunnel session dropped while running; cancelling tasks");
            self.cancel.cancel();
        }
    }
}

/// Close the SSH session, swallowing errors (teardown must not fail).
async fn disconnect(handle: &client::Handle<TunnelHandler>) {
    if let Err(e) = handle
        .disconnect(russh::Disconnect::ByApplication, "tunnel closed", "en")
        .await
    {
        debug!("ssh disconnect: {e}");
    }
}

/// One throwaway HTTP request against the local port.
///
/// Any HTTP response, error status included, proves the relay reached the
/// far side. Refusal and timeout both mean the tunnel did not come up;
/// callers get the one `Network` kind either way.
async fn probe_readiness(local_port: u16, timeout: Duration) -> Result<(), TunnelError> {
    let url = format!("http://127.0.0.1:{local_port}/");
    debug!(%url, "probing tunnel readiness");

    let probe = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| TunnelError::Network(format!("failed to build probe client: {e}")))?;

    match probe.get(&url).send().await {
        Ok(response) => {
            debug!(status = %response.status(), "tunnel readiness probe answered");
            Ok(())
        }
        Err(e) => Err(TunnelError::Network(format!(
            "tunnel readiness probe failed: {e}"
        ))),
    }
}
