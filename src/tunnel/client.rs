//! SSH connection establishment.
//!
//! Connecting runs in three steps: build the russh client config, open the
//! TCP connection with a timeout, then authenticate through the [`AuthChain`]
//! built from the tunnel credentials (password, key file, agent fallback).
//!
//! Transient transport failures are retried with exponential backoff and
//! jitter; authentication failures are surfaced immediately and never
//! retried.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use russh::client;
use tracing::{info, warn};

use super::auth::{AuthChain, AuthStrategy};
use super::error::{TunnelError, classify_connect_error};
use super::lifecycle::TunnelConfig;
use super::session::TunnelHandler;

/// Cap on the delay between connection retries.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Build the russh client configuration for a tunnel session.
///
/// Tunnel sessions stay open for the whole transfer run, so there is no
/// inactivity timeout; keepalives detect a dead peer instead.
pub(crate) fn build_client_config() -> Arc<client::Config> {
    Arc::new(client::Config {
        inactivity_timeout: None,
        keepalive_interval: Some(Duration::from_secs(30)),
        keepalive_max: 3,
        ..Default::default()
    })
}

/// Connect and authenticate, retrying transient transport failures.
pub(crate) async fn connect_with_retry(
    config: &TunnelConfig,
) -> Result<client::Handle<TunnelHandler>, TunnelError> {
    let attempt_counter = AtomicU32::new(0);

    let backoff = ExponentialBuilder::default()
        .with_min_delay(config.retry_delay)
        .with_max_delay(MAX_RETRY_DELAY)
        .with_max_times(config.max_retries as usize)
        .with_jitter();

    let handle = (|| async {
        let attempt = attempt_counter.fetch_add(1, Ordering::SeqCst);
        if attempt > 0 {
            warn!(
                "ssh connection retry attempt {attempt} to {}@{}:{}",
                config.username, config.ssh_host, config.ssh_port
            );
        }
        connect_once(config).await
    })
    .retry(backoff)
    .when(TunnelError::is_retryable)
    .notify(|err, dur| {
        warn!("ssh connection failed: {err}; retrying in {dur:?}");
    })
    .await?;

    let retries = attempt_counter.load(Ordering::SeqCst).saturating_sub(1);
    if retries > 0 {
        info!(
            "ssh connection to {}@{} succeeded after {retries} retry attempt(s)",
            config.username, config.ssh_host
        );
    }
    Ok(handle)
}

/// One connection attempt: TCP connect with timeout, then authenticate.
async fn connect_once(
    config: &TunnelConfig,
) -> Result<client::Handle<TunnelHandler>, TunnelError> {
    let client_config = build_client_config();
    let handler = TunnelHandler;

    let connect_future = client::connect(
        client_config,
        (config.ssh_host.as_str(), config.ssh_port),
        handler,
    );

    let mut handle = tokio::time::timeout(config.connect_timeout, connect_future)
        .await
        .map_err(|_| {
            TunnelError::Network(format!(
                "connection to {}:{} timed out after {:?}",
                config.ssh_host, config.ssh_port, config.connect_timeout
            ))
        })?
        .map_err(|e| classify_connect_error(format!("failed to connect: {e}")))?;

    let chain = build_auth_chain(config);
    let success = chain.authenticate(&mut handle, &config.username).await?;

    if !success {
        return Err(TunnelError::Authentication(
            "no authentication methods succeeded".to_string(),
        ));
    }

    Ok(handle)
}

/// Password first if configured, then key file, agent as the fallback when
/// no explicit credentials are present.
fn build_auth_chain(config: &TunnelConfig) -> AuthChain {
    let mut chain = AuthChain::new();

    if let Some(password) = &config.password {
        chain = chain.with_password(password.clone());
    }

    if let Some(key_path) = &config.key_path {
        chain = chain.with_key(key_path.clone());
    }

    if chain.is_empty() {
        chain = chain.with_agent();
    }

    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_config_keeps_session_alive() {
        let config = build_client_config();
        assert_eq!(config.inactivity_timeout, None);
        assert_eq!(config.keepalive_interval, Some(Duration::from_secs(30)));
        assert_eq!(config.keepalive_max, 3);
    }

    #[test]
    fn auth_chain_falls_back_to_agent() {
        let config = TunnelConfig::new("appliance", "admin", 9201);
        assert!(!build_auth_chain(&config).is_empty());
    }

    #[test]
    fn max_retry_delay_is_bounded() {
        assert_eq!(MAX_RETRY_DELAY, Duration::from_secs(10));
    }
}
