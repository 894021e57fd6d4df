//! SSH agent authentication.

use async_trait::async_trait;
use russh::{client, keys};
use tracing::debug;

use crate::tunnel::error::TunnelError;
use crate::tunnel::session::TunnelHandler;

use super::traits::AuthStrategy;

/// Tries every identity the agent (via `SSH_AUTH_SOCK`) offers, in order.
pub struct AgentAuth;

impl AgentAuth {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AgentAuth {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthStrategy for AgentAuth {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<TunnelHandler>,
        username: &str,
    ) -> Result<bool, TunnelError> {
        let mut agent = keys::agent::client::AgentClient::connect_env()
            .await
            .map_err(|e| {
                TunnelError::Authentication(format!("failed to connect to ssh agent: {e}"))
            })?;

        let identities = agent.request_identities().await.map_err(|e| {
            TunnelError::Authentication(format!("failed to list ssh agent identities: {e}"))
        })?;

        if identities.is_empty() {
            return Err(TunnelError::Authentication(
                "no identities found in ssh agent".to_string(),
            ));
        }

        for identity in identities {
            debug!("trying ssh agent identity: {:?}", identity.comment());

            let hash_alg = handle
                .best_supported_rsa_hash()
                .await
                .ok()
                .flatten()
                .flatten();

            match handle
                .authenticate_publickey_with(username, identity.clone(), hash_alg, &mut agent)
                .await
            {
                Ok(result) if result.success() => return Ok(true),
                Ok(_) => {
                    debug!("agent identity not accepted, trying next");
                    continue;
                }
                Err(e) => {
                    debug!("agent authentication error: {e}, trying next");
                    continue;
                }
            }
        }

        Err(TunnelError::Authentication(
            "agent authentication failed: no identities accepted".to_string(),
        ))
    }

    fn name(&self) -> &'static str {
        "agent"
    }
}
