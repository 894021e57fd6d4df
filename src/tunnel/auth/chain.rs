//! Authentication chain: try strategies in order, first success wins.

use std::path::PathBuf;

use async_trait::async_trait;
use russh::client;
use tracing::debug;

use crate::tunnel::error::TunnelError;
use crate::tunnel::session::TunnelHandler;

use super::traits::AuthStrategy;
use super::{AgentAuth, KeyAuth, PasswordAuth};

/// Ordered set of authentication strategies.
///
/// Strategies run in insertion order; the first `Ok(true)` stops the chain.
/// If every strategy fails, the last error (or rejection) is returned.
pub struct AuthChain {
    strategies: Vec<Box<dyn AuthStrategy>>,
}

impl AuthChain {
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.strategies.push(Box::new(PasswordAuth::new(password)));
        self
    }

    pub fn with_key(mut self, key_path: impl Into<PathBuf>) -> Self {
        self.strategies.push(Box::new(KeyAuth::new(key_path)));
        self
    }

    pub fn with_agent(mut self) -> Self {
        self.strategies.push(Box::new(AgentAuth::new()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.strategies.len()
    }
}

impl Default for AuthChain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthStrategy for AuthChain {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<TunnelHandler>,
        username: &str,
    ) -> Result<bool, TunnelError> {
        if self.strategies.is_empty() {
            return Err(TunnelError::Authentication(
                "no authentication strategies configured".to_string(),
            ));
        }

        let mut last_error = None;

        for strategy in &self.strategies {
            debug!("trying authentication strategy: {}", strategy.name());

            match strategy.authenticate(handle, username).await {
                Ok(true) => {
                    debug!("authentication succeeded with strategy: {}", strategy.name());
                    return Ok(true);
                }
                Ok(false) => {
                    debug!("authentication rejected by strategy: {}", strategy.name());
                    last_error = Some(TunnelError::Authentication(format!(
                        "{} authentication rejected",
                        strategy.name()
                    )));
                }
                Err(e) => {
                    debug!("authentication error with strategy {}: {e}", strategy.name());
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            TunnelError::Authentication("all authentication methods failed".to_string())
        }))
    }

    fn name(&self) -> &'static str {
        "chain"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_chain() {
        let chain = AuthChain::new();
        assert!(chain.is_empty());
        assert_eq!(chain.len(), 0);
    }

    #[test]
    fn chain_preserves_insertion_order() {
        let chain = AuthChain::new()
            .with_password("secret")
            .with_key("/path/to/key")
            .with_agent();

        assert_eq!(chain.len(), 3);
        let names: Vec<_> = chain.strategies.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["password", "key", "agent"]);
    }

    #[test]
    fn chain_is_a_strategy_itself() {
        fn requires_auth_strategy(_: &dyn AuthStrategy) {}
        let chain = AuthChain::new().with_password("secret");
        requires_auth_strategy(&chain);
    }

    #[test]
    fn default_chain_is_empty() {
        assert!(AuthChain::default().is_empty());
    }
}
