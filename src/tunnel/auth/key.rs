//! Private key file authentication.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use russh::{client, keys};
use tracing::debug;

use crate::tunnel::error::TunnelError;
use crate::tunnel::session::TunnelHandler;

use super::traits::AuthStrategy;

/// Public key authentication from a private key file.
///
/// Supports passphrase-less keys only.
pub struct KeyAuth {
    key_path: PathBuf,
}

impl KeyAuth {
    pub fn new(key_path: impl Into<PathBuf>) -> Self {
        Self {
            key_path: key_path.into(),
        }
    }
}

#[async_trait]
impl AuthStrategy for KeyAuth {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<TunnelHandler>,
        username: &str,
    ) -> Result<bool, TunnelError> {
        let key_pair = keys::load_secret_key(&self.key_path, None).map_err(|e| {
            TunnelError::Authentication(format!(
                "failed to load private key from {:?}: {e}",
                self.key_path
            ))
        })?;

        // RSA keys need the strongest hash algorithm both sides support.
        let hash_alg = handle
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();
        debug!("using rsa hash algorithm for key auth: {:?}", hash_alg);

        let key_with_hash = keys::PrivateKeyWithHashAlg::new(Arc::new(key_pair), hash_alg);

        let result = handle
            .authenticate_publickey(username, key_with_hash)
            .await
            .map_err(|e| TunnelError::Authentication(format!("key authentication failed: {e}")))?;

        Ok(result.success())
    }

    fn name(&self) -> &'static str {
        "key"
    }
}
