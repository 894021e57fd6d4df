//! Password authentication.

use async_trait::async_trait;
use russh::client;

use crate::tunnel::error::TunnelError;
use crate::tunnel::session::TunnelHandler;

use super::traits::AuthStrategy;

pub struct PasswordAuth {
    password: String,
}

impl PasswordAuth {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
        }
    }
}

#[async_trait]
impl AuthStrategy for PasswordAuth {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<TunnelHandler>,
        username: &str,
    ) -> Result<bool, TunnelError> {
        let result = handle
            .authenticate_password(username, &self.password)
            .await
            .map_err(|e| {
                TunnelError::Authentication(format!("password authentication failed: {e}"))
            })?;

        Ok(result.success())
    }

    fn name(&self) -> &'static str {
        "password"
    }
}
