//! Authentication strategy trait.

use async_trait::async_trait;
use russh::client;

use crate::tunnel::error::TunnelError;
use crate::tunnel::session::TunnelHandler;

/// One way of authenticating the SSH session.
///
/// Implementations must be `Send + Sync` so a chain can be shared across
/// async tasks.
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    /// Attempt to authenticate.
    ///
    /// `Ok(true)` means the server accepted the credentials, `Ok(false)`
    /// means it rejected them; `Err` is an error in the attempt itself
    /// (unreadable key file, no agent socket).
    async fn authenticate(
        &self,
        handle: &mut client::Handle<TunnelHandler>,
        username: &str,
    ) -> Result<bool, TunnelError>;

    /// Strategy name, for logging.
    fn name(&self) -> &'static str;
}
