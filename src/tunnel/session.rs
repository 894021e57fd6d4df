//! SSH client handler.
//!
//! The appliances this tool talks to regenerate their host keys on reimage,
//! so the handler accepts all server keys (the `StrictHostKeyChecking=no`
//! equivalent). Verify against known_hosts here if that ever changes.

use russh::{client, keys};

/// Client handler for russh that accepts all host keys.
pub struct TunnelHandler;

impl client::Handler for TunnelHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}
