//! SSH-tunneled byte-forwarding relay.
//!
//! - `lifecycle`: open/close of a [`TunnelSession`], readiness probing
//! - `listener`: local TCP listener and accept loop
//! - `forward`: per-connection duplex relay
//! - `client`: SSH connection establishment and retry
//! - `auth`: authentication strategies (password, key file, agent)
//! - `session`: russh client handler
//! - `error`: error taxonomy and connect-time classification

pub mod auth;
pub(crate) mod client;
pub mod error;
pub(crate) mod forward;
pub mod lifecycle;
pub(crate) mod listener;
pub mod session;

pub use error::TunnelError;
pub use lifecycle::{TunnelConfig, TunnelSession};
pub use listener::ForwardedConnection;
