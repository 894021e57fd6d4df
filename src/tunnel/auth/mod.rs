//! Authentication strategies for the SSH leg of the tunnel.
//!
//! Credentials come from the config file as a password, a key file, or
//! nothing (in which case the SSH agent is tried). Each method is one
//! [`AuthStrategy`]; [`AuthChain`] tries them in order and stops at the
//! first success.

mod agent;
mod chain;
mod key;
mod password;
mod traits;

pub use agent::AgentAuth;
pub use chain::AuthChain;
pub use key::KeyAuth;
pub use password::PasswordAuth;
pub use traits::AuthStrategy;
