//! Document transfer protocol over the tunnel's local port.
//!
//! - `client`: collect (search) and restore (per-document upsert)
//! - `document`: envelope parsing, document model, batch accounting
//! - `rewrite`: pure rewrites of collected trees before restore
//! - `error`: error taxonomy

pub mod client;
pub mod document;
pub mod error;
pub mod rewrite;

pub use client::DocumentTransferClient;
pub use document::{DocumentKind, TransferDocument, TransferResult};
pub use error::TransferError;
