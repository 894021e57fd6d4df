//! Collect and restore Elasticsearch documents through an SSH tunnel.
//!
//! The appliance's document store only listens on its own loopback, so every
//! operation runs through a local forwarding relay: a TCP listener on
//! `127.0.0.1` whose accepted connections are carried over `direct-tcpip`
//! SSH sub-streams to `localhost:9200` on the far side. The transfer
//! protocol on top is plain HTTP: match-all searches for collection,
//! per-document upserts for restore.

pub mod cli;
pub mod ops;
pub mod settings;
pub mod transfer;
pub mod tunnel;
