//! Document model for the transfer protocol.
//!
//! Collected data is kept on disk as the raw search envelope exactly as the
//! document store returned it, so the functions here parse documents *out*
//! of an envelope rather than defining a bespoke file format.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::TransferError;

/// The document kinds the appliance exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum DocumentKind {
    Alerts,
    Reports,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 2] = [DocumentKind::Alerts, DocumentKind::Reports];

    /// Index alias queried on the far side of the tunnel.
    pub fn index_alias(&self) -> &'static str {
        match self {
            DocumentKind::Alerts => "rt-alert-def-vrm-ty-rt-alert-def-vrm",
            DocumentKind::Reports => {
                "vrm-scheduled-report-definition-vrm-ty-vrm-scheduled-report-definition"
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DocumentKind::Alerts => "alerts",
            DocumentKind::Reports => "reports",
        }
    }

    /// Default envelope filename used by restore.
    pub fn default_filename(&self) -> &'static str {
        match self {
            DocumentKind::Alerts => "alerts.json",
            DocumentKind::Reports => "reports.json",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One document lifted out of a search envelope.
///
/// Identity fields are optional at the model level: a hit missing `_index`
/// or `_id` still deserializes, and is counted as a per-item failure at
/// restore time instead of poisoning the whole file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferDocument {
    #[serde(rename = "_index", default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "_source", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Value>,
}

impl TransferDocument {
    /// The (index, id, source) triple, or the reason this document cannot
    /// be written.
    pub fn identity(&self) -> Result<(&str, &str, &Value), String> {
        let index = self
            .index
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "missing _index".to_string())?;
        let id = self
            .id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "missing _id".to_string())?;
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| "missing _source".to_string())?;
        Ok((index, id, source))
    }
}

/// Parse the documents out of a search envelope.
///
/// The top-level `hits` key is required; everything below it is tolerant
/// (a missing inner `hits` array reads as zero documents). Document order
/// is preserved.
pub fn parse_envelope(envelope: &Value) -> Result<Vec<TransferDocument>, TransferError> {
    let hits = envelope
        .get("hits")
        .ok_or_else(|| TransferError::Format("missing 'hits' field in envelope".to_string()))?;

    let hits = hits
        .get("hits")
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()));

    let documents = serde_json::from_value(hits)
        .map_err(|e| TransferError::Format(format!("malformed hits array: {e}")))?;
    Ok(documents)
}

/// Pull only the `_source` definitions out of an envelope, in order.
/// Hits without a `_source` are skipped.
pub fn extract_sources(envelope: &Value) -> Result<Vec<Value>, TransferError> {
    let documents = parse_envelope(envelope)?;
    Ok(documents.into_iter().filter_map(|d| d.source).collect())
}

/// Aggregate outcome of one restore batch. Each attempted document is
/// counted exactly once.
#[derive(Debug, Default, Clone, Serialize)]
pub struct TransferResult {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<ItemFailure>,
}

/// One failed item and why it failed.
#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    /// Document id, when the item carried one.
    pub id: Option<String>,
    pub reason: String,
}

impl TransferResult {
    pub fn record_success(&mut self) {
        self.attempted += 1;
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self, id: Option<String>, reason: impl Into<String>) {
        self.attempted += 1;
        self.failed += 1;
        self.failures.push(ItemFailure {
            id,
            reason: reason.into(),
        });
    }

    /// Overall success: every attempted document was written.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}
