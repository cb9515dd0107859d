//! Sink abstraction.
//!
//! A sink persists one artifact, either a validated review document or an
//! analytics row, and reports what happened as a [`PersistRecord`]. Sinks
//! never raise: a missing token, an HTTP failure, or rejected insert shows
//! up as `status: error` with the reason in `detail`.
//!
//! Only [`ValidatedDocument`]s (and rows mapped from them) can be turned
//! into an [`Artifact`], so a rejected document cannot reach a sink.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use consumer_sense_core::sink::{Artifact, ArtifactKind, PersistMode, PersistRecord, Sink};
//!
//! struct NullSink;
//!
//! #[async_trait]
//! impl Sink for NullSink {
//!     fn name(&self) -> &str { "null" }
//!     fn description(&self) -> &str { "Discards everything" }
//!     fn accepts(&self) -> &[ArtifactKind] { &[ArtifactKind::Document, ArtifactKind::Row] }
//!
//!     async fn persist(&self, _artifact: Artifact<'_>, _mode: PersistMode) -> PersistRecord {
//!         PersistRecord::ok("discarded")
//!     }
//! }
//! ```

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{AnalyticsRow, ValidatedDocument};

/// Whether a sink performs the real write or a local stand-in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistMode {
    #[default]
    Local,
    Remote,
}

impl PersistMode {
    pub fn from_remote_flag(remote: bool) -> Self {
        if remote {
            PersistMode::Remote
        } else {
            PersistMode::Local
        }
    }
}

impl fmt::Display for PersistMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistMode::Local => f.write_str("local"),
            PersistMode::Remote => f.write_str("remote"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistStatus {
    Ok,
    MockSaved,
    Error,
}

/// Result of one `persist` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistRecord {
    pub status: PersistStatus,
    /// Where the artifact went (path, document name), or why it did not.
    pub detail: String,
}

impl PersistRecord {
    pub fn ok(detail: impl Into<String>) -> Self {
        Self {
            status: PersistStatus::Ok,
            detail: detail.into(),
        }
    }

    pub fn mock_saved(detail: impl Into<String>) -> Self {
        Self {
            status: PersistStatus::MockSaved,
            detail: detail.into(),
        }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            status: PersistStatus::Error,
            detail: detail.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == PersistStatus::Error
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Document,
    Row,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Document => f.write_str("document"),
            ArtifactKind::Row => f.write_str("row"),
        }
    }
}

/// Something a sink can persist.
#[derive(Debug, Clone, Copy)]
pub enum Artifact<'a> {
    Document(&'a ValidatedDocument),
    Row(&'a AnalyticsRow),
}

impl Artifact<'_> {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Artifact::Document(_) => ArtifactKind::Document,
            Artifact::Row(_) => ArtifactKind::Row,
        }
    }

    /// Review id of the underlying document, when known.
    pub fn review_id(&self) -> Option<&str> {
        match self {
            Artifact::Document(doc) => Some(doc.review_id.as_str()),
            Artifact::Row(row) => row.review_id.as_deref(),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Artifact::Document(doc) => doc.to_value(),
            Artifact::Row(row) => serde_json::to_value(row).unwrap_or_default(),
        }
    }
}

/// A persistence backend behind a uniform `persist` call.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Registry name (`file`, `document_store`, `warehouse`, ...).
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Artifact kinds this sink stores.
    fn accepts(&self) -> &[ArtifactKind];

    /// Persist one artifact. Each call creates a new artifact identity, so
    /// retrying a successful call stores a duplicate.
    async fn persist(&self, artifact: Artifact<'_>, mode: PersistMode) -> PersistRecord;

    /// Human-readable remote target, or `None` when remote mode is not
    /// configured.
    fn remote_target(&self) -> Option<String> {
        None
    }
}

/// Refusal record for an artifact the sink does not take.
pub fn unsupported(sink: &dyn Sink, kind: ArtifactKind) -> PersistRecord {
    PersistRecord::error(format!("sink '{}' does not accept {}s", sink.name(), kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_snake_case() {
        let rec = PersistRecord::mock_saved("/tmp/x.json");
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["status"], "mock_saved");
        assert_eq!(v["detail"], "/tmp/x.json");
        assert!(!rec.is_error());
        assert!(PersistRecord::error("boom").is_error());
    }

    #[test]
    fn mode_from_flag() {
        assert_eq!(PersistMode::from_remote_flag(true), PersistMode::Remote);
        assert_eq!(PersistMode::from_remote_flag(false), PersistMode::Local);
        assert_eq!(PersistMode::default().to_string(), "local");
    }
}
