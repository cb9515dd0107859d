//! Core data models used throughout Consumer Sense.
//!
//! These types represent the analysis results, canonical review documents,
//! and analytics rows that flow through the normalization pipeline.

use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Where a piece of feedback came from. Fixed when the document is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    MobileAppScreenshot,
    ManualText,
    WebScrape,
}

impl SourceType {
    pub const ALL: [SourceType; 3] = [
        SourceType::MobileAppScreenshot,
        SourceType::ManualText,
        SourceType::WebScrape,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::MobileAppScreenshot => "mobile_app_screenshot",
            SourceType::ManualText => "manual_text",
            SourceType::WebScrape => "web_scrape",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown source type '{0}' (expected mobile_app_screenshot, manual_text, or web_scrape)")]
pub struct UnknownSourceType(pub String);

impl FromStr for SourceType {
    type Err = UnknownSourceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownSourceType(s.to_string()))
    }
}

/// Raw output of the language-model client, before normalization.
///
/// Every field may be absent. `analysis` is the flat insight object; the
/// two upstream shapes are flattened into it by
/// [`UpstreamAnalysis`](crate::upstream::UpstreamAnalysis).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub input_text: Option<String>,
    #[serde(default)]
    pub extracted_text: Option<String>,
    #[serde(default)]
    pub analysis: Option<Map<String, Value>>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "lenient_millis")]
    pub processing_latency_ms: Option<u64>,
}

/// Facts about the upload that the model cannot know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub upload_method: String,
    #[serde(default)]
    pub app_version: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    /// Free-form extra keys copied into the document metadata.
    #[serde(default)]
    pub extra: Map<String, Value>,
}

fn default_language() -> String {
    "en".to_string()
}

impl SourceMetadata {
    pub fn new(upload_method: impl Into<String>) -> Self {
        Self {
            upload_method: upload_method.into(),
            app_version: None,
            region: None,
            language: default_language(),
            extra: Map::new(),
        }
    }

    /// Metadata object stored on the document. `upload_method` always wins
    /// over an `extra` key of the same name.
    pub fn to_metadata_map(&self) -> Map<String, Value> {
        let mut map = self.extra.clone();
        if let Some(v) = &self.app_version {
            map.insert("app_version".to_string(), Value::String(v.clone()));
        }
        if let Some(r) = &self.region {
            map.insert("region".to_string(), Value::String(r.clone()));
        }
        map.insert(
            "upload_method".to_string(),
            Value::String(self.upload_method.clone()),
        );
        map
    }
}

impl Default for SourceMetadata {
    fn default() -> Self {
        Self::new("local_ui")
    }
}

/// Canonical unit of record.
///
/// Optional fields serialize as `null`, never absent. Top-level keys outside
/// the known fields are kept in `extra` and written back out unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewDocument {
    pub review_id: String,
    pub source: SourceType,
    pub user_id_hash: Option<String>,
    pub raw_text: String,
    pub extracted_text: String,
    pub analysis: Map<String, Value>,
    pub image_gcs_path: Option<String>,
    pub language: String,
    pub model: String,
    #[serde(default, deserialize_with = "lenient_millis")]
    pub processing_latency_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
    pub metadata: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Millisecond counts arrive as `850` or `850.0`; both mean the same.
fn lenient_millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let Some(value) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    match &value {
        Value::Null => Ok(None),
        Value::Number(n) => {
            if let Some(ms) = n.as_u64() {
                return Ok(Some(ms));
            }
            match n.as_f64() {
                Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => {
                    Ok(Some(f as u64))
                }
                _ => Err(de::Error::custom(format!(
                    "processing_latency_ms: {} is not a non-negative integer",
                    n
                ))),
            }
        }
        other => Err(de::Error::custom(format!(
            "processing_latency_ms: {} is not a number",
            other
        ))),
    }
}

impl ReviewDocument {
    /// JSON form of the document, as seen by the validator and row mapper.
    pub fn to_value(&self) -> Value {
        // Every key is a string, so serialization cannot fail.
        serde_json::to_value(self).unwrap_or_default()
    }

    pub fn sentiment(&self) -> Option<&str> {
        self.analysis.get("sentiment").and_then(Value::as_str)
    }
}

/// A [`ReviewDocument`] that passed schema validation.
///
/// Only [`schema::validate_document`](crate::schema::validate_document) and
/// [`schema::validate_json`](crate::schema::validate_json) construct one, and
/// it hands out shared references only, so a validated document cannot be
/// altered afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidatedDocument(ReviewDocument);

impl ValidatedDocument {
    pub(crate) fn new(doc: ReviewDocument) -> Self {
        Self(doc)
    }

    pub fn document(&self) -> &ReviewDocument {
        &self.0
    }

    pub fn into_inner(self) -> ReviewDocument {
        self.0
    }
}

impl Deref for ValidatedDocument {
    type Target = ReviewDocument;

    fn deref(&self) -> &ReviewDocument {
        &self.0
    }
}

/// Metadata subset kept on an [`AnalyticsRow`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowMetadata {
    pub app_version: Option<String>,
    pub region: Option<String>,
    pub upload_method: Option<String>,
}

/// Flat, one-row-per-document projection for columnar storage.
///
/// Missing numeric fields are `None` (serialized `null`), never zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsRow {
    pub review_id: Option<String>,
    pub text: String,
    pub sentiment: Option<String>,
    pub score: Option<f64>,
    pub themes: Vec<String>,
    pub action_items: Vec<String>,
    pub intent: Option<String>,
    pub confidence: Option<f64>,
    pub source: Option<String>,
    pub model: Option<String>,
    pub created_at: String,
    pub processed_at: String,
    pub processing_latency_ms: Option<i64>,
    pub metadata: RowMetadata,
}
