//! Document normalizer: [`AnalysisResult`] → [`ReviewDocument`].
//!
//! Normalization never fails. Whatever the model returned, the output has
//! every field set; absent data becomes `null`, an empty string, or an empty
//! sequence. Semantic checks (ranges, enums) are left to the validator.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::coerce;
use crate::models::{AnalysisResult, ReviewDocument, SourceMetadata, SourceType};

/// Model name recorded when the result does not carry one.
pub const UNKNOWN_MODEL: &str = "unknown";

/// Keys always present on a normalized `analysis` object.
pub const CANONICAL_ANALYSIS_KEYS: [&str; 6] = [
    "sentiment",
    "score",
    "themes",
    "intent",
    "action_items",
    "confidence",
];

/// Normalize a result into a fresh document stamped with the current time.
pub fn normalize(
    result: &AnalysisResult,
    source: SourceType,
    meta: &SourceMetadata,
) -> ReviewDocument {
    normalize_at(result, source, meta, Utc::now())
}

/// Like [`normalize`], with an explicit timestamp for both `created_at`
/// and `processed_at`.
pub fn normalize_at(
    result: &AnalysisResult,
    source: SourceType,
    meta: &SourceMetadata,
    now: DateTime<Utc>,
) -> ReviewDocument {
    let extracted_text = result.extracted_text.clone().unwrap_or_default();
    let model = result
        .model
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(UNKNOWN_MODEL)
        .to_string();

    ReviewDocument {
        review_id: Uuid::new_v4().to_string(),
        source,
        user_id_hash: None,
        raw_text: extracted_text.clone(),
        extracted_text,
        analysis: canonical_analysis(result.analysis.as_ref()),
        image_gcs_path: None,
        language: meta.language.clone(),
        model,
        processing_latency_ms: result.processing_latency_ms,
        created_at: now,
        processed_at: now,
        metadata: meta.to_metadata_map(),
        extra: Map::new(),
    }
}

/// Bring an analysis object into canonical form.
///
/// Unknown keys are kept as they are. `sentiment` is trimmed and
/// lower-cased, `themes`/`action_items` become string sequences, and the
/// remaining canonical keys default to `null`.
pub fn canonical_analysis(analysis: Option<&Map<String, Value>>) -> Map<String, Value> {
    let mut out = analysis.cloned().unwrap_or_default();

    let sentiment = match out.remove("sentiment") {
        Some(Value::String(s)) => {
            let s = s.trim().to_lowercase();
            if s.is_empty() {
                Value::Null
            } else {
                Value::String(s)
            }
        }
        Some(other) => other,
        None => Value::Null,
    };
    out.insert("sentiment".to_string(), sentiment);

    for key in ["themes", "action_items"] {
        let list = coerce::string_list(out.get(key));
        out.insert(key.to_string(), Value::from(list));
    }

    for key in ["score", "intent", "confidence"] {
        out.entry(key).or_insert(Value::Null);
    }

    out
}
