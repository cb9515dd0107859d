//! Row mapper: validated [`ReviewDocument`](crate::ReviewDocument) →
//! [`AnalyticsRow`].

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::coerce::{self, CoercionError};
use crate::models::{AnalyticsRow, RowMetadata, ValidatedDocument};

/// Map a document (in its JSON form) to an analytics row.
///
/// Missing timestamps are filled with the current time.
pub fn map_document_to_row(doc: &Value) -> Result<AnalyticsRow, CoercionError> {
    map_document_to_row_at(doc, Utc::now())
}

/// Like [`map_document_to_row`], with `now` standing in for absent
/// `created_at`/`processed_at`.
pub fn map_document_to_row_at(
    doc: &Value,
    now: DateTime<Utc>,
) -> Result<AnalyticsRow, CoercionError> {
    let empty = Map::new();
    let analysis = doc
        .get("analysis")
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    let metadata = doc
        .get("metadata")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let text = [doc.get("extracted_text"), doc.get("raw_text")]
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .find(|s| !s.is_empty())
        .unwrap_or_default()
        .to_string();

    Ok(AnalyticsRow {
        review_id: text_field(doc.get("review_id")),
        text,
        sentiment: text_field(analysis.get("sentiment")),
        score: coerce::optional_f64("analysis.score", analysis.get("score"))?,
        themes: coerce::string_list(analysis.get("themes")),
        action_items: coerce::string_list(analysis.get("action_items")),
        intent: text_field(analysis.get("intent")),
        confidence: coerce::optional_f64("analysis.confidence", analysis.get("confidence"))?,
        source: text_field(doc.get("source")),
        model: text_field(doc.get("model")),
        created_at: timestamp(doc.get("created_at"), now),
        processed_at: timestamp(doc.get("processed_at"), now),
        processing_latency_ms: coerce::optional_i64(
            "processing_latency_ms",
            doc.get("processing_latency_ms"),
        )?,
        metadata: RowMetadata {
            app_version: text_field(metadata.get("app_version")),
            region: text_field(metadata.get("region")),
            upload_method: text_field(metadata.get("upload_method")),
        },
    })
}

impl AnalyticsRow {
    /// Row for a document that has already passed validation.
    pub fn from_document(doc: &ValidatedDocument) -> Result<Self, CoercionError> {
        map_document_to_row(&doc.to_value())
    }
}

fn text_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Absent, `null`, and `""` take `now`; anything else is kept as written.
fn timestamp(value: Option<&Value>, now: DateTime<Utc>) -> String {
    match value {
        None | Some(Value::Null) => now.to_rfc3339_opts(SecondsFormat::Micros, true),
        Some(Value::String(s)) if s.is_empty() => now.to_rfc3339_opts(SecondsFormat::Micros, true),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnalysisResult, SourceMetadata, SourceType};
    use crate::normalize::normalize;
    use crate::schema::validate_document;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn non_numeric_score_is_fatal() {
        let err = map_document_to_row(&json!({"analysis": {"score": "not-a-number"}})).unwrap_err();
        assert_eq!(err.field(), "analysis.score");
        assert!(matches!(err, CoercionError::NotANumber { .. }));
    }

    #[test]
    fn single_theme_string_becomes_list() {
        let row = map_document_to_row(&json!({
            "review_id": "r1",
            "analysis": {"themes": "checkout"}
        }))
        .unwrap();
        assert_eq!(row.themes, vec!["checkout"]);
        assert!(row.action_items.is_empty());
    }

    #[test]
    fn missing_numbers_stay_null() {
        let row = map_document_to_row(&json!({"analysis": {}})).unwrap();
        assert_eq!(row.score, None);
        assert_eq!(row.confidence, None);
        assert_eq!(row.processing_latency_ms, None);
        assert_eq!(row.text, "");
        assert_eq!(row.metadata, RowMetadata::default());

        let v = serde_json::to_value(&row).unwrap();
        assert_eq!(v["score"], Value::Null);
    }

    #[test]
    fn text_falls_back_to_raw_text() {
        let row = map_document_to_row(&json!({"extracted_text": "", "raw_text": "raw"})).unwrap();
        assert_eq!(row.text, "raw");
    }

    #[test]
    fn numeric_strings_and_floats_are_cast() {
        let row = map_document_to_row(&json!({
            "analysis": {"score": "-0.4", "confidence": 1},
            "processing_latency_ms": 12.7
        }))
        .unwrap();
        assert_eq!(row.score, Some(-0.4));
        assert_eq!(row.confidence, Some(1.0));
        assert_eq!(row.processing_latency_ms, Some(12));
    }

    #[test]
    fn absent_timestamps_use_the_supplied_clock() {
        let now = Utc.with_ymd_and_hms(2025, 1, 31, 10, 0, 0).unwrap();
        let row = map_document_to_row_at(
            &json!({"created_at": "2024-12-01T00:00:00Z"}),
            now,
        )
        .unwrap();
        assert_eq!(row.created_at, "2024-12-01T00:00:00Z");
        assert_eq!(row.processed_at, "2025-01-31T10:00:00.000000Z");
    }

    #[test]
    fn present_non_string_timestamps_are_not_replaced() {
        let now = Utc.with_ymd_and_hms(2025, 1, 31, 10, 0, 0).unwrap();
        let row = map_document_to_row_at(
            &json!({"created_at": 1738317600, "processed_at": null}),
            now,
        )
        .unwrap();
        assert_eq!(row.created_at, "1738317600");
        assert_eq!(row.processed_at, "2025-01-31T10:00:00.000000Z");

        let row = map_document_to_row_at(&json!({"created_at": ""}), now).unwrap();
        assert_eq!(row.created_at, "2025-01-31T10:00:00.000000Z");
    }

    #[test]
    fn row_agrees_with_its_document() {
        let result: AnalysisResult = serde_json::from_value(json!({
            "extracted_text": "Checkout crashed twice.",
            "analysis": {
                "sentiment": "negative",
                "score": -0.65,
                "themes": ["checkout", "crash"],
                "intent": "complaint",
                "action_items": ["Investigate logs"],
                "confidence": 0.92
            },
            "model": "gemini-1.5-mini",
            "processing_latency_ms": 850
        }))
        .unwrap();
        let mut meta = SourceMetadata::new("web_ui");
        meta.region = Some("IN".into());
        meta.app_version = Some("1.0.0".into());

        let doc = validate_document(normalize(&result, SourceType::MobileAppScreenshot, &meta))
            .unwrap();
        let row = AnalyticsRow::from_document(&doc).unwrap();

        assert_eq!(row.review_id.as_deref(), Some(doc.review_id.as_str()));
        assert_eq!(row.sentiment.as_deref(), doc.sentiment());
        assert_eq!(row.text, doc.extracted_text);
        assert_eq!(row.score, Some(-0.65));
        assert_eq!(row.themes, vec!["checkout", "crash"]);
        assert_eq!(row.source.as_deref(), Some("mobile_app_screenshot"));
        assert_eq!(row.model.as_deref(), Some("gemini-1.5-mini"));
        assert_eq!(row.processing_latency_ms, Some(850));
        assert_eq!(row.metadata.upload_method.as_deref(), Some("web_ui"));
        assert_eq!(row.metadata.region.as_deref(), Some("IN"));
        let created = DateTime::parse_from_rfc3339(&row.created_at).unwrap();
        assert_eq!(created.with_timezone(&Utc), doc.created_at);
    }
}
