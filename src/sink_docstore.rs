//! Document store sink (Firestore).
//!
//! Local mode writes `fsdoc-<hex>.json` under `<mock_dir>/document_store/`.
//! Remote mode calls the Firestore REST `createDocument` endpoint with no
//! document id, so Firestore assigns one and every call creates a new
//! document.
//!
//! Firestore wants typed values (`{"stringValue": ..}`, `{"mapValue": ..}`),
//! so the document's JSON is encoded by [`to_firestore_fields`] first.

use async_trait::async_trait;
use consumer_sense_core::sink::{
    self, Artifact, ArtifactKind, PersistMode, PersistRecord, Sink,
};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::DocumentStoreConfig;
use crate::sinks::{short_id, write_pretty_json};

/// Top-level keys stored as Firestore timestamps instead of strings.
const TIMESTAMP_FIELDS: [&str; 2] = ["created_at", "processed_at"];

pub struct DocumentStoreSink {
    config: DocumentStoreConfig,
    mock_dir: PathBuf,
    token: Option<String>,
}

impl DocumentStoreSink {
    /// Build the sink, reading the bearer token from `config.token_env`.
    pub fn from_config(config: &DocumentStoreConfig, mock_dir: &Path) -> Self {
        let token = std::env::var(&config.token_env).ok();
        Self::with_token(config, mock_dir, token)
    }

    pub fn with_token(config: &DocumentStoreConfig, mock_dir: &Path, token: Option<String>) -> Self {
        Self {
            config: config.clone(),
            mock_dir: mock_dir.join("document_store"),
            token: token.filter(|t| !t.is_empty()),
        }
    }

    fn collection_url(&self, project: &str) -> String {
        format!(
            "{}/v1/projects/{}/databases/{}/documents/{}",
            self.config.base_url.trim_end_matches('/'),
            project,
            self.config.database,
            self.config.collection
        )
    }

    fn save_local(&self, doc: &Value) -> PersistRecord {
        let file_name = format!("fsdoc-{}.json", short_id());
        match write_pretty_json(&self.mock_dir, &file_name, doc) {
            Ok(path) => {
                tracing::info!(path = %path.display(), "document_store mock saved");
                PersistRecord::mock_saved(path.display().to_string())
            }
            Err(e) => PersistRecord::error(format!("{:#}", e)),
        }
    }

    async fn save_remote(&self, doc: &Value) -> PersistRecord {
        let Some(project) = self.config.project.as_deref() else {
            return PersistRecord::error("document_store.project is not configured");
        };
        let Some(token) = self.token.as_deref() else {
            return PersistRecord::error(format!(
                "{} environment variable not set",
                self.config.token_env
            ));
        };

        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()
        {
            Ok(c) => c,
            Err(e) => return PersistRecord::error(e.to_string()),
        };

        let url = self.collection_url(project);
        let body = json!({ "fields": to_firestore_fields(doc) });
        tracing::debug!(%url, "creating firestore document");

        let response = match client.post(&url).bearer_auth(token).json(&body).send().await {
            Ok(r) => r,
            Err(e) => return PersistRecord::error(format!("Firestore request failed: {}", e)),
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(%status, "firestore rejected document");
            return PersistRecord::error(format!("Firestore API error {}: {}", status, text));
        }

        match response.json::<Value>().await {
            Ok(created) => {
                let name = created
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                tracing::info!(document = %name, "document_store saved");
                PersistRecord::ok(name)
            }
            Err(e) => PersistRecord::error(format!("Invalid Firestore response: {}", e)),
        }
    }
}

#[async_trait]
impl Sink for DocumentStoreSink {
    fn name(&self) -> &str {
        "document_store"
    }

    fn description(&self) -> &str {
        "Firestore collection of review documents"
    }

    fn accepts(&self) -> &[ArtifactKind] {
        &[ArtifactKind::Document]
    }

    async fn persist(&self, artifact: Artifact<'_>, mode: PersistMode) -> PersistRecord {
        let Artifact::Document(doc) = artifact else {
            return sink::unsupported(self, artifact.kind());
        };
        let value = doc.to_value();
        match mode {
            PersistMode::Local => self.save_local(&value),
            PersistMode::Remote => self.save_remote(&value).await,
        }
    }

    fn remote_target(&self) -> Option<String> {
        let project = self.config.project.as_deref()?;
        self.token.as_ref()?;
        Some(format!(
            "firestore:{}/{}/{}",
            project, self.config.database, self.config.collection
        ))
    }
}

/// Encode a JSON object as a Firestore `fields` map.
pub fn to_firestore_fields(doc: &Value) -> Map<String, Value> {
    let Some(obj) = doc.as_object() else {
        return Map::new();
    };
    obj.iter()
        .map(|(k, v)| {
            let encoded = match v {
                Value::String(s) if TIMESTAMP_FIELDS.contains(&k.as_str()) => {
                    json!({ "timestampValue": s })
                }
                other => to_firestore_value(other),
            };
            (k.clone(), encoded)
        })
        .collect()
}

/// Encode one JSON value as a Firestore typed value.
pub fn to_firestore_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(to_firestore_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => {
            let fields: Map<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), to_firestore_value(v)))
                .collect();
            json!({ "mapValue": { "fields": fields } })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consumer_sense_core::normalize::normalize;
    use consumer_sense_core::schema::validate_document;
    use consumer_sense_core::sink::PersistStatus;
    use consumer_sense_core::{AnalysisResult, AnalyticsRow, SourceMetadata, SourceType};
    use tempfile::TempDir;

    fn validated() -> consumer_sense_core::ValidatedDocument {
        validate_document(normalize(
            &AnalysisResult::default(),
            SourceType::ManualText,
            &SourceMetadata::default(),
        ))
        .unwrap()
    }

    #[test]
    fn encodes_typed_values() {
        let fields = to_firestore_fields(&json!({
            "review_id": "r1",
            "processing_latency_ms": 850,
            "analysis": {"score": -0.6, "themes": ["checkout"], "intent": null},
            "created_at": "2025-01-31T10:00:00Z"
        }));
        assert_eq!(fields["review_id"], json!({"stringValue": "r1"}));
        assert_eq!(fields["processing_latency_ms"], json!({"integerValue": "850"}));
        assert_eq!(fields["created_at"], json!({"timestampValue": "2025-01-31T10:00:00Z"}));
        let analysis = &fields["analysis"]["mapValue"]["fields"];
        assert_eq!(analysis["score"], json!({"doubleValue": -0.6}));
        assert_eq!(analysis["intent"], json!({"nullValue": null}));
        assert_eq!(
            analysis["themes"],
            json!({"arrayValue": {"values": [{"stringValue": "checkout"}]}})
        );
    }

    #[tokio::test]
    async fn local_mode_writes_mock_file() {
        let tmp = TempDir::new().unwrap();
        let sink = DocumentStoreSink::with_token(&DocumentStoreConfig::default(), tmp.path(), None);
        let rec = sink.persist(Artifact::Document(&validated()), PersistMode::Local).await;

        assert_eq!(rec.status, PersistStatus::MockSaved);
        let path = PathBuf::from(&rec.detail);
        assert!(path.starts_with(tmp.path().join("document_store")));
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("fsdoc-"));
    }

    #[tokio::test]
    async fn remote_mode_without_token_is_error_record() {
        let tmp = TempDir::new().unwrap();
        let config = DocumentStoreConfig {
            project: Some("demo".into()),
            ..Default::default()
        };
        let sink = DocumentStoreSink::with_token(&config, tmp.path(), None);
        let rec = sink.persist(Artifact::Document(&validated()), PersistMode::Remote).await;
        assert_eq!(rec.status, PersistStatus::Error);
        assert!(rec.detail.contains("GOOGLE_OAUTH_ACCESS_TOKEN"));
        assert!(sink.remote_target().is_none());
    }

    #[tokio::test]
    async fn rows_are_refused() {
        let tmp = TempDir::new().unwrap();
        let sink = DocumentStoreSink::with_token(&DocumentStoreConfig::default(), tmp.path(), None);
        let row = AnalyticsRow::from_document(&validated()).unwrap();
        let rec = sink.persist(Artifact::Row(&row), PersistMode::Local).await;
        assert!(rec.is_error());
        assert!(rec.detail.contains("does not accept rows"));
    }
}
