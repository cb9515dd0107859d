//! Analytics warehouse sink (BigQuery).
//!
//! Local mode writes `bqrow-<hex>.json` under `<mock_dir>/warehouse/`.
//! Remote mode streams the row through `tabledata.insertAll`; per-row
//! insert errors come back as an error record carrying BigQuery's report.

use async_trait::async_trait;
use consumer_sense_core::sink::{self, Artifact, ArtifactKind, PersistMode, PersistRecord, Sink};
use consumer_sense_core::AnalyticsRow;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use crate::config::WarehouseConfig;
use crate::sinks::{short_id, write_pretty_json};

pub struct WarehouseSink {
    config: WarehouseConfig,
    mock_dir: PathBuf,
    token: Option<String>,
}

impl WarehouseSink {
    /// Build the sink, reading the bearer token from `config.token_env`.
    pub fn from_config(config: &WarehouseConfig, mock_dir: &Path) -> Self {
        let token = std::env::var(&config.token_env).ok();
        Self::with_token(config, mock_dir, token)
    }

    pub fn with_token(config: &WarehouseConfig, mock_dir: &Path, token: Option<String>) -> Self {
        Self {
            config: config.clone(),
            mock_dir: mock_dir.join("warehouse"),
            token: token.filter(|t| !t.is_empty()),
        }
    }

    fn save_local(&self, row: &AnalyticsRow) -> PersistRecord {
        let file_name = format!("bqrow-{}.json", short_id());
        match write_pretty_json(&self.mock_dir, &file_name, row) {
            Ok(path) => {
                tracing::info!(path = %path.display(), "warehouse mock saved");
                PersistRecord::mock_saved(path.display().to_string())
            }
            Err(e) => PersistRecord::error(format!("{:#}", e)),
        }
    }

    async fn insert_remote(&self, row: &AnalyticsRow) -> PersistRecord {
        let Some((project, dataset, table)) = self.config.table_parts() else {
            return PersistRecord::error(
                "warehouse.table is not configured (expected project.dataset.table)",
            );
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

        let url = format!(
            "{}/bigquery/v2/projects/{}/datasets/{}/tables/{}/insertAll",
            self.config.base_url.trim_end_matches('/'),
            project,
            dataset,
            table
        );
        let body = insert_all_body(row);
        tracing::debug!(%url, "streaming row to bigquery");

        let response = match client.post(&url).bearer_auth(token).json(&body).send().await {
            Ok(r) => r,
            Err(e) => return PersistRecord::error(format!("BigQuery request failed: {}", e)),
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(%status, "bigquery rejected insert");
            return PersistRecord::error(format!("BigQuery API error {}: {}", status, text));
        }

        let reply: Value = match response.json().await {
            Ok(v) => v,
            Err(e) => return PersistRecord::error(format!("Invalid BigQuery response: {}", e)),
        };

        match reply.get("insertErrors").and_then(Value::as_array) {
            Some(errors) if !errors.is_empty() => {
                tracing::warn!(count = errors.len(), "bigquery reported insert errors");
                PersistRecord::error(format!(
                    "insert errors: {}",
                    Value::Array(errors.clone())
                ))
            }
            _ => {
                let target = format!("{}.{}.{}", project, dataset, table);
                tracing::info!(table = %target, "warehouse row inserted");
                PersistRecord::ok(format!("inserted 1 row into {}", target))
            }
        }
    }
}

/// Request body for `tabledata.insertAll` carrying one row.
pub fn insert_all_body(row: &AnalyticsRow) -> Value {
    json!({
        "kind": "bigquery#tableDataInsertAllRequest",
        "skipInvalidRows": false,
        "ignoreUnknownValues": false,
        "rows": [{
            "insertId": Uuid::new_v4().to_string(),
            "json": row,
        }]
    })
}

#[async_trait]
impl Sink for WarehouseSink {
    fn name(&self) -> &str {
        "warehouse"
    }

    fn description(&self) -> &str {
        "BigQuery table of analytics rows"
    }

    fn accepts(&self) -> &[ArtifactKind] {
        &[ArtifactKind::Row]
    }

    async fn persist(&self, artifact: Artifact<'_>, mode: PersistMode) -> PersistRecord {
        let Artifact::Row(row) = artifact else {
            return sink::unsupported(self, artifact.kind());
        };
        match mode {
            PersistMode::Local => self.save_local(row),
            PersistMode::Remote => self.insert_remote(row).await,
        }
    }

    fn remote_target(&self) -> Option<String> {
        self.token.as_ref()?;
        self.config.table.clone().map(|t| format!("bigquery:{}", t))
    }
}
