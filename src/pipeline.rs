//! Review pipeline orchestration.
//!
//! One input flows through the stages sequentially:
//!
//! ```text
//! input ──▶ client (scrape first for URLs) ──▶ normalize ──▶ validate
//!                                                             │
//!                         rejected ◀── invalid ───────────────┤
//!                                                             ▼ valid
//!                                          map row ──▶ persist to each sink
//! ```
//!
//! The [`Pipeline`] owns the explicitly constructed [`AnalysisClient`] and
//! the [`SinkRegistry`]; callers build it once and reuse it.

use anyhow::{Context, Result};
use consumer_sense_core::normalize::normalize;
use consumer_sense_core::schema::validate_document;
use consumer_sense_core::sink::{Artifact, ArtifactKind, PersistMode, PersistRecord, Sink};
use consumer_sense_core::{AnalysisResult, AnalyticsRow, ReviewDocument, SourceType, ValidatedDocument};
use serde::Serialize;
use std::path::PathBuf;

use crate::client::{create_client, AnalysisClient, ImageInput};
use crate::config::{Config, MetadataConfig, ScrapeConfig};
use crate::scrape;
use crate::sinks::SinkRegistry;

/// Something to analyze.
#[derive(Debug, Clone)]
pub enum AnalysisInput {
    Text(String),
    Images {
        images: Vec<ImageInput>,
        context: Option<String>,
    },
    Url(String),
}

impl AnalysisInput {
    pub fn source_type(&self) -> SourceType {
        match self {
            AnalysisInput::Text(_) => SourceType::ManualText,
            AnalysisInput::Images { .. } => SourceType::MobileAppScreenshot,
            AnalysisInput::Url(_) => SourceType::WebScrape,
        }
    }

    /// Read image files from disk.
    pub fn images_from_paths(paths: &[PathBuf], context: Option<String>) -> Result<Self> {
        let images = paths
            .iter()
            .map(|p| ImageInput::from_path(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(AnalysisInput::Images { images, context })
    }
}

/// Which sinks to write to, and how.
#[derive(Debug, Clone, Default)]
pub struct PersistRequest {
    pub sinks: Vec<String>,
    pub mode: PersistMode,
}

impl PersistRequest {
    pub fn new(sinks: Vec<String>, mode: PersistMode) -> Self {
        Self { sinks, mode }
    }

    pub fn none() -> Self {
        Self::default()
    }
}

/// One sink's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkReport {
    pub sink: String,
    #[serde(flatten)]
    pub record: PersistRecord,
}

/// What happened to one input.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Accepted {
        document: ValidatedDocument,
        row: AnalyticsRow,
        persisted: Vec<SinkReport>,
    },
    Rejected {
        document: Box<ReviewDocument>,
        errors: Vec<String>,
    },
}

impl Outcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Accepted { .. })
    }

    pub fn review_id(&self) -> &str {
        match self {
            Outcome::Accepted { document, .. } => &document.review_id,
            Outcome::Rejected { document, .. } => &document.review_id,
        }
    }
}

pub struct Pipeline {
    client: Box<dyn AnalysisClient>,
    sinks: SinkRegistry,
    scrape: ScrapeConfig,
    metadata: MetadataConfig,
}

impl Pipeline {
    pub fn new(client: Box<dyn AnalysisClient>, sinks: SinkRegistry, config: &Config) -> Self {
        Self {
            client,
            sinks,
            scrape: config.scrape.clone(),
            metadata: config.metadata.clone(),
        }
    }

    /// Client and built-in sinks as configured.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = create_client(&config.model)?;
        Ok(Self::new(client, SinkRegistry::with_builtins(config), config))
    }

    pub fn client(&self) -> &dyn AnalysisClient {
        self.client.as_ref()
    }

    pub fn sinks(&self) -> &SinkRegistry {
        &self.sinks
    }

    /// Send the input to the model. URLs are scraped first.
    pub async fn analyze(&self, input: &AnalysisInput) -> Result<AnalysisResult> {
        match input {
            AnalysisInput::Text(text) => {
                tracing::debug!(chars = text.chars().count(), "analyzing text");
                self.client.analyze_text(text).await
            }
            AnalysisInput::Images { images, context } => {
                tracing::debug!(count = images.len(), "analyzing images");
                self.client.analyze_images(images, context.as_deref()).await
            }
            AnalysisInput::Url(url) => {
                let text = scrape::scrape_url(&self.scrape, url).await?;
                tracing::debug!(url = %url, chars = text.chars().count(), "scraped page");
                self.client.analyze_text(&text).await
            }
        }
    }

    /// Run one input end to end.
    pub async fn run(
        &self,
        input: &AnalysisInput,
        upload_method: &str,
        request: &PersistRequest,
    ) -> Result<Outcome> {
        // Resolve sinks up front so a typo fails before the model is called.
        let sinks = self.sinks.resolve(&request.sinks)?;
        let result = self.analyze(input).await.context("analysis failed")?;
        let meta = self.metadata.source_metadata(upload_method);
        let doc = normalize(&result, input.source_type(), &meta);
        self.finish(doc, &sinks, request.mode).await
    }

    /// Validate an already-normalized document, then map and persist it.
    pub async fn process_document(
        &self,
        doc: ReviewDocument,
        request: &PersistRequest,
    ) -> Result<Outcome> {
        let sinks = self.sinks.resolve(&request.sinks)?;
        self.finish(doc, &sinks, request.mode).await
    }

    async fn finish(
        &self,
        doc: ReviewDocument,
        sinks: &[&dyn Sink],
        mode: PersistMode,
    ) -> Result<Outcome> {
        let validated = match validate_document(doc) {
            Ok(v) => v,
            Err(rejected) => {
                tracing::warn!(
                    review_id = %rejected.document.review_id,
                    errors = rejected.report.errors.len(),
                    "document rejected"
                );
                return Ok(Outcome::Rejected {
                    document: rejected.document,
                    errors: rejected.report.errors,
                });
            }
        };

        let row = AnalyticsRow::from_document(&validated)?;
        let persisted = persist_all(&validated, &row, sinks, mode).await;

        Ok(Outcome::Accepted {
            document: validated,
            row,
            persisted,
        })
    }
}

/// Persist a validated document (or its row) to each sink, in order.
pub async fn persist_all(
    doc: &ValidatedDocument,
    row: &AnalyticsRow,
    sinks: &[&dyn Sink],
    mode: PersistMode,
) -> Vec<SinkReport> {
    let mut reports = Vec::with_capacity(sinks.len());
    for sink in sinks {
        let artifact = if sink.accepts().contains(&ArtifactKind::Document) {
            Artifact::Document(doc)
        } else {
            Artifact::Row(row)
        };
        let record = sink.persist(artifact, mode).await;
        if record.is_error() {
            tracing::warn!(sink = sink.name(), detail = %record.detail, "persist failed");
        }
        reports.push(SinkReport {
            sink: sink.name().to_string(),
            record,
        });
    }
    reports
}

/// Report for a rejected document, as printed by the CLI.
pub fn rejection_lines(errors: &[String]) -> Vec<String> {
    errors.iter().map(|e| format!("- {}", e)).collect()
}

/// Print an outcome the way `csense analyze` and `csense persist` do.
pub fn print_outcome(outcome: &Outcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    match outcome {
        Outcome::Accepted {
            document,
            row,
            persisted,
        } => {
            println!("review {}", document.review_id);
            println!("  source: {}", document.source);
            println!("  model: {}", document.model);
            println!("  sentiment: {}", row.sentiment.as_deref().unwrap_or("-"));
            if let Some(score) = row.score {
                println!("  score: {}", score);
            }
            if !row.themes.is_empty() {
                println!("  themes: {}", row.themes.join(", "));
            }
            for item in &row.action_items {
                println!("  action: {}", item);
            }
            for report in persisted {
                let status = serde_json::to_value(report.record.status)?;
                println!(
                    "  {}: {} {}",
                    report.sink,
                    status.as_str().unwrap_or_default(),
                    report.record.detail
                );
            }
            println!("ok");
        }
        Outcome::Rejected { document, errors } => {
            println!("INVALID: document {} failed schema validation", document.review_id);
            for line in rejection_lines(errors) {
                println!("{}", line);
            }
            println!("raw analysis:");
            println!("{}", serde_json::to_string_pretty(&document.analysis)?);
        }
    }
    Ok(())
}

