//! File-based commands that never call the model: `normalize`, `validate`,
//! `map`, `persist`, and `schema`.
//!
//! They let results and documents produced elsewhere be re-checked and
//! re-persisted offline.

use anyhow::{Context, Result};
use consumer_sense_core::normalize::normalize;
use consumer_sense_core::row::map_document_to_row;
use consumer_sense_core::schema::{schema_document, validate_json, validate_review_doc, ValidationError};
use consumer_sense_core::sink::PersistMode;
use consumer_sense_core::{AnalysisResult, AnalyticsRow, SourceType};
use serde_json::Value;
use std::path::Path;

use crate::config::Config;
use crate::pipeline::{persist_all, print_outcome, rejection_lines, Outcome};
use crate::sinks::SinkRegistry;

fn read_json(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse JSON in {}", path.display()))
}

/// `csense normalize <result.json> --source <type>`
pub fn run_normalize(config: &Config, path: &Path, source: SourceType) -> Result<()> {
    let value = read_json(path)?;
    let result: AnalysisResult = serde_json::from_value(value)
        .with_context(|| format!("{} is not an analysis result", path.display()))?;
    let meta = config.metadata.source_metadata("cli");
    let doc = normalize(&result, source, &meta);
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

/// `csense validate <doc.json>`. Returns whether the document is valid.
pub fn run_validate(path: &Path) -> Result<bool> {
    let value = read_json(path)?;
    let report = validate_review_doc(&value);
    if report.is_valid {
        println!("OK: document is valid.");
    } else {
        println!("INVALID: {} error(s)", report.errors.len());
        for line in rejection_lines(&report.errors) {
            println!("{}", line);
        }
    }
    Ok(report.is_valid)
}

/// `csense map <doc.json>`. Coercion failures propagate as errors.
pub fn run_map(path: &Path) -> Result<()> {
    let value = read_json(path)?;
    let row: AnalyticsRow = map_document_to_row(&value)?;
    println!("{}", serde_json::to_string_pretty(&row)?);
    Ok(())
}

/// `csense persist <doc.json> --sink <name>`. Returns whether the document
/// was accepted.
pub async fn run_persist(
    config: &Config,
    path: &Path,
    sinks: &[String],
    mode: PersistMode,
    json: bool,
) -> Result<bool> {
    let registry = SinkRegistry::with_builtins(config);
    let resolved = registry.resolve(sinks)?;
    let value = read_json(path)?;

    let document = match validate_json(&value) {
        Ok(doc) => doc,
        Err(ValidationError::Invalid(report)) => {
            println!("INVALID: {} error(s)", report.errors.len());
            for line in rejection_lines(&report.errors) {
                println!("{}", line);
            }
            return Ok(false);
        }
        Err(e @ ValidationError::Decode(_)) => return Err(e.into()),
    };

    let row = AnalyticsRow::from_document(&document)?;
    let persisted = persist_all(&document, &row, &resolved, mode).await;
    let outcome = Outcome::Accepted {
        document,
        row,
        persisted,
    };
    print_outcome(&outcome, json)?;
    Ok(true)
}

/// `csense schema`
pub fn run_schema() -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&schema_document())?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn validate_reports_missing_field() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("doc.json");
        std::fs::write(&path, json!({"review_id": "x"}).to_string()).unwrap();
        assert!(!run_validate(&path).unwrap());
    }

    #[test]
    fn map_fails_on_bad_score() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("doc.json");
        std::fs::write(&path, json!({"analysis": {"score": "not-a-number"}}).to_string()).unwrap();
        let err = run_map(&path).unwrap_err();
        assert!(err.to_string().contains("analysis.score"));
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(run_validate(&tmp.path().join("missing.json")).is_err());
    }
}
