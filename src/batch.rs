//! Batch mode: run the pipeline over every matching file in a directory.
//!
//! Files are discovered with `walkdir`, filtered by the `[batch]` include
//! and exclude globs (matched against the path relative to the root), and
//! processed one after another in path order. Images are recognized by
//! their bytes; everything else is read as UTF-8 text.
//!
//! A file that fails (unreadable, model error) is counted and logged; the
//! batch keeps going.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::client::ImageInput;
use crate::config::BatchConfig;
use crate::pipeline::{AnalysisInput, Outcome, Pipeline, PersistRequest};
use crate::progress::{BatchProgressEvent, BatchProgressReporter};

/// Counts printed at the end of `csense batch`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub files: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Matching files under `root`, sorted by relative path.
pub fn discover_files(root: &Path, config: &BatchConfig) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("Batch root is not a directory: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut excludes = vec!["**/.git/**".to_string(), "**/target/**".to_string()];
    excludes.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(config.follow_symlinks) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy();

        if exclude_set.is_match(rel_str.as_ref()) || !include_set.is_match(rel_str.as_ref()) {
            continue;
        }
        files.push(path.to_path_buf());
    }

    files.sort();
    Ok(files)
}

/// Turn one file into a pipeline input. `None` means nothing to analyze.
pub fn input_for_file(path: &Path) -> Result<Option<AnalysisInput>> {
    let bytes = std::fs::read(path)?;
    if infer::is_image(&bytes) {
        let image = ImageInput::from_bytes(bytes)?;
        return Ok(Some(AnalysisInput::Images {
            images: vec![image],
            context: None,
        }));
    }

    let text = String::from_utf8(bytes)
        .map_err(|_| anyhow::anyhow!("not UTF-8 text and not a recognized image"))?;
    if text.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(AnalysisInput::Text(text)))
}

/// Run every discovered file through `pipeline`.
pub async fn run_batch(
    pipeline: &Pipeline,
    root: &Path,
    config: &BatchConfig,
    request: &PersistRequest,
    progress: &dyn BatchProgressReporter,
) -> Result<BatchSummary> {
    // Fail on unknown sink names before touching any file.
    pipeline.sinks().resolve(&request.sinks)?;

    progress.report(BatchProgressEvent::Discovering {
        root: root.display().to_string(),
    });
    let files = discover_files(root, config)?;
    let total = files.len() as u64;

    let mut summary = BatchSummary {
        files: files.len(),
        ..Default::default()
    };

    for (i, path) in files.iter().enumerate() {
        let rel = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string();
        progress.report(BatchProgressEvent::Processing {
            n: i as u64 + 1,
            total,
            file: rel.clone(),
        });

        let input = match input_for_file(path) {
            Ok(Some(input)) => input,
            Ok(None) => {
                tracing::warn!(file = %rel, "skipping empty file");
                summary.skipped += 1;
                continue;
            }
            Err(e) => {
                tracing::warn!(file = %rel, error = %e, "skipping unreadable file");
                summary.failed += 1;
                continue;
            }
        };

        match pipeline.run(&input, "batch", request).await {
            Ok(Outcome::Accepted { document, .. }) => {
                tracing::info!(file = %rel, review_id = %document.review_id, "accepted");
                summary.accepted += 1;
            }
            Ok(Outcome::Rejected { errors, .. }) => {
                tracing::warn!(file = %rel, errors = ?errors, "rejected");
                summary.rejected += 1;
            }
            Err(e) => {
                tracing::warn!(file = %rel, error = %format!("{:#}", e), "failed");
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

pub fn print_summary(root: &Path, summary: &BatchSummary) {
    println!("batch {}", root.display());
    println!("  files: {}", summary.files);
    println!("  accepted: {}", summary.accepted);
    println!("  rejected: {}", summary.rejected);
    println!("  skipped: {}", summary.skipped);
    println!("  failed: {}", summary.failed);
    println!("ok");
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn discovers_matching_files_in_order() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("b")).unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(root.join("b/two.txt"), "second").unwrap();
        std::fs::write(root.join("a.txt"), "first").unwrap();
        std::fs::write(root.join("notes.csv"), "x,y").unwrap();
        std::fs::write(root.join(".git/HEAD.txt"), "ref").unwrap();
        std::fs::write(root.join("draft.md"), "draft").unwrap();

        let config = BatchConfig {
            exclude_globs: vec!["draft.md".to_string()],
            ..Default::default()
        };
        let files = discover_files(root, &config).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["a.txt", "b/two.txt"]);
    }

    #[test]
    fn classifies_images_text_and_empty() {
        let tmp = TempDir::new().unwrap();
        let png = [
            0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48,
            0x44, 0x52,
        ];
        std::fs::write(tmp.path().join("shot.png"), png).unwrap();
        std::fs::write(tmp.path().join("r.txt"), "Great app").unwrap();
        std::fs::write(tmp.path().join("empty.txt"), "  \n").unwrap();

        assert!(matches!(
            input_for_file(&tmp.path().join("shot.png")).unwrap(),
            Some(AnalysisInput::Images { .. })
        ));
        assert!(matches!(
            input_for_file(&tmp.path().join("r.txt")).unwrap(),
            Some(AnalysisInput::Text(t)) if t == "Great app"
        ));
        assert!(input_for_file(&tmp.path().join("empty.txt")).unwrap().is_none());
    }

    #[test]
    fn missing_root_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(discover_files(&tmp.path().join("nope"), &BatchConfig::default()).is_err());
    }
}
