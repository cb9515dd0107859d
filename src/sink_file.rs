//! Local file sink.
//!
//! Writes each artifact to `<output_dir>/<review_id>-<hex>.json`. Local and
//! remote mode behave the same. Only `[A-Za-z0-9_-]` from the review id
//! reaches the file name, so every artifact lands directly in the output
//! directory.

use async_trait::async_trait;
use consumer_sense_core::sink::{Artifact, ArtifactKind, PersistMode, PersistRecord, Sink};
use std::path::PathBuf;

use crate::sinks::{short_id, write_pretty_json};

pub struct FileSink {
    output_dir: PathBuf,
}

impl FileSink {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }
}

#[async_trait]
impl Sink for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    fn description(&self) -> &str {
        "Pretty-printed JSON files in the output directory"
    }

    fn accepts(&self) -> &[ArtifactKind] {
        &[ArtifactKind::Document, ArtifactKind::Row]
    }

    async fn persist(&self, artifact: Artifact<'_>, _mode: PersistMode) -> PersistRecord {
        let stem = file_stem(artifact.review_id());
        let file_name = format!("{}-{}.json", stem, short_id());

        match write_pretty_json(&self.output_dir, &file_name, &artifact.to_value()) {
            Ok(path) => {
                tracing::info!(path = %path.display(), kind = %artifact.kind(), "artifact written");
                PersistRecord::ok(path.display().to_string())
            }
            Err(e) => PersistRecord::error(format!("{:#}", e)),
        }
    }

    fn remote_target(&self) -> Option<String> {
        Some(self.output_dir.display().to_string())
    }
}

fn file_stem(review_id: Option<&str>) -> String {
    let stem: String = review_id
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if stem.is_empty() {
        "review".to_string()
    } else {
        stem
    }
}
