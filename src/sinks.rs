//! Sink registry and shared artifact writing.
//!
//! Built-in sinks:
//!
//! | Name | Accepts | Local mode | Remote mode |
//! |------|---------|------------|-------------|
//! | `file` | document, row | `<output_dir>/<review_id>-<hex>.json` | same as local |
//! | `document_store` | document | `<mock_dir>/document_store/fsdoc-<hex>.json` | Firestore `createDocument` |
//! | `warehouse` | row | `<mock_dir>/warehouse/bqrow-<hex>.json` | BigQuery `insertAll` |
//!
//! Custom sinks implement [`Sink`] and are added with
//! [`SinkRegistry::register`].

use anyhow::{Context, Result};
use consumer_sense_core::sink::Sink;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::config::Config;
use crate::sink_docstore::DocumentStoreSink;
use crate::sink_file::FileSink;
use crate::sink_warehouse::WarehouseSink;

/// A requested sink name that is not registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown sink: '{name}'. Available: {}", available.join(", "))]
pub struct UnknownSink {
    pub name: String,
    pub available: Vec<String>,
}

/// Named collection of sinks.
pub struct SinkRegistry {
    sinks: Vec<Box<dyn Sink>>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    /// The three built-in sinks, configured from `config`. Remote tokens
    /// are read from the environment here, once.
    pub fn with_builtins(config: &Config) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(FileSink::new(config.storage.output_dir.clone())));
        registry.register(Box::new(DocumentStoreSink::from_config(
            &config.document_store,
            &config.storage.mock_dir,
        )));
        registry.register(Box::new(WarehouseSink::from_config(
            &config.warehouse,
            &config.storage.mock_dir,
        )));
        registry
    }

    /// Add a sink. A later sink with the same name shadows an earlier one.
    pub fn register(&mut self, sink: Box<dyn Sink>) {
        self.sinks.push(sink);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Sink> {
        self.sinks
            .iter()
            .rev()
            .find(|s| s.name() == name)
            .map(|s| s.as_ref())
    }

    pub fn sinks(&self) -> &[Box<dyn Sink>] {
        &self.sinks
    }

    pub fn names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    /// Resolve every name, failing on the first unknown one.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<&dyn Sink>, UnknownSink> {
        names
            .iter()
            .map(|name| {
                self.get(name).ok_or_else(|| UnknownSink {
                    name: name.clone(),
                    available: self.names().into_iter().map(str::to_string).collect(),
                })
            })
            .collect()
    }
}

impl Default for SinkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Print the sink table for `csense sinks`.
pub fn list_sinks(config: &Config) -> Result<()> {
    let registry = SinkRegistry::with_builtins(config);

    println!("{:<16} {:<16} {}", "SINK", "ACCEPTS", "REMOTE TARGET");
    for sink in registry.sinks() {
        let accepts = sink
            .accepts()
            .iter()
            .map(|k| k.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let target = sink
            .remote_target()
            .unwrap_or_else(|| "NOT CONFIGURED".to_string());
        println!("{:<16} {:<16} {}", sink.name(), accepts, target);
    }

    Ok(())
}

/// Eight random hex characters, used to keep artifact file names unique.
pub fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Write `value` as pretty-printed UTF-8 JSON to `dir/file_name`, creating
/// `dir` as needed. Non-ASCII text is written as-is, not escaped.
pub fn write_pretty_json<T: Serialize + ?Sized>(
    dir: &Path,
    file_name: &str,
    value: &T,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    let path = dir.join(file_name);
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write artifact: {}", path.display()))?;
    Ok(path)
}
