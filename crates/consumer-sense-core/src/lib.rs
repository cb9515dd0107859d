//! # Consumer Sense Core
//!
//! Pure logic for the review pipeline: data models, the document
//! normalizer, the fixed schema validator, the analytics row mapper, the
//! upstream analysis shapes, and the sink trait.
//!
//! This crate contains no tokio, HTTP client, or filesystem I/O. Every
//! function is synchronous and side-effect free; the application crate
//! supplies the language-model client and the concrete sinks.
//!
//! ```text
//! AnalysisResult ──▶ normalize ──▶ ReviewDocument ──▶ schema::validate_document
//!                                                          │
//!                                         ValidatedDocument ▼
//!                                   row::map_document_to_row ──▶ AnalyticsRow
//!                                                          │
//!                                                          ▼
//!                                                   sink::Sink::persist
//! ```

pub mod coerce;
pub mod models;
pub mod normalize;
pub mod row;
pub mod schema;
pub mod sink;
pub mod upstream;

pub use models::{
    AnalysisResult, AnalyticsRow, ReviewDocument, RowMetadata, SourceMetadata, SourceType,
    ValidatedDocument,
};
