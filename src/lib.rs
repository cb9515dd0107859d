//! # Consumer Sense
//!
//! Turns raw customer feedback (typed text, app-store screenshots, scraped
//! review pages) into validated review documents and flat analytics rows,
//! then persists them to local files, a document store, or a warehouse.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────┐   ┌───────────┐   ┌──────────┐
//! │ Text / Image │──▶│  Analysis  │──▶│ Normalize │──▶│ Validate │
//! │ / URL input  │   │   client   │   │           │   │          │
//! └──────────────┘   └────────────┘   └───────────┘   └────┬─────┘
//!                                                          │
//!                                           ┌──────────────┤
//!                                           ▼              ▼
//!                                      ┌─────────┐   ┌───────────┐
//!                                      │ Map row │──▶│   Sinks   │
//!                                      └─────────┘   │ file/docs │
//!                                                    │ /warehouse│
//!                                                    └───────────┘
//! ```
//!
//! The pure stages (normalizer, validator, mapper, sink trait) live in
//! `consumer-sense-core`; this crate supplies the model client, the
//! scraper, the concrete sinks, and the CLI and HTTP surfaces.
//!
//! ## Quick Start
//!
//! ```bash
//! csense analyze text "The app crashes when I upload photos" --save file
//! csense analyze image shot1.png shot2.png --save document_store,warehouse
//! csense validate ./data/out/review-1a2b3c4d.json
//! csense batch ./inbox --save file
//! csense serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`client`] | Language-model client abstraction |
//! | [`prompts`] | Analysis prompts |
//! | [`scrape`] | Review page scraping |
//! | [`pipeline`] | Analyze, normalize, validate, map, persist |
//! | [`sinks`] | Sink registry |
//! | [`sink_file`] | Local JSON files |
//! | [`sink_docstore`] | Firestore-compatible document store |
//! | [`sink_warehouse`] | BigQuery-compatible warehouse |
//! | [`offline`] | File-based commands |
//! | [`batch`] | Directory batch runs |
//! | [`progress`] | Batch progress reporting |
//! | [`server`] | HTTP API |

pub mod batch;
pub mod client;
pub mod config;
pub mod offline;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod scrape;
pub mod server;
pub mod sink_docstore;
pub mod sink_file;
pub mod sink_warehouse;
pub mod sinks;
