//! # gdc-models
//!
//! Relational models for the data portal backend: batches, cohorts, entity
//! sets, released data, studies and study rules, notifications, submission
//! transaction logs, usage reports, redactions and QC reports. Usable both as
//! a library and as a schema management binary.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! gdc-models = { version = "0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use gdc_models::store::{BatchStore, SqliteStore, Store};
//! use gdc_models::types::{Batch, BatchMembership};
//!
//! let store = SqliteStore::new("./data/gdc_models.db").unwrap();
//! store.initialize().unwrap();
//!
//! let mut batch = Batch::new("batch-1", "TCGA-BRCA");
//! batch.members.push(BatchMembership::new(0, "node-1", "case"));
//! let batch = store.create_batch(&batch).unwrap();
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `gdc-models` binary. Disable with `default-features = false`.

pub mod config;
pub mod error;
pub mod privileges;
pub mod store;
pub mod types;
