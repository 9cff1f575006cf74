// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod error;
pub mod export;
pub mod ingest;
pub mod probe;
pub mod scoring;

// ---- Re-exports for stable public API ----
pub use crate::config::LeadsConfig;
pub use crate::error::LeadsError;
pub use crate::export::{export_filename, save_to_file, to_delimited_text, WebsiteColumn};
pub use crate::ingest::providers::build_adapter;
pub use crate::ingest::{
    Aggregator, Company, Normalizer, RawRecord, RunReport, ScrapeOptions, SourceAdapter,
    SourceKind,
};
pub use crate::probe::LivenessProbe;
pub use crate::scoring::Scorer;
