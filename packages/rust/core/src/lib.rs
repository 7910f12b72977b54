//! Core pipeline orchestration for LeadHarvest.
//!
//! Ties the crawler, the lead store and the embedding service together into
//! the two end-to-end workflows: harvesting a search query
//! ([`Pipeline::run_harvest`]) and enriching stored leads that still lack an
//! email ([`Pipeline::run_enrichment`]).

pub mod dedup;
pub mod embedding;
pub mod enrichment;
pub mod export;
pub mod pipeline;
pub mod scheduler;
pub mod sink;

#[cfg(test)]
mod testing;

pub use dedup::{Admission, DeduplicationGate};
pub use embedding::{Embedder, HttpEmbedder};
pub use enrichment::{EnrichOptions, EnrichmentReport};
pub use export::ExportLog;
pub use pipeline::{
    Collaborators, HarvestReport, Pipeline, PipelineConfig, ProgressReporter, SilentProgress,
};
pub use scheduler::{BatchScheduler, DelayRange, UnitFailure, UnitReport};
pub use sink::{RecordSink, SinkOutcome};
