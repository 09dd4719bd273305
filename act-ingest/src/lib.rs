//! act-ingest library interface
//!
//! Session reconciliation and manifest engine for accelerometer files. The
//! `act-ingest` binary is a thin wrapper around [`pipeline::IngestPipeline`];
//! everything is exposed here for integration testing.

pub mod drop_listing;
pub mod error;
pub mod fs;
pub mod layout;
pub mod pipeline;
pub mod registry;
pub mod services;
pub mod temp_names;

pub use crate::error::{IngestError, IngestResult, RebuildError, RebuildFailure};
pub use crate::pipeline::{IngestPipeline, IngestReport, PipelineSettings, RunSummary};
