//! # ACT Common Library
//!
//! Shared code for the accelerometer ingest workspace including:
//! - Session record and identity types
//! - Calendar-date normalization
//! - The JSON manifest store (durable subject → session state)
//! - Configuration loading and system path profiles

pub mod config;
pub mod dates;
pub mod error;
pub mod manifest;
pub mod record;

pub use error::{Error, Result};
pub use manifest::{Manifest, ManifestStore};
pub use record::{IdentityKey, SessionRecord, Study};
