//! Session record and identity types
//!
//! A [`SessionRecord`] describes one accelerometer file acquisition. Records
//! coming out of identity matching only carry `filename`, `labID` and `date`;
//! `run`, `study` and `file_path` are filled in by reconciliation and are
//! always present on records stored in the manifest.

use crate::dates::{self, DateValue};
use crate::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Study cohort a subject belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Study {
    /// Interventional cohort
    Int,
    /// Observational cohort
    Obs,
}

impl Study {
    pub fn as_str(&self) -> &'static str {
        match self {
            Study::Int => "int",
            Study::Obs => "obs",
        }
    }

    /// Derive the cohort from the numeric range of a subject ID
    ///
    /// Non-numeric IDs and IDs at or below the observational floor have no cohort.
    pub fn for_subject(subject_id: &str, ranges: &CohortRanges) -> Option<Study> {
        let value: u64 = subject_id.trim().parse().ok()?;
        if value >= ranges.int_min {
            Some(Study::Int)
        } else if value > ranges.obs_min {
            Some(Study::Obs)
        } else {
            None
        }
    }
}

impl fmt::Display for Study {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subject-ID ranges that encode cohort membership
///
/// `obs_min < id < int_min` is observational, `id >= int_min` interventional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortRanges {
    #[serde(default = "default_obs_min")]
    pub obs_min: u64,
    #[serde(default = "default_int_min")]
    pub int_min: u64,
}

fn default_obs_min() -> u64 {
    6000
}

fn default_int_min() -> u64 {
    8000
}

impl Default for CohortRanges {
    fn default() -> Self {
        Self {
            obs_min: default_obs_min(),
            int_min: default_int_min(),
        }
    }
}

/// `(labID, normalized date, filename)`: one file acquisition
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey {
    pub lab_id: String,
    pub date: NaiveDate,
    pub filename: String,
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "labID={} date={} filename={}",
            self.lab_id,
            dates::format_date(self.date),
            self.filename
        )
    }
}

/// One accelerometer session file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub filename: String,
    #[serde(rename = "labID")]
    pub lab_id: String,
    #[serde(with = "crate::dates::iso_date")]
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub study: Option<Study>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
}

impl SessionRecord {
    /// Build a freshly matched record, normalizing the date
    pub fn new(
        filename: impl Into<String>,
        lab_id: impl Into<String>,
        date: impl Into<DateValue>,
    ) -> Result<Self> {
        Ok(Self {
            filename: filename.into(),
            lab_id: lab_id.into(),
            date: date.into().normalize()?,
            run: None,
            study: None,
            file_path: None,
        })
    }

    pub fn with_run(mut self, run: u32) -> Self {
        self.run = Some(run);
        self
    }

    pub fn with_study(mut self, study: Study) -> Self {
        self.study = Some(study);
        self
    }

    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey {
            lab_id: self.lab_id.clone(),
            date: self.date,
            filename: self.filename.clone(),
        }
    }

    /// Canonical ordering key: `(date, filename, labID)` ascending
    pub fn sort_key(&self) -> (NaiveDate, &str, &str) {
        (self.date, self.filename.as_str(), self.lab_id.as_str())
    }
}
