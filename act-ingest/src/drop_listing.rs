//! Network drop listing
//!
//! Raw files land flat in the drop as `<labID> (<YYYY-MM-DD>)RAW.csv`. Only
//! the `(filename, labID, date)` triple is consumed.

use crate::error::IngestResult;
use act_common::dates::normalize_date;
use act_common::SessionRecord;
use chrono::{Duration, NaiveDate};
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// One raw file in the network drop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropRow {
    pub filename: String,
    pub lab_id: String,
    pub date: NaiveDate,
}

impl DropRow {
    /// Parse a drop file name; `None` for anything not shaped like a raw file
    pub fn parse(filename: &str) -> Option<DropRow> {
        if !filename.to_ascii_lowercase().ends_with(".csv") {
            return None;
        }
        let lab_id = filename.split(' ').next()?.trim();
        let open = filename.find('(')?;
        let rest = &filename[open + 1..];
        let close = rest.find(')')?;
        if lab_id.is_empty() || lab_id.contains('(') {
            return None;
        }
        let date = normalize_date(&rest[..close]).ok()?;
        Some(DropRow {
            filename: filename.to_string(),
            lab_id: lab_id.to_string(),
            date,
        })
    }

    /// Freshly matched record for this file
    pub fn to_record(&self) -> SessionRecord {
        SessionRecord {
            filename: self.filename.clone(),
            lab_id: self.lab_id.clone(),
            date: self.date,
            run: None,
            study: None,
            file_path: None,
        }
    }
}

/// Oldest drop date to consider
///
/// A positive look-back window counts back from `today`; otherwise the
/// configured floor applies.
pub fn cutoff_date(days_ago: Option<u32>, floor: NaiveDate, today: NaiveDate) -> NaiveDate {
    match days_ago {
        Some(days) if days > 0 => today - Duration::days(i64::from(days)),
        _ => floor,
    }
}

/// List raw files in `drop_dir` dated on or after `cutoff`
///
/// `None` keeps every parseable row. Rows are sorted by `(date, filename)`.
pub fn scan_drop(drop_dir: &Path, cutoff: Option<NaiveDate>) -> IngestResult<Vec<DropRow>> {
    if !drop_dir.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("network drop {} is not a directory", drop_dir.display()),
        )
        .into());
    }

    let mut rows = Vec::new();
    for entry in WalkDir::new(drop_dir).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Error accessing drop entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !name.to_ascii_lowercase().ends_with(".csv") {
            continue;
        }
        match DropRow::parse(&name) {
            Some(row) if cutoff.map_or(true, |c| row.date >= c) => rows.push(row),
            Some(_) => {}
            None => warn!(file = %name, "Unrecognized drop file name; skipping"),
        }
    }

    rows.sort_by(|a, b| (a.date, &a.filename).cmp(&(b.date, &b.filename)));
    debug!(dir = %drop_dir.display(), rows = rows.len(), "Drop listing scanned");
    Ok(rows)
}
