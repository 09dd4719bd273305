//! Service modules for the session ingest engine
//!
//! Leaf-first: reconciliation and rename planning are pure; the mover, file
//! mover and linker touch disk; the transaction coordinator ties them
//! together per subject. Duplicate resolution, identity matching and the
//! manifest rebuilder sit beside the transaction path.

pub mod duplicate_resolver;
pub mod file_mover;
pub mod identity_matcher;
pub mod manifest_rebuilder;
pub mod reconciler;
pub mod rename_planner;
pub mod session_linker;
pub mod transaction;
pub mod two_phase_mover;

pub use duplicate_resolver::{DuplicateEntry, DuplicateGroup, DuplicateResolver};
pub use file_mover::{CopyOutcome, FileMover, SkipReason};
pub use identity_matcher::{match_identities, MatchResult};
pub use manifest_rebuilder::{discover_sessions, DiscoveredSession, Discovery, ManifestRebuilder};
pub use reconciler::{reconcile, ReconcileAction, Reconciliation, TieDateConflict};
pub use rename_planner::{plan_renames, RenameMove, RenamePlan};
pub use session_linker::{refresh_subject_links, remove_link_directories};
pub use transaction::{TransactionCoordinator, TransactionOutcome};
pub use two_phase_mover::{CsvRename, MoveReport, TwoPhaseMover};
