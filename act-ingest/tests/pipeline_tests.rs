//! End-to-end ingest runs
//!
//! Drop directory, registry snapshot and both study roots live in one temp
//! tree; each test drives [`IngestPipeline::run`] and inspects the result on
//! disk and in the persisted manifest.

mod helpers;

use act_common::config::SystemPaths;
use act_common::{ManifestStore, Study};
use act_ingest::drop_listing::{scan_drop, DropRow};
use act_ingest::registry::{RegistryRow, RegistrySnapshot};
use act_ingest::{IngestError, IngestPipeline, PipelineSettings, RunSummary};
use helpers::{capture_logs, raw_name, FaultyFs, Fixture};
use std::fs;

fn pipeline(fx: &Fixture, settings: PipelineSettings) -> IngestPipeline {
    IngestPipeline::new(
        fx.paths.clone(),
        settings,
        ManifestStore::new(fx.manifest_path()),
    )
}

fn registry(pairs: &[(&str, &str)]) -> RegistrySnapshot {
    RegistrySnapshot::from_rows(
        pairs
            .iter()
            .map(|(subject, lab)| RegistryRow::new(*subject, *lab))
            .collect(),
    )
}

fn scan(fx: &Fixture) -> Vec<DropRow> {
    scan_drop(&fx.drop_dir(), None).unwrap()
}

#[test]
fn test_run_places_files_and_saves_manifest() {
    let fx = Fixture::new();
    fx.write_drop(&raw_name("1101", "2025-01-10"), "int-2");
    fx.write_drop(&raw_name("1101", "2025-01-03"), "int-1");
    fx.write_drop(&raw_name("1201", "2024-12-01"), "obs-1");
    fx.write_drop(&raw_name("9999", "2025-01-01"), "unbound");
    let registry = registry(&[("8001", "1101"), ("7001", "1201")]);
    let pipeline = pipeline(&fx, PipelineSettings::default());

    let report = pipeline.run(&registry, &scan(&fx)).unwrap();

    assert_eq!(
        report.summary,
        RunSummary {
            committed: 2,
            skipped_tie_date: 0,
            failed: 0
        }
    );
    assert_eq!(fx.read_session(Study::Int, "8001", 1), "int-1");
    assert_eq!(fx.read_session(Study::Int, "8001", 2), "int-2");
    assert_eq!(fx.read_session(Study::Obs, "7001", 1), "obs-1");

    let manifest = pipeline.store().load();
    assert_eq!(manifest.keys().collect::<Vec<_>>(), vec!["7001", "8001"]);
    let runs: Vec<_> = manifest["8001"].iter().filter_map(|r| r.run).collect();
    assert_eq!(runs, vec![1, 2]);
    assert_eq!(manifest["7001"][0].study, Some(Study::Obs));
}

#[test]
fn test_second_run_is_idempotent() {
    let fx = Fixture::new();
    fx.write_drop(&raw_name("1101", "2025-01-03"), "a");
    fx.write_drop(&raw_name("1101", "2025-01-10"), "b");
    let registry = registry(&[("8001", "1101")]);
    let pipeline = pipeline(&fx, PipelineSettings::default());

    let first = pipeline.run(&registry, &scan(&fx)).unwrap();
    let manifest_after_first = fs::read_to_string(fx.manifest_path()).unwrap();

    let (second, logs) = capture_logs(|| pipeline.run(&registry, &scan(&fx)).unwrap());

    assert_eq!(first.committed, second.committed);
    assert_eq!(fs::read_to_string(fx.manifest_path()).unwrap(), manifest_after_first);
    assert_eq!(logs.count_action("noop_duplicate"), 1);
    logs.assert_no_action("backfill_reindex");
    assert!(!fx.layout.session_dir(Study::Int, "8001", 3).exists());
}

#[test]
fn test_later_backfill_renumbers_through_pipeline() {
    let fx = Fixture::new();
    fx.write_drop(&raw_name("1101", "2025-02-01"), "late");
    let registry = registry(&[("8001", "1101")]);
    let pipeline = pipeline(&fx, PipelineSettings::default());
    pipeline.run(&registry, &scan(&fx)).unwrap();

    fx.write_drop(&raw_name("1101", "2025-01-01"), "early");
    let report = pipeline.run(&registry, &scan(&fx)).unwrap();

    assert_eq!(report.summary.committed, 1);
    assert_eq!(fx.read_session(Study::Int, "8001", 1), "early");
    assert_eq!(fx.read_session(Study::Int, "8001", 2), "late");
    let manifest = pipeline.store().load();
    assert_eq!(manifest["8001"][1].filename, raw_name("1101", "2025-02-01"));
    assert_eq!(manifest["8001"][1].run, Some(2));
}

#[test]
fn test_duplicate_identity_splits_between_cohorts() {
    let fx = Fixture::new();
    fx.write_drop(&raw_name("1101", "2024-09-01"), "baseline");
    fx.write_drop(&raw_name("1101", "2025-01-15"), "followup-1");
    fx.write_drop(&raw_name("1101", "2025-03-01"), "followup-2");
    let registry = registry(&[("7001", "1101"), ("8001", "1101")]);
    let pipeline = pipeline(&fx, PipelineSettings::default());

    let report = pipeline.run(&registry, &scan(&fx)).unwrap();

    assert_eq!(report.summary.committed, 2);
    assert_eq!(fx.read_session(Study::Obs, "7001", 1), "baseline");
    assert_eq!(fx.read_session(Study::Int, "8001", 1), "followup-1");
    assert_eq!(fx.read_session(Study::Int, "8001", 2), "followup-2");

    let manifest = pipeline.store().load();
    assert_eq!(manifest["7001"].len(), 1);
    assert_eq!(manifest["8001"].len(), 2);

    // Stored files stay with their subject on the next run
    let again = pipeline.run(&registry, &scan(&fx)).unwrap();
    assert_eq!(again.committed, report.committed);
    assert!(!fx.layout.session_dir(Study::Obs, "7001", 2).exists());
}

#[test]
fn test_excluded_subject_leaves_single_identity() {
    let fx = Fixture::new();
    fx.write_drop(&raw_name("1101", "2025-01-01"), "a");
    let registry = registry(&[("7001", "1101"), ("7002", "1101"), ("8001", "1101")]);
    let settings = PipelineSettings {
        excluded_subjects: ["7002".to_string()].into_iter().collect(),
        ..PipelineSettings::default()
    };

    let report = pipeline(&fx, settings).run(&registry, &scan(&fx)).unwrap();

    assert_eq!(report.summary.committed, 1);
    assert_eq!(fx.read_session(Study::Obs, "7001", 1), "a");
    assert!(!fx.layout.subject_dir(Study::Obs, "7002").exists());
}

#[test]
fn test_tie_date_subject_does_not_block_others() {
    let fx = Fixture::new();
    fx.write_drop("1102 (2025-01-01)RAW.csv", "x");
    fx.write_drop("1102 (2025-01-01)RAW-2.csv", "y");
    fx.write_drop(&raw_name("1101", "2025-01-01"), "a");
    let registry = registry(&[("8001", "1101"), ("8002", "1102")]);
    let pipeline = pipeline(&fx, PipelineSettings::default());

    let (report, logs) = capture_logs(|| pipeline.run(&registry, &scan(&fx)).unwrap());

    assert_eq!(report.summary.committed, 1);
    assert_eq!(report.summary.skipped_tie_date, 1);
    assert!(report.committed["8002"].is_empty());
    assert_eq!(report.committed["8001"].len(), 1);
    assert!(!fx.layout.subject_dir(Study::Int, "8002").exists());
    logs.assert_contains("skip_tie_date subject=8002");

    let manifest = pipeline.store().load();
    assert!(manifest.contains_key("8001"));
    assert!(!manifest.contains_key("8002"));
}

#[test]
fn test_failed_subject_is_counted_and_others_saved() {
    let fx = Fixture::new();
    fx.seed_session(Study::Int, "8001", 1, "B");
    fx.write_drop(&raw_name("1101", "2025-01-01"), "A");
    fx.write_drop(&raw_name("1102", "2025-01-01"), "X");
    let store = ManifestStore::new(fx.manifest_path());
    let mut seeded = act_common::Manifest::new();
    seeded.insert(
        "8001".to_string(),
        vec![fx.stored(Study::Int, "8001", "1101", "2025-02-01", 1)],
    );
    store.save(&seeded).unwrap();
    let registry = registry(&[("8001", "1101"), ("8002", "1102")]);
    let pipeline = IngestPipeline::new(fx.paths.clone(), PipelineSettings::default(), store)
        .with_fs(Box::new(FaultyFs::failing_rename(1)));

    let report = pipeline.run(&registry, &scan(&fx)).unwrap();

    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.committed, 1);
    assert_eq!(fx.read_session(Study::Int, "8001", 1), "B");
    assert_eq!(fx.read_session(Study::Int, "8002", 1), "X");
    let manifest = pipeline.store().load();
    assert_eq!(manifest["8001"], seeded["8001"]);
    assert_eq!(manifest["8002"].len(), 1);
}

#[test]
fn test_link_directories_removed_when_linking_off() {
    let fx = Fixture::new();
    let stale = fx.layout.accel_dir(Study::Obs, "7001").join("all");
    fs::create_dir_all(&stale).unwrap();
    fs::write(stale.join("old.csv"), "x").unwrap();

    pipeline(&fx, PipelineSettings::default())
        .run(&registry(&[]), &[])
        .unwrap();

    assert!(!stale.exists());
}

#[cfg(unix)]
#[test]
fn test_link_directories_built_when_linking_on() {
    let fx = Fixture::new();
    fx.write_drop(&raw_name("1101", "2025-01-01"), "a");
    let settings = PipelineSettings {
        link_sessions: true,
        ..PipelineSettings::default()
    };

    pipeline(&fx, settings)
        .run(&registry(&[("8001", "1101")]), &scan(&fx))
        .unwrap();

    let link = fx
        .layout
        .accel_dir(Study::Int, "8001")
        .join("all")
        .join("ses-1")
        .join("sub-8001_ses-1_accel.csv");
    assert_eq!(fs::read_to_string(&link).unwrap(), "a");
    assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
}

#[test]
fn test_missing_drop_dir_is_an_error() {
    let fx = Fixture::new();
    let paths = SystemPaths::new(fx.paths.int_dir.clone(), fx.paths.obs_dir.clone(), None);
    let pipeline = IngestPipeline::new(
        paths,
        PipelineSettings::default(),
        ManifestStore::new(fx.manifest_path()),
    );

    let err = pipeline.run(&registry(&[]), &[]).unwrap_err();

    assert!(matches!(err, IngestError::Common(_)));
    assert!(!fx.manifest_path().exists());
    assert!(scan_drop(&fx.root.path().join("missing"), None).is_err());
}
