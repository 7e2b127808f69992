//! End-to-end planning behavior against an in-memory database.

use chrono::{Duration, Utc};
use pkgsweep_core::{
    CleanupReason, Database, EngineConfig, FeatureVector, KeepScore, OptimizationEngine,
    PackageRecord, ProjectRecord, ScanResult, SilentReporter,
};
use std::sync::Arc;
use tempfile::tempdir;

struct FixedScore(f64);

impl KeepScore for FixedScore {
    fn score(&self, _features: &FeatureVector) -> f64 {
        self.0
    }
}

fn package(name: &str, version: &str, path: &str, size: u64, days_old: i64) -> PackageRecord {
    PackageRecord {
        name: name.into(),
        version: version.into(),
        path: path.into(),
        size_bytes: size,
        last_access: Utc::now() - Duration::days(days_old),
        manager: None,
        project_paths: vec![],
    }
}

fn project(path: &str, deps: &[(&str, &str)]) -> ProjectRecord {
    ProjectRecord {
        path: path.into(),
        manager: None,
        dependencies: deps
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect(),
        last_modified: Utc::now(),
    }
}

fn engine(config: EngineConfig) -> OptimizationEngine {
    let store = tempdir().unwrap();
    let db = Arc::new(Database::open_in_memory().unwrap());
    OptimizationEngine::new(config, db, store.path().join("store")).unwrap()
}

#[test]
fn test_orphaned_package_is_planned() {
    let mut eng = engine(EngineConfig::default());
    let scan = ScanResult {
        packages: vec![package(
            "lodash",
            "4.17.21",
            "/cache/npm/lodash",
            52_428_800,
            3,
        )],
        projects: vec![project("/work/app", &[("react", "18.2.0")])],
    };

    let plan = eng.plan_cleanup(&scan, &SilentReporter).unwrap();
    assert_eq!(plan.items.len(), 1);
    assert_eq!(plan.items[0].reason, CleanupReason::Orphaned);
    assert_eq!(plan.items[0].estimated_size_bytes, 52_428_800);
    assert_eq!(plan.total_estimated_bytes, 52_428_800);
    assert_eq!(plan.skipped, 0);
}

#[test]
fn test_orphaned_beats_predictor_keep() {
    // a scorer that wants to keep everything cannot rescue an orphan
    let mut eng = engine(EngineConfig::default()).with_scorer(Box::new(FixedScore(1.0)));
    let scan = ScanResult {
        packages: vec![package("left-pad", "1.3.0", "/cache/left-pad", 4096, 0)],
        projects: vec![],
    };

    let plan = eng.plan_cleanup(&scan, &SilentReporter).unwrap();
    assert_eq!(plan.items.len(), 1);
    assert_eq!(plan.items[0].reason, CleanupReason::Orphaned);
}

#[test]
fn test_referenced_fresh_package_not_planned() {
    let mut eng = engine(EngineConfig::default());
    let scan = ScanResult {
        packages: vec![package("react", "18.2.0", "/cache/react", 1 << 20, 2)],
        projects: vec![project("/work/app", &[("react", "18.2.0")])],
    };

    let plan = eng.plan_cleanup(&scan, &SilentReporter).unwrap();
    assert!(plan.items.is_empty());
    assert_eq!(plan.total_estimated_bytes, 0);
}

#[test]
fn test_old_evicted_package_planned_without_predictor() {
    let config = EngineConfig {
        preserve_days: 30,
        enable_ml: false,
        lru_max_packages: 1,
        ..EngineConfig::default()
    };
    let mut eng = engine(config);
    let scan = ScanResult {
        packages: vec![
            package("stale", "1.0.0", "/cache/stale", 1024, 100),
            package("fresh", "1.0.0", "/cache/fresh", 1024, 1),
        ],
        projects: vec![project(
            "/work/app",
            &[("stale", "1.0.0"), ("fresh", "1.0.0")],
        )],
    };

    let plan = eng.plan_cleanup(&scan, &SilentReporter).unwrap();
    assert_eq!(plan.items.len(), 1);
    assert_eq!(plan.items[0].target_path, "/cache/stale");
    assert_eq!(plan.items[0].reason, CleanupReason::Old);
}

#[test]
fn test_predictor_evict_tags_ml_reason() {
    let config = EngineConfig {
        preserve_days: 30,
        lru_max_packages: 1,
        ..EngineConfig::default()
    };
    let mut eng = engine(config).with_scorer(Box::new(FixedScore(0.1)));
    let scan = ScanResult {
        packages: vec![
            package("stale", "1.0.0", "/cache/stale", 1024, 100),
            package("fresh", "1.0.0", "/cache/fresh", 1024, 1),
        ],
        projects: vec![project(
            "/work/app",
            &[("stale", "1.0.0"), ("fresh", "1.0.0")],
        )],
    };

    let plan = eng.plan_cleanup(&scan, &SilentReporter).unwrap();
    assert_eq!(plan.items.len(), 1);
    assert_eq!(plan.items[0].reason, CleanupReason::MlPredictedUnused);
}

#[test]
fn test_predictor_veto_leaves_size_pressure() {
    // evicted by the LRU but the predictor insists on keeping: the path
    // still surfaces, tagged as a capacity decision rather than an ML one
    let config = EngineConfig {
        preserve_days: 30,
        lru_max_packages: 1,
        ..EngineConfig::default()
    };
    let mut eng = engine(config).with_scorer(Box::new(FixedScore(0.9)));
    let scan = ScanResult {
        packages: vec![
            package("stale", "1.0.0", "/cache/stale", 1024, 100),
            package("fresh", "1.0.0", "/cache/fresh", 1024, 1),
        ],
        projects: vec![project(
            "/work/app",
            &[("stale", "1.0.0"), ("fresh", "1.0.0")],
        )],
    };

    let plan = eng.plan_cleanup(&scan, &SilentReporter).unwrap();
    assert_eq!(plan.items.len(), 1);
    assert_eq!(plan.items[0].target_path, "/cache/stale");
    assert_eq!(plan.items[0].reason, CleanupReason::SizePressure);
}

#[test]
fn test_malformed_records_skipped_and_counted() {
    let mut eng = engine(EngineConfig::default());
    let mut bad = package("", "1.0.0", "/cache/bad", 1024, 1);
    bad.name = String::new();
    let scan = ScanResult {
        packages: vec![bad, package("ok", "1.0.0", "/cache/ok", 1024, 1)],
        projects: vec![project("/work/app", &[("ok", "1.0.0")])],
    };

    let plan = eng.plan_cleanup(&scan, &SilentReporter).unwrap();
    assert_eq!(plan.skipped, 1);
    assert!(plan.items.is_empty());
}

#[test]
fn test_duplicate_locations_surface_as_symlink_candidates() {
    let config = EngineConfig {
        enable_symlinking: true,
        ..EngineConfig::default()
    };
    let mut eng = engine(config);
    let scan = ScanResult {
        packages: vec![
            package("react", "18.2.0", "/work/a/node_modules/react", 1 << 20, 1),
            package("react", "18.2.0", "/work/b/node_modules/react", 1 << 20, 1),
        ],
        projects: vec![project("/work/a", &[("react", "18.2.0")])],
    };

    let plan = eng.plan_cleanup(&scan, &SilentReporter).unwrap();
    let candidates: Vec<_> = plan
        .items
        .iter()
        .filter(|i| i.reason == CleanupReason::DuplicateSymlinkCandidate)
        .collect();
    assert_eq!(candidates.len(), 2);
    // informational tags reclaim nothing
    assert!(candidates.iter().all(|i| i.estimated_size_bytes == 0));
}

#[test]
fn test_usage_metrics_accumulate_across_plans() {
    let store = tempdir().unwrap();
    let db = Arc::new(Database::open_in_memory().unwrap());
    let mut eng =
        OptimizationEngine::new(EngineConfig::default(), Arc::clone(&db), store.path()).unwrap();

    let scan = ScanResult {
        packages: vec![package("vite", "5.0.0", "/cache/vite", 1024, 1)],
        projects: vec![project("/work/app", &[("vite", "5.0.0")])],
    };
    eng.plan_cleanup(&scan, &SilentReporter).unwrap();
    eng.plan_cleanup(&scan, &SilentReporter).unwrap();

    let metrics = eng.usage().metrics("vite@5.0.0").unwrap().unwrap();
    assert_eq!(metrics.access_count, 2);
}
