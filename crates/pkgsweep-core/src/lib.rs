//! Core engine for package cache optimization: usage-tracked LRU
//! eviction, predictive keep/evict scoring, content-addressed symlink
//! deduplication, and reversible quarantine.
//!
//! The CLI crate is a thin shell over this library; everything here is
//! callable without a terminal attached.

pub mod cache;
pub mod config;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod platform;
pub mod predictor;
pub mod progress;
pub mod quarantine;
pub mod records;
pub mod storage;

pub use cache::{PackageLruCache, UsageTracker};
pub use config::{load_configuration, AppConfig, EngineConfig};
pub use dedup::{DedupOutcome, SemanticDeduplication};
pub use engine::OptimizationEngine;
pub use error::{Error, Result};
pub use predictor::{FeatureVector, KeepScore, PredictiveOptimizer};
pub use progress::{ProgressReporter, SilentReporter};
pub use quarantine::{QuarantineConfig, QuarantineManager, QuarantineStats};
pub use records::{
    CleanupItem, CleanupPlan, CleanupReason, ManagerKind, PackageId, PackageRecord,
    ProjectRecord, QuarantineEntry, RollbackReport, ScanResult, SymlinkReport,
};
pub use storage::{Database, QuarantineRecord, QuarantineStatus, UsageMetrics};
