//! Optimization engine: folds a scan snapshot, the usage database, the
//! LRU state and the predictor into a [`CleanupPlan`], and drives the
//! symlink deduplication pass.
//!
//! The plan phase never touches the filesystem; acting on a plan is the
//! quarantine manager's job.

use crate::cache::{PackageLruCache, UsageTracker};
use crate::config::EngineConfig;
use crate::dedup::{DedupOutcome, SemanticDeduplication};
use crate::error::{Error, Result};
use crate::predictor::{FeatureVector, KeepScore, PredictiveOptimizer, NEUTRAL};
use crate::progress::ProgressReporter;
use crate::records::{
    CleanupItem, CleanupPlan, CleanupReason, PackageId, PackageRecord, ProjectRecord, ScanResult,
};
use crate::storage::Database;
use ahash::{AHashMap, AHashSet};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct OptimizationEngine {
    config: EngineConfig,
    lru: PackageLruCache,
    scorer: Box<dyn KeepScore>,
    usage: UsageTracker,
    dedup: Option<SemanticDeduplication>,
}

impl OptimizationEngine {
    pub fn new(
        config: EngineConfig,
        db: Arc<Database>,
        store_root: impl Into<PathBuf>,
    ) -> Result<Self> {
        config.validate()?;
        let lru = PackageLruCache::from_config(&config)?;
        let dedup = if config.enable_symlinking {
            Some(SemanticDeduplication::new(store_root)?)
        } else {
            None
        };
        Ok(Self {
            config,
            lru,
            scorer: Box::new(PredictiveOptimizer::new()),
            usage: UsageTracker::new(db),
            dedup,
        })
    }

    /// Swap in a different scoring model.
    pub fn with_scorer(mut self, scorer: Box<dyn KeepScore>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    pub fn lru(&self) -> &PackageLruCache {
        &self.lru
    }

    /// Compute a cleanup plan for one scan snapshot.
    ///
    /// Reason precedence per target: `orphaned` beats everything and is
    /// never overridden; otherwise a package must be past the preservation
    /// window AND outside the LRU resident set AND (when the predictor is
    /// enabled) scored below the keep threshold. Duplicate-location and
    /// size-pressure tags fill in afterwards for paths not already planned.
    pub fn plan_cleanup(
        &mut self,
        scan: &ScanResult,
        reporter: &dyn ProgressReporter,
    ) -> Result<CleanupPlan> {
        let now = Utc::now();
        reporter.on_plan_start(scan.packages.len());

        let mut skipped = 0usize;
        let mut locations: AHashMap<PackageId, Vec<&PackageRecord>> = AHashMap::new();

        // pass 1: replay observed accesses into the LRU and the durable
        // usage store, and index locations per identity
        for record in &scan.packages {
            if !record.is_well_formed() {
                warn!(
                    "skipping malformed package record (name={:?} version={:?} path={:?})",
                    record.name, record.version, record.path
                );
                skipped += 1;
                continue;
            }
            let id = record.id();
            self.lru.touch_at(&id, record.size_bytes, record.last_access);
            self.usage.record_access(&id.to_string(), record.last_access)?;
            locations.entry(id).or_default().push(record);
        }

        let used = used_set(&scan.projects);
        let projects_by_path: AHashMap<&str, &ProjectRecord> = scan
            .projects
            .iter()
            .map(|p| (p.path.as_str(), p))
            .collect();

        let mut items: Vec<CleanupItem> = Vec::new();
        let mut planned: AHashSet<&str> = AHashSet::new();

        // pass 2: per-record decisions
        let total = scan.packages.len();
        for (index, record) in scan.packages.iter().enumerate() {
            if !record.is_well_formed() {
                continue;
            }
            let id = record.id();
            reporter.on_package_considered(index, total, &id.to_string());

            if !used.contains(&id) {
                debug!("{} is orphaned (no project references it)", id);
                items.push(CleanupItem {
                    target_path: record.path.clone(),
                    estimated_size_bytes: record.size_bytes,
                    reason: CleanupReason::Orphaned,
                });
                planned.insert(&record.path);
                continue;
            }

            let key = id.to_string();
            let metrics = self.usage.metrics(&key)?;
            let effective_access = metrics
                .as_ref()
                .map(|m| m.last_access.max(record.last_access))
                .unwrap_or(record.last_access);
            let old = (now - effective_access).num_days() > self.config.preserve_days;
            if !old {
                continue;
            }
            if self.lru.should_keep(&id) {
                continue;
            }

            let owning_project = record
                .project_paths
                .iter()
                .find_map(|p| projects_by_path.get(p.as_str()).copied());
            let ml_evict = if self.config.enable_ml {
                let features =
                    FeatureVector::extract(record, metrics.as_ref(), owning_project, now);
                self.scorer.score(&features) < NEUTRAL
            } else {
                false
            };
            if self.config.enable_ml && !ml_evict {
                // the predictor vetoes the age-based decision
                continue;
            }

            let reason = if ml_evict {
                CleanupReason::MlPredictedUnused
            } else {
                CleanupReason::Old
            };
            items.push(CleanupItem {
                target_path: record.path.clone(),
                estimated_size_bytes: record.size_bytes,
                reason,
            });
            planned.insert(&record.path);
        }

        // duplicate locations are symlink candidates, not reclaim targets:
        // estimated at zero bytes because deduplication keeps the content
        if self.config.enable_symlinking {
            for records in locations.values() {
                if records.len() < 2 {
                    continue;
                }
                for record in records {
                    if planned.contains(record.path.as_str()) {
                        continue;
                    }
                    items.push(CleanupItem {
                        target_path: record.path.clone(),
                        estimated_size_bytes: 0,
                        reason: CleanupReason::DuplicateSymlinkCandidate,
                    });
                    planned.insert(&record.path);
                }
            }
        }

        // identities pushed out by the LRU bounds this run
        for id in self.lru.evicted() {
            let Some(records) = locations.get(id) else { continue };
            for record in records {
                if planned.contains(record.path.as_str()) {
                    continue;
                }
                items.push(CleanupItem {
                    target_path: record.path.clone(),
                    estimated_size_bytes: record.size_bytes,
                    reason: CleanupReason::SizePressure,
                });
                planned.insert(&record.path);
            }
        }

        let total_estimated_bytes = items.iter().map(|i| i.estimated_size_bytes).sum();
        reporter.on_plan_complete(items.len(), total_estimated_bytes);
        info!(
            "plan: {} targets, {} bytes estimated, {} malformed records skipped",
            items.len(),
            total_estimated_bytes,
            skipped
        );

        Ok(CleanupPlan {
            items,
            total_estimated_bytes,
            skipped,
        })
    }

    /// Replace duplicate package locations with symlinks into the
    /// canonical store. Returns the number of locations linked.
    ///
    /// Per-path failures are logged and skipped; a single unreadable
    /// payload never aborts the pass.
    pub fn execute_symlinking(
        &self,
        scan: &ScanResult,
        reporter: &dyn ProgressReporter,
    ) -> Result<usize> {
        let dedup = self.dedup.as_ref().ok_or_else(|| {
            Error::Config("symlink deduplication is disabled (enable_symlinking)".into())
        })?;

        let mut groups: AHashMap<PackageId, Vec<&PackageRecord>> = AHashMap::new();
        for record in scan.packages.iter().filter(|r| r.is_well_formed()) {
            groups.entry(record.id()).or_default().push(record);
        }
        groups.retain(|_, records| records.len() > 1);
        reporter.on_symlink_start(groups.len());

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.concurrency)
            .build()
            .map_err(|e| Error::Other(format!("could not build worker pool: {}", e)))?;

        let linked = AtomicUsize::new(0);
        pool.scope(|scope| {
            for (id, records) in &groups {
                for record in records {
                    let linked = &linked;
                    scope.spawn(move |_| {
                        match dedup.deduplicate(Path::new(&record.path), &id.name, &id.version) {
                            Ok(DedupOutcome::Linked { canonical }) => {
                                let n = linked.fetch_add(1, Ordering::Relaxed) + 1;
                                reporter.on_symlink_progress(n, &record.path);
                                debug!("linked {} -> {}", record.path, canonical.display());
                            }
                            Ok(DedupOutcome::AlreadyLinked) => {
                                debug!("{} already linked", record.path);
                            }
                            Err(e) => {
                                warn!("could not deduplicate {}: {}", record.path, e);
                            }
                        }
                    });
                }
            }
        });

        let linked = linked.into_inner();
        reporter.on_symlink_complete(linked);
        info!("symlink pass complete: {} locations linked", linked);
        Ok(linked)
    }
}

/// Every `(name, version)` referenced by at least one scanned project.
fn used_set(projects: &[ProjectRecord]) -> AHashSet<PackageId> {
    projects
        .iter()
        .flat_map(|p| {
            p.dependencies
                .iter()
                .map(|(name, version)| PackageId::new(name.clone(), version.clone()))
        })
        .collect()
}
