//! Reversible removal.
//!
//! Nothing is permanently deleted on the cleanup path: targets are moved
//! into the quarantine root, verified, and indexed so they can be rolled
//! back later. The safety invariant is quarantine before delete, verify
//! before trust, never overwrite live data.

use crate::dedup::{payload_fingerprint, payload_size};
use crate::error::{Error, Result};
use crate::storage::{Database, QuarantineRecord, QuarantineStatus};
use chrono::{Duration, Utc};
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Retention policy for the quarantine area itself. Zero disables the
/// corresponding quota.
#[derive(Debug, Clone)]
pub struct QuarantineConfig {
    pub max_entries: usize,
    pub max_size_bytes: u64,
    pub retention_days: i64,
}

impl Default for QuarantineConfig {
    fn default() -> Self {
        Self {
            max_entries: 200,
            max_size_bytes: 10 * 1024 * 1024 * 1024,
            retention_days: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuarantineStats {
    pub total_entries: usize,
    pub active_entries: usize,
    pub total_size_bytes: u64,
    pub oldest_entry_days: i64,
    pub entries_over_retention: usize,
}

pub struct QuarantineManager {
    root: PathBuf,
    db: Arc<Database>,
    config: QuarantineConfig,
}

impl QuarantineManager {
    pub fn new(root: impl Into<PathBuf>, db: Arc<Database>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| Error::fs(&root, e))?;
        Ok(Self {
            root,
            db,
            config: QuarantineConfig::default(),
        })
    }

    pub fn with_config(mut self, config: QuarantineConfig) -> Self {
        self.config = config;
        self
    }

    /// Quarantine each target. Targets are independent: one failing
    /// transaction aborts that target only, the rest proceed. Filesystem
    /// moves run in parallel; record persistence is sequenced by the
    /// database lock.
    ///
    /// `fast` skips checksum verification — an explicit opt-in trading
    /// integrity assurance for latency, never the default.
    pub fn quarantine(&self, targets: &[PathBuf], fast: bool) -> Vec<Result<QuarantineRecord>> {
        targets
            .par_iter()
            .map(|target| {
                let result = self.quarantine_one(target, fast);
                if let Err(e) = &result {
                    error!("failed to quarantine {}: {}", target.display(), e);
                }
                result
            })
            .collect()
    }

    fn quarantine_one(&self, target: &Path, fast: bool) -> Result<QuarantineRecord> {
        if !target.exists() {
            return Err(Error::fs(
                target,
                std::io::Error::new(std::io::ErrorKind::NotFound, "quarantine target missing"),
            ));
        }

        let size_bytes = payload_size(target);
        let mut checksum = if fast {
            None
        } else {
            Some(payload_fingerprint(target)?)
        };

        let id = fresh_id(checksum.as_deref());
        let qpath = self.root.join(&id);

        match fs::rename(target, &qpath) {
            Ok(()) => {}
            Err(e) if crate::platform::is_cross_device(&e) => {
                // copy + verify + delete; verification is mandatory on
                // this path even in fast mode
                let expected = match &checksum {
                    Some(c) => c.clone(),
                    None => payload_fingerprint(target)?,
                };
                copy_tree(target, &qpath)?;
                let actual = payload_fingerprint(&qpath)?;
                if actual != expected {
                    let _ = fs::remove_dir_all(&qpath);
                    return Err(Error::Integrity {
                        path: qpath,
                        expected,
                        actual,
                    });
                }
                fs::remove_dir_all(target).map_err(|e| Error::fs(target, e))?;
                checksum = Some(expected);
                warn!(
                    "quarantined {} across volumes (copy + verify)",
                    target.display()
                );
            }
            Err(e) => return Err(Error::fs(target, e)),
        }

        let record = QuarantineRecord {
            id: id.clone(),
            original_path: target.to_string_lossy().into_owned(),
            quarantine_path: qpath.to_string_lossy().into_owned(),
            checksum: checksum.clone(),
            size_bytes,
            created_at: Utc::now(),
            status: QuarantineStatus::Active,
            suspect: false,
        };
        // the record hits durable storage before the move is trusted
        self.db.insert_quarantine_record(&record)?;

        // post-move verification; a mismatch keeps the data, flagged
        // suspect — data loss is never the failure mode
        if let Some(expected) = &checksum {
            let actual = payload_fingerprint(&qpath)?;
            if &actual != expected {
                self.db.mark_suspect(&id)?;
                return Err(Error::Integrity {
                    path: qpath,
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        info!("quarantined {} as {}", target.display(), id);
        Ok(record)
    }

    /// Restore a quarantined target to its original path.
    pub fn rollback(&self, id: &str) -> Result<QuarantineRecord> {
        let record = self
            .db
            .get_quarantine_record(id)?
            .filter(|r| r.status == QuarantineStatus::Active)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        self.rollback_record(record)
    }

    /// Restore the most recently quarantined (non-suspect) target.
    pub fn rollback_latest(&self) -> Result<QuarantineRecord> {
        let record = self
            .db
            .latest_active_quarantine()?
            .ok_or_else(|| Error::NotFound("latest".into()))?;
        self.rollback_record(record)
    }

    fn rollback_record(&self, mut record: QuarantineRecord) -> Result<QuarantineRecord> {
        let original = PathBuf::from(&record.original_path);
        let qpath = PathBuf::from(&record.quarantine_path);

        // never overwrite live data
        if original.symlink_metadata().is_ok() {
            return Err(Error::PathConflict(original));
        }
        if let Some(parent) = original.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::fs(parent, e))?;
        }

        match fs::rename(&qpath, &original) {
            Ok(()) => {}
            Err(e) if crate::platform::is_cross_device(&e) => {
                let expected = match &record.checksum {
                    Some(c) => c.clone(),
                    None => payload_fingerprint(&qpath)?,
                };
                copy_tree(&qpath, &original)?;
                let actual = payload_fingerprint(&original)?;
                if actual != expected {
                    let _ = fs::remove_dir_all(&original);
                    return Err(Error::Integrity {
                        path: original,
                        expected,
                        actual,
                    });
                }
                fs::remove_dir_all(&qpath).map_err(|e| Error::fs(&qpath, e))?;
            }
            Err(e) => return Err(Error::fs(&qpath, e)),
        }

        self.db.mark_rolled_back(&record.id)?;
        record.status = QuarantineStatus::RolledBack;
        info!("rolled back {} to {}", record.id, record.original_path);
        Ok(record)
    }

    pub fn list(&self) -> Result<Vec<QuarantineRecord>> {
        Ok(self.db.list_quarantine_records()?)
    }

    pub fn stats(&self) -> Result<QuarantineStats> {
        let records = self.db.list_quarantine_records()?;
        let now = Utc::now();
        let active: Vec<_> = records
            .iter()
            .filter(|r| r.status == QuarantineStatus::Active)
            .collect();

        let total_size_bytes = active.iter().map(|r| r.size_bytes).sum();
        let oldest_entry_days = active
            .iter()
            .map(|r| (now - r.created_at).num_days())
            .max()
            .unwrap_or(0);
        let entries_over_retention = if self.config.retention_days > 0 {
            active
                .iter()
                .filter(|r| (now - r.created_at).num_days() > self.config.retention_days)
                .count()
        } else {
            0
        };

        Ok(QuarantineStats {
            total_entries: records.len(),
            active_entries: active.len(),
            total_size_bytes,
            oldest_entry_days,
            entries_over_retention,
        })
    }

    /// Permanently delete quarantined payloads past the retention policy,
    /// oldest first, until every quota holds. Suspect records are never
    /// swept — unverified data is not deleted by policy.
    ///
    /// Returns `(entries_removed, bytes_freed)`.
    pub fn sweep(&self) -> Result<(usize, u64)> {
        let mut records: Vec<QuarantineRecord> = self
            .db
            .list_quarantine_records()?
            .into_iter()
            .filter(|r| r.status == QuarantineStatus::Active && !r.suspect)
            .collect();
        records.sort_by_key(|r| r.created_at);

        let now = Utc::now();
        let mut expired: Vec<&QuarantineRecord> = Vec::new();

        if self.config.retention_days > 0 {
            let cutoff = now - Duration::days(self.config.retention_days);
            expired.extend(records.iter().filter(|r| r.created_at < cutoff));
        }

        // quotas apply to what would remain after the retention pass,
        // oldest-first, so an expired entry cannot push a young in-quota
        // payload over the edge
        let mut remaining: Vec<&QuarantineRecord> = records
            .iter()
            .filter(|r| !expired.iter().any(|e| e.id == r.id))
            .collect();

        if self.config.max_entries > 0 && remaining.len() > self.config.max_entries {
            let excess = remaining.len() - self.config.max_entries;
            expired.extend(remaining.drain(..excess));
        }

        if self.config.max_size_bytes > 0 {
            let mut total: u64 = remaining.iter().map(|r| r.size_bytes).sum();
            while total > self.config.max_size_bytes && !remaining.is_empty() {
                let victim = remaining.remove(0);
                total -= victim.size_bytes;
                expired.push(victim);
            }
        }

        let mut removed = 0usize;
        let mut freed = 0u64;
        for rec in expired {
            let qpath = PathBuf::from(&rec.quarantine_path);
            if qpath.exists() {
                if let Err(e) = fs::remove_dir_all(&qpath) {
                    warn!("could not sweep {}: {}", qpath.display(), e);
                    continue;
                }
            }
            self.db.delete_quarantine_record(&rec.id)?;
            removed += 1;
            freed += rec.size_bytes;
            debug!("swept quarantine entry {}", rec.id);
        }

        // rolled-back rows past retention are history only, their payloads
        // are already restored; drop the index rows
        if self.config.retention_days > 0 {
            let cutoff = now - Duration::days(self.config.retention_days);
            let stale_history: Vec<String> = self
                .db
                .list_quarantine_records()?
                .into_iter()
                .filter(|r| r.status == QuarantineStatus::RolledBack && r.created_at < cutoff)
                .map(|r| r.id)
                .collect();
            for id in stale_history {
                self.db.delete_quarantine_record(&id)?;
            }
        }

        if removed > 0 {
            info!("quarantine sweep removed {} entries, freed {} bytes", removed, freed);
        }
        Ok((removed, freed))
    }
}

/// Id derived from the payload checksum when one exists, plus a timestamp
/// component so quarantining the same content twice stays unique.
fn fresh_id(checksum: Option<&str>) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    match checksum {
        Some(c) => format!("{}-{}", &c[..c.len().min(12)], nanos),
        None => format!("q-{}", nanos),
    }
}

fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).map_err(|e| Error::fs(dst, e))?;
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| {
            let path = e
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| src.to_path_buf());
            match e.into_io_error() {
                Some(io) => Error::fs(path, io),
                None => Error::fs(
                    path,
                    std::io::Error::new(std::io::ErrorKind::Other, "filesystem loop detected"),
                ),
            }
        })?;
        let rel = match entry.path().strip_prefix(src) {
            Ok(rel) if rel.as_os_str().is_empty() => continue,
            Ok(rel) => rel,
            Err(_) => continue,
        };
        let dst_path = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dst_path).map_err(|e| Error::fs(&dst_path, e))?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &dst_path).map_err(|e| Error::fs(&dst_path, e))?;
        }
    }
    Ok(())
}
