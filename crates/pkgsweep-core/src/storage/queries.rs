use super::models::{QuarantineRecord, QuarantineStatus, UsageMetrics};
use super::sqlite::Database;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Result, Row};
use std::collections::HashMap;

fn parse_ts(idx: usize, s: String) -> Result<DateTime<Utc>> {
    s.parse::<DateTime<Utc>>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_opt_ts(idx: usize, s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.map(|s| parse_ts(idx, s)).transpose()
}

fn metrics_from_row(row: &Row<'_>) -> Result<UsageMetrics> {
    Ok(UsageMetrics {
        package_key: row.get(0)?,
        last_access: parse_ts(1, row.get(1)?)?,
        last_script_execution: parse_opt_ts(2, row.get(2)?)?,
        last_successful_build: parse_opt_ts(3, row.get(3)?)?,
        access_count: row.get(4)?,
        script_execution_count: row.get(5)?,
    })
}

fn quarantine_from_row(row: &Row<'_>) -> Result<QuarantineRecord> {
    let status: String = row.get(6)?;
    Ok(QuarantineRecord {
        id: row.get(0)?,
        original_path: row.get(1)?,
        quarantine_path: row.get(2)?,
        checksum: row.get(3)?,
        size_bytes: row.get::<_, i64>(4)? as u64,
        created_at: parse_ts(5, row.get(5)?)?,
        status: QuarantineStatus::parse(&status).unwrap_or(QuarantineStatus::Active),
        suspect: row.get(7)?,
    })
}

const METRICS_COLS: &str = "package_key, last_access, last_script_execution, \
     last_successful_build, access_count, script_execution_count";

const QUARANTINE_COLS: &str = "id, original_path, quarantine_path, checksum, \
     size_bytes, created_at, status, suspect";

impl Database {
    // ── Usage metrics ────────────────────────────────────────────

    /// Record an observed access. `last_access` only ever moves forward, so
    /// replaying an old scan snapshot cannot make a package look fresher
    /// than it is.
    pub fn record_access(&self, package_key: &str, at: DateTime<Utc>) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.lock().execute(
            "INSERT INTO usage_metrics (package_key, last_access, access_count, updated_at) \
             VALUES (?1, ?2, 1, ?3) \
             ON CONFLICT(package_key) DO UPDATE SET \
                 last_access = MAX(last_access, excluded.last_access), \
                 access_count = access_count + 1, \
                 updated_at = excluded.updated_at",
            params![package_key, at.to_rfc3339(), now],
        )?;
        Ok(())
    }

    /// Record a script execution. Creates the metrics row if the package
    /// has never been seen before; a script run is an access signal too,
    /// so the fresh row's `last_access` is the event time.
    pub fn record_script_execution(&self, package_key: &str, at: DateTime<Utc>) -> Result<()> {
        let at = at.to_rfc3339();
        self.lock().execute(
            "INSERT INTO usage_metrics \
                 (package_key, last_access, last_script_execution, \
                  script_execution_count, updated_at) \
             VALUES (?1, ?2, ?2, 1, ?2) \
             ON CONFLICT(package_key) DO UPDATE SET \
                 last_script_execution = excluded.last_script_execution, \
                 script_execution_count = script_execution_count + 1, \
                 updated_at = excluded.updated_at",
            params![package_key, at],
        )?;
        Ok(())
    }

    /// Record a successful build, creating the metrics row if absent.
    pub fn record_build(&self, package_key: &str, at: DateTime<Utc>) -> Result<()> {
        let at = at.to_rfc3339();
        self.lock().execute(
            "INSERT INTO usage_metrics \
                 (package_key, last_access, last_successful_build, updated_at) \
             VALUES (?1, ?2, ?2, ?2) \
             ON CONFLICT(package_key) DO UPDATE SET \
                 last_successful_build = excluded.last_successful_build, \
                 updated_at = excluded.updated_at",
            params![package_key, at],
        )?;
        Ok(())
    }

    pub fn get_metrics(&self, package_key: &str) -> Result<Option<UsageMetrics>> {
        self.lock()
            .query_row(
                &format!("SELECT {METRICS_COLS} FROM usage_metrics WHERE package_key = ?1"),
                params![package_key],
                metrics_from_row,
            )
            .optional()
    }

    pub fn all_metrics(&self) -> Result<HashMap<String, UsageMetrics>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("SELECT {METRICS_COLS} FROM usage_metrics"))?;
        let rows = stmt.query_map([], metrics_from_row)?;
        let mut map = HashMap::new();
        for row in rows {
            let m = row?;
            map.insert(m.package_key.clone(), m);
        }
        Ok(map)
    }

    // ── Quarantine index ─────────────────────────────────────────

    pub fn insert_quarantine_record(&self, rec: &QuarantineRecord) -> Result<()> {
        self.lock().execute(
            "INSERT INTO quarantine_record \
                 (id, original_path, quarantine_path, checksum, size_bytes, \
                  created_at, status, suspect) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                rec.id,
                rec.original_path,
                rec.quarantine_path,
                rec.checksum,
                rec.size_bytes as i64,
                rec.created_at.to_rfc3339(),
                rec.status.as_str(),
                rec.suspect,
            ],
        )?;
        Ok(())
    }

    pub fn get_quarantine_record(&self, id: &str) -> Result<Option<QuarantineRecord>> {
        self.lock()
            .query_row(
                &format!("SELECT {QUARANTINE_COLS} FROM quarantine_record WHERE id = ?1"),
                params![id],
                quarantine_from_row,
            )
            .optional()
    }

    pub fn list_quarantine_records(&self) -> Result<Vec<QuarantineRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {QUARANTINE_COLS} FROM quarantine_record ORDER BY created_at ASC"
        ))?;
        let rows = stmt.query_map([], quarantine_from_row)?;
        rows.collect()
    }

    /// Most recent active, non-suspect record, for `rollback --latest`.
    pub fn latest_active_quarantine(&self) -> Result<Option<QuarantineRecord>> {
        self.lock()
            .query_row(
                &format!(
                    "SELECT {QUARANTINE_COLS} FROM quarantine_record \
                     WHERE status = 'active' AND suspect = 0 \
                     ORDER BY created_at DESC LIMIT 1"
                ),
                [],
                quarantine_from_row,
            )
            .optional()
    }

    /// Returns false if the record was not active (terminal states stay put).
    pub fn mark_rolled_back(&self, id: &str) -> Result<bool> {
        let changed = self.lock().execute(
            "UPDATE quarantine_record SET status = 'rolled_back' \
             WHERE id = ?1 AND status = 'active'",
            params![id],
        )?;
        Ok(changed > 0)
    }

    pub fn mark_suspect(&self, id: &str) -> Result<()> {
        self.lock().execute(
            "UPDATE quarantine_record SET suspect = 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    pub fn delete_quarantine_record(&self, id: &str) -> Result<()> {
        self.lock().execute(
            "DELETE FROM quarantine_record WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }
}
