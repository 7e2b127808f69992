//! Durable per-package usage tracking.
//!
//! Access, script-execution, and build events accumulate in the sqlite
//! store and survive process restarts. The engine folds these metrics into
//! the predictor's feature extraction on every run.

use crate::error::Result;
use crate::storage::{Database, UsageMetrics};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

pub struct UsageTracker {
    db: Arc<Database>,
}

impl UsageTracker {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Record an access observed at scan time. The stored last-access only
    /// moves forward.
    pub fn record_access(&self, package_key: &str, at: DateTime<Utc>) -> Result<()> {
        self.db.record_access(package_key, at)?;
        Ok(())
    }

    /// Record a script execution (npm run build, npm test, ...).
    pub fn record_script_execution(&self, package_key: &str) -> Result<()> {
        self.db.record_script_execution(package_key, Utc::now())?;
        Ok(())
    }

    /// Record a successful build that exercised this package.
    pub fn record_build(&self, package_key: &str) -> Result<()> {
        self.db.record_build(package_key, Utc::now())?;
        Ok(())
    }

    pub fn metrics(&self, package_key: &str) -> Result<Option<UsageMetrics>> {
        Ok(self.db.get_metrics(package_key)?)
    }

    pub fn all_metrics(&self) -> Result<HashMap<String, UsageMetrics>> {
        Ok(self.db.all_metrics()?)
    }

    /// Explicit reset is the only way tracked metrics are ever deleted.
    pub fn reset(&self) -> Result<()> {
        self.db.reset_usage_metrics()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn tracker() -> UsageTracker {
        UsageTracker::new(Arc::new(Database::open_in_memory().unwrap()))
    }

    #[test]
    fn test_access_accumulates() {
        let t = tracker();
        let now = Utc::now();
        t.record_access("lodash@4.17.21", now - Duration::days(2)).unwrap();
        t.record_access("lodash@4.17.21", now).unwrap();

        let m = t.metrics("lodash@4.17.21").unwrap().unwrap();
        assert_eq!(m.access_count, 2);
        assert!((m.last_access - now).num_seconds().abs() <= 1);
    }

    #[test]
    fn test_last_access_never_regresses() {
        let t = tracker();
        let now = Utc::now();
        t.record_access("react@18.2.0", now).unwrap();
        t.record_access("react@18.2.0", now - Duration::days(30)).unwrap();

        let m = t.metrics("react@18.2.0").unwrap().unwrap();
        assert!((m.last_access - now).num_seconds().abs() <= 1);
    }

    #[test]
    fn test_script_and_build_events() {
        let t = tracker();
        t.record_access("vite@5.0.0", Utc::now()).unwrap();
        t.record_script_execution("vite@5.0.0").unwrap();
        t.record_script_execution("vite@5.0.0").unwrap();
        t.record_build("vite@5.0.0").unwrap();

        let m = t.metrics("vite@5.0.0").unwrap().unwrap();
        assert_eq!(m.script_execution_count, 2);
        assert!(m.last_script_execution.is_some());
        assert!(m.last_successful_build.is_some());
    }

    #[test]
    fn test_events_create_row_without_prior_access() {
        let t = tracker();
        t.record_script_execution("esbuild@0.20.0").unwrap();
        let m = t.metrics("esbuild@0.20.0").unwrap().unwrap();
        assert_eq!(m.script_execution_count, 1);
        assert!(m.last_script_execution.is_some());
        assert_eq!(m.access_count, 0);

        t.record_build("swc@1.4.0").unwrap();
        let m = t.metrics("swc@1.4.0").unwrap().unwrap();
        assert!(m.last_successful_build.is_some());
    }

    #[test]
    fn test_reset_clears_everything() {
        let t = tracker();
        t.record_access("a@1", Utc::now()).unwrap();
        t.reset().unwrap();
        assert!(t.metrics("a@1").unwrap().is_none());
    }
}
