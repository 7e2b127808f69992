//! Boundary data model shared with the scanner and CLI layers.
//!
//! The scanner feeds the engine a [`ScanResult`]; the engine's only output
//! of the decision phase is a [`CleanupPlan`]. Both are plain serde shapes
//! so the surrounding glue can move them as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManagerKind {
    Npm,
    Yarn,
    Pnpm,
}

/// Package identity: a `(name, version)` pair. Paths are not part of the
/// identity — the same package version may be cached at many locations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageId {
    pub name: String,
    pub version: String,
}

impl PackageId {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// A cached package directory discovered by the scanner.
/// Read-only to the core; superseded on each scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    pub path: String,
    pub size_bytes: u64,
    pub last_access: DateTime<Utc>,
    pub manager: Option<ManagerKind>,
    #[serde(default)]
    pub project_paths: Vec<String>,
}

impl PackageRecord {
    pub fn id(&self) -> PackageId {
        PackageId::new(self.name.clone(), self.version.clone())
    }

    /// A record the engine can act on. Malformed records are skipped and
    /// counted rather than failing the whole run.
    pub fn is_well_formed(&self) -> bool {
        !self.name.is_empty() && !self.version.is_empty() && !self.path.is_empty()
    }
}

/// A project root discovered by the scanner, with its resolved dependency
/// map. Used to compute orphaned status and predictor context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub path: String,
    pub manager: Option<ManagerKind>,
    /// name -> version pairs from the project's lock file.
    #[serde(default)]
    pub dependencies: Vec<(String, String)>,
    pub last_modified: DateTime<Utc>,
}

/// One filesystem snapshot, as handed over by the scanner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanResult {
    #[serde(default)]
    pub packages: Vec<PackageRecord>,
    #[serde(default)]
    pub projects: Vec<ProjectRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupReason {
    Orphaned,
    Old,
    MlPredictedUnused,
    SizePressure,
    DuplicateSymlinkCandidate,
}

impl fmt::Display for CleanupReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CleanupReason::Orphaned => "orphaned",
            CleanupReason::Old => "old",
            CleanupReason::MlPredictedUnused => "ml_predicted_unused",
            CleanupReason::SizePressure => "size_pressure",
            CleanupReason::DuplicateSymlinkCandidate => "duplicate_symlink_candidate",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupItem {
    pub target_path: String,
    pub estimated_size_bytes: u64,
    pub reason: CleanupReason,
}

/// The engine's decision-phase output. Produced once, never mutated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupPlan {
    pub items: Vec<CleanupItem>,
    pub total_estimated_bytes: u64,
    /// Count of malformed scanner records that were skipped.
    #[serde(default)]
    pub skipped: usize,
}

/// Outcome of a symlink execution pass: `status` is `"ok"` or `"error"`.
#[derive(Debug, Clone, Serialize)]
pub struct SymlinkReport {
    pub status: String,
    pub symlinked_count: usize,
}

/// Outcome of a rollback: `status` is `"ok"` or `"error"`.
#[derive(Debug, Clone, Serialize)]
pub struct RollbackReport {
    pub status: String,
    pub id: String,
}

/// One successfully quarantined target; quarantine output is a JSON
/// sequence of these.
#[derive(Debug, Clone, Serialize)]
pub struct QuarantineEntry {
    pub id: String,
    pub original_path: String,
    pub size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_result_json_shape() {
        let json = r#"{
            "packages": [{
                "name": "lodash",
                "version": "4.17.21",
                "path": "/cache/npm/lodash",
                "size_bytes": 52428800,
                "last_access": "2026-05-01T00:00:00Z",
                "manager": "npm"
            }],
            "projects": [{
                "path": "/work/app",
                "manager": "npm",
                "dependencies": [["react", "18.2.0"]],
                "last_modified": "2026-08-01T00:00:00Z"
            }]
        }"#;
        let scan: ScanResult = serde_json::from_str(json).unwrap();
        assert_eq!(scan.packages.len(), 1);
        assert_eq!(scan.packages[0].manager, Some(ManagerKind::Npm));
        assert!(scan.packages[0].project_paths.is_empty());
        assert_eq!(scan.projects[0].dependencies[0].0, "react");
    }

    #[test]
    fn test_reason_serializes_snake_case() {
        let s = serde_json::to_string(&CleanupReason::MlPredictedUnused).unwrap();
        assert_eq!(s, "\"ml_predicted_unused\"");
        assert_eq!(CleanupReason::SizePressure.to_string(), "size_pressure");
    }

    #[test]
    fn test_report_shapes_match_boundary_contract() {
        let symlink = serde_json::to_value(SymlinkReport {
            status: "ok".into(),
            symlinked_count: 3,
        })
        .unwrap();
        assert_eq!(symlink["status"], "ok");
        assert_eq!(symlink["symlinked_count"], 3);

        let rollback = serde_json::to_value(RollbackReport {
            status: "ok".into(),
            id: "abc-123".into(),
        })
        .unwrap();
        assert_eq!(rollback["status"], "ok");
        assert_eq!(rollback["id"], "abc-123");

        let entries = serde_json::to_value(vec![QuarantineEntry {
            id: "abc-123".into(),
            original_path: "/cache/lodash".into(),
            size_bytes: 42,
        }])
        .unwrap();
        assert_eq!(entries[0]["id"], "abc-123");
        assert_eq!(entries[0]["original_path"], "/cache/lodash");
        assert_eq!(entries[0]["size_bytes"], 42);
    }

    #[test]
    fn test_well_formed_rejects_blank_fields() {
        let rec = PackageRecord {
            name: String::new(),
            version: "1.0.0".into(),
            path: "/cache/x".into(),
            size_bytes: 1,
            last_access: Utc::now(),
            manager: None,
            project_paths: vec![],
        };
        assert!(!rec.is_well_formed());
    }
}
