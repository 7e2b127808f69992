use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-package usage metrics, persisted across invocations. Mutated
/// incrementally as events are observed; only an explicit reset deletes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageMetrics {
    /// `name@version` key.
    pub package_key: String,
    pub last_access: DateTime<Utc>,
    pub last_script_execution: Option<DateTime<Utc>>,
    pub last_successful_build: Option<DateTime<Utc>>,
    pub access_count: i64,
    pub script_execution_count: i64,
}

impl UsageMetrics {
    pub fn new(package_key: impl Into<String>, last_access: DateTime<Utc>) -> Self {
        Self {
            package_key: package_key.into(),
            last_access,
            last_script_execution: None,
            last_successful_build: None,
            access_count: 1,
            script_execution_count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuarantineStatus {
    Active,
    RolledBack,
}

impl QuarantineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuarantineStatus::Active => "active",
            QuarantineStatus::RolledBack => "rolled_back",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(QuarantineStatus::Active),
            "rolled_back" => Some(QuarantineStatus::RolledBack),
            _ => None,
        }
    }
}

/// One quarantined directory. `active -> rolled_back` is the only
/// transition; `suspect` is an orthogonal flag set when post-move
/// verification fails (the data is kept, never trusted, never deleted).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantineRecord {
    pub id: String,
    pub original_path: String,
    pub quarantine_path: String,
    /// Payload checksum; absent when quarantined in fast mode.
    pub checksum: Option<String>,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub status: QuarantineStatus,
    pub suspect: bool,
}
