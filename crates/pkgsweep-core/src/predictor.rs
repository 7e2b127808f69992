//! Predictive keep/evict scoring.
//!
//! The scorer is a fixed-weight logistic model over ten normalized
//! features — deterministic and explainable, not trained at runtime. The
//! [`KeepScore`] trait is the seam where a trained model could be plugged
//! in later without touching the engine.

use crate::records::{PackageRecord, ProjectRecord};
use crate::storage::UsageMetrics;
use chrono::{DateTime, Utc};

/// Neutral value for a feature that cannot be computed (no git history,
/// no tracked events). Evaluation never fails on missing data.
pub const NEUTRAL: f64 = 0.5;

/// Staleness features saturate at one year.
const STALENESS_HORIZON_DAYS: f64 = 365.0;

/// Ten features, each already clipped and normalized to `[0, 1]`.
///
/// Staleness features read "1.0 = maximally stale"; frequency and affinity
/// features read "1.0 = heavily used / strongly relevant".
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub days_since_access: f64,
    pub days_since_script_run: f64,
    pub days_since_build: f64,
    pub access_frequency: f64,
    pub script_frequency: f64,
    pub days_since_commit: f64,
    pub project_affinity: f64,
    pub dependency_count: f64,
    pub days_since_build_activity: f64,
    pub file_access_frequency: f64,
}

impl FeatureVector {
    pub fn neutral() -> Self {
        Self {
            days_since_access: NEUTRAL,
            days_since_script_run: NEUTRAL,
            days_since_build: NEUTRAL,
            access_frequency: NEUTRAL,
            script_frequency: NEUTRAL,
            days_since_commit: NEUTRAL,
            project_affinity: NEUTRAL,
            dependency_count: NEUTRAL,
            days_since_build_activity: NEUTRAL,
            file_access_frequency: NEUTRAL,
        }
    }

    /// Derive features from whatever context is available. Any missing
    /// source (no tracked metrics, no owning project) leaves the affected
    /// features at [`NEUTRAL`].
    pub fn extract(
        record: &PackageRecord,
        metrics: Option<&UsageMetrics>,
        project: Option<&ProjectRecord>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut f = Self::neutral();

        let last_access = metrics
            .map(|m| m.last_access.max(record.last_access))
            .unwrap_or(record.last_access);
        f.days_since_access = staleness(now, Some(last_access));

        if let Some(m) = metrics {
            f.days_since_script_run = staleness(now, m.last_script_execution);
            f.days_since_build = staleness(now, m.last_successful_build);
            f.access_frequency = frequency(m.access_count, 10.0);
            f.script_frequency = frequency(m.script_execution_count, 5.0);
            // file-level access counts are not tracked separately from
            // package accesses; a wider saturation keeps the two distinct
            f.file_access_frequency = frequency(m.access_count, 100.0);
            f.days_since_build_activity = staleness(
                now,
                m.last_successful_build
                    .max(m.last_script_execution),
            );
        }

        if let Some(p) = project {
            // no git history is available here; the project's last
            // modification is the closest durable commit signal
            f.days_since_commit = staleness(now, Some(p.last_modified));
            f.project_affinity = project_affinity(&record.name, p);
            f.dependency_count = frequency(p.dependencies.len() as i64, 50.0);
        }

        f
    }

    pub fn as_array(&self) -> [f64; 10] {
        [
            self.days_since_access,
            self.days_since_script_run,
            self.days_since_build,
            self.access_frequency,
            self.script_frequency,
            self.days_since_commit,
            self.project_affinity,
            self.dependency_count,
            self.days_since_build_activity,
            self.file_access_frequency,
        ]
    }
}

fn staleness(now: DateTime<Utc>, at: Option<DateTime<Utc>>) -> f64 {
    match at {
        Some(at) => {
            let days = (now - at).num_seconds() as f64 / 86_400.0;
            (days / STALENESS_HORIZON_DAYS).clamp(0.0, 1.0)
        }
        None => NEUTRAL,
    }
}

/// `n / (n + k)`: 0 at zero events, saturating toward 1.
fn frequency(count: i64, k: f64) -> f64 {
    let n = count.max(0) as f64;
    n / (n + k)
}

/// How strongly the package matches the project's framework family.
fn project_affinity(package_name: &str, project: &ProjectRecord) -> f64 {
    let has = |needle: &str| {
        project
            .dependencies
            .iter()
            .any(|(name, _)| name == needle)
    };

    let family: &[&str] = if has("react") || has("next") {
        &["react", "react-dom", "next", "scheduler"]
    } else if has("vue") || has("nuxt") {
        &["vue", "nuxt", "@vue/runtime-core"]
    } else if has("@angular/core") {
        &["@angular/core", "@angular/common", "rxjs", "zone.js"]
    } else if has("typescript") {
        &["typescript", "tslib", "ts-node"]
    } else {
        &[]
    };

    if family.contains(&package_name) {
        0.9
    } else if project
        .dependencies
        .iter()
        .any(|(name, _)| name == package_name)
    {
        0.7
    } else {
        NEUTRAL
    }
}

/// Pluggable scoring capability: probability in `[0, 1]` that the package
/// should be kept.
pub trait KeepScore: Send + Sync {
    fn score(&self, features: &FeatureVector) -> f64;
}

/// Fixed-weight logistic scorer.
///
/// Weights are configuration, not learned: negative on staleness features
/// (older means less likely to keep), positive on frequency and affinity.
/// At all-neutral input the score is exactly 0.5.
pub struct PredictiveOptimizer {
    weights: [f64; 10],
    bias: f64,
}

/// Documented default weights, index-aligned with
/// [`FeatureVector::as_array`].
pub const DEFAULT_WEIGHTS: [f64; 10] = [
    -2.0, // days_since_access
    -1.0, // days_since_script_run
    -0.8, // days_since_build
    1.5,  // access_frequency
    1.0,  // script_frequency
    -0.7, // days_since_commit
    0.8,  // project_affinity
    0.4,  // dependency_count
    -0.6, // days_since_build_activity
    0.5,  // file_access_frequency
];

/// Offsets the weighted sum so the all-neutral vector lands on exactly 0.5:
/// `-NEUTRAL * sum(DEFAULT_WEIGHTS)` with the weights summing to -0.9.
const DEFAULT_BIAS: f64 = 0.45;

impl Default for PredictiveOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl PredictiveOptimizer {
    pub fn new() -> Self {
        Self {
            weights: DEFAULT_WEIGHTS,
            bias: DEFAULT_BIAS,
        }
    }

    pub fn with_weights(weights: [f64; 10], bias: f64) -> Self {
        Self { weights, bias }
    }

    pub fn should_keep(&self, features: &FeatureVector, threshold: f64) -> bool {
        self.score(features) >= threshold
    }
}

impl KeepScore for PredictiveOptimizer {
    fn score(&self, features: &FeatureVector) -> f64 {
        let x = features.as_array();
        let z: f64 = self
            .weights
            .iter()
            .zip(x.iter())
            .map(|(w, v)| w * v)
            .sum::<f64>()
            + self.bias;
        sigmoid(z)
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(days_old: i64) -> PackageRecord {
        PackageRecord {
            name: "lodash".into(),
            version: "4.17.21".into(),
            path: "/cache/lodash".into(),
            size_bytes: 1024,
            last_access: Utc::now() - Duration::days(days_old),
            manager: None,
            project_paths: vec![],
        }
    }

    #[test]
    fn test_neutral_scores_half() {
        let scorer = PredictiveOptimizer::new();
        let score = scorer.score(&FeatureVector::neutral());
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_stale_scores_below_fresh() {
        let scorer = PredictiveOptimizer::new();
        let now = Utc::now();
        let fresh = FeatureVector::extract(&record(1), None, None, now);
        let stale = FeatureVector::extract(&record(400), None, None, now);
        assert!(scorer.score(&stale) < scorer.score(&fresh));
    }

    #[test]
    fn test_staleness_clipped_to_unit_range() {
        let now = Utc::now();
        let f = FeatureVector::extract(&record(10_000), None, None, now);
        assert_eq!(f.days_since_access, 1.0);
        for v in f.as_array() {
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_missing_context_defaults_neutral() {
        let now = Utc::now();
        let f = FeatureVector::extract(&record(5), None, None, now);
        assert_eq!(f.days_since_commit, NEUTRAL);
        assert_eq!(f.project_affinity, NEUTRAL);
        assert_eq!(f.days_since_script_run, NEUTRAL);
    }

    #[test]
    fn test_should_keep_threshold() {
        let scorer = PredictiveOptimizer::new();
        let mut hot = FeatureVector::neutral();
        hot.days_since_access = 0.0;
        hot.access_frequency = 0.9;
        assert!(scorer.should_keep(&hot, 0.5));

        let mut cold = FeatureVector::neutral();
        cold.days_since_access = 1.0;
        cold.access_frequency = 0.0;
        cold.days_since_script_run = 1.0;
        assert!(!scorer.should_keep(&cold, 0.5));
    }

    #[test]
    fn test_framework_affinity() {
        let project = ProjectRecord {
            path: "/work/app".into(),
            manager: None,
            dependencies: vec![
                ("react".into(), "18.2.0".into()),
                ("lodash".into(), "4.17.21".into()),
            ],
            last_modified: Utc::now(),
        };
        let mut rec = record(1);
        rec.name = "react-dom".into();
        let f = FeatureVector::extract(&rec, None, Some(&project), Utc::now());
        assert!((f.project_affinity - 0.9).abs() < 1e-9);

        let f = FeatureVector::extract(&record(1), None, Some(&project), Utc::now());
        assert!((f.project_affinity - 0.7).abs() < 1e-9);
    }
}
