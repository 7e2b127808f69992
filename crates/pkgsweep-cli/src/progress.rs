use pkgsweep_core::ProgressReporter;
use tracing::{debug, info};

/// CLI progress reporter backed by tracing output.
pub struct CliReporter;

impl CliReporter {
    pub fn new() -> Self {
        Self
    }
}

impl ProgressReporter for CliReporter {
    fn on_plan_start(&self, total_packages: usize) {
        info!("Planning over {} packages...", total_packages);
    }

    fn on_package_considered(&self, index: usize, total: usize, package: &str) {
        debug!("[{}/{}] {}", index + 1, total, package);
    }

    fn on_plan_complete(&self, planned: usize, estimated_bytes: u64) {
        info!(
            "Plan complete: {} targets, {} bytes reclaimable",
            planned, estimated_bytes
        );
    }

    fn on_symlink_start(&self, duplicate_groups: usize) {
        info!("Deduplicating {} duplicate groups...", duplicate_groups);
    }

    fn on_symlink_progress(&self, linked: usize, current_path: &str) {
        debug!("linked #{}: {}", linked, current_path);
    }

    fn on_symlink_complete(&self, linked: usize) {
        info!("Symlink pass complete: {} locations linked", linked);
    }
}
