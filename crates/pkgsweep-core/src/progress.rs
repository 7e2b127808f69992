/// Trait for reporting engine progress.
///
/// The CLI implements this with tracing output; library consumers can plug
/// their own. All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_plan_start(&self, _total_packages: usize) {}
    fn on_package_considered(&self, _index: usize, _total: usize, _package: &str) {}
    fn on_plan_complete(&self, _planned: usize, _estimated_bytes: u64) {}
    fn on_symlink_start(&self, _duplicate_groups: usize) {}
    fn on_symlink_progress(&self, _linked: usize, _current_path: &str) {}
    fn on_symlink_complete(&self, _linked: usize) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
