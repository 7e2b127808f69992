pub mod lru;
pub mod usage;

pub use lru::PackageLruCache;
pub use usage::UsageTracker;
