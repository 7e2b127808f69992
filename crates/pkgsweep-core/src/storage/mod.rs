pub mod models;
mod queries;
mod sqlite;

pub use models::{QuarantineRecord, QuarantineStatus, UsageMetrics};
pub use sqlite::Database;
