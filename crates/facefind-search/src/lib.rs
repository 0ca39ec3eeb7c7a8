//! facefind-search — Multi-source search aggregation.
//!
//! Fans one query out to every configured platform adapter under a
//! concurrency cap, per-source timeout and overall deadline, then merges
//! and ranks whatever the sources return.

pub mod aggregator;
pub mod config;
pub mod report;
pub mod sources;
pub mod tracker;

pub use aggregator::{SearchAggregator, SearchError, SearchOptions};
pub use config::{ConfigError, SearchConfig};
pub use report::{SearchReport, SourceReport, SourceStatus};
pub use sources::catalog_registry;
pub use tracker::{TaskId, TaskState, TaskTracker};
