//! Time-windowed statistics for outbound calls to upstream dependencies.
//!
//! # RECORDING INVARIANT
//! `record` must never fail or block on I/O. Instrumentation can never be allowed
//! to break the call site it observes.
//!
//! # WINDOW INVARIANT
//! Events only ever land in the current window. A window displaced into history
//! is shared behind an `Arc` and never written again.

pub mod classifier;
pub mod collector;
pub mod driver;
pub mod error;
pub mod report;
pub mod store;
pub mod window;

pub use classifier::classify;
pub use collector::{CallOutcome, RestoreOutcome, StatsCollector};
pub use driver::StatsDrivers;
pub use error::StatsError;
pub use report::StatisticsReport;
pub use store::{FileSnapshotStore, MemorySnapshotStore, PersistedSnapshot, SnapshotStore};
pub use window::{DomainStats, Window};
