pub mod config;
pub mod services;
pub mod stats;

// Re-export the pieces every embedding process needs
pub use config::{CollectorConfig, FetchConfig};
pub use stats::{StatsCollector, StatsDrivers};
