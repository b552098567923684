//! Background job scheduler and job implementations.

mod expire_sessions;
mod pool_metrics;
mod scheduler;

pub use expire_sessions::ExpireSessionsJob;
pub use pool_metrics::PoolMetricsJob;
pub use scheduler::{Job, JobFrequency, JobScheduler};
