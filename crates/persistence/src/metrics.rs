//! Database metrics collection.

use metrics::{gauge, histogram};
use sqlx::PgPool;
use std::time::Instant;

/// Queries slower than this are logged.
const SLOW_QUERY_SECS: f64 = 0.5;

/// Record database query duration.
pub fn record_query_duration(query_name: &str, duration_secs: f64) {
    histogram!(
        "database_query_duration_seconds",
        "query" => query_name.to_string()
    )
    .record(duration_secs);
}

/// Record connection pool gauges. Called periodically by the pool metrics job.
pub fn record_pool_metrics(pool: &PgPool) {
    let size = pool.size() as usize;
    let idle = pool.num_idle();

    gauge!("database_connections_active").set(size.saturating_sub(idle) as f64);
    gauge!("database_connections_idle").set(idle as f64);
    gauge!("database_connections_total").set(size as f64);
}

/// Times a repository call.
///
/// ```ignore
/// let timer = QueryTimer::new("find_verification_session_by_token");
/// let result = sqlx::query_as::<_, VerificationSessionEntity>(...).fetch_optional(&pool).await;
/// timer.record();
/// result
/// ```
pub struct QueryTimer {
    query_name: &'static str,
    start: Instant,
}

impl QueryTimer {
    pub fn new(query_name: &'static str) -> Self {
        Self {
            query_name,
            start: Instant::now(),
        }
    }

    /// Record the elapsed duration to metrics.
    pub fn record(self) {
        let elapsed = self.start.elapsed().as_secs_f64();
        if elapsed > SLOW_QUERY_SECS {
            tracing::warn!(
                query = self.query_name,
                elapsed_ms = (elapsed * 1000.0) as u64,
                "Slow database query"
            );
        }
        record_query_duration(self.query_name, elapsed);
    }
}
