//! Query and pool metrics for the PostgreSQL store.

use metrics::{gauge, histogram};
use sqlx::PgPool;
use std::time::Instant;

/// Records how long a named query took.
pub fn record_query_duration(query_name: &str, duration_secs: f64) {
    histogram!(
        "database_query_duration_seconds",
        "query" => query_name.to_string()
    )
    .record(duration_secs);
}

/// Records pool size gauges. Called from the readiness check.
pub fn record_pool_metrics(pool: &PgPool) {
    let size = pool.size() as usize;
    let idle = pool.num_idle();
    let active = size.saturating_sub(idle);

    gauge!("database_connections_active").set(active as f64);
    gauge!("database_connections_idle").set(idle as f64);
    gauge!("database_connections_total").set(size as f64);
}

/// Times one store operation.
///
/// ```ignore
/// let timer = QueryTimer::new("find_locations_in_range");
/// let rows = sqlx::query_as::<_, LocationEntity>(...).fetch_all(&pool).await;
/// timer.record();
/// ```
pub struct QueryTimer {
    query_name: String,
    start: Instant,
}

impl QueryTimer {
    pub fn new(query_name: impl Into<String>) -> Self {
        Self {
            query_name: query_name.into(),
            start: Instant::now(),
        }
    }

    pub fn record(self) {
        let duration = self.start.elapsed().as_secs_f64();
        record_query_duration(&self.query_name, duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_timer_creation() {
        let timer = QueryTimer::new("find_locations_in_range");
        assert_eq!(timer.query_name, "find_locations_in_range");
    }

    #[test]
    fn test_query_timer_records_without_recorder() {
        let timer = QueryTimer::new(String::from("latest_locations_for_owners"));
        assert_eq!(timer.query_name, "latest_locations_for_owners");
        timer.record();
    }
}
