use std::time::{Duration, Instant};

use sqlx::PgPool;

use super::StoreResult;

/// Round-trip latency of a trivial query.
pub(crate) async fn ping(pool: &PgPool) -> StoreResult<Duration> {
    let started = Instant::now();
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(started.elapsed())
}
