//! # Database Persistence Layer
//!
//! Optional Postgres write-through via SQLx. When `DATABASE_URL` is set,
//! every committed catalog and application mutation is written before the
//! in-memory state is replaced, and the full state is loaded back on
//! startup. When absent, the service runs in-memory only.
//!
//! Business rules are enforced by the service. The schema only guards
//! identity and uniqueness.

pub mod applications;
pub mod catalog;

use sqlx::postgres::{PgPool, PgPoolOptions};

/// Connect and run migrations. `None` when `DATABASE_URL` is not set.
pub async fn init_pool() -> Result<Option<PgPool>, sqlx::Error> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            tracing::warn!(
                "DATABASE_URL not set, running in-memory only. \
                 Applications and uploads metadata will not survive restarts."
            );
            return Ok(None);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}

/// Map a serialization failure into the sqlx error space.
pub(crate) fn encode_error(what: &str, e: impl std::fmt::Display) -> sqlx::Error {
    sqlx::Error::Protocol(format!("failed to serialize {what}: {e}"))
}

/// Unsigned counters are stored as BIGINT.
pub(crate) fn to_db_int(value: u32) -> i64 {
    i64::from(value)
}

pub(crate) fn from_db_int(value: i64) -> Option<u32> {
    u32::try_from(value).ok()
}
