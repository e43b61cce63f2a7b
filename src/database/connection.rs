use std::{str::FromStr, time::Duration};

use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Sqlite,
};

use super::error::QueryError;
use crate::constants::DATABASE_BUSY_TIMEOUT_SECONDS;

pub fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// Opens the pool with foreign keys enforced on every connection.
///
/// An in-memory database lives and dies with its connection, so it gets a
/// single connection that is never recycled.
pub async fn connect(url: &str, max_connections: u32) -> Result<Pool<Sqlite>, QueryError> {
    let options = SqliteConnectOptions::from_str(url)
        .map_err(QueryError::from)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(DATABASE_BUSY_TIMEOUT_SECONDS));

    let pool = if is_in_memory(url) {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(max_connections.max(1))
    };

    let pool = pool
        .connect_with(options)
        .await
        .map_err(QueryError::from)?;

    log::info!("Connected to {url}");
    Ok(pool)
}

pub async fn migrate(pool: &Pool<Sqlite>) -> Result<(), QueryError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| QueryError::new(format!("Migration failed: {e}")))?;

    log::info!("Database schema is up to date");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_in_memory_urls() {
        assert!(is_in_memory("sqlite::memory:"));
        assert!(is_in_memory("sqlite://pantry.db?mode=memory&cache=shared"));
        assert!(!is_in_memory("sqlite://pantry.db"));
    }
}
