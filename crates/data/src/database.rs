use capflow_core::{DatabaseConfig, PersistenceError, PersistenceResult};
use sqlx::{postgres::PgPoolOptions, PgPool};

/// Opens a connection pool to the configured `PostgreSQL` database.
///
/// # Errors
/// Returns an error if the database connection cannot be established.
pub async fn connect(config: &DatabaseConfig) -> PersistenceResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .connect(&config.url)
        .await
        .map_err(PersistenceError::database)
}
