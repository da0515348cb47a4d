/// Error returned by the PostgreSQL helpers.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[cfg(feature = "postgres")]
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sea_orm::DbErr),

    /// `SELECT 1` did not come back
    #[error("Health check failed: {0}")]
    HealthCheckFailed(String),
}
