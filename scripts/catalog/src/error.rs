use thiserror::Error;

/// Errors from the catalog store. A database error here means the backend
/// itself failed; callers treat it as fatal for the remaining work, unlike
/// row-level problems which are collected into result reports.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
