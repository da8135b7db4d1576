use sqlx::SqlitePool;

/// Append-only record of the media URLs the rewriter has emitted, scoped
/// per feed source path. Entries are never removed.
pub struct AllowlistRepository;

impl AllowlistRepository {
    /// Record that `url_token` was emitted for `path_token`.
    ///
    /// Idempotent: the unique index turns re-registration into a no-op,
    /// and the insert is atomic, so concurrent rewrites of the same feed
    /// cannot lose or duplicate entries.
    pub async fn register(
        pool: &SqlitePool,
        path_token: &str,
        url_token: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT OR IGNORE INTO allowlist (path_token, url_token) VALUES ($1, $2)")
            .bind(path_token)
            .bind(url_token)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Whether `url_token` was ever registered under `path_token`.
    pub async fn is_allowed(
        pool: &SqlitePool,
        path_token: &str,
        url_token: &str,
    ) -> Result<bool, sqlx::Error> {
        let allowed: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM allowlist WHERE path_token = $1 AND url_token = $2)",
        )
        .bind(path_token)
        .bind(url_token)
        .fetch_one(pool)
        .await?;
        Ok(allowed)
    }

    /// Number of entries recorded for a feed path.
    pub async fn count_for_path(
        pool: &SqlitePool,
        path_token: &str,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM allowlist WHERE path_token = $1")
            .bind(path_token)
            .fetch_one(pool)
            .await
    }
}
