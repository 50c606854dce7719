//! Local SQLite persistence for auth-instance credentials, so a signed-in
//! session survives an application restart.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

use shared::{domain::UserId, protocol::PersistedCredentials};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid sqlite url '{database_url}'"))?
            .create_if_missing(true);
        // Every connection to `sqlite::memory:` opens its own database.
        let max_connections = if is_memory_url(database_url) { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open sqlite database '{database_url}'"))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run session storage migrations")?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn save_credentials(
        &self,
        instance: &str,
        credentials: &PersistedCredentials,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO auth_sessions (instance, uid, email, id_token, refresh_token, expires_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(instance) DO UPDATE SET
                uid = excluded.uid,
                email = excluded.email,
                id_token = excluded.id_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                updated_at = CURRENT_TIMESTAMP",
        )
        .bind(instance)
        .bind(credentials.uid.as_str())
        .bind(&credentials.email)
        .bind(&credentials.id_token)
        .bind(&credentials.refresh_token)
        .bind(credentials.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to persist credentials for instance '{instance}'"))?;
        debug!(instance, uid = %credentials.uid, "storage: persisted credentials");
        Ok(())
    }

    pub async fn load_credentials(&self, instance: &str) -> Result<Option<PersistedCredentials>> {
        let row = sqlx::query(
            "SELECT uid, email, id_token, refresh_token, expires_at
             FROM auth_sessions WHERE instance = ?",
        )
        .bind(instance)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to load credentials for instance '{instance}'"))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let expires_at: String = row.try_get("expires_at")?;
        let expires_at = DateTime::parse_from_rfc3339(&expires_at)
            .with_context(|| format!("corrupt expires_at '{expires_at}' for '{instance}'"))?
            .with_timezone(&Utc);

        Ok(Some(PersistedCredentials {
            uid: UserId(row.try_get("uid")?),
            email: row.try_get("email")?,
            id_token: row.try_get("id_token")?,
            refresh_token: row.try_get("refresh_token")?,
            expires_at,
        }))
    }

    /// Removing credentials that were never stored is not an error.
    pub async fn clear_credentials(&self, instance: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM auth_sessions WHERE instance = ?")
            .bind(instance)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to clear credentials for instance '{instance}'"))?;
        Ok(result.rows_affected() > 0)
    }
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_memory_url(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
