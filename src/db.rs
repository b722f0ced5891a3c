//! SQLite pool backing the search indices.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use crate::config::{default_busy_timeout_secs, default_max_connections, Config};

pub async fn connect(config: &Config) -> Result<SqlitePool> {
    open(
        &config.db.path,
        config.db.max_connections,
        Duration::from_secs(config.db.busy_timeout_secs),
    )
    .await
}

/// Opens the database at `path` with the default pool settings.
pub async fn connect_path(path: &Path) -> Result<SqlitePool> {
    open(
        path,
        default_max_connections(),
        Duration::from_secs(default_busy_timeout_secs()),
    )
    .await
}

async fn open(path: &Path, max_connections: u32, busy_timeout: Duration) -> Result<SqlitePool> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }

    // Index builds hold a write transaction per bulk; readers wait on WAL
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(busy_timeout);

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open search database: {}", path.display()))
}
