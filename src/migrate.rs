use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Creates the search tables on `pool`. Safe to run repeatedly.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // One row per (version, index type); its presence means the index exists
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS search_indices (
            version TEXT NOT NULL,
            index_type TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (version, index_type)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS search_documents (
            id INTEGER PRIMARY KEY,
            version TEXT NOT NULL,
            index_type TEXT NOT NULL,
            doc_id TEXT NOT NULL,
            title TEXT,
            body TEXT NOT NULL,
            UNIQUE (version, index_type, doc_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS search_aliases (
            alias TEXT PRIMARY KEY,
            version TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Searchable tokens of each document, keyed by search_documents.id.
    // The ascii tokenizer splits only on the spaces between stored tokens.
    if !table_exists(pool, "search_fts").await? {
        sqlx::query("CREATE VIRTUAL TABLE search_fts USING fts5(tokens, tokenize = 'ascii')")
            .execute(pool)
            .await?;
    }

    // Distinct indexed terms, for expanding fuzzy query terms
    if !table_exists(pool, "search_terms").await? {
        sqlx::query("CREATE VIRTUAL TABLE search_terms USING fts5vocab(search_fts, 'row')")
            .execute(pool)
            .await?;
    }

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_search_documents_version \
         ON search_documents(version, index_type)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn table_exists(pool: &SqlitePool, name: &str) -> Result<bool> {
    Ok(sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?",
    )
    .bind(name)
    .fetch_one(pool)
    .await?)
}
