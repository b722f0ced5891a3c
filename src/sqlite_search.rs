//! SQLite-backed [`SearchProvider`].
//!
//! Documents are stored as JSON text keyed by `(version, index_type,
//! doc_id)`; the `search_indices` table records which indices exist. Bulk
//! writes and the index marker share one transaction, so an index never
//! becomes visible half-written.
//!
//! Each document's searchable tokens also go into the `search_fts` FTS5
//! table. A query is expanded against the indexed vocabulary with the shared
//! term matching rules, so `MATCH` returns exactly the documents that can
//! score above zero. Those candidates are then ranked in Rust by
//! [`segue_content_core::search::ranking`], which keeps results identical to
//! the in-memory backend.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::debug;

use segue_content_core::error::{SearchError, SearchResult};
use segue_content_core::search::ranking;
use segue_content_core::search::{
    IndexDocument, IndexName, IndexType, ResultsWrapper, SearchFilters, SearchProvider,
};

pub struct SqliteSearchProvider {
    pool: SqlitePool,
}

impl SqliteSearchProvider {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_bodies(
        &self,
        version: &str,
        index_type: IndexType,
        id_prefix: Option<&str>,
    ) -> SearchResult<Vec<Value>> {
        let rows = match id_prefix {
            Some(prefix) => {
                sqlx::query(
                    "SELECT body FROM search_documents \
                     WHERE version = ? AND index_type = ? AND substr(doc_id, 1, length(?)) = ?",
                )
                .bind(version)
                .bind(index_type.as_str())
                .bind(prefix)
                .bind(prefix)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT body FROM search_documents WHERE version = ? AND index_type = ?",
                )
                .bind(version)
                .bind(index_type.as_str())
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(db_error)?;

        parse_bodies(&rows)
    }

    /// Builds an FTS5 expression matching every token any of `terms` can
    /// match, or `None` when nothing indexed can.
    async fn match_expression(&self, terms: &[String]) -> SearchResult<Option<String>> {
        let min_len = terms
            .iter()
            .map(|t| {
                let len = t.chars().count();
                len.saturating_sub(ranking::allowed_edits(len))
            })
            .min()
            .unwrap_or(0);
        let vocabulary: Vec<String> =
            sqlx::query_scalar("SELECT term FROM search_terms WHERE length(term) >= ?")
                .bind(min_len as i64)
                .fetch_all(&self.pool)
                .await
                .map_err(db_error)?;

        let mut clauses = BTreeSet::new();
        for term in terms {
            // A single-token term covers its prefix matches with one clause
            let single_token = term.chars().all(char::is_alphanumeric);
            if single_token {
                clauses.insert(format!("\"{}\"*", term));
            }
            for word in &vocabulary {
                if single_token && word.starts_with(term.as_str()) {
                    continue;
                }
                if ranking::term_matches(term, word) {
                    clauses.insert(format!("\"{}\"", word));
                }
            }
        }

        if clauses.is_empty() {
            return Ok(None);
        }
        Ok(Some(clauses.into_iter().collect::<Vec<_>>().join(" OR ")))
    }

    async fn fetch_matching(
        &self,
        version: &str,
        index_type: IndexType,
        expression: &str,
    ) -> SearchResult<Vec<Value>> {
        let rows = sqlx::query(
            "SELECT d.body FROM search_fts \
             JOIN search_documents d ON d.id = search_fts.rowid \
             WHERE search_fts MATCH ? AND d.version = ? AND d.index_type = ?",
        )
        .bind(expression)
        .bind(version)
        .bind(index_type.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        parse_bodies(&rows)
    }
}

fn parse_bodies(rows: &[SqliteRow]) -> SearchResult<Vec<Value>> {
    rows.iter()
        .map(|row| {
            let body: String = row.get("body");
            serde_json::from_str(&body).map_err(SearchError::from)
        })
        .collect()
}

fn db_error(err: sqlx::Error) -> SearchError {
    SearchError::Database(err.to_string())
}

async fn mark_index(
    tx: &mut Transaction<'_, Sqlite>,
    version: &str,
    index_type: IndexType,
) -> SearchResult<()> {
    sqlx::query(
        "INSERT OR IGNORE INTO search_indices (version, index_type, created_at) VALUES (?, ?, ?)",
    )
    .bind(version)
    .bind(index_type.as_str())
    .bind(Utc::now().timestamp())
    .execute(&mut **tx)
    .await
    .map_err(db_error)?;
    Ok(())
}

async fn upsert_document(
    tx: &mut Transaction<'_, Sqlite>,
    version: &str,
    index_type: IndexType,
    id: &str,
    document: &Value,
) -> SearchResult<()> {
    let title = document.get("title").and_then(Value::as_str);
    let body = serde_json::to_string(document)?;
    let row_id: i64 = sqlx::query_scalar(
        "INSERT INTO search_documents (version, index_type, doc_id, title, body) \
         VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT (version, index_type, doc_id) \
         DO UPDATE SET title = excluded.title, body = excluded.body \
         RETURNING id",
    )
    .bind(version)
    .bind(index_type.as_str())
    .bind(id)
    .bind(title)
    .bind(body)
    .fetch_one(&mut **tx)
    .await
    .map_err(db_error)?;

    sqlx::query("DELETE FROM search_fts WHERE rowid = ?")
        .bind(row_id)
        .execute(&mut **tx)
        .await
        .map_err(db_error)?;
    sqlx::query("INSERT INTO search_fts (rowid, tokens) VALUES (?, ?)")
        .bind(row_id)
        .bind(ranking::searchable_tokens(document).join(" "))
        .execute(&mut **tx)
        .await
        .map_err(db_error)?;
    Ok(())
}

#[async_trait]
impl SearchProvider for SqliteSearchProvider {
    async fn has_index(&self, version: &str, index_type: IndexType) -> SearchResult<bool> {
        sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM search_indices WHERE version = ? AND index_type = ?",
        )
        .bind(version)
        .bind(index_type.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn index_object(
        &self,
        version: &str,
        index_type: IndexType,
        id: &str,
        document: &Value,
    ) -> SearchResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        upsert_document(&mut tx, version, index_type, id, document).await?;
        mark_index(&mut tx, version, index_type).await?;
        tx.commit().await.map_err(db_error)
    }

    async fn bulk_index(
        &self,
        version: &str,
        index_type: IndexType,
        documents: &[IndexDocument],
    ) -> SearchResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        for doc in documents {
            upsert_document(&mut tx, version, index_type, &doc.id, &doc.body).await?;
        }
        mark_index(&mut tx, version, index_type).await?;
        tx.commit().await.map_err(db_error)?;
        debug!(version, index = %index_type, count = documents.len(), "Bulk indexed documents");
        Ok(())
    }

    async fn get_by_id(
        &self,
        version: &str,
        index_type: IndexType,
        id: &str,
    ) -> SearchResult<Option<Value>> {
        let body: Option<String> = sqlx::query_scalar(
            "SELECT body FROM search_documents WHERE version = ? AND index_type = ? AND doc_id = ?",
        )
        .bind(version)
        .bind(index_type.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        body.map(|b| serde_json::from_str(&b).map_err(SearchError::from))
            .transpose()
    }

    async fn fuzzy_search(
        &self,
        version: &str,
        index_type: IndexType,
        query: &str,
        filters: &SearchFilters,
        start: usize,
        limit: usize,
    ) -> SearchResult<ResultsWrapper<Value>> {
        let terms = ranking::query_terms(query);
        let docs = if terms.is_empty() {
            self.fetch_bodies(version, index_type, None).await?
        } else {
            match self.match_expression(&terms).await? {
                Some(expression) => self.fetch_matching(version, index_type, &expression).await?,
                None => return Ok(ResultsWrapper::empty()),
            }
        };
        Ok(ranking::rank(docs, query, filters, start, limit))
    }

    async fn find_by_prefix(
        &self,
        version: &str,
        index_type: IndexType,
        field: &str,
        prefix: &str,
        filters: &SearchFilters,
        start: usize,
        limit: usize,
    ) -> SearchResult<ResultsWrapper<Value>> {
        // doc_id mirrors the `id` field, so id prefixes narrow in SQL
        let id_prefix = (field == "id").then_some(prefix);
        let docs = self.fetch_bodies(version, index_type, id_prefix).await?;
        Ok(ranking::prefix_match(docs, field, prefix, filters, start, limit))
    }

    async fn list_indices(&self) -> SearchResult<Vec<IndexName>> {
        let rows = sqlx::query(
            "SELECT version, index_type FROM search_indices ORDER BY version, index_type",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let mut names: Vec<IndexName> = rows
            .iter()
            .filter_map(|row| {
                let version: String = row.get("version");
                let index_type: String = row.get("index_type");
                IndexType::parse(&index_type).map(|index_type| IndexName {
                    version,
                    index_type,
                })
            })
            .collect();
        names.sort();
        Ok(names)
    }

    async fn expunge_index(&self, version: &str) -> SearchResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        for sql in [
            "DELETE FROM search_fts WHERE rowid IN \
             (SELECT id FROM search_documents WHERE version = ?)",
            "DELETE FROM search_documents WHERE version = ?",
            "DELETE FROM search_indices WHERE version = ?",
            "DELETE FROM search_aliases WHERE version = ?",
        ] {
            sqlx::query(sql)
                .bind(version)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
        }
        tx.commit().await.map_err(db_error)
    }

    async fn add_or_move_alias(&self, alias: &str, version: &str) -> SearchResult<()> {
        sqlx::query(
            "INSERT INTO search_aliases (alias, version) VALUES (?, ?) \
             ON CONFLICT(alias) DO UPDATE SET version = excluded.version",
        )
        .bind(alias)
        .bind(version)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn resolve_alias(&self, alias: &str) -> SearchResult<Option<String>> {
        sqlx::query_scalar("SELECT version FROM search_aliases WHERE alias = ?")
            .bind(alias)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)
    }
}
