//! SQLite-backed document store
//!
//! All collections share one `documents` table holding JSON bodies. Indexes
//! are partial expression indexes over `json_extract(body, '$.<field>')`
//! restricted to one collection, so a unique index on `hash` in `Sales` does
//! not constrain any other collection.

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tabfeed_common::checksum::compute_md5;
use tracing::debug;

use super::{matches, DocumentStore, Filter, InsertOutcome};
use crate::error::{StoreError, StoreResult};

const MAX_CONNECTIONS: u32 = 8;

/// [`DocumentStore`] on a SQLite database
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url`, e.g.
    /// `sqlite:tabfeed.db` or `sqlite::memory:`
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let mut options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        // every pooled connection to :memory: would see its own database
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            options = options.journal_mode(SqliteJournalMode::Wal);
            SqlitePoolOptions::new().max_connections(MAX_CONNECTIONS)
        };

        let pool = pool_options.connect_with(options).await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn in_memory() -> StoreResult<Self> {
        Self::connect("sqlite::memory:").await
    }

    async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT NOT NULL,
                body TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents (collection)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// `(id, body)` of every document in `collection` matching `filter`
    async fn select(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<(i64, Value)>> {
        let rows = sqlx::query("SELECT id, body FROM documents WHERE collection = ?1 ORDER BY id")
            .bind(collection)
            .fetch_all(&self.pool)
            .await?;

        let mut selected = Vec::new();
        for row in rows {
            let id: i64 = row.try_get("id")?;
            let body: String = row.try_get("body")?;
            let document: Value = serde_json::from_str(&body)?;
            if matches(&document, filter) {
                selected.push((id, document));
            }
        }
        Ok(selected)
    }
}

/// Field names are spliced into index DDL and JSON paths
fn validate_field(field: &str) -> StoreResult<()> {
    let valid = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName(field.to_string()))
    }
}

fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn index_name(collection: &str, field: &str, unique: bool) -> String {
    let prefix = if unique { "ux" } else { "ix" };
    let digest = compute_md5(collection.as_bytes());
    format!("{}_{}_{}", prefix, &digest[..16], field)
}

fn unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn create(&self, collection: &str, documents: &[Value]) -> StoreResult<InsertOutcome> {
        let mut outcome = InsertOutcome::default();
        if documents.is_empty() {
            return Ok(outcome);
        }

        let mut tx = self.pool.begin().await?;
        for document in documents {
            let body = serde_json::to_string(document)?;
            let result =
                sqlx::query("INSERT OR IGNORE INTO documents (collection, body) VALUES (?1, ?2)")
                    .bind(collection)
                    .bind(body)
                    .execute(&mut *tx)
                    .await?;

            if result.rows_affected() == 0 {
                outcome.duplicates += 1;
            } else {
                outcome.inserted += 1;
            }
        }
        tx.commit().await?;

        Ok(outcome)
    }

    async fn read(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Value>> {
        Ok(self
            .select(collection, filter)
            .await?
            .into_iter()
            .map(|(_, document)| document)
            .collect())
    }

    async fn create_index(&self, collection: &str, field: &str, unique: bool) -> StoreResult<()> {
        validate_field(field)?;

        let ddl = format!(
            "CREATE {}INDEX IF NOT EXISTS \"{}\" ON documents (json_extract(body, '$.{}')) WHERE collection = {}",
            if unique { "UNIQUE " } else { "" },
            index_name(collection, field, unique),
            field,
            sql_literal(collection),
        );
        debug!(collection, field, unique, "Ensuring index");

        sqlx::query(&ddl).execute(&self.pool).await.map_err(|e| {
            if unique_violation(&e) {
                StoreError::Conflict {
                    collection: collection.to_string(),
                    field: field.to_string(),
                }
            } else {
                StoreError::from(e)
            }
        })?;

        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        changes: &Map<String, Value>,
    ) -> StoreResult<u64> {
        let selected = self.select(collection, filter).await?;
        if selected.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for (id, mut document) in selected.iter().cloned() {
            if let Value::Object(fields) = &mut document {
                for (k, v) in changes {
                    fields.insert(k.clone(), v.clone());
                }
            }
            sqlx::query("UPDATE documents SET body = ?1 WHERE id = ?2")
                .bind(serde_json::to_string(&document)?)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    if unique_violation(&e) {
                        StoreError::Conflict {
                            collection: collection.to_string(),
                            field: changes.keys().cloned().collect::<Vec<_>>().join(","),
                        }
                    } else {
                        StoreError::from(e)
                    }
                })?;
        }
        tx.commit().await?;

        Ok(selected.len() as u64)
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let selected = self.select(collection, filter).await?;
        if selected.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for (id, _) in &selected {
            sqlx::query("DELETE FROM documents WHERE id = ?1")
                .bind(*id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(selected.len() as u64)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_field() {
        assert!(validate_field("hash").is_ok());
        assert!(validate_field("file_name2").is_ok());
        assert!(validate_field("").is_err());
        assert!(validate_field("a'b").is_err());
        assert!(validate_field("a.b").is_err());
    }

    #[test]
    fn test_sql_literal_escapes_quotes() {
        assert_eq!(sql_literal("Sales"), "'Sales'");
        assert_eq!(sql_literal("O'Brien"), "'O''Brien'");
    }

    #[test]
    fn test_index_name_is_stable_and_distinct() {
        assert_eq!(index_name("Sales", "hash", true), index_name("Sales", "hash", true));
        assert_ne!(index_name("Sales", "hash", true), index_name("Costs", "hash", true));
        assert_ne!(index_name("Sales", "hash", true), index_name("Sales", "hash", false));
    }
}
