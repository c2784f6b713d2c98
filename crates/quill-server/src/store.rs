//! Single-field entity updates, behind an allow-list.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StoreError {
    /// No row with this id.
    #[error("entity not found: {table}/{id}")]
    NotFound { table: String, id: String },

    /// Table or field is not writable through this store.
    #[error("updates to `{table}.{field}` are not allowed")]
    NotAllowed { table: String, field: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistence collaborator for editor-driven entity edits.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Set `field` of row `id` in `table` to `value`.
    async fn update_entity_field(
        &self,
        table: &str,
        id: &str,
        field: &str,
        value: &Value,
    ) -> Result<(), StoreError>;
}

/// Writable fields per table.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    tables: BTreeMap<String, BTreeSet<String>>,
}

impl AllowList {
    pub fn new(tables: BTreeMap<String, BTreeSet<String>>) -> Self {
        Self { tables }
    }

    pub fn allows(&self, table: &str, field: &str) -> bool {
        is_identifier(table)
            && is_identifier(field)
            && self
                .tables
                .get(table)
                .is_some_and(|fields| fields.contains(field))
    }
}

/// Identifiers are interpolated into SQL, so only plain names pass.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Clone)]
pub struct SqliteEntityStore {
    pool: SqlitePool,
    allow: AllowList,
}

impl SqliteEntityStore {
    /// Open (creating if needed) the database at `path`.
    pub async fn open(path: &Path, allow: AllowList) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory: {}", parent.display()))?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", path.display());
        let options = SqliteConnectOptions::from_str(&database_url)
            .context("parsing database URL")?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("connecting to database")?;

        info!(path = %path.display(), "entity store opened");
        Ok(Self { pool, allow })
    }

    /// In-memory database, for tests.
    pub async fn in_memory(allow: AllowList) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("parsing in-memory database URL")?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("connecting to in-memory database")?;

        Ok(Self { pool, allow })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl EntityStore for SqliteEntityStore {
    async fn update_entity_field(
        &self,
        table: &str,
        id: &str,
        field: &str,
        value: &Value,
    ) -> Result<(), StoreError> {
        if !self.allow.allows(table, field) {
            return Err(StoreError::NotAllowed {
                table: table.to_string(),
                field: field.to_string(),
            });
        }

        let sql = format!(r#"UPDATE "{table}" SET "{field}" = ? WHERE id = ?"#);
        let query = sqlx::query(&sql);
        let query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(flag) => query.bind(*flag),
            Value::Number(number) => match number.as_i64() {
                Some(int) => query.bind(int),
                None => query.bind(number.as_f64()),
            },
            Value::String(text) => query.bind(text.clone()),
            // Structured values are stored as JSON text.
            Value::Array(_) | Value::Object(_) => query.bind(value.to_string()),
        };

        let result = query.bind(id).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                table: table.to_string(),
                id: id.to_string(),
            });
        }

        debug!(table, id, field, "entity field updated");
        Ok(())
    }
}
