pub mod schema;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
};
use sqlx::Row;
use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, error, info, warn};

use crate::models::errors::StorageError;
use crate::models::events::{EventRecord, OnConflict, BLOCK_NUMBER_FIELD};
use crate::storage::CollectionKey;
use crate::storage::sqlite::schema::{table_schema, TableSchema, ROW_KEY_COLUMN};

/// SQLite-backed event store. One table per collection, created on first write.
///
/// The pool holds a single connection: the store assumes one writer per
/// collection and keeps every batch inside one transaction.
#[derive(Clone)]
pub struct EventStore {
    pool: SqlitePool,
}

impl EventStore {
    pub async fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::Database(sqlx::Error::Io(e)))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        info!("Opened event store at {}", path.to_string_lossy());
        Ok(Self { pool })
    }

    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        // An in-memory database lives as long as its connection, so never recycle it
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(table)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>(0)? > 0)
    }

    pub async fn tables(&self) -> Result<Vec<String>, StorageError> {
        let rows = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>(0).map_err(StorageError::from))
            .collect()
    }

    // Highest all-digit block number in the collection, 0 when there is none
    pub async fn max_block(&self, key: &CollectionKey) -> Result<u64, StorageError> {
        let table = key.table_name();
        if !self.table_exists(&table).await? {
            return Ok(0);
        }

        let column = format!("trim({})", quote(BLOCK_NUMBER_FIELD));
        let query = format!(
            "SELECT MAX(CAST({0} AS INTEGER)) FROM {1} WHERE {0} GLOB '[0-9]*' AND {0} NOT GLOB '*[^0-9]*'",
            column,
            quote(&table)
        );
        let max_block: Option<i64> = sqlx::query_scalar(&query).fetch_one(&self.pool).await?;
        let max_block = max_block.map_or(0, |b| b.max(0) as u64);

        debug!("Max block for {}: {}", table, max_block);
        Ok(max_block)
    }

    pub async fn count(&self, key: &CollectionKey) -> Result<u64, StorageError> {
        let table = key.table_name();
        if !self.table_exists(&table).await? {
            return Ok(0);
        }

        let row = sqlx::query(&format!("SELECT COUNT(*) FROM {}", quote(&table)))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>(0)? as u64)
    }

    /// Insert `records` into the collection in a single transaction.
    ///
    /// With [`OnConflict::Reject`] a duplicate key aborts the whole batch and
    /// returns [`StorageError::Conflict`] carrying the row already stored under
    /// that key. With [`OnConflict::Overwrite`] the existing row is updated in
    /// place and keeps its position in the collection.
    pub async fn append(
        &self,
        key: &CollectionKey,
        records: &[EventRecord],
        on_conflict: OnConflict,
    ) -> Result<usize, StorageError> {
        if records.is_empty() {
            return Ok(0);
        }

        let schema = table_schema(key.kind());
        let table = key.table_name();
        let insert = insert_statement(&table, schema, on_conflict);

        let mut tx = self.pool.begin().await?;
        sqlx::query(&create_table_statement(&table, schema))
            .execute(&mut *tx)
            .await?;

        let unknown: BTreeSet<&str> = records
            .iter()
            .flat_map(|record| schema.unknown_fields(record))
            .collect();
        if !unknown.is_empty() {
            warn!(
                "Dropping fields with no column in {}: {}",
                table,
                unknown.into_iter().collect::<Vec<_>>().join(", ")
            );
        }

        for record in records {
            let row_key = schema
                .row_key(record)
                .map_err(|field| StorageError::MissingKeyField {
                    table: table.clone(),
                    field,
                })?;

            let mut query = sqlx::query(&insert).bind(row_key.as_str());
            for column in schema.column_names() {
                query = query.bind(record.get(column));
            }

            let result = query.execute(&mut *tx).await;
            match result {
                Ok(_) => {}
                Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                    let existing = fetch_row(&mut *tx, &table, schema, &row_key)
                        .await?
                        .unwrap_or_default();
                    tx.rollback().await?;
                    error!(
                        "Tried to insert {:?} in table {} but the key '{}' is occupied: {:?}",
                        record, table, row_key, existing
                    );
                    return Err(StorageError::Conflict {
                        table,
                        key: row_key,
                        existing,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        tx.commit().await?;
        debug!("Appended {} rows to {}", records.len(), table);
        Ok(records.len())
    }

    // Rows in insertion order, empty when the collection was never written
    pub async fn all(&self, key: &CollectionKey) -> Result<Vec<EventRecord>, StorageError> {
        let schema = table_schema(key.kind());
        let table = key.table_name();
        if !self.table_exists(&table).await? {
            return Ok(Vec::new());
        }

        let query = format!(
            "SELECT {} FROM {} ORDER BY rowid",
            column_list(schema),
            quote(&table)
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| row_to_record(row, schema))
            .collect()
    }

    pub async fn get(
        &self,
        key: &CollectionKey,
        row_key: &str,
    ) -> Result<Option<EventRecord>, StorageError> {
        let schema = table_schema(key.kind());
        let table = key.table_name();
        if !self.table_exists(&table).await? {
            return Ok(None);
        }

        let mut conn = self.pool.acquire().await?;
        fetch_row(&mut *conn, &table, schema, row_key).await
    }

    pub async fn drop_collection(&self, key: &CollectionKey) -> Result<(), StorageError> {
        let table = key.table_name();
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", quote(&table)))
            .execute(&self.pool)
            .await?;
        info!("Dropped table {}", table);
        Ok(())
    }

    pub async fn drop_all(&self) -> Result<(), StorageError> {
        let tables = self.tables().await?;
        let mut tx = self.pool.begin().await?;
        for table in &tables {
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", quote(table)))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        info!("Dropped {} tables", tables.len());
        Ok(())
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn column_list(schema: &TableSchema) -> String {
    schema
        .column_names()
        .map(quote)
        .collect::<Vec<_>>()
        .join(", ")
}

fn create_table_statement(table: &str, schema: &TableSchema) -> String {
    let columns = schema
        .column_names()
        .map(|name| format!("{} TEXT", quote(name)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({} TEXT PRIMARY KEY NOT NULL, {})",
        quote(table),
        quote(ROW_KEY_COLUMN),
        columns
    )
}

fn insert_statement(table: &str, schema: &TableSchema, on_conflict: OnConflict) -> String {
    let placeholders = vec!["?"; schema.fields.len() + 1].join(", ");
    let insert = format!(
        "INSERT INTO {} ({}, {}) VALUES ({})",
        quote(table),
        quote(ROW_KEY_COLUMN),
        column_list(schema),
        placeholders
    );

    match on_conflict {
        OnConflict::Reject => insert,
        OnConflict::Overwrite => {
            let updates = schema
                .column_names()
                .map(|name| format!("{0} = excluded.{0}", quote(name)))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "{} ON CONFLICT({}) DO UPDATE SET {}",
                insert,
                quote(ROW_KEY_COLUMN),
                updates
            )
        }
    }
}

async fn fetch_row(
    conn: &mut SqliteConnection,
    table: &str,
    schema: &TableSchema,
    row_key: &str,
) -> Result<Option<EventRecord>, StorageError> {
    let query = format!(
        "SELECT {} FROM {} WHERE {} = ?",
        column_list(schema),
        quote(table),
        quote(ROW_KEY_COLUMN)
    );
    let row = sqlx::query(&query)
        .bind(row_key)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(|row| row_to_record(row, schema)).transpose()
}

// NULL columns are fields the provider did not send; they stay absent from the record
fn row_to_record(
    row: &sqlx::sqlite::SqliteRow,
    schema: &TableSchema,
) -> Result<EventRecord, StorageError> {
    let mut record = EventRecord::new();
    for (i, name) in schema.column_names().enumerate() {
        if let Some(value) = row.try_get::<Option<String>, _>(i)? {
            record.insert(name, value);
        }
    }
    Ok(record)
}
