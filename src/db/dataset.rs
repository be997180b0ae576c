//! Tables as transporter datasets.
//!
//! A [`SqlDataset`] binds one table of one adapter. Bulk imports are multi-row
//! `INSERT ... VALUES` statements built with sqlx's `QueryBuilder`, chunked under the
//! backend's bind-parameter limit and committed in a single transaction, so a failed
//! import writes nothing. Every statement runs under the adapter's query timeout.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sqlx::{QueryBuilder, Row as _};
use tokio::sync::OnceCell;
use tokio::time::timeout;
use tracing::debug;

use crate::db::pool::DbPool;
use crate::db::types::RowToRecord;
use crate::error::{DbError, DbResult};
use crate::models::DatabaseType;
use crate::transporter::{Dataset, Record, Row};

/// Run a bulk insert of `$rows` in one transaction, `$per_statement` rows at a time.
/// Each bound value is followed by its column's cast suffix (empty outside PostgreSQL).
macro_rules! insert_chunks {
    ($db:ty, $pool:expr, $prefix:expr, $rows:expr, $per_statement:expr, $casts:expr) => {{
        let mut tx = $pool.begin().await?;
        let mut written = 0u64;
        for chunk in $rows.chunks($per_statement) {
            let mut builder = QueryBuilder::<$db>::new($prefix);
            builder.push_values(chunk, |mut tuple, row| {
                for (value, cast) in row.iter().zip($casts.iter()) {
                    tuple.push_bind(value.clone());
                    tuple.push_unseparated(cast);
                }
            });
            written += builder.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        written
    }};
}

/// Check a table or column name: `name` or `schema.name`, alphanumerics and `_` only.
pub fn validate_identifier(ident: &str) -> DbResult<()> {
    let parts: Vec<&str> = ident.split('.').collect();
    let valid = parts.len() <= 2
        && parts.iter().all(|part| {
            !part.is_empty() && part.chars().all(|c| c.is_alphanumeric() || c == '_')
        });
    if valid {
        Ok(())
    } else {
        Err(DbError::invalid_input(format!(
            "Invalid identifier '{}': use letters, digits and '_', optionally qualified as schema.name",
            ident
        )))
    }
}

/// One table on one adapter.
#[derive(Debug, Clone)]
pub struct SqlDataset {
    pool: DbPool,
    table: String,
    writable: bool,
    query_timeout: Duration,
    /// PostgreSQL column name to `::type` suffix, loaded on first write.
    casts: Arc<OnceCell<HashMap<String, String>>>,
}

impl SqlDataset {
    pub fn new(
        pool: DbPool,
        table: impl Into<String>,
        writable: bool,
        query_timeout: Duration,
    ) -> DbResult<Self> {
        let table = table.into();
        validate_identifier(&table)?;
        Ok(Self {
            pool,
            table,
            writable,
            query_timeout,
            casts: Arc::new(OnceCell::new()),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn db_type(&self) -> DatabaseType {
        self.pool.db_type()
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    fn quoted_table(&self) -> String {
        self.db_type().quote_identifier(&self.table)
    }

    fn column_list(&self, columns: &[String]) -> DbResult<String> {
        columns
            .iter()
            .map(|column| {
                validate_identifier(column)?;
                Ok(self.db_type().quote_identifier(column))
            })
            .collect::<DbResult<Vec<_>>>()
            .map(|quoted| quoted.join(", "))
    }

    async fn with_timeout<T, F>(&self, operation: &str, fut: F) -> DbResult<T>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match timeout(self.query_timeout, fut).await {
            Ok(result) => result.map_err(DbError::from),
            Err(_) => Err(DbError::timeout(
                operation,
                self.query_timeout.as_secs() as u32,
            )),
        }
    }

    /// `SELECT COUNT(*)` of the table.
    pub async fn row_count(&self) -> DbResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.quoted_table());
        let count: i64 = self
            .with_timeout("count", async {
                impl_db_dispatch!(&self.pool, {
                    MySql(p) => sqlx::query_scalar::<_, i64>(&sql).fetch_one(p).await,
                    Postgres(p) => sqlx::query_scalar::<_, i64>(&sql).fetch_one(p).await,
                    SQLite(p) => sqlx::query_scalar::<_, i64>(&sql).fetch_one(p).await,
                })
            })
            .await?;
        Ok(count.max(0) as u64)
    }

    /// Column names of the table, in declaration order.
    pub async fn columns(&self) -> DbResult<Vec<String>> {
        let (schema, name) = match self.table.split_once('.') {
            Some((schema, name)) => (Some(schema), name),
            None => (None, self.table.as_str()),
        };

        let columns: Vec<String> = self
            .with_timeout("describe table", async {
                match &self.pool {
                    DbPool::SQLite(p) => {
                        let pragma = match schema {
                            Some(schema) => format!("PRAGMA \"{}\".table_info('{}')", schema, name),
                            None => format!("PRAGMA table_info('{}')", name),
                        };
                        sqlx::query(&pragma).fetch_all(p).await.and_then(|rows| {
                            rows.iter()
                                .map(|row| row.try_get::<String, _>("name"))
                                .collect::<Result<Vec<_>, _>>()
                        })
                    }
                    DbPool::Postgres(p) => {
                        sqlx::query_scalar::<_, String>(
                            "SELECT column_name::text FROM information_schema.columns \
                             WHERE table_name = $1 AND table_schema = COALESCE($2, current_schema()) \
                             ORDER BY ordinal_position",
                        )
                        .bind(name)
                        .bind(schema)
                        .fetch_all(p)
                        .await
                    }
                    DbPool::MySql(p) => {
                        sqlx::query_scalar::<_, String>(
                            "SELECT CAST(COLUMN_NAME AS CHAR) FROM information_schema.COLUMNS \
                             WHERE TABLE_NAME = ? AND TABLE_SCHEMA = COALESCE(?, DATABASE()) \
                             ORDER BY ORDINAL_POSITION",
                        )
                        .bind(name)
                        .bind(schema)
                        .fetch_all(p)
                        .await
                    }
                }
            })
            .await?;

        if columns.is_empty() {
            return Err(DbError::schema("Table not found or has no columns", &self.table));
        }
        Ok(columns)
    }

    /// Every row of the table as ordered records; all columns when `columns` is empty.
    pub async fn records(&self, columns: &[String]) -> DbResult<Vec<Record>> {
        let select = if columns.is_empty() {
            "*".to_string()
        } else {
            self.column_list(columns)?
        };
        let sql = format!("SELECT {} FROM {}", select, self.quoted_table());
        debug!(table = %self.table, "Fetching records for export");

        self.with_timeout("export query", async {
            Ok::<_, sqlx::Error>(impl_db_dispatch!(&self.pool, {
                MySql(p) => sqlx::query(&sql).fetch_all(p).await?.iter().map(RowToRecord::to_record).collect::<Vec<Record>>(),
                Postgres(p) => sqlx::query(&sql).fetch_all(p).await?.iter().map(RowToRecord::to_record).collect::<Vec<Record>>(),
                SQLite(p) => sqlx::query(&sql).fetch_all(p).await?.iter().map(RowToRecord::to_record).collect::<Vec<Record>>(),
            }))
        })
        .await
    }

    /// Insert `rows` in one transaction. Returns the number of rows written.
    pub async fn insert_rows(&self, columns: &[String], rows: &[Row]) -> DbResult<u64> {
        if !self.writable {
            return Err(DbError::permission(
                format!("insert into {}", self.table),
                "Adapter is read-only. Add ?writable=true to its database URL.",
            ));
        }
        if columns.is_empty() {
            return Err(DbError::invalid_input("No columns given for insert"));
        }
        if let Some(row) = rows.iter().find(|row| row.len() != columns.len()) {
            return Err(DbError::invalid_input(format!(
                "Row has {} values for {} columns",
                row.len(),
                columns.len()
            )));
        }
        if rows.is_empty() {
            return Ok(0);
        }

        let prefix = format!(
            "INSERT INTO {} ({}) ",
            self.quoted_table(),
            self.column_list(columns)?
        );
        let casts = self.cast_suffixes(columns).await?;
        let per_statement = (self.db_type().max_bind_params() / columns.len()).max(1);

        self.with_timeout("import", async {
            Ok::<_, sqlx::Error>(impl_db_dispatch!(&self.pool, {
                MySql(p) => insert_chunks!(sqlx::MySql, p, prefix.as_str(), rows, per_statement, casts),
                Postgres(p) => insert_chunks!(sqlx::Postgres, p, prefix.as_str(), rows, per_statement, casts),
                SQLite(p) => insert_chunks!(sqlx::Sqlite, p, prefix.as_str(), rows, per_statement, casts),
            }))
        })
        .await
    }

    /// Values are bound as text. PostgreSQL does not coerce text parameters into typed
    /// columns, so each one gets an explicit cast to its column's type.
    async fn cast_suffixes(&self, columns: &[String]) -> DbResult<Vec<String>> {
        let DbPool::Postgres(pool) = &self.pool else {
            return Ok(vec![String::new(); columns.len()]);
        };

        let types = self
            .casts
            .get_or_try_init(|| async {
                let rows: Vec<(String, String)> = self
                    .with_timeout(
                        "describe table",
                        sqlx::query_as(
                            "SELECT a.attname::text, format_type(a.atttypid, a.atttypmod) \
                             FROM pg_attribute a \
                             WHERE a.attrelid = $1::regclass AND a.attnum > 0 AND NOT a.attisdropped",
                        )
                        .bind(self.quoted_table())
                        .fetch_all(pool),
                    )
                    .await?;
                Ok::<_, DbError>(rows.into_iter().collect::<HashMap<_, _>>())
            })
            .await?;

        columns
            .iter()
            .map(|column| {
                types
                    .get(column)
                    .map(|ty| format!("::{}", ty))
                    .ok_or_else(|| {
                        DbError::schema(format!("Unknown column '{}'", column), &self.table)
                    })
            })
            .collect()
    }
}

impl Dataset for SqlDataset {
    type Error = DbError;

    fn count(&self) -> impl Future<Output = Result<u64, DbError>> + Send {
        self.row_count()
    }

    fn import(
        &self,
        columns: &[String],
        rows: &[Row],
    ) -> impl Future<Output = Result<(), DbError>> + Send {
        async move {
            let written = self.insert_rows(columns, rows).await?;
            debug!(table = %self.table, rows = written, "Bulk insert committed");
            Ok(())
        }
    }

    fn insert(
        &self,
        columns: &[String],
        row: &Row,
    ) -> impl Future<Output = Result<(), DbError>> + Send {
        async move {
            self.insert_rows(columns, std::slice::from_ref(row)).await?;
            Ok(())
        }
    }
}
