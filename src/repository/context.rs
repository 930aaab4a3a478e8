//! Database context for managing the connection pool and repository access.

use std::path::Path;

use diesel_async::SimpleAsyncConnection;

use super::conversion::ConversionRepository;
use super::pool::{DbError, DbPool};

/// Database context that owns the pool and hands out repositories.
///
/// Create one context per command, then use it to access the result store.
///
/// # Example
/// ```ignore
/// let ctx = DbContext::from_path(&db_path);
/// ctx.init_schema().await?;
/// let rows = ctx.conversions().get_all("cat.sch.conversion_targets_202406141139").await?;
/// ```
#[derive(Clone)]
pub struct DbContext {
    pool: DbPool,
}

impl DbContext {
    /// Create a context for a SQLite database file.
    pub fn from_path(db_path: &Path) -> Self {
        Self {
            pool: DbPool::from_path(db_path),
        }
    }

    /// Get the conversion record repository.
    pub fn conversions(&self) -> ConversionRepository {
        ConversionRepository::new(self.pool.clone())
    }

    /// Create the result store tables if they don't exist.
    pub async fn init_schema(&self) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        conn.batch_execute(
            r#"
            CREATE TABLE IF NOT EXISTS result_tables (
                name TEXT PRIMARY KEY NOT NULL,
                catalog TEXT NOT NULL,
                schema_name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                input_dir TEXT NOT NULL,
                token_count_threshold INTEGER NOT NULL,
                tokenizer TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS conversion_records (
                result_table TEXT NOT NULL,
                input_file_number INTEGER NOT NULL,
                input_file_path TEXT NOT NULL,
                input_file_encoding TEXT,
                tiktoken_encoding TEXT NOT NULL,
                input_file_token_count INTEGER,
                input_file_token_count_without_sql_comments INTEGER,
                input_file_content TEXT,
                input_file_content_without_sql_comments TEXT,
                is_conversion_target BOOLEAN NOT NULL DEFAULT 0,
                model_serving_endpoint_for_conversion TEXT,
                model_serving_endpoint_for_fix TEXT,
                result_content TEXT,
                result_token_count INTEGER,
                result_error TEXT,
                result_timestamp TEXT,
                result_python_parse_error TEXT,
                result_extracted_sqls TEXT,
                result_sql_parse_errors TEXT,
                PRIMARY KEY (result_table, input_file_number),
                FOREIGN KEY (result_table) REFERENCES result_tables(name)
            );

            CREATE INDEX IF NOT EXISTS idx_conversion_records_target
                ON conversion_records(result_table, is_conversion_target);
            "#,
        )
        .await
    }

    /// Get list of all tables in the database.
    pub async fn list_tables(&self) -> Result<Vec<String>, DbError> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<TableName> = diesel_async::RunQueryDsl::load(
            diesel::sql_query(
                "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            ),
            &mut conn,
        )
        .await?;
        Ok(rows.into_iter().map(|r| r.name).collect())
    }
}

#[derive(diesel::QueryableByName)]
struct TableName {
    #[diesel(sql_type = diesel::sql_types::Text)]
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_init_schema_is_repeatable() {
        let dir = tempdir().unwrap();
        let ctx = DbContext::from_path(&dir.path().join("store.db"));

        ctx.init_schema().await.unwrap();
        ctx.init_schema().await.unwrap();

        let tables = ctx.list_tables().await.unwrap();
        assert_eq!(tables, vec!["conversion_records", "result_tables"]);
    }
}
