//! Conversion record repository: the result store every stage reads and writes.
//!
//! Rows are inserted once by analysis and only updated afterwards. Each stage
//! selects its work with a fresh query, and every stage write is scoped to a
//! single `(result_table, input_file_number)` row that is still a conversion
//! target, so rows excluded by validation are never written again.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::{
    ConversionRecordRow, NewConversionRecordRow, NewResultTable, ResultChangeset,
    ResultTableRecord, ValidationChangeset,
};
use super::pool::{DbError, DbPool};
use super::util::{parse_datetime, parse_datetime_opt, parse_string_array, to_json_array};
use crate::models::{
    ConversionRecord, NewConversionRecord, ResultTable, ResultTableName, TOKENIZER_SCHEME,
};
use crate::schema::{conversion_records, result_tables};

/// Rows per INSERT statement, well under SQLite's bound-parameter limit.
const INSERT_CHUNK: usize = 500;

/// Convert a database row to a domain model.
impl TryFrom<ConversionRecordRow> for ConversionRecord {
    type Error = diesel::result::Error;

    fn try_from(row: ConversionRecordRow) -> Result<Self, Self::Error> {
        Ok(ConversionRecord {
            result_table: row.result_table,
            input_file_number: row.input_file_number,
            input_file_path: row.input_file_path,
            input_file_encoding: row.input_file_encoding,
            tiktoken_encoding: row.tiktoken_encoding,
            input_file_token_count: row.input_file_token_count,
            input_file_token_count_without_sql_comments: row
                .input_file_token_count_without_sql_comments,
            input_file_content: row.input_file_content,
            input_file_content_without_sql_comments: row.input_file_content_without_sql_comments,
            is_conversion_target: row.is_conversion_target,
            model_serving_endpoint_for_conversion: row.model_serving_endpoint_for_conversion,
            model_serving_endpoint_for_fix: row.model_serving_endpoint_for_fix,
            result_content: row.result_content,
            result_token_count: row.result_token_count,
            result_error: row.result_error,
            result_timestamp: parse_datetime_opt(row.result_timestamp),
            result_python_parse_error: row.result_python_parse_error,
            result_extracted_sqls: parse_string_array(row.result_extracted_sqls)?,
            result_sql_parse_errors: parse_string_array(row.result_sql_parse_errors)?,
        })
    }
}

impl TryFrom<ResultTableRecord> for ResultTable {
    type Error = diesel::result::Error;

    fn try_from(record: ResultTableRecord) -> Result<Self, Self::Error> {
        let name = ResultTableName::parse(&record.name).ok_or_else(|| {
            diesel::result::Error::DeserializationError(
                format!("Invalid result table name: '{}'", record.name).into(),
            )
        })?;
        Ok(ResultTable {
            name,
            created_at: parse_datetime(&record.created_at),
            input_dir: record.input_dir,
            token_count_threshold: record.token_count_threshold,
            tokenizer: record.tokenizer,
        })
    }
}

/// Output of one conversion or fix attempt for a row.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultUpdate {
    pub content: Option<String>,
    pub token_count: Option<i32>,
    pub error: Option<String>,
}

impl ResultUpdate {
    pub fn converted(content: String, token_count: i32) -> Self {
        Self {
            content: Some(content),
            token_count: Some(token_count),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            content: None,
            token_count: None,
            error: Some(error.into()),
        }
    }
}

/// Output of one static check pass for a row.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationUpdate {
    pub python_parse_error: Option<String>,
    pub extracted_sqls: Vec<String>,
    pub sql_parse_errors: Vec<String>,
}

impl ValidationUpdate {
    pub fn is_clean(&self) -> bool {
        self.python_parse_error.is_none() && self.sql_parse_errors.is_empty()
    }
}

/// Repository over the `conversion_records` and `result_tables` tables.
#[derive(Clone)]
pub struct ConversionRepository {
    pool: DbPool,
}

impl ConversionRepository {
    /// Create a new repository with an existing pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Register a new result table. Fails if the name is already taken.
    pub async fn create_table(&self, table: &ResultTable) -> Result<(), DbError> {
        let name = table.name.to_string();
        let created_at = table.created_at.to_rfc3339();
        let mut conn = self.pool.get().await?;
        diesel::insert_into(result_tables::table)
            .values(NewResultTable {
                name: &name,
                catalog: &table.name.catalog,
                schema_name: &table.name.schema,
                created_at: &created_at,
                input_dir: &table.input_dir,
                token_count_threshold: table.token_count_threshold,
                tokenizer: &table.tokenizer,
            })
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    /// Look up a registered result table.
    pub async fn get_table(&self, name: &str) -> Result<Option<ResultTable>, DbError> {
        let mut conn = self.pool.get().await?;
        result_tables::table
            .find(name)
            .first::<ResultTableRecord>(&mut conn)
            .await
            .optional()
            .and_then(|opt| opt.map(ResultTable::try_from).transpose())
    }

    /// All registered result tables, newest first.
    pub async fn list_result_tables(&self) -> Result<Vec<ResultTable>, DbError> {
        let mut conn = self.pool.get().await?;
        result_tables::table
            .order(result_tables::created_at.desc())
            .load::<ResultTableRecord>(&mut conn)
            .await
            .and_then(|records| records.into_iter().map(ResultTable::try_from).collect())
    }

    /// Insert analyzed files into a result table.
    pub async fn insert_records(
        &self,
        table: &str,
        records: &[NewConversionRecord],
    ) -> Result<usize, DbError> {
        let mut conn = self.pool.get().await?;
        let mut inserted = 0;
        for chunk in records.chunks(INSERT_CHUNK) {
            let rows: Vec<NewConversionRecordRow<'_>> = chunk
                .iter()
                .map(|r| NewConversionRecordRow {
                    result_table: table,
                    input_file_number: r.input_file_number,
                    input_file_path: &r.input_file_path,
                    input_file_encoding: r.input_file_encoding.as_deref(),
                    tiktoken_encoding: TOKENIZER_SCHEME,
                    input_file_token_count: r.input_file_token_count,
                    input_file_token_count_without_sql_comments: r
                        .input_file_token_count_without_sql_comments,
                    input_file_content: r.input_file_content.as_deref(),
                    input_file_content_without_sql_comments: r
                        .input_file_content_without_sql_comments
                        .as_deref(),
                    is_conversion_target: r.is_conversion_target,
                    result_error: r.result_error.as_deref(),
                })
                .collect();
            inserted += diesel::insert_into(conversion_records::table)
                .values(&rows)
                .execute(&mut conn)
                .await?;
        }
        Ok(inserted)
    }

    /// Every row of a result table, ordered by file number.
    pub async fn get_all(&self, table: &str) -> Result<Vec<ConversionRecord>, DbError> {
        let mut conn = self.pool.get().await?;
        conversion_records::table
            .filter(conversion_records::result_table.eq(table))
            .order(conversion_records::input_file_number.asc())
            .select(ConversionRecordRow::as_select())
            .load(&mut conn)
            .await
            .and_then(into_records)
    }

    /// A single row by file number.
    pub async fn get(
        &self,
        table: &str,
        file_number: i32,
    ) -> Result<Option<ConversionRecord>, DbError> {
        let mut conn = self.pool.get().await?;
        conversion_records::table
            .filter(conversion_records::result_table.eq(table))
            .filter(conversion_records::input_file_number.eq(file_number))
            .select(ConversionRecordRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .and_then(|opt| opt.map(ConversionRecord::try_from).transpose())
    }

    /// Rows awaiting their first conversion: targets with no content yet.
    pub async fn conversion_candidates(
        &self,
        table: &str,
    ) -> Result<Vec<ConversionRecord>, DbError> {
        use crate::schema::conversion_records::dsl::*;

        let mut conn = self.pool.get().await?;
        conversion_records
            .filter(result_table.eq(table))
            .filter(is_conversion_target.eq(true))
            .filter(result_content.is_null())
            .order(input_file_number.asc())
            .select(ConversionRecordRow::as_select())
            .load(&mut conn)
            .await
            .and_then(into_records)
    }

    pub async fn count_conversion_candidates(&self, table: &str) -> Result<u64, DbError> {
        use crate::schema::conversion_records::dsl::*;

        let mut conn = self.pool.get().await?;
        let count: i64 = conversion_records
            .filter(result_table.eq(table))
            .filter(is_conversion_target.eq(true))
            .filter(result_content.is_null())
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(count as u64)
    }

    /// Rows with converted content that are still targets.
    pub async fn validation_candidates(
        &self,
        table: &str,
    ) -> Result<Vec<ConversionRecord>, DbError> {
        use crate::schema::conversion_records::dsl::*;

        let mut conn = self.pool.get().await?;
        conversion_records
            .filter(result_table.eq(table))
            .filter(is_conversion_target.eq(true))
            .filter(result_content.is_not_null())
            .order(input_file_number.asc())
            .select(ConversionRecordRow::as_select())
            .load(&mut conn)
            .await
            .and_then(into_records)
    }

    pub async fn count_validation_candidates(&self, table: &str) -> Result<u64, DbError> {
        use crate::schema::conversion_records::dsl::*;

        let mut conn = self.pool.get().await?;
        let count: i64 = conversion_records
            .filter(result_table.eq(table))
            .filter(is_conversion_target.eq(true))
            .filter(result_content.is_not_null())
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(count as u64)
    }

    /// Targets that still carry an error: static check failures on converted
    /// content, or an endpoint failure that produced no content.
    pub async fn fix_candidates(&self, table: &str) -> Result<Vec<ConversionRecord>, DbError> {
        use crate::schema::conversion_records::dsl::*;

        let mut conn = self.pool.get().await?;
        conversion_records
            .filter(result_table.eq(table))
            .filter(is_conversion_target.eq(true))
            .filter(
                result_content
                    .is_not_null()
                    .and(
                        result_python_parse_error.is_not_null().or(result_sql_parse_errors
                            .is_not_null()
                            .and(result_sql_parse_errors.ne("[]"))),
                    )
                    .or(result_content.is_null().and(result_error.is_not_null())),
            )
            .order(input_file_number.asc())
            .select(ConversionRecordRow::as_select())
            .load(&mut conn)
            .await
            .and_then(into_records)
    }

    /// Number of rows still erroring (same predicate as `fix_candidates`).
    pub async fn count_erroring(&self, table: &str) -> Result<u64, DbError> {
        use crate::schema::conversion_records::dsl::*;

        let mut conn = self.pool.get().await?;
        let count: i64 = conversion_records
            .filter(result_table.eq(table))
            .filter(is_conversion_target.eq(true))
            .filter(
                result_content
                    .is_not_null()
                    .and(
                        result_python_parse_error.is_not_null().or(result_sql_parse_errors
                            .is_not_null()
                            .and(result_sql_parse_errors.ne("[]"))),
                    )
                    .or(result_content.is_null().and(result_error.is_not_null())),
            )
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(count as u64)
    }

    /// Write the output of a conversion attempt.
    ///
    /// Returns false when the row is no longer a target and nothing was written.
    pub async fn record_conversion(
        &self,
        table: &str,
        file_number: i32,
        endpoint: &str,
        update: &ResultUpdate,
    ) -> Result<bool, DbError> {
        use crate::schema::conversion_records::dsl::*;

        let timestamp = Utc::now().to_rfc3339();
        let changeset = ResultChangeset {
            result_content: update.content.as_deref(),
            result_token_count: update.token_count,
            result_error: update.error.as_deref(),
            result_timestamp: Some(&timestamp),
        };

        let mut conn = self.pool.get().await?;
        let rows = diesel::update(
            conversion_records
                .filter(result_table.eq(table))
                .filter(input_file_number.eq(file_number))
                .filter(is_conversion_target.eq(true)),
        )
        .set((
            &changeset,
            model_serving_endpoint_for_conversion.eq(endpoint),
        ))
        .execute(&mut conn)
        .await?;
        Ok(rows > 0)
    }

    /// Write the output of a fix attempt and clear the previous static check
    /// results so the next validation pass recomputes them.
    ///
    /// A failed attempt keeps the previous content and its errors; only
    /// `result_error` records the failure.
    pub async fn record_fix(
        &self,
        table: &str,
        file_number: i32,
        endpoint: &str,
        update: &ResultUpdate,
    ) -> Result<bool, DbError> {
        use crate::schema::conversion_records::dsl::*;

        let target = conversion_records
            .filter(result_table.eq(table))
            .filter(input_file_number.eq(file_number))
            .filter(is_conversion_target.eq(true));

        let timestamp = Utc::now().to_rfc3339();
        let mut conn = self.pool.get().await?;
        let rows = match &update.content {
            Some(content) => {
                let changeset = ResultChangeset {
                    result_content: Some(content),
                    result_token_count: update.token_count,
                    result_error: None,
                    result_timestamp: Some(&timestamp),
                };
                let cleared = ValidationChangeset {
                    result_python_parse_error: None,
                    result_extracted_sqls: None,
                    result_sql_parse_errors: None,
                    is_conversion_target: true,
                };
                diesel::update(target)
                    .set((
                        &changeset,
                        &cleared,
                        model_serving_endpoint_for_fix.eq(endpoint),
                    ))
                    .execute(&mut conn)
                    .await?
            }
            None => {
                diesel::update(target)
                    .set((
                        result_error.eq(update.error.as_deref()),
                        result_timestamp.eq(Some(timestamp.as_str())),
                        model_serving_endpoint_for_fix.eq(endpoint),
                    ))
                    .execute(&mut conn)
                    .await?
            }
        };
        Ok(rows > 0)
    }

    /// Write static check results. A clean row stops being a conversion target.
    pub async fn record_validation(
        &self,
        table: &str,
        file_number: i32,
        update: &ValidationUpdate,
    ) -> Result<bool, DbError> {
        use crate::schema::conversion_records::dsl::*;

        let sqls = to_json_array(&update.extracted_sqls);
        let errors = to_json_array(&update.sql_parse_errors);
        let changeset = ValidationChangeset {
            result_python_parse_error: update.python_parse_error.as_deref(),
            result_extracted_sqls: Some(&sqls),
            result_sql_parse_errors: Some(&errors),
            is_conversion_target: !update.is_clean(),
        };

        let mut conn = self.pool.get().await?;
        let rows = diesel::update(
            conversion_records
                .filter(result_table.eq(table))
                .filter(input_file_number.eq(file_number))
                .filter(is_conversion_target.eq(true)),
        )
        .set(&changeset)
        .execute(&mut conn)
        .await?;
        Ok(rows > 0)
    }

    /// Mark rows for reprocessing: flag them as targets again and discard
    /// their previous output so the next conversion picks them up.
    ///
    /// Rows that could not be read are left alone.
    pub async fn retarget(&self, table: &str, file_numbers: &[i32]) -> Result<usize, DbError> {
        use crate::schema::conversion_records::dsl::*;

        let cleared_result = ResultChangeset {
            result_content: None,
            result_token_count: None,
            result_error: None,
            result_timestamp: None,
        };
        let cleared_validation = ValidationChangeset {
            result_python_parse_error: None,
            result_extracted_sqls: None,
            result_sql_parse_errors: None,
            is_conversion_target: true,
        };

        let mut conn = self.pool.get().await?;
        diesel::update(
            conversion_records
                .filter(result_table.eq(table))
                .filter(input_file_number.eq_any(file_numbers))
                .filter(input_file_content_without_sql_comments.is_not_null()),
        )
        .set((&cleared_result, &cleared_validation))
        .execute(&mut conn)
        .await
    }
}

fn into_records(rows: Vec<ConversionRecordRow>) -> Result<Vec<ConversionRecord>, DbError> {
    rows.into_iter().map(ConversionRecord::try_from).collect()
}
