//! Diesel ORM models for the result store tables.
//!
//! These mirror `crate::schema` column-for-column. Timestamps are stored as
//! RFC 3339 text and string arrays as JSON text.

use diesel::prelude::*;

use crate::schema;

/// Result table registry record from the database.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = schema::result_tables)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ResultTableRecord {
    pub name: String,
    pub catalog: String,
    pub schema_name: String,
    pub created_at: String,
    pub input_dir: String,
    pub token_count_threshold: i32,
    pub tokenizer: String,
}

/// New result table registry entry.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::result_tables)]
pub struct NewResultTable<'a> {
    pub name: &'a str,
    pub catalog: &'a str,
    pub schema_name: &'a str,
    pub created_at: &'a str,
    pub input_dir: &'a str,
    pub token_count_threshold: i32,
    pub tokenizer: &'a str,
}

/// Conversion record row from the database.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = schema::conversion_records)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ConversionRecordRow {
    pub result_table: String,
    pub input_file_number: i32,
    pub input_file_path: String,
    pub input_file_encoding: Option<String>,
    pub tiktoken_encoding: String,
    pub input_file_token_count: Option<i32>,
    pub input_file_token_count_without_sql_comments: Option<i32>,
    pub input_file_content: Option<String>,
    pub input_file_content_without_sql_comments: Option<String>,
    pub is_conversion_target: bool,
    pub model_serving_endpoint_for_conversion: Option<String>,
    pub model_serving_endpoint_for_fix: Option<String>,
    pub result_content: Option<String>,
    pub result_token_count: Option<i32>,
    pub result_error: Option<String>,
    pub result_timestamp: Option<String>,
    pub result_python_parse_error: Option<String>,
    pub result_extracted_sqls: Option<String>,
    pub result_sql_parse_errors: Option<String>,
}

/// New conversion record for insertion. Output and validation columns start NULL.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::conversion_records)]
pub struct NewConversionRecordRow<'a> {
    pub result_table: &'a str,
    pub input_file_number: i32,
    pub input_file_path: &'a str,
    pub input_file_encoding: Option<&'a str>,
    pub tiktoken_encoding: &'a str,
    pub input_file_token_count: Option<i32>,
    pub input_file_token_count_without_sql_comments: Option<i32>,
    pub input_file_content: Option<&'a str>,
    pub input_file_content_without_sql_comments: Option<&'a str>,
    pub is_conversion_target: bool,
    pub result_error: Option<&'a str>,
}

/// Output columns written by a conversion or fix attempt.
#[derive(AsChangeset, Debug)]
#[diesel(table_name = schema::conversion_records)]
#[diesel(treat_none_as_null = true)]
pub struct ResultChangeset<'a> {
    pub result_content: Option<&'a str>,
    pub result_token_count: Option<i32>,
    pub result_error: Option<&'a str>,
    pub result_timestamp: Option<&'a str>,
}

/// Validation columns written by a static check pass.
#[derive(AsChangeset, Debug)]
#[diesel(table_name = schema::conversion_records)]
#[diesel(treat_none_as_null = true)]
pub struct ValidationChangeset<'a> {
    pub result_python_parse_error: Option<&'a str>,
    pub result_extracted_sqls: Option<&'a str>,
    pub result_sql_parse_errors: Option<&'a str>,
    pub is_conversion_target: bool,
}
