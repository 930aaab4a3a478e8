//! Data models for sqlport.

mod dialect;
mod record;
mod result_table;
mod row_error;

pub use dialect::{CommentLang, SqlDialect};
pub use record::{ConversionRecord, NewConversionRecord, TableCensus, TOKENIZER_SCHEME};
pub use result_table::{ResultTable, ResultTableName, DEFAULT_TABLE_PREFIX};
pub use row_error::RowErrorKind;
