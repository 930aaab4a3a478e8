//! Conversion records: one row per input file, the single source of truth
//! for every pipeline stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the tokenizer scheme used for every token count in a result table.
pub const TOKENIZER_SCHEME: &str = "o200k_base";

/// A single input file tracked through the conversion pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRecord {
    /// Logical result table this row belongs to.
    pub result_table: String,
    /// Sequential identifier, starting at 1 within one analysis run.
    pub input_file_number: i32,
    pub input_file_path: String,
    /// Detected text encoding (e.g. `UTF-8`). Unset when the file could not be read.
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
    pub result_timestamp: Option<DateTime<Utc>>,
    pub result_python_parse_error: Option<String>,
    pub result_extracted_sqls: Option<Vec<String>>,
    pub result_sql_parse_errors: Option<Vec<String>>,
}

impl ConversionRecord {
    /// Number of static check errors recorded by the last validation pass.
    pub fn parse_error_count(&self) -> usize {
        let python = usize::from(self.result_python_parse_error.is_some());
        let sql = self
            .result_sql_parse_errors
            .as_ref()
            .map(Vec::len)
            .unwrap_or(0);
        python + sql
    }

    /// True when converted content exists and the last validation found nothing.
    pub fn is_clean(&self) -> bool {
        self.result_content.is_some()
            && self.result_python_parse_error.is_none()
            && self
                .result_sql_parse_errors
                .as_ref()
                .is_some_and(|errors| errors.is_empty())
    }

    /// True when the row still needs the fix loop: static errors on converted
    /// content, or a failed endpoint call that left no content behind.
    pub fn needs_fix(&self) -> bool {
        if !self.is_conversion_target {
            return false;
        }
        match self.result_content {
            Some(_) => self.parse_error_count() > 0,
            None => self.result_error.is_some(),
        }
    }

    /// All static check errors as display lines.
    pub fn error_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(err) = &self.result_python_parse_error {
            lines.push(err.clone());
        }
        if let Some(errors) = &self.result_sql_parse_errors {
            lines.extend(errors.iter().cloned());
        }
        lines
    }
}

/// A freshly analyzed file, ready to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewConversionRecord {
    pub input_file_number: i32,
    pub input_file_path: String,
    pub input_file_encoding: Option<String>,
    pub input_file_token_count: Option<i32>,
    pub input_file_token_count_without_sql_comments: Option<i32>,
    pub input_file_content: Option<String>,
    pub input_file_content_without_sql_comments: Option<String>,
    pub is_conversion_target: bool,
    /// Set only when the file could not be read or decoded.
    pub result_error: Option<String>,
}

/// Per-table census used by `status` and the end-of-run summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableCensus {
    pub total: usize,
    pub targets: usize,
    pub converted: usize,
    pub clean: usize,
    pub with_errors: usize,
    pub over_threshold: usize,
    pub unreadable: usize,
}

impl TableCensus {
    pub fn from_records(records: &[ConversionRecord]) -> Self {
        let mut census = Self {
            total: records.len(),
            ..Default::default()
        };
        for record in records {
            if record.is_conversion_target {
                census.targets += 1;
            }
            if record.result_content.is_some() {
                census.converted += 1;
            }
            if record.is_clean() {
                census.clean += 1;
            }
            if record.needs_fix() {
                census.with_errors += 1;
            }
            if record.input_file_encoding.is_none() {
                census.unreadable += 1;
            } else if !record.is_conversion_target && record.result_content.is_none() {
                census.over_threshold += 1;
            }
        }
        census
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ConversionRecord {
        ConversionRecord {
            result_table: "c.s.t_202401010000".to_string(),
            input_file_number: 1,
            input_file_path: "/in/a.sql".to_string(),
            input_file_encoding: Some("UTF-8".to_string()),
            tiktoken_encoding: TOKENIZER_SCHEME.to_string(),
            input_file_token_count: Some(10),
            input_file_token_count_without_sql_comments: Some(8),
            input_file_content: Some("select 1 -- x".to_string()),
            input_file_content_without_sql_comments: Some("select 1".to_string()),
            is_conversion_target: true,
            model_serving_endpoint_for_conversion: None,
            model_serving_endpoint_for_fix: None,
            result_content: None,
            result_token_count: None,
            result_error: None,
            result_timestamp: None,
            result_python_parse_error: None,
            result_extracted_sqls: None,
            result_sql_parse_errors: None,
        }
    }

    #[test]
    fn test_unvalidated_content_is_not_clean() {
        let mut r = record();
        r.result_content = Some("x = 1".to_string());
        assert!(!r.is_clean());
        assert!(!r.needs_fix());

        r.result_sql_parse_errors = Some(vec![]);
        assert!(r.is_clean());
    }

    #[test]
    fn test_error_count_includes_python_and_sql() {
        let mut r = record();
        r.result_content = Some("x = (".to_string());
        r.result_python_parse_error = Some("unexpected EOF".to_string());
        r.result_sql_parse_errors = Some(vec!["a".into(), "b".into()]);
        assert_eq!(r.parse_error_count(), 3);
        assert!(r.needs_fix());
        assert_eq!(r.error_lines().len(), 3);
    }

    #[test]
    fn test_endpoint_failure_needs_fix_only_while_targeted() {
        let mut r = record();
        r.result_error = Some("Endpoint error: timeout".to_string());
        assert!(r.needs_fix());
        r.is_conversion_target = false;
        assert!(!r.needs_fix());
    }

    #[test]
    fn test_census() {
        let mut clean = record();
        clean.result_content = Some("x = 1".into());
        clean.result_sql_parse_errors = Some(vec![]);
        clean.is_conversion_target = false;

        let mut too_big = record();
        too_big.input_file_number = 2;
        too_big.is_conversion_target = false;

        let mut unreadable = record();
        unreadable.input_file_number = 3;
        unreadable.input_file_encoding = None;
        unreadable.is_conversion_target = false;

        let census = TableCensus::from_records(&[clean, too_big, unreadable, record()]);
        assert_eq!(census.total, 4);
        assert_eq!(census.targets, 1);
        assert_eq!(census.clean, 1);
        assert_eq!(census.over_threshold, 1);
        assert_eq!(census.unreadable, 1);
    }
}
