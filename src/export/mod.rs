//! Notebook export.

pub mod notebook;

use serde::{Deserialize, Serialize};

/// Per-file export outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportResult {
    pub input_file_number: i32,
    pub input_file_path: String,
    /// Unset when no artifact was written
    pub output_file_path: Option<String>,
    pub export_succeeded: bool,
    pub parse_error_count: usize,
    pub export_error: Option<String>,
}

/// Message reported for rows excluded by the token threshold.
pub const TOKEN_LIMIT_ERROR: &str = "Token count exceeds threshold";
