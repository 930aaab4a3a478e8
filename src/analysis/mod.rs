//! Input analysis: discovery, decoding, comment stripping, and token counting.

pub mod comments;
pub mod encoding;
pub mod tokens;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::models::{NewConversionRecord, RowErrorKind};

pub use comments::strip_sql_comments;
pub use tokens::TokenCounter;

/// Errors that stop analysis as a whole.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Input directory not found: {0}")]
    InputDirNotFound(PathBuf),
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
}

/// List every file under `root`, sorted by path.
///
/// Unreadable directory entries are logged and skipped; files that cannot be
/// read are still returned so they get recorded with an error.
pub fn discover_files(root: &Path) -> Result<Vec<PathBuf>, AnalysisError> {
    if !root.is_dir() {
        return Err(AnalysisError::InputDirNotFound(root.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        match entry {
            Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
            Ok(_) => {}
            Err(e) => warn!("Skipping unreadable entry under {}: {}", root.display(), e),
        }
    }
    files.sort();
    Ok(files)
}

/// Turns input files into conversion records.
#[derive(Debug)]
pub struct Analyzer {
    counter: Arc<TokenCounter>,
    token_count_threshold: usize,
}

impl Analyzer {
    pub fn new(token_count_threshold: usize) -> Result<Self, AnalysisError> {
        let counter = TokenCounter::new().map_err(AnalysisError::Tokenizer)?;
        Ok(Self::with_counter(Arc::new(counter), token_count_threshold))
    }

    pub fn with_counter(counter: Arc<TokenCounter>, token_count_threshold: usize) -> Self {
        Self {
            counter,
            token_count_threshold,
        }
    }

    pub fn token_count_threshold(&self) -> usize {
        self.token_count_threshold
    }

    pub fn tokenizer(&self) -> &'static str {
        self.counter.scheme()
    }

    /// Read and analyze one file.
    pub fn analyze_file(&self, file_number: i32, path: &Path) -> NewConversionRecord {
        match std::fs::read(path) {
            Ok(bytes) => self.analyze_bytes(file_number, path, &bytes),
            Err(e) => unreadable_record(file_number, path, e),
        }
    }

    /// Analyze already-read file content.
    pub fn analyze_bytes(&self, file_number: i32, path: &Path, bytes: &[u8]) -> NewConversionRecord {
        let decoded = match encoding::decode(bytes) {
            Ok(decoded) => decoded,
            Err(e) => return unreadable_record(file_number, path, e),
        };

        let stripped = strip_sql_comments(&decoded.text);
        let token_count = self.counter.count(&decoded.text);
        let stripped_count = self.counter.count(&stripped);
        let is_target = stripped_count <= self.token_count_threshold;
        debug!(
            "#{} {}: {} tokens ({} without comments), target={}",
            file_number,
            path.display(),
            token_count,
            stripped_count,
            is_target
        );

        NewConversionRecord {
            input_file_number: file_number,
            input_file_path: path.display().to_string(),
            input_file_encoding: Some(decoded.encoding.to_string()),
            input_file_token_count: Some(saturating_i32(token_count)),
            input_file_token_count_without_sql_comments: Some(saturating_i32(stripped_count)),
            input_file_content: Some(decoded.text),
            input_file_content_without_sql_comments: Some(stripped),
            is_conversion_target: is_target,
            result_error: None,
        }
    }
}

/// Record for a file that could not be read or decoded. Never a target.
pub fn unreadable_record(
    file_number: i32,
    path: &Path,
    error: impl std::fmt::Display,
) -> NewConversionRecord {
    warn!("Could not read {}: {}", path.display(), error);
    NewConversionRecord {
        input_file_number: file_number,
        input_file_path: path.display().to_string(),
        input_file_encoding: None,
        input_file_token_count: None,
        input_file_token_count_without_sql_comments: None,
        input_file_content: None,
        input_file_content_without_sql_comments: None,
        is_conversion_target: false,
        result_error: Some(RowErrorKind::InputRead.message(error)),
    }
}

fn saturating_i32(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_discover_sorted_recursive() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("b.sql"), "SELECT 2").unwrap();
        std::fs::write(dir.path().join("a.sql"), "SELECT 1").unwrap();
        std::fs::write(dir.path().join("sub/c.sql"), "SELECT 3").unwrap();

        let files = discover_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().display().to_string())
            .collect();
        assert_eq!(names, vec!["a.sql", "b.sql", "sub/c.sql"]);
    }

    #[test]
    fn test_missing_input_dir() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            discover_files(&missing),
            Err(AnalysisError::InputDirNotFound(_))
        ));
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        let counter = Arc::new(TokenCounter::new().unwrap());
        let sql = "SELECT id, name FROM dbo.customers -- comment";
        let stripped_tokens = counter.count(&strip_sql_comments(sql));

        let at = Analyzer::with_counter(counter.clone(), stripped_tokens);
        let record = at.analyze_bytes(1, Path::new("a.sql"), sql.as_bytes());
        assert!(record.is_conversion_target);
        assert_eq!(
            record.input_file_token_count_without_sql_comments,
            Some(stripped_tokens as i32)
        );
        assert!(record.input_file_token_count.unwrap() > stripped_tokens as i32);

        let below = Analyzer::with_counter(counter, stripped_tokens - 1);
        let record = below.analyze_bytes(1, Path::new("a.sql"), sql.as_bytes());
        assert!(!record.is_conversion_target);
        assert!(record.result_error.is_none());
    }

    #[test]
    fn test_unreadable_file_is_recorded() {
        let analyzer = Analyzer::new(100).unwrap();
        let dir = tempdir().unwrap();
        let record = analyzer.analyze_file(7, &dir.path().join("missing.sql"));
        assert_eq!(record.input_file_number, 7);
        assert!(!record.is_conversion_target);
        assert!(record.input_file_encoding.is_none());
        assert!(record
            .result_error
            .as_deref()
            .unwrap()
            .starts_with("InputReadError: "));
    }

    #[test]
    fn test_undecodable_file_is_not_a_target() {
        let analyzer = Analyzer::new(100).unwrap();
        // UTF-16LE BOM followed by a dangling half code unit
        let bytes = [0xFF, 0xFE, 0x41, 0x00, 0x42];
        let record = analyzer.analyze_bytes(3, Path::new("/in/odd.sql"), &bytes);
        assert_eq!(record.input_file_path, "/in/odd.sql");
        assert!(!record.is_conversion_target);
        assert!(record.input_file_encoding.is_none());
        assert!(record.input_file_content.is_none());
        assert!(record.input_file_token_count.is_none());
        let error = record.result_error.unwrap();
        assert!(error.starts_with("InputReadError: "), "{}", error);
        assert!(error.contains("UTF-16LE"), "{}", error);
    }
}
