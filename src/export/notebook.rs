//! Databricks source-format notebooks.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const NOTEBOOK_HEADER: &str = "# Databricks notebook source";
pub const CELL_SEPARATOR: &str = "# COMMAND ----------";

/// Render converted content as a notebook.
///
/// When `errors` is non-empty a trailing markdown cell lists them.
pub fn render(content: &str, errors: &[String]) -> String {
    let body = content.trim_end();
    let mut out = String::with_capacity(body.len() + 64);
    if !body.starts_with(NOTEBOOK_HEADER) {
        out.push_str(NOTEBOOK_HEADER);
        out.push_str("\n\n");
    }
    out.push_str(body);
    out.push('\n');

    if !errors.is_empty() {
        out.push('\n');
        out.push_str(CELL_SEPARATOR);
        out.push_str("\n\n# MAGIC %md\n# MAGIC ## Static check errors\n# MAGIC ```\n");
        for line in errors.iter().flat_map(|e| e.lines()) {
            out.push_str("# MAGIC ");
            out.push_str(line);
            out.push('\n');
        }
        out.push_str("# MAGIC ```\n");
    }
    out
}

/// Assigns output paths relative to the output directory, one per row.
#[derive(Debug, Default)]
pub struct OutputPaths {
    taken: HashSet<PathBuf>,
}

impl OutputPaths {
    pub fn new() -> Self {
        Self::default()
    }

    /// Path for `input_path`: its location under `input_dir` with a `.py`
    /// extension. A path already handed out gets `_{file_number}` appended
    /// to the stem.
    pub fn assign(&mut self, input_path: &Path, input_dir: &Path, file_number: i32) -> PathBuf {
        let relative = input_path
            .strip_prefix(input_dir)
            .ok()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .or_else(|| input_path.file_name().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(format!("file_{}", file_number)));

        let mut candidate = relative.with_extension("py");
        if self.taken.contains(&candidate) {
            let stem = relative
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            candidate = relative.with_file_name(format!("{}_{}.py", stem, file_number));
        }
        self.taken.insert(candidate.clone());
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_adds_header_once() {
        let out = render("x = 1\n", &[]);
        assert_eq!(out, "# Databricks notebook source\n\nx = 1\n");
        assert_eq!(render(&out, &[]), out);
    }

    #[test]
    fn test_render_lists_errors() {
        let out = render("spark.sql(\"SELEC 1\")", &["SELEC 1\nError: bad".to_string()]);
        assert!(out.contains("# COMMAND ----------\n\n# MAGIC %md"));
        assert!(out.contains("# MAGIC SELEC 1\n# MAGIC Error: bad\n"));
    }

    #[test]
    fn test_paths_mirror_input_tree() {
        let mut paths = OutputPaths::new();
        let dir = Path::new("/in");
        assert_eq!(
            paths.assign(Path::new("/in/etl/load.sql"), dir, 1),
            PathBuf::from("etl/load.py")
        );
        assert_eq!(
            paths.assign(Path::new("/in/etl/load.SQL"), dir, 2),
            PathBuf::from("etl/load_2.py")
        );
        assert_eq!(
            paths.assign(Path::new("/elsewhere/x.sql"), dir, 3),
            PathBuf::from("x.py")
        );
    }
}
