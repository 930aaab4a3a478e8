//! Static checks over converted programs. Nothing is executed.

pub mod python;
pub mod sql;

use std::fmt;

use crate::models::RowErrorKind;
use crate::repository::ValidationUpdate;

/// Run every static check over one converted program.
pub fn validate_program(program: &str) -> ValidationUpdate {
    let python_parse_error = python::check_program(program);
    let extracted_sqls = sql::extract_sqls(program);
    let sql_parse_errors = sql::check_sqls(&extracted_sqls);
    ValidationUpdate {
        python_parse_error,
        extracted_sqls,
        sql_parse_errors,
    }
}

/// Result for a program whose checks could not run. Counts as a program
/// parse failure so the row stays in the fix loop.
pub fn unchecked_program(detail: impl fmt::Display) -> ValidationUpdate {
    ValidationUpdate {
        python_parse_error: Some(RowErrorKind::ProgramParse.message(format!(
            "static checks did not complete: {}",
            detail
        ))),
        extracted_sqls: Vec::new(),
        sql_parse_errors: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_program() {
        let update = validate_program("spark.sql(\"SELECT 1\")\n");
        assert!(update.is_clean());
        assert_eq!(update.extracted_sqls, vec!["SELECT 1"]);
    }

    #[test]
    fn test_checks_are_independent() {
        // Broken Python still has its SQL checked
        let update = validate_program("spark.sql(\"SELEC 1\")\nif x\n");
        assert!(update.python_parse_error.is_some());
        assert_eq!(update.sql_parse_errors.len(), 1);
        assert!(!update.is_clean());
    }

    #[test]
    fn test_unchecked_program_is_not_clean() {
        let update = unchecked_program("task panicked");
        assert!(!update.is_clean());
        assert!(update
            .python_parse_error
            .as_deref()
            .is_some_and(|e| e.starts_with("ProgramParseError: ")));
    }

    #[test]
    fn test_deterministic() {
        let program = "spark.sql(\"SELEC 1\")\n";
        assert_eq!(validate_program(program), validate_program(program));
    }
}
