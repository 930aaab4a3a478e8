//! Structural check of converted programs.

use rustpython_parser::{parse, Mode};

use crate::models::RowErrorKind;

/// Parse `source` as a Python module. Returns the prefixed parse error, if any.
///
/// Nothing is executed.
pub fn check_program(source: &str) -> Option<String> {
    parse(source, Mode::Module, "<notebook>")
        .err()
        .map(|e| RowErrorKind::ProgramParse.message(e))
}
