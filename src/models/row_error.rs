//! Row-level failure kinds recorded in `result_error` and export reports.

use std::fmt;

/// Kind of a failure that is captured into a row instead of aborting a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowErrorKind {
    /// Source file unreadable or undecodable. Terminal: never a target.
    InputRead,
    /// Model endpoint call failed, timed out, or returned nothing usable.
    Endpoint,
    /// Converted program does not parse.
    ProgramParse,
    /// An embedded SQL statement does not parse.
    SqlParse,
    /// Writing the output artifact failed.
    Export,
}

impl RowErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InputRead => "InputReadError",
            Self::Endpoint => "EndpointError",
            Self::ProgramParse => "ProgramParseError",
            Self::SqlParse => "SqlParseError",
            Self::Export => "ExportError",
        }
    }

    /// Format a message for storage, prefixed with the kind.
    pub fn message(&self, detail: impl fmt::Display) -> String {
        format!("{}: {}", self.as_str(), detail)
    }
}

impl fmt::Display for RowErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
