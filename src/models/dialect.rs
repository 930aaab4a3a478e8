//! Source dialects and comment languages recognized by the converter.

use serde::{Deserialize, Serialize};

/// SQL dialect of the input files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    /// Transact-SQL (SQL Server, Azure Synapse).
    #[default]
    Tsql,
}

impl SqlDialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tsql => "tsql",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "tsql" | "t-sql" => Some(Self::Tsql),
            _ => None,
        }
    }
}

/// Natural language used for comments in the generated notebooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CommentLang {
    #[default]
    English,
    Japanese,
}

impl CommentLang {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Japanese => "Japanese",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "english" | "en" => Some(Self::English),
            "japanese" | "ja" => Some(Self::Japanese),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_names() {
        assert_eq!(SqlDialect::from_str("TSQL"), Some(SqlDialect::Tsql));
        assert_eq!(SqlDialect::from_str("snowflake"), None);
        assert_eq!(CommentLang::from_str("japanese"), Some(CommentLang::Japanese));
        assert_eq!(CommentLang::English.as_str(), "English");
    }
}
