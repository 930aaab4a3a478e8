//! Logical result table identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default prefix for newly created result tables.
pub const DEFAULT_TABLE_PREFIX: &str = "conversion_targets";

/// Fully qualified result table name: `{catalog}.{schema}.{table}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultTableName {
    pub catalog: String,
    pub schema: String,
    pub table: String,
}

impl ResultTableName {
    /// Name for a table created at `now`: `{prefix}_{yyyyMMddHHmm}` in UTC.
    pub fn new_timestamped(catalog: &str, schema: &str, prefix: &str, now: DateTime<Utc>) -> Self {
        Self {
            catalog: catalog.to_string(),
            schema: schema.to_string(),
            table: format!("{}_{}", prefix, now.format("%Y%m%d%H%M")),
        }
    }

    /// Parse `catalog.schema.table`. Every part must be non-empty.
    pub fn parse(name: &str) -> Option<Self> {
        let mut parts = name.trim().split('.');
        let catalog = parts.next()?;
        let schema = parts.next()?;
        let table = parts.next()?;
        if parts.next().is_some() || [catalog, schema, table].iter().any(|p| p.is_empty()) {
            return None;
        }
        Some(Self {
            catalog: catalog.to_string(),
            schema: schema.to_string(),
            table: table.to_string(),
        })
    }
}

impl std::fmt::Display for ResultTableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.catalog, self.schema, self.table)
    }
}

/// Registry entry describing how a result table was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    pub name: ResultTableName,
    pub created_at: DateTime<Utc>,
    pub input_dir: String,
    pub token_count_threshold: i32,
    pub tokenizer: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamped_name() {
        let now = Utc.with_ymd_and_hms(2024, 6, 14, 11, 39, 52).unwrap();
        let name = ResultTableName::new_timestamped("my_catalog", "my_schema", DEFAULT_TABLE_PREFIX, now);
        assert_eq!(
            name.to_string(),
            "my_catalog.my_schema.conversion_targets_202406141139"
        );
    }

    #[test]
    fn test_parse() {
        let name = ResultTableName::parse("a.b.c").unwrap();
        assert_eq!(name.table, "c");
        assert!(ResultTableName::parse("a.b").is_none());
        assert!(ResultTableName::parse("a..c").is_none());
        assert!(ResultTableName::parse("a.b.c.d").is_none());
    }
}
