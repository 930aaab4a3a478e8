//! Embedded SQL extraction and checking.
//!
//! Statements are found textually: the first argument of each `spark.sql(...)`
//! call, when it is a single complete string literal. Calls inside `#`
//! comments and arguments built from several pieces are not checked.

use std::sync::LazyLock;

use regex::Regex;
use sqlparser::dialect::DatabricksDialect;
use sqlparser::parser::Parser;

use crate::models::RowErrorKind;

/// Identifier substituted for f-string `{...}` placeholders before parsing.
pub const PLACEHOLDER: &str = "__placeholder__";

static SPARK_SQL_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"spark\.sql\(\s*(?P<prefix>[rRfFuU]{0,2})"#,
        r#"(?:"""(?P<tdq>(?s:.*?))""""#,
        r#"|'''(?P<tsq>(?s:.*?))'''"#,
        r#"|"(?P<dq>(?:[^"\\\n]|\\.)*)""#,
        r#"|'(?P<sq>(?:[^'\\\n]|\\.)*)')"#,
        r#"\s*[,)]"#,
    ))
    .expect("valid regex")
});

/// Every SQL statement passed as a literal to `spark.sql`, in source order.
pub fn extract_sqls(program: &str) -> Vec<String> {
    SPARK_SQL_CALL
        .captures_iter(program)
        .filter(|caps| {
            caps.get(0)
                .is_some_and(|call| !in_line_comment(program, call.start()))
        })
        .filter_map(|caps| {
            let prefix = caps.name("prefix").map_or("", |m| m.as_str());
            let body = ["tdq", "tsq", "dq", "sq"]
                .iter()
                .find_map(|name| caps.name(name))?
                .as_str();

            let raw = prefix.contains(['r', 'R']);
            let formatted = prefix.contains(['f', 'F']);
            let mut sql = if raw {
                body.to_string()
            } else {
                unescape(body)
            };
            if formatted {
                sql = fill_placeholders(&sql);
            }
            Some(sql.trim().to_string())
        })
        .filter(|sql| !sql.is_empty())
        .collect()
}

/// Parse one statement under the Databricks dialect.
pub fn check_sql(sql: &str) -> Result<(), String> {
    Parser::parse_sql(&DatabricksDialect {}, sql)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

/// Check each statement, returning `"SqlParseError: {sql}\nError: {message}"`
/// for failures.
pub fn check_sqls(sqls: &[String]) -> Vec<String> {
    sqls.iter()
        .filter_map(|sql| {
            check_sql(sql)
                .err()
                .map(|message| RowErrorKind::SqlParse.message(format!("{}\nError: {}", sql, message)))
        })
        .collect()
}

/// Whether `offset` sits after a `#` that starts a comment on its line.
fn in_line_comment(program: &str, offset: usize) -> bool {
    let line_start = program[..offset].rfind('\n').map_or(0, |i| i + 1);
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in program[line_start..offset].chars() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '#' => return true,
            None if c == '"' || c == '\'' => quote = Some(c),
            None => {}
        }
    }
    false
}

/// Replace `{expr}` with the placeholder identifier; `{{`/`}}` become literal braces.
fn fill_placeholders(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut depth = 1;
                for inner in chars.by_ref() {
                    match inner {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                }
                out.push_str(PLACEHOLDER);
            }
            c => out.push(c),
        }
    }
    out
}

fn unescape(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    let mut chars = literal.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            // Line continuation
            Some('\n') => {}
            Some(other @ ('\\' | '\'' | '"')) => out.push(other),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_literal_forms() {
        let program = r#"
spark.sql("SELECT 1")
df = spark.sql('SELECT \'a\' AS x')
spark.sql("""
    SELECT *
    FROM sales
""")
spark.sql(f"DELETE FROM {target} WHERE id = {row['id']}")
spark.sql(query)
"#;
        let sqls = extract_sqls(program);
        assert_eq!(sqls.len(), 4);
        assert_eq!(sqls[0], "SELECT 1");
        assert_eq!(sqls[1], "SELECT 'a' AS x");
        assert!(sqls[2].starts_with("SELECT *"));
        assert_eq!(
            sqls[3],
            "DELETE FROM __placeholder__ WHERE id = __placeholder__"
        );
    }

    #[test]
    fn test_partial_literals_are_not_extracted() {
        let program = r#"
df = spark.sql("SELECT * FROM " + table)
spark.sql("SELECT a "
          "FROM t")
spark.sql(sql_text, args)
spark.sql("SELECT b FROM t", args)
"#;
        assert_eq!(extract_sqls(program), vec!["SELECT b FROM t"]);
    }

    #[test]
    fn test_commented_calls_are_skipped() {
        let program = r##"
# spark.sql("SELEC broken")
x = "#"; spark.sql("SELECT 1")  # spark.sql("also ignored")
"##;
        assert_eq!(extract_sqls(program), vec!["SELECT 1"]);
        assert!(check_sqls(&extract_sqls(program)).is_empty());
    }

    #[test]
    fn test_fstring_braces() {
        assert_eq!(fill_placeholders("a {{b}} {c}"), "a {b} __placeholder__");
        assert_eq!(fill_placeholders("{d[{k}]}"), PLACEHOLDER);
    }

    #[test]
    fn test_check_sqls_reports_failures() {
        let sqls = vec![
            "SELECT id FROM t WHERE __placeholder__ > 1".to_string(),
            "SELEC id FROM t".to_string(),
        ];
        let errors = check_sqls(&sqls);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("SqlParseError: SELEC id FROM t\nError: "));
    }

    #[test]
    fn test_databricks_statements_parse() {
        assert!(check_sql("CREATE OR REPLACE TEMPORARY VIEW v AS SELECT 1 AS x").is_ok());
        assert!(check_sql("SELECT current_timestamp(), coalesce(a, 0) FROM t LIMIT 10").is_ok());
    }
}
