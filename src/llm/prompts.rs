//! Prompts for conversion and fix requests.

use crate::models::{CommentLang, SqlDialect};

const TSQL_SYSTEM_PROMPT: &str = r#"You convert T-SQL (SQL Server) scripts into Databricks notebooks written in Python.

Rules:
- Output one Python program in a single ```python fenced block and nothing else.
- Run every SQL statement through spark.sql("...") using Databricks SQL syntax.
- Replace T-SQL variables (DECLARE/SET @x) with Python variables and pass them into the SQL with f-strings.
- Replace temporary tables (#tmp) with temporary views created by spark.sql or DataFrame.createOrReplaceTempView.
- Replace procedural control flow (IF, WHILE, TRY/CATCH, cursors) with Python control flow.
- Replace T-SQL specific functions with their Databricks SQL equivalents (GETDATE() -> current_timestamp(), ISNULL -> coalesce, TOP n -> LIMIT n).
- Drop statements that have no meaning on Databricks (GO, SET NOCOUNT ON, transaction isolation settings) and leave a comment where you do.
- Separate logical steps with a line containing only `# COMMAND ----------`.
- Keep object names as they are unless they are invalid in Databricks SQL."#;

/// System prompt for converting files of `dialect`.
pub fn conversion_system_prompt(dialect: SqlDialect, comment_lang: CommentLang) -> String {
    let base = match dialect {
        SqlDialect::Tsql => TSQL_SYSTEM_PROMPT,
    };
    format!("{}\n{}", base, comment_directive(comment_lang))
}

/// Instruction fixing the natural language of comments in generated code.
pub fn comment_directive(comment_lang: CommentLang) -> String {
    format!(
        "- Write all comments in the notebook in {}.",
        comment_lang.as_str()
    )
}

/// System prompt for repair requests.
pub fn fix_system_prompt(comment_lang: CommentLang) -> String {
    format!(
        "You repair Databricks notebooks written in Python.\n\
         - You are given a program and the static check errors found in it.\n\
         - Fix every listed error and change nothing else.\n\
         - SQL inside spark.sql(...) must be valid Databricks SQL.\n\
         - Output the whole corrected program in a single ```python fenced block and nothing else.\n\
         {}",
        comment_directive(comment_lang)
    )
}

/// User message for a repair request.
pub fn fix_user_prompt(program: &str, errors: &[String]) -> String {
    let mut prompt = String::from("Program:\n```python\n");
    prompt.push_str(program.trim_end());
    prompt.push_str("\n```\n\nErrors:\n");
    for (i, error) in errors.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, error));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comment_language_is_applied() {
        let prompt = conversion_system_prompt(SqlDialect::Tsql, CommentLang::Japanese);
        assert!(prompt.contains("T-SQL"));
        assert!(prompt.ends_with("in Japanese."));
        assert!(fix_system_prompt(CommentLang::English).contains("in English."));
    }

    #[test]
    fn test_fix_user_prompt_lists_errors() {
        let prompt = fix_user_prompt("x = (\n", &["first".into(), "second".into()]);
        assert!(prompt.contains("```python\nx = (\n```"));
        assert!(prompt.contains("1. first\n2. second\n"));
    }
}
