//! T-SQL comment stripping and whitespace normalization.

#[derive(Clone, Copy)]
enum State {
    Code,
    /// Inside quoted text; holds the closing character.
    Quoted(char),
    LineComment,
    /// Block comments nest in T-SQL; holds the depth.
    BlockComment(usize),
}

/// Remove `--` and `/* */` comments, collapse runs of whitespace outside
/// quoted text to one space, and drop blank lines.
///
/// Comment markers inside `'...'`, `"..."` and `[...]` are left alone.
pub fn strip_sql_comments(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut state = State::Code;

    while let Some(c) = chars.next() {
        match state {
            State::Code => match c {
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    state = State::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    push_space(&mut out);
                    state = State::BlockComment(1);
                }
                '\'' | '"' => {
                    out.push(c);
                    state = State::Quoted(c);
                }
                '[' => {
                    out.push(c);
                    state = State::Quoted(']');
                }
                '\n' => end_line(&mut out),
                c if c.is_whitespace() => push_space(&mut out),
                c => out.push(c),
            },
            // Doubled quotes ('' and ]]) close and reopen, which round-trips
            State::Quoted(close) => {
                out.push(c);
                if c == close {
                    state = State::Code;
                }
            }
            State::LineComment => {
                if c == '\n' {
                    end_line(&mut out);
                    state = State::Code;
                }
            }
            State::BlockComment(depth) => {
                if c == '/' && chars.peek() == Some(&'*') {
                    chars.next();
                    state = State::BlockComment(depth + 1);
                } else if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = if depth == 1 {
                        State::Code
                    } else {
                        State::BlockComment(depth - 1)
                    };
                }
            }
        }
    }

    end_line(&mut out);
    out.truncate(out.trim_end().len());
    out
}

fn push_space(out: &mut String) {
    if !out.is_empty() && !out.ends_with(' ') && !out.ends_with('\n') {
        out.push(' ');
    }
}

fn end_line(out: &mut String) {
    out.truncate(out.trim_end_matches(' ').len());
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_and_block_comments() {
        let sql = "-- header\nSELECT a, /* inline */ b\nFROM t; -- trailing\n";
        assert_eq!(strip_sql_comments(sql), "SELECT a, b\nFROM t;");
    }

    #[test]
    fn test_nested_block_comment() {
        let sql = "SELECT 1 /* outer /* inner */ still comment */ AS x";
        assert_eq!(strip_sql_comments(sql), "SELECT 1 AS x");
    }

    #[test]
    fn test_markers_inside_quotes_are_kept() {
        let sql = "SELECT '--not', \"/*col*/\", [a--b] FROM t";
        assert_eq!(strip_sql_comments(sql), sql);
    }

    #[test]
    fn test_escaped_quote() {
        let sql = "SELECT 'it''s -- here' -- gone";
        assert_eq!(strip_sql_comments(sql), "SELECT 'it''s -- here'");
    }

    #[test]
    fn test_whitespace_and_blank_lines() {
        let sql = "  SELECT\t  1\r\n\r\n\n   FROM    t  \n/* only\ncomment */\nGO";
        assert_eq!(strip_sql_comments(sql), "SELECT 1\nFROM t\nGO");
    }

    #[test]
    fn test_spacing_inside_literals_is_kept() {
        let sql = "SELECT 'a    b'";
        assert_eq!(strip_sql_comments(sql), sql);
    }
}
