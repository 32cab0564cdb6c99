//! SQL script statement splitter.
//!
//! Turns a script blob into an ordered sequence of executable statements,
//! honoring quoted strings, comments, and `DELIMITER` directives. The
//! splitter is a pure function of the input text: it keeps no state between
//! calls and touches no I/O.
//!
//! Policy choices:
//! - Comments are stripped from emitted statements. A block comment is
//!   replaced by a single space so it cannot join adjacent tokens; the
//!   newline terminating a line comment is kept.
//! - A `DELIMITER <token>` line is recognized only at a line start outside
//!   quotes and comments, and is never emitted as a statement.
//! - Statement text is trimmed; empty fragments between delimiters are
//!   dropped.

use crate::error::{Error, Result};

/// Split a SQL script into individual statements.
///
/// Returns statements in source order. An empty script, or one consisting
/// only of whitespace, comments, and `DELIMITER` directives, yields an empty
/// vector. Unterminated quotes or block comments fail with
/// [`Error::MalformedScript`].
pub fn split_script(script: &str) -> Result<Vec<String>> {
    let chars: Vec<char> = script.chars().collect();
    let mut statements = Vec::new();
    let mut buf = String::new();
    let mut delimiter: Vec<char> = vec![';'];
    let mut i = 0;
    let mut line = 1;
    // True once the current source line holds anything but whitespace.
    // DELIMITER directives are only recognized while this is false.
    let mut line_has_content = false;

    while i < chars.len() {
        let c = chars[i];

        if !line_has_content {
            if let Some((token, next, next_line)) = parse_delimiter_directive(&chars, i, line)? {
                delimiter = token;
                i = next;
                line = next_line;
                line_has_content = false;
                continue;
            }
        }

        // Active delimiter ends the statement being accumulated.
        if starts_with(&chars, i, &delimiter) {
            flush(&mut buf, &mut statements);
            i += delimiter.len();
            line_has_content = true;
            continue;
        }

        match c {
            '\'' | '"' | '`' => {
                i = consume_quoted(&chars, i, &mut buf, &mut line)?;
                line_has_content = true;
            }
            '-' if starts_line_comment(&chars, i) => {
                i += 2;
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '#' => {
                i += 1;
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if i + 1 < chars.len() && chars[i + 1] == '*' => {
                i = consume_block_comment(&chars, i, &mut line)?;
                buf.push(' ');
                line_has_content = true;
            }
            '\n' => {
                buf.push(c);
                line += 1;
                line_has_content = false;
                i += 1;
            }
            _ => {
                buf.push(c);
                if !c.is_whitespace() {
                    line_has_content = true;
                }
                i += 1;
            }
        }
    }

    flush(&mut buf, &mut statements);
    Ok(statements)
}

/// Try to parse a `DELIMITER <token>` directive starting at `i`.
///
/// Returns the new delimiter, the index just past the directive line, and
/// the updated line number. `Ok(None)` means the text at `i` is not a
/// directive.
fn parse_delimiter_directive(
    chars: &[char],
    i: usize,
    line: usize,
) -> Result<Option<(Vec<char>, usize, usize)>> {
    const KEYWORD: &str = "DELIMITER";
    let keyword_len = KEYWORD.len();
    if i + keyword_len > chars.len() {
        return Ok(None);
    }
    let matches = KEYWORD
        .chars()
        .zip(&chars[i..i + keyword_len])
        .all(|(k, &c)| c.eq_ignore_ascii_case(&k));
    if !matches {
        return Ok(None);
    }
    let mut j = i + keyword_len;
    if j >= chars.len() || (chars[j] != ' ' && chars[j] != '\t') {
        return Ok(None);
    }
    while j < chars.len() && (chars[j] == ' ' || chars[j] == '\t') {
        j += 1;
    }
    let mut end = j;
    while end < chars.len() && chars[end] != '\n' {
        end += 1;
    }
    let token: String = chars[j..end].iter().collect();
    let token = token.trim_end();
    if token.is_empty() {
        return Err(Error::malformed_script(
            line,
            "DELIMITER directive without a token",
        ));
    }
    // Consume the trailing newline so the directive leaves no trace in the
    // statement buffer.
    let (next, next_line) = if end < chars.len() {
        (end + 1, line + 1)
    } else {
        (end, line)
    };
    Ok(Some((token.chars().collect(), next, next_line)))
}

/// Consume a quoted region starting at `i` (which holds the opening quote),
/// appending it verbatim to `buf`. Backslash escapes the next character
/// inside `'` and `"` quotes; backquoted identifiers have no escapes.
fn consume_quoted(chars: &[char], i: usize, buf: &mut String, line: &mut usize) -> Result<usize> {
    let quote = chars[i];
    let open_line = *line;
    buf.push(quote);
    let mut j = i + 1;
    while j < chars.len() {
        let c = chars[j];
        if c == '\\' && quote != '`' {
            buf.push(c);
            j += 1;
            if j < chars.len() {
                if chars[j] == '\n' {
                    *line += 1;
                }
                buf.push(chars[j]);
                j += 1;
            }
            continue;
        }
        if c == '\n' {
            *line += 1;
        }
        buf.push(c);
        j += 1;
        if c == quote {
            return Ok(j);
        }
    }
    Err(Error::malformed_script(
        open_line,
        format!("unterminated {quote} quote"),
    ))
}

/// Consume a `/* ... */` block comment starting at `i`. Returns the index
/// just past the closing `*/`.
fn consume_block_comment(chars: &[char], i: usize, line: &mut usize) -> Result<usize> {
    let open_line = *line;
    let mut j = i + 2;
    while j + 1 < chars.len() {
        if chars[j] == '*' && chars[j + 1] == '/' {
            return Ok(j + 2);
        }
        if chars[j] == '\n' {
            *line += 1;
        }
        j += 1;
    }
    Err(Error::malformed_script(open_line, "unterminated block comment"))
}

/// `--` starts a line comment only when followed by whitespace or the end of
/// input (MySQL semantics, so expressions like `a--b` are left alone).
fn starts_line_comment(chars: &[char], i: usize) -> bool {
    if i + 1 >= chars.len() || chars[i + 1] != '-' {
        return false;
    }
    match chars.get(i + 2) {
        None => true,
        Some(c) => c.is_whitespace(),
    }
}

fn starts_with(chars: &[char], i: usize, needle: &[char]) -> bool {
    chars.len() >= i + needle.len() && chars[i..i + needle.len()] == *needle
}

fn flush(buf: &mut String, statements: &mut Vec<String>) {
    let trimmed = buf.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
    buf.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_script() {
        assert!(split_script("").expect("split").is_empty());
        assert!(split_script("   \n\t\n").expect("split").is_empty());
    }

    #[test]
    fn test_single_statement_with_delimiter() {
        let stmts = split_script("SELECT 1;").expect("split");
        assert_eq!(stmts, vec!["SELECT 1"]);
    }

    #[test]
    fn test_trailing_statement_without_delimiter() {
        let stmts = split_script("SELECT 1; SELECT 2").expect("split");
        assert_eq!(stmts, vec!["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn test_statements_in_source_order() {
        let script = "INSERT INTO t VALUES (1);\nINSERT INTO t VALUES (2);\nINSERT INTO t VALUES (3);";
        let stmts = split_script(script).expect("split");
        assert_eq!(stmts.len(), 3);
        assert!(stmts[0].contains("(1)"));
        assert!(stmts[2].contains("(3)"));
    }

    #[test]
    fn test_line_comment_stripped() {
        let script = "INSERT INTO t VALUES (1);\n-- comment\nINSERT INTO t VALUES (2);";
        let stmts = split_script(script).expect("split");
        assert_eq!(
            stmts,
            vec!["INSERT INTO t VALUES (1)", "INSERT INTO t VALUES (2)"]
        );
        assert!(!stmts[1].contains("comment"));
    }

    #[test]
    fn test_hash_comment_stripped() {
        let stmts = split_script("# header\nSELECT 1;").expect("split");
        assert_eq!(stmts, vec!["SELECT 1"]);
    }

    #[test]
    fn test_delimiter_inside_line_comment_ignored() {
        let stmts = split_script("SELECT 1 -- not the end ;\n+ 2;").expect("split");
        assert_eq!(stmts, vec!["SELECT 1 \n+ 2"]);
    }

    #[test]
    fn test_block_comment_stripped_and_spaced() {
        let stmts = split_script("SELECT/* inline ; comment */1;").expect("split");
        assert_eq!(stmts, vec!["SELECT 1"]);
    }

    #[test]
    fn test_multiline_block_comment() {
        let script = "/* spanning\nseveral ; lines\n*/ SELECT 1;";
        let stmts = split_script(script).expect("split");
        assert_eq!(stmts, vec!["SELECT 1"]);
    }

    #[test]
    fn test_double_dash_without_space_is_not_comment() {
        let stmts = split_script("SELECT 5--3;").expect("split");
        assert_eq!(stmts, vec!["SELECT 5--3"]);
    }

    #[test]
    fn test_delimiter_in_single_quotes_not_split() {
        let stmts = split_script("INSERT INTO t VALUES ('a;b');").expect("split");
        assert_eq!(stmts, vec!["INSERT INTO t VALUES ('a;b')"]);
    }

    #[test]
    fn test_delimiter_in_double_quotes_not_split() {
        let stmts = split_script("SELECT \"x;y\";").expect("split");
        assert_eq!(stmts, vec!["SELECT \"x;y\""]);
    }

    #[test]
    fn test_delimiter_in_backquoted_identifier_not_split() {
        let stmts = split_script("SELECT `weird;name` FROM t;").expect("split");
        assert_eq!(stmts, vec!["SELECT `weird;name` FROM t"]);
    }

    #[test]
    fn test_escaped_quote_inside_string() {
        let stmts = split_script("INSERT INTO t VALUES ('it\\'s;fine');").expect("split");
        assert_eq!(stmts, vec!["INSERT INTO t VALUES ('it\\'s;fine')"]);
    }

    #[test]
    fn test_doubled_quote_inside_string() {
        // '' reads as close-then-reopen, which leaves delimiter matching
        // outside the quotes untouched.
        let stmts = split_script("INSERT INTO t VALUES ('it''s');").expect("split");
        assert_eq!(stmts, vec!["INSERT INTO t VALUES ('it''s')"]);
    }

    #[test]
    fn test_comment_start_inside_string_preserved() {
        let stmts = split_script("SELECT '-- not a comment';").expect("split");
        assert_eq!(stmts, vec!["SELECT '-- not a comment'"]);
    }

    #[test]
    fn test_delimiter_directive_round_trip() {
        let script = "\
DELIMITER //
CREATE PROCEDURE p()
BEGIN
  INSERT INTO t VALUES (1);
  INSERT INTO t VALUES (2);
END//
DELIMITER ;
SELECT 1;";
        let stmts = split_script(script).expect("split");
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].starts_with("CREATE PROCEDURE"));
        // Semicolons inside the procedure body survive intact.
        assert!(stmts[0].contains("VALUES (1);"));
        assert_eq!(stmts[1], "SELECT 1");
    }

    #[test]
    fn test_delimiter_directive_case_insensitive() {
        let stmts = split_script("delimiter $$\nSELECT 1$$").expect("split");
        assert_eq!(stmts, vec!["SELECT 1"]);
    }

    #[test]
    fn test_delimiter_directive_with_leading_whitespace() {
        let stmts = split_script("   DELIMITER //\nSELECT 1//").expect("split");
        assert_eq!(stmts, vec!["SELECT 1"]);
    }

    #[test]
    fn test_delimiter_directive_not_emitted() {
        let stmts = split_script("DELIMITER //\nDELIMITER ;\n").expect("split");
        assert!(stmts.is_empty());
    }

    #[test]
    fn test_delimiter_keyword_mid_line_is_plain_text() {
        let stmts = split_script("SELECT 'x' AS delimiter_test;").expect("split");
        assert_eq!(stmts, vec!["SELECT 'x' AS delimiter_test"]);
    }

    #[test]
    fn test_multichar_delimiter() {
        let stmts = split_script("DELIMITER $$\nSELECT 1$$SELECT 2$$").expect("split");
        assert_eq!(stmts, vec!["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn test_comments_and_directives_only_yield_nothing() {
        let script = "-- top\n/* block */\nDELIMITER //\n# tail\n";
        assert!(split_script(script).expect("split").is_empty());
    }

    #[test]
    fn test_empty_fragments_dropped() {
        let stmts = split_script(";;;SELECT 1;;;").expect("split");
        assert_eq!(stmts, vec!["SELECT 1"]);
    }

    #[test]
    fn test_unterminated_single_quote_is_error() {
        let err = split_script("SELECT 'oops;\n").expect_err("must fail");
        match err {
            Error::MalformedScript { line, .. } => assert_eq!(line, 1),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unterminated_block_comment_is_error() {
        let err = split_script("SELECT 1;\n/* never closed").expect_err("must fail");
        match err {
            Error::MalformedScript { line, message } => {
                assert_eq!(line, 2);
                assert!(message.contains("block comment"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_delimiter_directive_without_token_is_error() {
        let err = split_script("DELIMITER \nSELECT 1;").expect_err("must fail");
        assert!(matches!(err, Error::MalformedScript { line: 1, .. }));
    }

    #[test]
    fn test_restartable_pure_function() {
        let script = "SELECT 1; SELECT 2;";
        let first = split_script(script).expect("split");
        let second = split_script(script).expect("split");
        assert_eq!(first, second);
    }

    #[test]
    fn test_n_statements_for_n_delimiters() {
        let script: String = (0..20).map(|n| format!("SELECT {n};")).collect();
        let stmts = split_script(&script).expect("split");
        assert_eq!(stmts.len(), 20);
    }
}
