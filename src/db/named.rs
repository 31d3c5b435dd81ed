//! Named placeholder rewriting.
//!
//! Statements reference parameters as `@name`. Before execution every
//! placeholder is rewritten to PostgreSQL's positional `$n` form; a name
//! used more than once keeps the index of its first occurrence.
//!
//! The scanner understands just enough SQL lexis to leave placeholder
//! lookalikes alone: single-quoted strings (including `E'...'` escapes),
//! double-quoted identifiers, dollar-quoted bodies, `--` line comments and
//! nested `/* */` block comments. `@@` is kept as the text-search operator.

use crate::error::{DbError, DbResult};
use crate::models::{NamedParams, QueryParam};

/// A statement whose `@name` placeholders were rewritten to `$n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedStatement {
    original: String,
    sql: String,
    names: Vec<String>,
}

impl NamedStatement {
    /// Rewrite the placeholders of `sql`.
    ///
    /// Fails when the statement mixes `@name` with positional `$n`
    /// placeholders, since the two numbering schemes would collide.
    pub fn parse(sql: impl Into<String>) -> DbResult<Self> {
        let original = sql.into();
        let scan = scan(&original);

        if !scan.names.is_empty() && scan.has_positional {
            return Err(DbError::binding(
                scan.names[0].as_str(),
                "statement mixes named (@name) and positional ($n) placeholders",
            ));
        }

        Ok(Self {
            original,
            sql: scan.sql,
            names: scan.names,
        })
    }

    /// Rewritten statement text, as sent to the server.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Statement text as written by the caller.
    pub fn original(&self) -> &str {
        &self.original
    }

    /// Parameter names in `$n` order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn has_placeholders(&self) -> bool {
        !self.names.is_empty()
    }

    /// Resolve the values to bind, in `$n` order.
    ///
    /// Every referenced name must be present in `params`. Nothing is sent
    /// to the server when one is missing.
    pub fn bind_values<'p>(&self, params: &'p NamedParams) -> DbResult<Vec<&'p QueryParam>> {
        self.names
            .iter()
            .map(|name| {
                params.get(name).ok_or_else(|| {
                    DbError::binding(
                        name.as_str(),
                        "referenced by the statement but missing from the parameter set",
                    )
                })
            })
            .collect()
    }
}

struct Scan {
    sql: String,
    names: Vec<String>,
    has_positional: bool,
}

fn scan(sql: &str) -> Scan {
    let bytes = sql.as_bytes();
    let len = bytes.len();
    let mut out = String::with_capacity(len + 8);
    let mut names: Vec<String> = Vec::new();
    let mut has_positional = false;
    let mut copied = 0;
    let mut i = 0;

    while i < len {
        match bytes[i] {
            b'\'' => {
                let escapes = i > 0
                    && matches!(bytes[i - 1], b'E' | b'e')
                    && (i == 1 || !is_ident_char(bytes[i - 2]));
                i = skip_quoted(bytes, i, b'\'', escapes);
            }
            b'"' => i = skip_quoted(bytes, i, b'"', false),
            b'-' if bytes.get(i + 1) == Some(&b'-') => i = skip_line_comment(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i),
            b'$' => {
                if bytes.get(i + 1).is_some_and(u8::is_ascii_digit) {
                    has_positional = true;
                    i += 1;
                } else {
                    i = skip_dollar_quoted(bytes, i);
                }
            }
            b'@' if bytes.get(i + 1) == Some(&b'@') => i += 2,
            b'@' if bytes.get(i + 1).is_some_and(|b| is_ident_start(*b)) => {
                let start = i + 1;
                let mut end = start;
                while end < len && is_ident_char(bytes[end]) {
                    end += 1;
                }
                let name = &sql[start..end];
                let index = match names.iter().position(|n| n == name) {
                    Some(pos) => pos + 1,
                    None => {
                        names.push(name.to_string());
                        names.len()
                    }
                };
                out.push_str(&sql[copied..i]);
                out.push('$');
                out.push_str(&index.to_string());
                copied = end;
                i = end;
            }
            _ => i += 1,
        }
    }
    out.push_str(&sql[copied..]);

    Scan {
        sql: out,
        names,
        has_positional,
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Skip a quoted run starting at `start`; returns the index after the closing quote.
fn skip_quoted(bytes: &[u8], start: usize, quote: u8, backslash_escapes: bool) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        let b = bytes[i];
        if backslash_escapes && b == b'\\' {
            i += 2;
            continue;
        }
        if b == quote {
            // doubled quote is an escaped quote
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

fn skip_line_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |pos| start + pos + 1)
}

fn skip_block_comment(bytes: &[u8], start: usize) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while i + 1 < bytes.len() {
        match (bytes[i], bytes[i + 1]) {
            (b'/', b'*') => {
                depth += 1;
                i += 2;
            }
            (b'*', b'/') => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return i;
                }
            }
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Skip `$tag$ ... $tag$`. A `$` that does not open a tag is consumed alone.
fn skip_dollar_quoted(bytes: &[u8], start: usize) -> usize {
    let mut j = start + 1;
    while j < bytes.len() && is_ident_char(bytes[j]) {
        j += 1;
    }
    if j >= bytes.len() || bytes[j] != b'$' {
        return start + 1;
    }
    let tag = &bytes[start..=j];
    let body = j + 1;
    bytes[body..]
        .windows(tag.len())
        .position(|w| w == tag)
        .map_or(bytes.len(), |pos| body + pos + tag.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrites_named_placeholders() {
        let stmt =
            NamedStatement::parse("INSERT INTO author (name, bio) VALUES (@name, @bio) RETURNING *")
                .unwrap();
        assert_eq!(
            stmt.sql(),
            "INSERT INTO author (name, bio) VALUES ($1, $2) RETURNING *"
        );
        assert_eq!(stmt.names(), &["name".to_string(), "bio".to_string()]);
    }

    #[test]
    fn test_repeated_name_reuses_index() {
        let stmt =
            NamedStatement::parse("SELECT * FROM t WHERE a = @x OR b = @y OR c = @x").unwrap();
        assert_eq!(stmt.sql(), "SELECT * FROM t WHERE a = $1 OR b = $2 OR c = $1");
        assert_eq!(stmt.names().len(), 2);
    }

    #[test]
    fn test_ignores_quoted_text_and_comments() {
        let sql = "SELECT '@not', \"@col\", E'it\\'s @x' -- @comment\n /* @block /* @nested */ */ FROM t WHERE id = @id";
        let stmt = NamedStatement::parse(sql).unwrap();
        assert_eq!(stmt.names(), &["id".to_string()]);
        assert!(stmt.sql().ends_with("WHERE id = $1"));
        assert!(stmt.sql().contains("'@not'"));
        assert!(stmt.sql().contains("\"@col\""));
    }

    #[test]
    fn test_ignores_dollar_quoted_body() {
        let sql = "SELECT $fn$ @inside $fn$, $$ @also $$, @outside";
        let stmt = NamedStatement::parse(sql).unwrap();
        assert_eq!(stmt.names(), &["outside".to_string()]);
        assert_eq!(stmt.sql(), "SELECT $fn$ @inside $fn$, $$ @also $$, $1");
    }

    #[test]
    fn test_doubled_quote_inside_string() {
        let stmt = NamedStatement::parse("SELECT 'O''Brien @x', @y").unwrap();
        assert_eq!(stmt.names(), &["y".to_string()]);
    }

    #[test]
    fn test_operators_left_alone() {
        let stmt =
            NamedStatement::parse("SELECT doc @@ to_tsquery(@q), tags @> @tags, @ -1").unwrap();
        assert_eq!(stmt.names(), &["q".to_string(), "tags".to_string()]);
        assert_eq!(stmt.sql(), "SELECT doc @@ to_tsquery($1), tags @> $2, @ -1");
    }

    #[test]
    fn test_no_placeholders() {
        let stmt = NamedStatement::parse("SELECT 1").unwrap();
        assert!(!stmt.has_placeholders());
        assert_eq!(stmt.sql(), stmt.original());
    }

    #[test]
    fn test_positional_only_is_accepted() {
        let stmt = NamedStatement::parse("SELECT $1::int").unwrap();
        assert!(!stmt.has_placeholders());
        assert_eq!(stmt.sql(), "SELECT $1::int");
    }

    #[test]
    fn test_mixed_placeholders_rejected() {
        let err = NamedStatement::parse("SELECT @a, $1").unwrap_err();
        assert!(matches!(err, DbError::Binding { .. }));
    }

    #[test]
    fn test_unicode_text_preserved() {
        let stmt = NamedStatement::parse("SELECT 'héllo @x' AS \"naïve\", @name").unwrap();
        assert_eq!(stmt.names(), &["name".to_string()]);
        assert_eq!(stmt.sql(), "SELECT 'héllo @x' AS \"naïve\", $1");
    }

    #[test]
    fn test_bind_values_in_order() {
        let stmt = NamedStatement::parse("SELECT @b, @a, @b").unwrap();
        let params = NamedParams::new().with("a", 1i64).with("b", 2i64).with("unused", true);
        let values = stmt.bind_values(&params).unwrap();
        assert_eq!(values, vec![&QueryParam::Int(2), &QueryParam::Int(1)]);
    }

    #[test]
    fn test_bind_values_missing_name() {
        let stmt = NamedStatement::parse("SELECT name FROM author WHERE id = @id").unwrap();
        let err = stmt.bind_values(&NamedParams::new()).unwrap_err();
        match err {
            DbError::Binding { parameter, .. } => assert_eq!(parameter, "id"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_all_present_never_binding_error() {
        for sql in [
            "SELECT @a",
            "SELECT @a, @b, @a",
            "UPDATE t SET x = @x WHERE id = @id AND y <> '@y'",
        ] {
            let stmt = NamedStatement::parse(sql).unwrap();
            let params: NamedParams = stmt
                .names()
                .iter()
                .map(|n| (n.clone(), QueryParam::Int(1)))
                .collect();
            assert!(stmt.bind_values(&params).is_ok(), "{sql}");
        }
    }
}
