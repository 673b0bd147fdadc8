//! Helpers for building Confluence Query Language strings.

use std::sync::OnceLock;

use regex::{Captures, Regex};

const RESERVED_WORDS: &[&str] = &[
    "after", "and", "as", "avg", "before", "begin", "by", "commit", "contains", "count",
    "distinct", "else", "empty", "end", "explain", "from", "having", "if", "in", "inner",
    "insert", "into", "is", "isnull", "left", "like", "limit", "max", "min", "not", "null",
    "or", "order", "outer", "right", "select", "sum", "then", "was", "where", "update",
];

const CQL_OPERATORS: &[&str] = &["=", "~", " AND ", " OR "];

fn space_clause() -> &'static Regex {
    static SPACE_CLAUSE: OnceLock<Regex> = OnceLock::new();
    SPACE_CLAUSE.get_or_init(|| {
        Regex::new(r#"space\s*=\s*([^\s"()]+)"#).unwrap_or_else(|e| unreachable!("{e}"))
    })
}

fn needs_quoting(identifier: &str) -> bool {
    identifier.starts_with('~')
        || identifier.starts_with(|c: char| c.is_ascii_digit())
        || identifier.contains(['"', '\\'])
        || RESERVED_WORDS.contains(&identifier.to_ascii_lowercase().as_str())
}

/// Quote an identifier when CQL would otherwise misread it.
pub fn quote_identifier(identifier: &str) -> String {
    if !needs_quoting(identifier) {
        return identifier.to_string();
    }
    let escaped = identifier.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Quote bare values of `space = KEY` clauses that need it.
pub fn auto_quote_space_keys(cql: &str) -> String {
    space_clause()
        .replace_all(cql, |caps: &Captures<'_>| {
            let key = &caps[1];
            let quoted = quote_identifier(key);
            if quoted == key {
                caps[0].to_string()
            } else {
                caps[0].replacen(key, &quoted, 1)
            }
        })
        .into_owned()
}

/// Turn free text into a `text ~` search. Queries that already use CQL operators pass through.
pub fn content_query(query: &str) -> String {
    let cql = if CQL_OPERATORS.iter().any(|op| query.contains(op)) {
        query.to_string()
    } else {
        format!("text ~ \"{}\"", escape_literal(query))
    };
    auto_quote_space_keys(&cql)
}

/// Turn a name into a user search unless it already references `user.` fields.
pub fn user_query(query: &str) -> String {
    if query.contains("user.") {
        query.to_string()
    } else {
        format!("user.fullname ~ \"{}\"", escape_literal(query))
    }
}

/// Escape a value for use inside a double-quoted CQL or JQL string.
pub(crate) fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
