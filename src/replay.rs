//! Replay text: the command-line form entities are serialized to.
//!
//! One statement per line, `<type> <name> <verb> [-option value ...]`. Values
//! containing whitespace or quote characters are wrapped in double quotes with
//! `\` escaping inside.

use crate::errors::{DatastoreError, Result};

fn needs_quoting(value: &str) -> bool {
    value.is_empty() || value.chars().any(|c| c.is_whitespace() || c == '"' || c == '\\')
}

/// Quotes `value` when it could not be read back as a single token.
pub fn escape(value: &str) -> String {
    if !needs_quoting(value) {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Appends ` <escaped value>` to `line`.
pub fn push_value(line: &mut String, value: &str) {
    line.push(' ');
    line.push_str(&escape(value));
}

/// Splits one replay line into tokens, honoring double quotes and backslash
/// escapes.
pub fn tokenize(line: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut token = String::new();
    let mut in_token = false;
    let mut in_quotes = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let escaped = chars.next().ok_or_else(|| {
                    DatastoreError::InvalidArgs(format!("dangling escape: {}", line))
                })?;
                token.push(escaped);
                in_token = true;
            }
            '"' => {
                in_quotes = !in_quotes;
                in_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if in_token {
                    tokens.push(std::mem::take(&mut token));
                    in_token = false;
                }
            }
            c => {
                token.push(c);
                in_token = true;
            }
        }
    }
    if in_quotes {
        return Err(DatastoreError::InvalidArgs(format!(
            "unterminated quote: {}",
            line
        )));
    }
    if in_token {
        tokens.push(token);
    }
    Ok(tokens)
}

/// One parsed statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub type_name: String,
    pub name: String,
    pub verb: String,
    pub args: Vec<String>,
}

/// Parses a statement line. Blank lines and `#` comments yield `None`.
pub fn parse_statement(line: &str) -> Result<Option<Statement>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let mut tokens = tokenize(trimmed)?.into_iter();
    let (Some(type_name), Some(name), Some(verb)) = (tokens.next(), tokens.next(), tokens.next())
    else {
        return Err(DatastoreError::InvalidArgs(format!(
            "incomplete statement: {}",
            trimmed
        )));
    };
    Ok(Some(Statement {
        type_name,
        name,
        verb,
        args: tokens.collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_values_are_untouched() {
        assert_eq!(escape(":ch1"), ":ch1");
        assert_eq!(escape("10.0.0.1"), "10.0.0.1");
    }

    #[test]
    fn test_quote_and_space_are_escaped() {
        assert_eq!(escape(":my ch"), "\":my ch\"");
        assert_eq!(escape(":a\"b"), "\":a\\\"b\"");
        assert_eq!(escape(""), "\"\"");
    }

    #[test]
    fn test_escaped_name_reads_back() {
        for name in [":a\"b", ":my channel", ":back\\slash", ":\"", ""] {
            let line = format!("channel {} create", escape(name));
            let stmt = parse_statement(&line).unwrap().unwrap();
            assert_eq!(stmt.name, name);
            assert_eq!(stmt.verb, "create");
        }
    }

    #[test]
    fn test_statement_shape() {
        let stmt = parse_statement("controller :c1 create -channel :ch1 -role master\n")
            .unwrap()
            .unwrap();
        assert_eq!(stmt.type_name, "controller");
        assert_eq!(stmt.args, vec!["-channel", ":ch1", "-role", "master"]);
        assert!(parse_statement("   ").unwrap().is_none());
        assert!(parse_statement("# comment").unwrap().is_none());
        assert!(parse_statement("controller :c1").is_err());
        assert!(parse_statement("controller \":c1 create").is_err());
    }
}
