/*!
Record filter expressions.

The record store accepts a small query language (`field = "value"`, clauses
joined by `&&`). Filters are only ever built here so that user-controlled
values are always quoted and escaped, never spliced into the expression.
*/

use std::fmt;

use crate::{BrowserBytesError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Clause {
    field: String,
    value: String,
}

/// A conjunction of `field = "value"` clauses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    /// Start a filter matching records whose `field` equals `value`
    ///
    /// # Errors
    /// * `BrowserBytesError::Validation` - `field` is not a plain identifier
    pub fn eq(field: &str, value: impl Into<String>) -> Result<Self> {
        Self { clauses: Vec::new() }.and_eq(field, value)
    }

    /// Add another equality clause
    pub fn and_eq(mut self, field: &str, value: impl Into<String>) -> Result<Self> {
        validate_field(field)?;
        self.clauses.push(Clause {
            field: field.to_string(),
            value: value.into(),
        });
        Ok(self)
    }

    /// The `(field, value)` pairs of every clause, unescaped
    pub fn equalities(&self) -> impl Iterator<Item = (&str, &str)> {
        self.clauses
            .iter()
            .map(|c| (c.field.as_str(), c.value.as_str()))
    }

    /// True when `lookup` returns a matching value for every clause
    pub fn matches<'a>(&self, lookup: impl Fn(&str) -> Option<&'a str>) -> bool {
        self.clauses
            .iter()
            .all(|c| lookup(&c.field) == Some(c.value.as_str()))
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                f.write_str(" && ")?;
            }
            write!(f, "{} = {}", clause.field, quote(&clause.value))?;
        }
        Ok(())
    }
}

fn validate_field(field: &str) -> Result<()> {
    let mut chars = field.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
        Ok(())
    } else {
        Err(BrowserBytesError::validation(format!(
            "Invalid filter field name '{field}'"
        )))
    }
}

fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_equality() {
        let filter = Filter::eq("passphrase", "Correct Horse Battery").unwrap();
        assert_eq!(filter.to_string(), r#"passphrase = "Correct Horse Battery""#);
    }

    #[test]
    fn test_values_are_escaped() {
        let filter = Filter::eq("passphrase", r#"x" || name != "y\"#).unwrap();
        assert_eq!(
            filter.to_string(),
            r#"passphrase = "x\" || name != \"y\\""#
        );
    }

    #[test]
    fn test_conjunction() {
        let filter = Filter::eq("name", "work")
            .unwrap()
            .and_eq("passphrase", "abc")
            .unwrap();
        assert_eq!(filter.to_string(), r#"name = "work" && passphrase = "abc""#);
        assert_eq!(
            filter.equalities().collect::<Vec<_>>(),
            vec![("name", "work"), ("passphrase", "abc")]
        );
    }

    #[test]
    fn test_field_names_validated() {
        for field in ["", "1abc", "name = 1 ||", "pass phrase", "a\"b"] {
            assert!(Filter::eq(field, "v").is_err(), "accepted {field:?}");
        }
        assert!(Filter::eq("expand.owner_id", "v").is_ok());
    }

    #[test]
    fn test_matches() {
        let filter = Filter::eq("passphrase", "abc").unwrap();
        assert!(filter.matches(|field| (field == "passphrase").then_some("abc")));
        assert!(!filter.matches(|field| (field == "passphrase").then_some("abd")));
        assert!(!filter.matches(|_| None));
    }
}
