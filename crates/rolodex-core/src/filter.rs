//! Search filter expressions.
//!
//! Filters are held as an expression tree and rendered to the RFC 4515
//! string form on demand. [`Filter::parse`] accepts the same string form,
//! strictly: values escape `*` `(` `)` `\` and NUL as `\XX` hex pairs, and
//! anything else after a backslash is rejected.
//!
//! User-supplied terms substituted into filter text must go through
//! [`escape_value`] so a term like `ad*min)` stays a literal and cannot
//! rewrite the filter around it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::error::Error as CoreError;

/// Errors that can occur when parsing a filter string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// The filter string was empty.
    #[error("filter cannot be empty")]
    Empty,
    /// Parentheses did not balance.
    #[error("unbalanced parentheses")]
    UnbalancedParens,
    /// An attribute name was missing or contained invalid characters.
    #[error("invalid attribute name: {0:?}")]
    InvalidAttribute(String),
    /// An assertion value was empty or otherwise malformed.
    #[error("invalid assertion for attribute {0}")]
    InvalidAssertion(String),
    /// A substring pattern contained an empty interior part.
    #[error("invalid substring pattern: {0:?}")]
    InvalidSubstring(String),
    /// A backslash was not followed by two hex digits.
    #[error("invalid escape sequence: \\{0}")]
    InvalidEscape(String),
    /// Escapes decoded to bytes that are not valid UTF-8.
    #[error("escaped value is not valid UTF-8")]
    NonUtf8Value,
    /// The construct is valid LDAP but not supported by this client.
    #[error("unsupported filter construct: {0}")]
    Unsupported(String),
    /// Input continued past the end of the outermost filter.
    #[error("unexpected trailing characters: {0:?}")]
    TrailingCharacters(String),
}

impl From<FilterError> for CoreError {
    fn from(err: FilterError) -> Self {
        CoreError::InvalidFilter(err.to_string())
    }
}

/// A search filter expression (RFC 4515).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filter {
    /// Every inner filter must match. `(&)` matches everything.
    And(Vec<Filter>),
    /// At least one inner filter must match. `(|)` matches nothing.
    Or(Vec<Filter>),
    /// The inner filter must not match.
    Not(Box<Filter>),
    /// The attribute has exactly this value.
    Equality(String, String),
    /// The attribute value matches a wildcard pattern.
    Substring {
        /// Attribute the pattern applies to.
        attribute: String,
        /// Required leading text, if any.
        initial: Option<String>,
        /// Required interior fragments, in order.
        any: Vec<String>,
        /// Required trailing text, if any.
        final_: Option<String>,
    },
    /// The attribute has a value ordered at or above this one.
    GreaterOrEqual(String, String),
    /// The attribute has a value ordered at or below this one.
    LessOrEqual(String, String),
    /// The attribute is present on the entry with any value.
    Present(String),
    /// The attribute approximately matches this value.
    Approx(String, String),
}

impl Filter {
    /// Parses the string form of a filter.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError`] if the string is not a well-formed RFC 4515
    /// filter or uses a construct this client does not support
    /// (extensible matching).
    pub fn parse(input: &str) -> std::result::Result<Self, FilterError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(FilterError::Empty);
        }

        let mut parser = Parser {
            bytes: trimmed.as_bytes(),
            pos: 0,
        };
        let filter = parser.filter()?;
        if parser.pos != parser.bytes.len() {
            return Err(FilterError::TrailingCharacters(
                trimmed[parser.pos..].to_string(),
            ));
        }
        Ok(filter)
    }

    /// Conjunction of `filters`.
    #[must_use]
    pub fn and(filters: Vec<Filter>) -> Self {
        Self::And(filters)
    }

    /// Disjunction of `filters`.
    #[must_use]
    pub fn or(filters: Vec<Filter>) -> Self {
        Self::Or(filters)
    }

    /// Negation of `filter`.
    #[must_use]
    pub fn not(filter: Filter) -> Self {
        Self::Not(Box::new(filter))
    }

    /// Exact-value assertion. The value is taken literally; no escaping is
    /// required or interpreted.
    #[must_use]
    pub fn equality(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Equality(attribute.into(), value.into())
    }

    /// Attribute-presence assertion.
    #[must_use]
    pub fn present(attribute: impl Into<String>) -> Self {
        Self::Present(attribute.into())
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(inner) => {
                f.write_str("(&")?;
                for filter in inner {
                    write!(f, "{filter}")?;
                }
                f.write_str(")")
            }
            Self::Or(inner) => {
                f.write_str("(|")?;
                for filter in inner {
                    write!(f, "{filter}")?;
                }
                f.write_str(")")
            }
            Self::Not(inner) => write!(f, "(!{inner})"),
            Self::Equality(attribute, value) => {
                write!(f, "({attribute}={})", escape_value(value))
            }
            Self::Substring {
                attribute,
                initial,
                any,
                final_,
            } => {
                write!(f, "({attribute}=")?;
                if let Some(initial) = initial {
                    f.write_str(&escape_value(initial))?;
                }
                for part in any {
                    write!(f, "*{}", escape_value(part))?;
                }
                write!(f, "*")?;
                if let Some(final_) = final_ {
                    f.write_str(&escape_value(final_))?;
                }
                f.write_str(")")
            }
            Self::GreaterOrEqual(attribute, value) => {
                write!(f, "({attribute}>={})", escape_value(value))
            }
            Self::LessOrEqual(attribute, value) => {
                write!(f, "({attribute}<={})", escape_value(value))
            }
            Self::Present(attribute) => write!(f, "({attribute}=*)"),
            Self::Approx(attribute, value) => {
                write!(f, "({attribute}~={})", escape_value(value))
            }
        }
    }
}

impl FromStr for Filter {
    type Err = FilterError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Escapes a value for literal inclusion in a filter string (RFC 4515
/// section 3).
#[must_use]
pub fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Recursive-descent parser over the byte form.
///
/// All structural characters are ASCII, so byte positions are safe; value
/// bytes are collected raw and validated as UTF-8 once complete.
struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn filter(&mut self) -> std::result::Result<Filter, FilterError> {
        self.expect(b'(')?;
        let filter = match self.peek() {
            Some(b'&') => {
                self.pos += 1;
                Filter::And(self.filter_list()?)
            }
            Some(b'|') => {
                self.pos += 1;
                Filter::Or(self.filter_list()?)
            }
            Some(b'!') => {
                self.pos += 1;
                Filter::Not(Box::new(self.filter()?))
            }
            Some(_) => self.item()?,
            None => return Err(FilterError::UnbalancedParens),
        };
        self.expect(b')')?;
        Ok(filter)
    }

    /// Zero or more nested filters, up to the closing paren. Zero is the
    /// RFC 4526 absolute-true/false form.
    fn filter_list(&mut self) -> std::result::Result<Vec<Filter>, FilterError> {
        let mut filters = Vec::new();
        while self.peek() != Some(b')') {
            if self.peek().is_none() {
                return Err(FilterError::UnbalancedParens);
            }
            filters.push(self.filter()?);
        }
        Ok(filters)
    }

    fn item(&mut self) -> std::result::Result<Filter, FilterError> {
        let attribute = self.attribute()?;

        match self.peek() {
            Some(b'=') => {
                self.pos += 1;
                self.equality_or_substring(attribute)
            }
            Some(b'>') => {
                self.pos += 1;
                self.expect(b'=')?;
                let value = self.assertion_value(&attribute)?;
                Ok(Filter::GreaterOrEqual(attribute, value))
            }
            Some(b'<') => {
                self.pos += 1;
                self.expect(b'=')?;
                let value = self.assertion_value(&attribute)?;
                Ok(Filter::LessOrEqual(attribute, value))
            }
            Some(b'~') => {
                self.pos += 1;
                self.expect(b'=')?;
                let value = self.assertion_value(&attribute)?;
                Ok(Filter::Approx(attribute, value))
            }
            Some(b':') => Err(FilterError::Unsupported(
                "extensible matching rules".to_string(),
            )),
            _ => Err(FilterError::InvalidAssertion(attribute)),
        }
    }

    /// After `attr=`: presence, substring pattern, or plain equality.
    fn equality_or_substring(
        &mut self,
        attribute: String,
    ) -> std::result::Result<Filter, FilterError> {
        let mut parts: Vec<String> = Vec::new();
        let mut current: Vec<u8> = Vec::new();
        let mut wildcards = 0usize;

        loop {
            match self.peek() {
                None => return Err(FilterError::UnbalancedParens),
                Some(b')') => break,
                Some(b'*') => {
                    self.pos += 1;
                    wildcards += 1;
                    parts.push(take_utf8(std::mem::take(&mut current))?);
                }
                Some(b'\\') => {
                    self.pos += 1;
                    current.push(self.hex_escape()?);
                }
                Some(b'(') => return Err(FilterError::InvalidAssertion(attribute)),
                Some(byte) => {
                    self.pos += 1;
                    current.push(byte);
                }
            }
        }
        parts.push(take_utf8(current)?);

        if wildcards == 0 {
            let value = parts.pop().unwrap_or_default();
            if value.is_empty() {
                return Err(FilterError::InvalidAssertion(attribute));
            }
            return Ok(Filter::Equality(attribute, value));
        }

        // `=*` with nothing else is a presence test.
        if wildcards == 1 && parts.iter().all(String::is_empty) {
            return Ok(Filter::Present(attribute));
        }

        // First part is initial, last is final, the rest are interior and
        // must be non-empty.
        let final_ = match parts.pop() {
            Some(part) if part.is_empty() => None,
            Some(part) => Some(part),
            None => None,
        };
        let mut rest = parts.into_iter();
        let initial = match rest.next() {
            Some(part) if part.is_empty() => None,
            Some(part) => Some(part),
            None => None,
        };
        let any: Vec<String> = rest.collect();
        if any.iter().any(String::is_empty) {
            return Err(FilterError::InvalidSubstring(attribute));
        }

        Ok(Filter::Substring {
            attribute,
            initial,
            any,
            final_,
        })
    }

    fn assertion_value(&mut self, attribute: &str) -> std::result::Result<String, FilterError> {
        let mut bytes: Vec<u8> = Vec::new();
        loop {
            match self.peek() {
                None => return Err(FilterError::UnbalancedParens),
                Some(b')') => break,
                Some(b'\\') => {
                    self.pos += 1;
                    bytes.push(self.hex_escape()?);
                }
                Some(b'*' | b'(') => {
                    return Err(FilterError::InvalidAssertion(attribute.to_string()))
                }
                Some(byte) => {
                    self.pos += 1;
                    bytes.push(byte);
                }
            }
        }
        if bytes.is_empty() {
            return Err(FilterError::InvalidAssertion(attribute.to_string()));
        }
        take_utf8(bytes)
    }

    fn attribute(&mut self) -> std::result::Result<String, FilterError> {
        let start = self.pos;
        while let Some(byte) = self.peek() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'.' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let name = &self.bytes[start..self.pos];
        if name.is_empty() || !name[0].is_ascii_alphanumeric() {
            let found = self
                .peek()
                .map(|b| (b as char).to_string())
                .unwrap_or_default();
            return Err(FilterError::InvalidAttribute(found));
        }
        Ok(String::from_utf8_lossy(name).into_owned())
    }

    fn hex_escape(&mut self) -> std::result::Result<u8, FilterError> {
        let Some(pair) = self.bytes.get(self.pos..self.pos + 2) else {
            return Err(FilterError::InvalidEscape(
                String::from_utf8_lossy(&self.bytes[self.pos..]).into_owned(),
            ));
        };
        self.pos += 2;
        let text = std::str::from_utf8(pair)
            .map_err(|_| FilterError::InvalidEscape("??".to_string()))?;
        u8::from_str_radix(text, 16).map_err(|_| FilterError::InvalidEscape(text.to_string()))
    }

    fn expect(&mut self, byte: u8) -> std::result::Result<(), FilterError> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(FilterError::UnbalancedParens)
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }
}

fn take_utf8(bytes: Vec<u8>) -> std::result::Result<String, FilterError> {
    String::from_utf8(bytes).map_err(|_| FilterError::NonUtf8Value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_equality() {
        let filter = Filter::parse("(cn=Jane Doe)").unwrap();
        assert_eq!(
            filter,
            Filter::Equality("cn".to_string(), "Jane Doe".to_string())
        );
        assert_eq!(filter.to_string(), "(cn=Jane Doe)");
    }

    #[test]
    fn parse_presence() {
        let filter = Filter::parse("(objectClass=*)").unwrap();
        assert_eq!(filter, Filter::Present("objectClass".to_string()));
        assert_eq!(filter.to_string(), "(objectClass=*)");
    }

    #[test]
    fn parse_substring_forms() {
        let filter = Filter::parse("(cn=Jan*)").unwrap();
        assert_eq!(
            filter,
            Filter::Substring {
                attribute: "cn".to_string(),
                initial: Some("Jan".to_string()),
                any: vec![],
                final_: None,
            }
        );
        assert_eq!(filter.to_string(), "(cn=Jan*)");

        let filter = Filter::parse("(cn=*doe)").unwrap();
        assert_eq!(
            filter,
            Filter::Substring {
                attribute: "cn".to_string(),
                initial: None,
                any: vec![],
                final_: Some("doe".to_string()),
            }
        );

        let filter = Filter::parse("(cn=j*a*n*e)").unwrap();
        assert_eq!(
            filter,
            Filter::Substring {
                attribute: "cn".to_string(),
                initial: Some("j".to_string()),
                any: vec!["a".to_string(), "n".to_string()],
                final_: Some("e".to_string()),
            }
        );
        assert_eq!(filter.to_string(), "(cn=j*a*n*e)");
    }

    #[test]
    fn parse_nested_boolean() {
        let text = "(&(objectClass=user)(!(objectClass=computer))(|(cn=jane)(uid=jane)))";
        let filter = Filter::parse(text).unwrap();
        assert_eq!(filter.to_string(), text);

        match filter {
            Filter::And(parts) => {
                assert_eq!(parts.len(), 3);
                assert!(matches!(parts[1], Filter::Not(_)));
            }
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn parse_ordering_and_approx() {
        assert_eq!(
            Filter::parse("(uidNumber>=1000)").unwrap(),
            Filter::GreaterOrEqual("uidNumber".to_string(), "1000".to_string())
        );
        assert_eq!(
            Filter::parse("(uidNumber<=2000)").unwrap(),
            Filter::LessOrEqual("uidNumber".to_string(), "2000".to_string())
        );
        assert_eq!(
            Filter::parse("(sn~=jonsen)").unwrap(),
            Filter::Approx("sn".to_string(), "jonsen".to_string())
        );
    }

    #[test]
    fn parse_hex_escapes() {
        let filter = Filter::parse("(cn=a\\2ab)").unwrap();
        assert_eq!(filter, Filter::Equality("cn".to_string(), "a*b".to_string()));
        // Renders back in escaped form.
        assert_eq!(filter.to_string(), "(cn=a\\2ab)");
    }

    #[test]
    fn parse_empty_and_or() {
        assert_eq!(Filter::parse("(&)").unwrap(), Filter::And(vec![]));
        assert_eq!(Filter::parse("(|)").unwrap(), Filter::Or(vec![]));
    }

    #[test]
    fn parse_rejects_malformed() {
        assert_eq!(Filter::parse("  ").unwrap_err(), FilterError::Empty);
        assert_eq!(
            Filter::parse("(cn=jane").unwrap_err(),
            FilterError::UnbalancedParens
        );
        assert_eq!(
            Filter::parse("cn=jane").unwrap_err(),
            FilterError::UnbalancedParens
        );
        assert!(matches!(
            Filter::parse("(cn=jane))").unwrap_err(),
            FilterError::TrailingCharacters(_)
        ));
        assert!(matches!(
            Filter::parse("(=jane)").unwrap_err(),
            FilterError::InvalidAttribute(_)
        ));
        assert!(matches!(
            Filter::parse("(cn=)").unwrap_err(),
            FilterError::InvalidAssertion(_)
        ));
        assert!(matches!(
            Filter::parse("(cn=a\\zzb)").unwrap_err(),
            FilterError::InvalidEscape(_)
        ));
        assert!(matches!(
            Filter::parse("(cn=a**b)").unwrap_err(),
            FilterError::InvalidSubstring(_)
        ));
        assert!(matches!(
            Filter::parse("(uac:1.2.840.113556.1.4.803:=2)").unwrap_err(),
            FilterError::Unsupported(_)
        ));
    }

    #[test]
    fn escape_value_covers_specials() {
        assert_eq!(escape_value("ad*min"), "ad\\2amin");
        assert_eq!(escape_value("(admin)"), "\\28admin\\29");
        assert_eq!(escape_value("back\\slash"), "back\\5cslash");
        assert_eq!(escape_value("nul\0byte"), "nul\\00byte");
        assert_eq!(escape_value("plain"), "plain");
    }

    #[test]
    fn escaped_term_stays_literal() {
        let hostile = "x)(objectClass=*";
        let filter = Filter::equality("cn", hostile);
        let rendered = filter.to_string();
        assert_eq!(rendered, "(cn=x\\29\\28objectClass=\\2a)");

        // Round-trip keeps the hostile text as one literal value.
        let reparsed = Filter::parse(&rendered).unwrap();
        assert_eq!(reparsed, filter);
    }

    #[test]
    fn converts_to_core_error() {
        let err: CoreError = FilterError::Empty.into();
        assert!(matches!(err, CoreError::InvalidFilter(_)));
    }
}
