//! Strongly-typed distinguished names.
//!
//! Parsing follows RFC 4514, including `\XX` hex escapes and multi-valued
//! (`+`-joined) RDNs. Parsing is intentionally strict so malformed names
//! surface before they reach the wire, and the canonical string form is
//! cached so display and comparison stay cheap.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::error::Error as CoreError;

/// Errors that can occur when parsing or composing distinguished names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnError {
    /// The distinguished name was empty.
    #[error("distinguished name cannot be empty")]
    Empty,
    /// A component in the distinguished name was invalid.
    #[error("invalid distinguished name component: {0}")]
    InvalidComponent(String),
    /// A component was missing the attribute name to the left of the `=`.
    #[error("component missing attribute name: {0}")]
    MissingAttribute(String),
    /// A component was missing the value to the right of the `=`.
    #[error("component missing value for attribute {0}")]
    MissingValue(String),
    /// The distinguished name ended in the middle of an escape sequence.
    #[error("unterminated escape sequence")]
    UnterminatedEscape,
    /// An escape sequence was not a special character or a hex pair.
    #[error("invalid escape sequence: \\{0}")]
    InvalidEscape(String),
    /// Hex escapes decoded to bytes that are not valid UTF-8.
    #[error("escaped value is not valid UTF-8")]
    NonUtf8Value,
}

impl From<DnError> for CoreError {
    fn from(err: DnError) -> Self {
        CoreError::InvalidDn(err.to_string())
    }
}

/// A single attribute/value assertion, e.g. `cn=Jane Doe`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ava {
    attribute: String,
    value: String,
}

impl Ava {
    /// Creates an assertion from an attribute name and an unescaped value.
    #[must_use]
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Attribute name, e.g. `cn`.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Unescaped attribute value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns true if the attribute name matches, ignoring ASCII case.
    #[must_use]
    pub fn matches(&self, attribute: &str) -> bool {
        self.attribute.eq_ignore_ascii_case(attribute)
    }
}

impl fmt::Display for Ava {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attribute, escape_value(&self.value))
    }
}

/// One relative distinguished name: one assertion, or several joined by `+`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rdn {
    avas: Vec<Ava>,
}

impl Rdn {
    /// Creates a single-assertion RDN.
    #[must_use]
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            avas: vec![Ava::new(attribute, value)],
        }
    }

    /// All assertions in this RDN, in parse order.
    #[must_use]
    pub fn avas(&self) -> &[Ava] {
        &self.avas
    }

    /// Attribute name of the first assertion.
    #[must_use]
    pub fn attribute(&self) -> &str {
        self.avas[0].attribute()
    }

    /// Value of the first assertion.
    #[must_use]
    pub fn value(&self) -> &str {
        self.avas[0].value()
    }

    /// Looks up the value asserted for `attribute`, ignoring ASCII case.
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.avas
            .iter()
            .find(|ava| ava.matches(attribute))
            .map(Ava::value)
    }

    fn equivalent(&self, other: &Self) -> bool {
        self.avas.len() == other.avas.len()
            && self.avas.iter().zip(&other.avas).all(|(a, b)| {
                a.attribute.eq_ignore_ascii_case(&b.attribute)
                    && a.value.eq_ignore_ascii_case(&b.value)
            })
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, ava) in self.avas.iter().enumerate() {
            if idx > 0 {
                f.write_str("+")?;
            }
            write!(f, "{ava}")?;
        }
        Ok(())
    }
}

/// Strongly-typed distinguished name.
///
/// RDNs are stored leftmost-first (entry towards root), matching the string
/// form. The canonical string representation is kept alongside, so the value
/// sent to the server is always a normalized re-rendering of what parsed,
/// never the raw input.
///
/// Serialization uses the string form in both directions, so deserialized
/// values go through [`DistinguishedName::parse`] like every other input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct DistinguishedName {
    raw: String,
    rdns: Vec<Rdn>,
}

impl DistinguishedName {
    /// Parses a distinguished name from its string form.
    ///
    /// Surrounding whitespace of each component is ignored; whitespace inside
    /// values is preserved. Escapes cover both the `\,` special form and
    /// `\2c` hex pairs.
    ///
    /// # Errors
    ///
    /// Returns [`DnError`] if the name is empty or any component is
    /// malformed.
    pub fn parse(input: impl AsRef<str>) -> std::result::Result<Self, DnError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(DnError::Empty);
        }

        let rdns = Parser::new(trimmed).run()?;
        Ok(Self {
            raw: render(&rdns),
            rdns,
        })
    }

    /// Borrows the canonical string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// RDNs in order, leftmost (the entry's own RDN) first.
    #[must_use]
    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    /// The entry's own RDN (leftmost component).
    #[must_use]
    pub fn leaf(&self) -> &Rdn {
        &self.rdns[0]
    }

    /// Number of RDNs.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.rdns.len()
    }

    /// Looks up the first value asserted for `attribute` anywhere in the
    /// name, ignoring ASCII case.
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.rdns.iter().find_map(|rdn| rdn.get(attribute))
    }

    /// The name of the parent entry, or `None` at the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.rdns.len() < 2 {
            return None;
        }
        let rdns: Vec<Rdn> = self.rdns[1..].to_vec();
        Some(Self {
            raw: render(&rdns),
            rdns,
        })
    }

    /// Builds the name of a direct child entry.
    #[must_use]
    pub fn child(&self, attribute: impl Into<String>, value: impl Into<String>) -> Self {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(Rdn::new(attribute, value));
        rdns.extend(self.rdns.iter().cloned());
        Self {
            raw: render(&rdns),
            rdns,
        }
    }

    /// Appends `suffix` below this name, e.g. joining an entry-relative name
    /// onto a base.
    #[must_use]
    pub fn join(&self, suffix: &Self) -> Self {
        let mut rdns = self.rdns.clone();
        rdns.extend(suffix.rdns.iter().cloned());
        Self {
            raw: render(&rdns),
            rdns,
        }
    }

    /// Returns true if this name sits under `ancestor` (or is equal to it).
    ///
    /// Comparison ignores ASCII case on both attribute names and values,
    /// which matches how directory servers treat DN equality.
    #[must_use]
    pub fn is_under(&self, ancestor: &Self) -> bool {
        if ancestor.rdns.len() > self.rdns.len() {
            return false;
        }
        let offset = self.rdns.len() - ancestor.rdns.len();
        self.rdns[offset..]
            .iter()
            .zip(&ancestor.rdns)
            .all(|(a, b)| a.equivalent(b))
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for DistinguishedName {
    type Err = DnError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for DistinguishedName {
    type Error = DnError;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<String> for DistinguishedName {
    type Error = DnError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<DistinguishedName> for String {
    fn from(value: DistinguishedName) -> Self {
        value.raw
    }
}

/// Escapes a value for inclusion in a DN string (RFC 4514 section 2.4).
#[must_use]
pub fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    let last = value.chars().count().saturating_sub(1);

    for (idx, ch) in value.chars().enumerate() {
        match ch {
            '"' | '+' | ',' | ';' | '<' | '>' | '\\' | '=' => {
                escaped.push('\\');
                escaped.push(ch);
            }
            ' ' | '#' if idx == 0 => {
                escaped.push('\\');
                escaped.push(ch);
            }
            ' ' if idx == last => {
                escaped.push('\\');
                escaped.push(ch);
            }
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(ch),
        }
    }

    escaped
}

fn render(rdns: &[Rdn]) -> String {
    let parts: Vec<String> = rdns.iter().map(ToString::to_string).collect();
    parts.join(",")
}

/// Single-pass RFC 4514 parser.
///
/// Values accumulate as bytes so hex escapes can splice in raw octets; each
/// finished value must re-validate as UTF-8.
struct Parser<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    input: &'a str,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            input,
        }
    }

    fn run(mut self) -> std::result::Result<Vec<Rdn>, DnError> {
        let mut rdns = Vec::new();
        let mut avas = Vec::new();

        loop {
            let (ava, terminator) = self.ava()?;
            avas.push(ava);

            match terminator {
                Some('+') => {}
                Some(',') => {
                    rdns.push(Rdn {
                        avas: std::mem::take(&mut avas),
                    });
                }
                None => {
                    rdns.push(Rdn { avas });
                    return Ok(rdns);
                }
                Some(_) => unreachable!("ava() only yields '+', ',' or end"),
            }
        }
    }

    /// Parses one `attr=value`, returning the separator that ended it.
    fn ava(&mut self) -> std::result::Result<(Ava, Option<char>), DnError> {
        let attribute = self.attribute_name()?;
        let (value, terminator) = self.value(&attribute)?;
        Ok((Ava { attribute, value }, terminator))
    }

    fn attribute_name(&mut self) -> std::result::Result<String, DnError> {
        let mut name = String::new();

        while let Some(&ch) = self.chars.peek() {
            match ch {
                '=' => {
                    self.chars.next();
                    let trimmed = name.trim();
                    if trimmed.is_empty() {
                        return Err(DnError::MissingAttribute(self.input.to_string()));
                    }
                    if !valid_attribute_name(trimmed) {
                        return Err(DnError::InvalidComponent(trimmed.to_string()));
                    }
                    return Ok(trimmed.to_string());
                }
                ',' | '+' => {
                    return Err(DnError::InvalidComponent(self.input.to_string()));
                }
                _ => {
                    name.push(ch);
                    self.chars.next();
                }
            }
        }

        Err(DnError::InvalidComponent(self.input.to_string()))
    }

    fn value(
        &mut self,
        attribute: &str,
    ) -> std::result::Result<(String, Option<char>), DnError> {
        let mut bytes: Vec<u8> = Vec::new();
        let mut terminator = None;
        // Escaped trailing spaces survive trimming; track where the last
        // escape-produced byte ends.
        let mut protected = 0;

        // Leading unescaped whitespace is insignificant.
        while matches!(self.chars.peek(), Some(' ')) {
            self.chars.next();
        }

        while let Some(ch) = self.chars.next() {
            match ch {
                '\\' => {
                    let escaped = self.chars.next().ok_or(DnError::UnterminatedEscape)?;
                    bytes.extend_from_slice(self.decode_escape(escaped)?.as_slice());
                    protected = bytes.len();
                }
                ',' | '+' => {
                    terminator = Some(ch);
                    break;
                }
                _ => {
                    let mut buf = [0u8; 4];
                    bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                }
            }
        }

        // Trailing unescaped whitespace is insignificant.
        while bytes.len() > protected && bytes.last() == Some(&b' ') {
            bytes.pop();
        }

        if bytes.is_empty() {
            return Err(DnError::MissingValue(attribute.to_string()));
        }

        let value = String::from_utf8(bytes).map_err(|_| DnError::NonUtf8Value)?;
        Ok((value, terminator))
    }

    fn decode_escape(&mut self, escaped: char) -> std::result::Result<Vec<u8>, DnError> {
        match escaped {
            ' ' | '#' | '"' | '+' | ',' | ';' | '<' | '>' | '=' | '\\' => {
                Ok(vec![escaped as u8])
            }
            hex if hex.is_ascii_hexdigit() => {
                let second = self.chars.next().ok_or(DnError::UnterminatedEscape)?;
                if !second.is_ascii_hexdigit() {
                    return Err(DnError::InvalidEscape(format!("{hex}{second}")));
                }
                let byte = u8::from_str_radix(&format!("{hex}{second}"), 16)
                    .map_err(|_| DnError::InvalidEscape(format!("{hex}{second}")))?;
                Ok(vec![byte])
            }
            other => Err(DnError::InvalidEscape(other.to_string())),
        }
    }
}

fn valid_attribute_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    // Either a descriptor (leading alpha) or a numeric OID.
    if first.is_ascii_alphabetic() {
        chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
    } else if first.is_ascii_digit() {
        name.chars().all(|c| c.is_ascii_digit() || c == '.')
    } else {
        false
    }
}
