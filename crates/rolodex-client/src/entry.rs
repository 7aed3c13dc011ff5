//! Search result entries.

use rolodex_core::{DistinguishedName, Error, Result};
use rolodex_proto::message::SearchResultEntry;
use std::collections::HashMap;

/// One entry returned by a search, owned by the caller.
///
/// Attribute names are normalized to lowercase on construction, so lookups
/// are case-insensitive the way RFC 4512 attribute descriptions are. Values
/// stay as the raw octets from the wire; the textual accessors ([`first`],
/// [`values`]) decode UTF-8 on demand and pass over values that are not
/// text, while the binary accessors ([`first_bytes`], [`raw_values`]) hand
/// out the octets for attributes like `objectGUID`.
///
/// [`first`]: Entry::first
/// [`values`]: Entry::values
/// [`first_bytes`]: Entry::first_bytes
/// [`raw_values`]: Entry::raw_values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    dn: DistinguishedName,
    attributes: HashMap<String, Vec<Vec<u8>>>,
}

impl Entry {
    /// Builds an entry from its wire form, merging repeated attribute
    /// descriptions.
    pub(crate) fn from_wire(wire: SearchResultEntry) -> Result<Self> {
        let dn = DistinguishedName::parse(&wire.dn).map_err(|err| {
            Error::Protocol(format!("entry has malformed DN `{}`: {err}", wire.dn))
        })?;
        let mut attributes: HashMap<String, Vec<Vec<u8>>> = HashMap::new();
        for attribute in wire.attributes {
            attributes
                .entry(attribute.name.to_ascii_lowercase())
                .or_default()
                .extend(attribute.values);
        }
        Ok(Self { dn, attributes })
    }

    /// Distinguished name of the entry.
    #[must_use]
    pub const fn dn(&self) -> &DistinguishedName {
        &self.dn
    }

    /// Number of distinct attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// True when the entry carries no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Attribute names present on the entry, lowercased; order is not
    /// significant.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    /// True when the attribute is present, compared case-insensitively.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.attributes.contains_key(&name.to_ascii_lowercase())
    }

    /// First value of the attribute, when that value is valid UTF-8.
    #[must_use]
    pub fn first(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(&name.to_ascii_lowercase())?
            .first()
            .and_then(|value| std::str::from_utf8(value).ok())
    }

    /// All values of the attribute that are valid UTF-8, in server order.
    #[must_use]
    pub fn values(&self, name: &str) -> Vec<&str> {
        self.attributes
            .get(&name.to_ascii_lowercase())
            .map(|values| {
                values
                    .iter()
                    .filter_map(|value| std::str::from_utf8(value).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// First value of the attribute as raw octets.
    #[must_use]
    pub fn first_bytes(&self, name: &str) -> Option<&[u8]> {
        self.attributes
            .get(&name.to_ascii_lowercase())?
            .first()
            .map(Vec::as_slice)
    }

    /// All values of the attribute as raw octets.
    #[must_use]
    pub fn raw_values(&self, name: &str) -> Option<&[Vec<u8>]> {
        self.attributes
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
    }
}
