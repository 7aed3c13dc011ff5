//! Organizational units.

use crate::entry::Entry;
use crate::mapper::{self, ObjectKind};
use rolodex_core::{DistinguishedName, Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An organizational unit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrgUnit {
    /// Distinguished name of the entry.
    pub dn: DistinguishedName,
    /// `objectGUID`, when present.
    #[serde(default)]
    pub guid: Option<Uuid>,
    /// Name (`ou`, falling back to `name`).
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

impl OrgUnit {
    /// Creates a builder with the required fields.
    #[must_use]
    pub fn builder(dn: DistinguishedName, name: impl Into<String>) -> OrgUnitBuilder {
        OrgUnitBuilder {
            unit: Self {
                dn,
                guid: None,
                name: name.into(),
                description: None,
            },
        }
    }

    /// Maps a search result entry to an organizational unit record.
    ///
    /// # Errors
    ///
    /// [`Error::Mapping`] when the entry is not classified as an
    /// organizational unit or carries no name.
    pub fn from_entry(entry: &Entry) -> Result<Self> {
        match ObjectKind::of(entry) {
            ObjectKind::OrgUnit => {}
            kind => {
                return Err(Error::Mapping(format!(
                    "entry `{}` is a {kind}, not an organizational unit",
                    entry.dn()
                )))
            }
        }
        let name = entry.first("ou").or_else(|| entry.first("name")).ok_or_else(|| {
            Error::Mapping(format!(
                "organizational unit entry `{}` has no name",
                entry.dn()
            ))
        })?;

        let mut builder = Self::builder(entry.dn().clone(), name);
        if let Some(guid) = mapper::decode_guid(entry) {
            builder = builder.guid(guid);
        }
        if let Some(description) = entry.first("description") {
            builder = builder.description(description);
        }
        Ok(builder.build())
    }
}

/// Builder for [`OrgUnit`].
#[derive(Debug)]
pub struct OrgUnitBuilder {
    unit: OrgUnit,
}

impl OrgUnitBuilder {
    /// Sets the `objectGUID`.
    #[must_use]
    pub const fn guid(mut self, guid: Uuid) -> Self {
        self.unit.guid = Some(guid);
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.unit.description = Some(description.into());
        self
    }

    /// Finalises the builder.
    #[must_use]
    pub fn build(self) -> OrgUnit {
        self.unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rolodex_proto::message::{PartialAttribute, SearchResultEntry};

    #[test]
    fn from_entry_maps_the_attributes() {
        let entry = Entry::from_wire(SearchResultEntry {
            dn: "ou=Engineering,dc=example,dc=com".to_string(),
            attributes: vec![
                PartialAttribute::new("objectClass", vec!["top", "organizationalUnit"]),
                PartialAttribute::new("ou", vec!["Engineering"]),
                PartialAttribute::new("description", vec!["Product engineering"]),
            ],
        })
        .unwrap();
        let unit = OrgUnit::from_entry(&entry).unwrap();
        assert_eq!(unit.name, "Engineering");
        assert_eq!(unit.description.as_deref(), Some("Product engineering"));
    }

    #[test]
    fn name_attribute_is_a_fallback() {
        let entry = Entry::from_wire(SearchResultEntry {
            dn: "ou=Sales,dc=example,dc=com".to_string(),
            attributes: vec![
                PartialAttribute::new("objectClass", vec!["organizationalUnit"]),
                PartialAttribute::new("name", vec!["Sales"]),
            ],
        })
        .unwrap();
        let unit = OrgUnit::from_entry(&entry).unwrap();
        assert_eq!(unit.name, "Sales");
    }

    #[test]
    fn group_entry_is_rejected() {
        let entry = Entry::from_wire(SearchResultEntry {
            dn: "cn=ops,ou=Groups,dc=example,dc=com".to_string(),
            attributes: vec![
                PartialAttribute::new("objectClass", vec!["group"]),
                PartialAttribute::new("cn", vec!["ops"]),
            ],
        })
        .unwrap();
        assert!(matches!(
            OrgUnit::from_entry(&entry),
            Err(Error::Mapping(_))
        ));
    }
}
