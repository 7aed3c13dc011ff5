//! Directory groups.

use crate::entry::Entry;
use crate::mapper::{self, ObjectKind};
use rolodex_core::{DistinguishedName, Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A group entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    /// Distinguished name of the entry.
    pub dn: DistinguishedName,
    /// `objectGUID`, when present.
    #[serde(default)]
    pub guid: Option<Uuid>,
    /// Name (`cn`).
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Distinguished names of the group members.
    #[serde(default)]
    pub members: Vec<DistinguishedName>,
}

impl Group {
    /// Creates a builder with the required fields.
    #[must_use]
    pub fn builder(dn: DistinguishedName, name: impl Into<String>) -> GroupBuilder {
        GroupBuilder {
            group: Self {
                dn,
                guid: None,
                name: name.into(),
                description: None,
                members: Vec::new(),
            },
        }
    }

    /// Maps a search result entry to a group record.
    ///
    /// Membership is read from `member` and `uniqueMember`; values that do
    /// not parse as distinguished names are skipped.
    ///
    /// # Errors
    ///
    /// [`Error::Mapping`] when the entry is not classified as a group or
    /// carries no name.
    pub fn from_entry(entry: &Entry) -> Result<Self> {
        match ObjectKind::of(entry) {
            ObjectKind::Group => {}
            kind => {
                return Err(Error::Mapping(format!(
                    "entry `{}` is a {kind}, not a group",
                    entry.dn()
                )))
            }
        }
        let name = entry
            .first("cn")
            .ok_or_else(|| Error::Mapping(format!("group entry `{}` has no name", entry.dn())))?;

        let mut members = mapper::decode_member_dns(entry, "member");
        members.extend(mapper::decode_member_dns(entry, "uniqueMember"));

        let mut builder = Self::builder(entry.dn().clone(), name).members(members);
        if let Some(guid) = mapper::decode_guid(entry) {
            builder = builder.guid(guid);
        }
        if let Some(description) = entry.first("description") {
            builder = builder.description(description);
        }
        Ok(builder.build())
    }

    /// Number of members.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Whether `dn` is a member, compared case-insensitively.
    #[must_use]
    pub fn has_member(&self, dn: &DistinguishedName) -> bool {
        self.members
            .iter()
            .any(|member| member.as_str().eq_ignore_ascii_case(dn.as_str()))
    }
}

/// Builder for [`Group`].
#[derive(Debug)]
pub struct GroupBuilder {
    group: Group,
}

impl GroupBuilder {
    /// Sets the `objectGUID`.
    #[must_use]
    pub const fn guid(mut self, guid: Uuid) -> Self {
        self.group.guid = Some(guid);
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.group.description = Some(description.into());
        self
    }

    /// Sets the member list.
    #[must_use]
    pub fn members(mut self, members: impl IntoIterator<Item = DistinguishedName>) -> Self {
        self.group.members = members.into_iter().collect();
        self
    }

    /// Finalises the builder.
    #[must_use]
    pub fn build(self) -> Group {
        self.group
    }
}
