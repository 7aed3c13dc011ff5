//! Directory computer accounts.

use crate::entry::Entry;
use crate::mapper::{self, ObjectKind};
use chrono::{DateTime, Utc};
use rolodex_core::{DistinguishedName, Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A computer account entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Computer {
    /// Distinguished name of the entry.
    pub dn: DistinguishedName,
    /// `objectGUID`, when present.
    #[serde(default)]
    pub guid: Option<Uuid>,
    /// Name (`cn`).
    pub name: String,
    /// Account name (`sAMAccountName`), conventionally ending in `$`.
    #[serde(default)]
    pub account_name: Option<String>,
    /// DNS host name.
    #[serde(default)]
    pub dns_host_name: Option<String>,
    /// Operating system.
    #[serde(default)]
    pub operating_system: Option<String>,
    /// Operating system version.
    #[serde(default)]
    pub operating_system_version: Option<String>,
    /// False when `userAccountControl` carries the disable bit.
    pub enabled: bool,
    /// `whenCreated` timestamp.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Computer {
    /// Creates a builder with the required fields. The account starts
    /// enabled.
    #[must_use]
    pub fn builder(dn: DistinguishedName, name: impl Into<String>) -> ComputerBuilder {
        ComputerBuilder {
            computer: Self {
                dn,
                guid: None,
                name: name.into(),
                account_name: None,
                dns_host_name: None,
                operating_system: None,
                operating_system_version: None,
                enabled: true,
                created_at: None,
            },
        }
    }

    /// Maps a search result entry to a computer record.
    ///
    /// # Errors
    ///
    /// [`Error::Mapping`] when the entry is not classified as a computer or
    /// carries no name.
    pub fn from_entry(entry: &Entry) -> Result<Self> {
        match ObjectKind::of(entry) {
            ObjectKind::Computer => {}
            kind => {
                return Err(Error::Mapping(format!(
                    "entry `{}` is a {kind}, not a computer",
                    entry.dn()
                )))
            }
        }
        let name = entry.first("cn").ok_or_else(|| {
            Error::Mapping(format!("computer entry `{}` has no name", entry.dn()))
        })?;

        let mut builder =
            Self::builder(entry.dn().clone(), name).enabled(mapper::decode_enabled(entry));
        if let Some(guid) = mapper::decode_guid(entry) {
            builder = builder.guid(guid);
        }
        if let Some(account_name) = entry.first("sAMAccountName") {
            builder = builder.account_name(account_name);
        }
        if let Some(dns_host_name) = entry.first("dNSHostName") {
            builder = builder.dns_host_name(dns_host_name);
        }
        if let Some(operating_system) = entry.first("operatingSystem") {
            builder = builder.operating_system(operating_system);
        }
        if let Some(version) = entry.first("operatingSystemVersion") {
            builder = builder.operating_system_version(version);
        }
        if let Some(created_at) = entry.first("whenCreated").and_then(mapper::decode_time) {
            builder = builder.created_at(created_at);
        }
        Ok(builder.build())
    }
}

/// Builder for [`Computer`].
#[derive(Debug)]
pub struct ComputerBuilder {
    computer: Computer,
}

impl ComputerBuilder {
    /// Sets the `objectGUID`.
    #[must_use]
    pub const fn guid(mut self, guid: Uuid) -> Self {
        self.computer.guid = Some(guid);
        self
    }

    /// Sets the account name.
    #[must_use]
    pub fn account_name(mut self, account_name: impl Into<String>) -> Self {
        self.computer.account_name = Some(account_name.into());
        self
    }

    /// Sets the DNS host name.
    #[must_use]
    pub fn dns_host_name(mut self, dns_host_name: impl Into<String>) -> Self {
        self.computer.dns_host_name = Some(dns_host_name.into());
        self
    }

    /// Sets the operating system.
    #[must_use]
    pub fn operating_system(mut self, operating_system: impl Into<String>) -> Self {
        self.computer.operating_system = Some(operating_system.into());
        self
    }

    /// Sets the operating system version.
    #[must_use]
    pub fn operating_system_version(mut self, version: impl Into<String>) -> Self {
        self.computer.operating_system_version = Some(version.into());
        self
    }

    /// Sets the enabled flag.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.computer.enabled = enabled;
        self
    }

    /// Sets the creation timestamp.
    #[must_use]
    pub const fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.computer.created_at = Some(created_at);
        self
    }

    /// Finalises the builder.
    #[must_use]
    pub fn build(self) -> Computer {
        self.computer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rolodex_proto::message::{PartialAttribute, SearchResultEntry};

    fn computer_entry() -> Entry {
        Entry::from_wire(SearchResultEntry {
            dn: "cn=ws-042,ou=Workstations,dc=example,dc=com".to_string(),
            attributes: vec![
                PartialAttribute::new("objectClass", vec!["top", "person", "user", "computer"]),
                PartialAttribute::new("cn", vec!["ws-042"]),
                PartialAttribute::new("sAMAccountName", vec!["WS-042$"]),
                PartialAttribute::new("dNSHostName", vec!["ws-042.example.com"]),
                PartialAttribute::new("operatingSystem", vec!["Windows 11 Enterprise"]),
                PartialAttribute::new("operatingSystemVersion", vec!["10.0 (22631)"]),
                PartialAttribute::new("userAccountControl", vec!["4096"]),
            ],
        })
        .unwrap()
    }

    #[test]
    fn from_entry_maps_the_attributes() {
        let computer = Computer::from_entry(&computer_entry()).unwrap();
        assert_eq!(computer.name, "ws-042");
        assert_eq!(computer.account_name.as_deref(), Some("WS-042$"));
        assert_eq!(computer.dns_host_name.as_deref(), Some("ws-042.example.com"));
        assert_eq!(
            computer.operating_system.as_deref(),
            Some("Windows 11 Enterprise")
        );
        assert!(computer.enabled);
    }

    #[test]
    fn user_entry_is_rejected() {
        let entry = Entry::from_wire(SearchResultEntry {
            dn: "cn=Jane,ou=People,dc=example,dc=com".to_string(),
            attributes: vec![
                PartialAttribute::new("objectClass", vec!["top", "person", "user"]),
                PartialAttribute::new("cn", vec!["Jane"]),
            ],
        })
        .unwrap();
        let err = Computer::from_entry(&entry).unwrap_err();
        assert!(matches!(err, Error::Mapping(_)));
    }

    #[test]
    fn disable_bit_clears_enabled() {
        // 4098 = WORKSTATION_TRUST_ACCOUNT | ACCOUNTDISABLE.
        let entry = Entry::from_wire(SearchResultEntry {
            dn: "cn=ws-043,ou=Workstations,dc=example,dc=com".to_string(),
            attributes: vec![
                PartialAttribute::new("objectClass", vec!["computer"]),
                PartialAttribute::new("cn", vec!["ws-043"]),
                PartialAttribute::new("userAccountControl", vec!["4098"]),
            ],
        })
        .unwrap();
        let computer = Computer::from_entry(&entry).unwrap();
        assert!(!computer.enabled);
    }
}
