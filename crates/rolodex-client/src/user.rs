//! Directory user accounts.

use crate::entry::Entry;
use crate::mapper::{self, ObjectKind};
use chrono::{DateTime, Utc};
use rolodex_core::{DistinguishedName, Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user account entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Distinguished name of the entry.
    pub dn: DistinguishedName,
    /// `objectGUID`, when present.
    #[serde(default)]
    pub guid: Option<Uuid>,
    /// Account name (`sAMAccountName`, falling back to `uid`).
    pub account_name: String,
    /// User principal name (`user@realm`).
    #[serde(default)]
    pub principal_name: Option<String>,
    /// Primary mail address.
    #[serde(default)]
    pub mail: Option<String>,
    /// Common name.
    #[serde(default)]
    pub cn: Option<String>,
    /// Given name (first name).
    #[serde(default)]
    pub given_name: Option<String>,
    /// Surname (last name).
    #[serde(default)]
    pub sn: Option<String>,
    /// Display name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Groups the account is a direct member of.
    #[serde(default)]
    pub member_of: Vec<DistinguishedName>,
    /// False when `userAccountControl` carries the disable bit.
    pub enabled: bool,
    /// True when `lockoutTime` is set and non-zero.
    pub locked: bool,
    /// `whenCreated` timestamp.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// `whenChanged` timestamp.
    #[serde(default)]
    pub changed_at: Option<DateTime<Utc>>,
}

impl User {
    /// Creates a builder with the required fields. The account starts
    /// enabled and unlocked.
    #[must_use]
    pub fn builder(dn: DistinguishedName, account_name: impl Into<String>) -> UserBuilder {
        UserBuilder {
            user: Self {
                dn,
                guid: None,
                account_name: account_name.into(),
                principal_name: None,
                mail: None,
                cn: None,
                given_name: None,
                sn: None,
                display_name: None,
                member_of: Vec::new(),
                enabled: true,
                locked: false,
                created_at: None,
                changed_at: None,
            },
        }
    }

    /// Maps a search result entry to a user record.
    ///
    /// # Errors
    ///
    /// [`Error::Mapping`] when the entry is not classified as a user or
    /// carries no account name.
    pub fn from_entry(entry: &Entry) -> Result<Self> {
        match ObjectKind::of(entry) {
            ObjectKind::User => {}
            kind => {
                return Err(Error::Mapping(format!(
                    "entry `{}` is a {kind}, not a user",
                    entry.dn()
                )))
            }
        }
        let account_name = entry
            .first("sAMAccountName")
            .or_else(|| entry.first("uid"))
            .ok_or_else(|| {
                Error::Mapping(format!("user entry `{}` has no account name", entry.dn()))
            })?;

        let mut builder = Self::builder(entry.dn().clone(), account_name)
            .member_of(mapper::decode_member_dns(entry, "memberOf"))
            .enabled(mapper::decode_enabled(entry))
            .locked(mapper::decode_locked(entry));
        if let Some(guid) = mapper::decode_guid(entry) {
            builder = builder.guid(guid);
        }
        if let Some(principal_name) = entry.first("userPrincipalName") {
            builder = builder.principal_name(principal_name);
        }
        if let Some(mail) = entry.first("mail") {
            builder = builder.mail(mail);
        }
        if let Some(cn) = entry.first("cn") {
            builder = builder.cn(cn);
        }
        if let Some(given_name) = entry.first("givenName") {
            builder = builder.given_name(given_name);
        }
        if let Some(sn) = entry.first("sn") {
            builder = builder.sn(sn);
        }
        if let Some(display_name) = entry.first("displayName") {
            builder = builder.display_name(display_name);
        }
        if let Some(created_at) = entry.first("whenCreated").and_then(mapper::decode_time) {
            builder = builder.created_at(created_at);
        }
        if let Some(changed_at) = entry.first("whenChanged").and_then(mapper::decode_time) {
            builder = builder.changed_at(changed_at);
        }
        Ok(builder.build())
    }

    /// True when the account is enabled and not locked out.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.enabled && !self.locked
    }

    /// True when the account is a direct member of `group`, compared
    /// case-insensitively.
    #[must_use]
    pub fn in_group(&self, group: &DistinguishedName) -> bool {
        self.member_of
            .iter()
            .any(|dn| dn.as_str().eq_ignore_ascii_case(group.as_str()))
    }

    /// Preferred human-readable name: display name, then common name, then
    /// given name and surname, then the account name.
    #[must_use]
    pub fn preferred_name(&self) -> String {
        if let Some(display_name) = &self.display_name {
            return display_name.clone();
        }
        if let Some(cn) = &self.cn {
            return cn.clone();
        }
        match (&self.given_name, &self.sn) {
            (Some(given), Some(sn)) => format!("{given} {sn}"),
            (Some(given), None) => given.clone(),
            (None, Some(sn)) => sn.clone(),
            (None, None) => self.account_name.clone(),
        }
    }
}

/// Builder for [`User`].
#[derive(Debug)]
pub struct UserBuilder {
    user: User,
}

impl UserBuilder {
    /// Sets the `objectGUID`.
    #[must_use]
    pub const fn guid(mut self, guid: Uuid) -> Self {
        self.user.guid = Some(guid);
        self
    }

    /// Sets the user principal name.
    #[must_use]
    pub fn principal_name(mut self, principal_name: impl Into<String>) -> Self {
        self.user.principal_name = Some(principal_name.into());
        self
    }

    /// Sets the mail address.
    #[must_use]
    pub fn mail(mut self, mail: impl Into<String>) -> Self {
        self.user.mail = Some(mail.into());
        self
    }

    /// Sets the common name.
    #[must_use]
    pub fn cn(mut self, cn: impl Into<String>) -> Self {
        self.user.cn = Some(cn.into());
        self
    }

    /// Sets the given name.
    #[must_use]
    pub fn given_name(mut self, given_name: impl Into<String>) -> Self {
        self.user.given_name = Some(given_name.into());
        self
    }

    /// Sets the surname.
    #[must_use]
    pub fn sn(mut self, sn: impl Into<String>) -> Self {
        self.user.sn = Some(sn.into());
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.user.display_name = Some(display_name.into());
        self
    }

    /// Replaces the membership list.
    #[must_use]
    pub fn member_of<I>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = DistinguishedName>,
    {
        self.user.member_of = groups.into_iter().collect();
        self
    }

    /// Sets the enabled flag.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.user.enabled = enabled;
        self
    }

    /// Sets the locked flag.
    #[must_use]
    pub const fn locked(mut self, locked: bool) -> Self {
        self.user.locked = locked;
        self
    }

    /// Sets the creation timestamp.
    #[must_use]
    pub const fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.user.created_at = Some(created_at);
        self
    }

    /// Sets the last-change timestamp.
    #[must_use]
    pub const fn changed_at(mut self, changed_at: DateTime<Utc>) -> Self {
        self.user.changed_at = Some(changed_at);
        self
    }

    /// Finalises the builder.
    #[must_use]
    pub fn build(self) -> User {
        self.user
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rolodex_proto::message::{PartialAttribute, SearchResultEntry};

    fn user_entry() -> Entry {
        Entry::from_wire(SearchResultEntry {
            dn: "cn=Jane Doe,ou=People,dc=example,dc=com".to_string(),
            attributes: vec![
                PartialAttribute::new("objectClass", vec!["top", "person", "user"]),
                PartialAttribute::new("sAMAccountName", vec!["jdoe"]),
                PartialAttribute::new("userPrincipalName", vec!["jdoe@example.com"]),
                PartialAttribute::new("mail", vec!["jane.doe@example.com"]),
                PartialAttribute::new("cn", vec!["Jane Doe"]),
                PartialAttribute::new("givenName", vec!["Jane"]),
                PartialAttribute::new("sn", vec!["Doe"]),
                PartialAttribute::new(
                    "memberOf",
                    vec![
                        "cn=admins,ou=Groups,dc=example,dc=com",
                        "cn=staff,ou=Groups,dc=example,dc=com",
                    ],
                ),
                PartialAttribute::new("userAccountControl", vec!["512"]),
                PartialAttribute::new("whenCreated", vec!["20230815123045.0Z"]),
            ],
        })
        .unwrap()
    }

    #[test]
    fn from_entry_maps_the_attributes() {
        let user = User::from_entry(&user_entry()).unwrap();
        assert_eq!(user.dn.as_str(), "cn=Jane Doe,ou=People,dc=example,dc=com");
        assert_eq!(user.account_name, "jdoe");
        assert_eq!(user.principal_name.as_deref(), Some("jdoe@example.com"));
        assert_eq!(user.mail.as_deref(), Some("jane.doe@example.com"));
        assert_eq!(user.member_of.len(), 2);
        assert!(user.enabled);
        assert!(!user.locked);
        assert!(user.is_active());
        assert_eq!(
            user.created_at.unwrap().to_rfc3339(),
            "2023-08-15T12:30:45+00:00"
        );
    }

    #[test]
    fn uid_is_the_fallback_account_name() {
        let entry = Entry::from_wire(SearchResultEntry {
            dn: "uid=jdoe,ou=People,dc=example,dc=com".to_string(),
            attributes: vec![
                PartialAttribute::new("objectClass", vec!["inetOrgPerson"]),
                PartialAttribute::new("uid", vec!["jdoe"]),
            ],
        })
        .unwrap();
        let user = User::from_entry(&entry).unwrap();
        assert_eq!(user.account_name, "jdoe");
    }

    #[test]
    fn wrong_kind_is_a_mapping_error() {
        let entry = Entry::from_wire(SearchResultEntry {
            dn: "cn=ws-042,ou=Workstations,dc=example,dc=com".to_string(),
            attributes: vec![
                PartialAttribute::new("objectClass", vec!["top", "user", "computer"]),
                PartialAttribute::new("sAMAccountName", vec!["WS-042$"]),
            ],
        })
        .unwrap();
        let err = User::from_entry(&entry).unwrap_err();
        assert!(matches!(err, Error::Mapping(ref m) if m.contains("computer")));
    }

    #[test]
    fn missing_account_name_is_a_mapping_error() {
        let entry = Entry::from_wire(SearchResultEntry {
            dn: "cn=Jane,dc=example,dc=com".to_string(),
            attributes: vec![PartialAttribute::new("objectClass", vec!["user"])],
        })
        .unwrap();
        assert!(matches!(
            User::from_entry(&entry),
            Err(Error::Mapping(_))
        ));
    }

    #[test]
    fn group_membership_is_case_insensitive() {
        let user = User::from_entry(&user_entry()).unwrap();
        let admins: DistinguishedName = "CN=Admins,OU=Groups,DC=example,DC=com".parse().unwrap();
        let other: DistinguishedName = "cn=other,ou=Groups,dc=example,dc=com".parse().unwrap();
        assert!(user.in_group(&admins));
        assert!(!user.in_group(&other));
    }

    #[test]
    fn preferred_name_prefers_the_richest_field() {
        let dn: DistinguishedName = "cn=x,dc=example,dc=com".parse().unwrap();
        let bare = User::builder(dn.clone(), "jdoe").build();
        assert_eq!(bare.preferred_name(), "jdoe");

        let named = User::builder(dn.clone(), "jdoe")
            .given_name("Jane")
            .sn("Doe")
            .build();
        assert_eq!(named.preferred_name(), "Jane Doe");

        let displayed = User::builder(dn, "jdoe")
            .cn("Jane Doe")
            .display_name("Doe, Jane")
            .build();
        assert_eq!(displayed.preferred_name(), "Doe, Jane");
    }

    #[test]
    fn disabled_account_is_not_active() {
        let dn: DistinguishedName = "cn=x,dc=example,dc=com".parse().unwrap();
        let disabled = User::builder(dn.clone(), "jdoe").enabled(false).build();
        let locked = User::builder(dn, "jdoe").locked(true).build();
        assert!(!disabled.is_active());
        assert!(!locked.is_active());
    }
}
