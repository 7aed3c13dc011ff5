//! Classification and attribute decoding for directory entries.

use crate::entry::Entry;
use chrono::{DateTime, NaiveDateTime, Utc};
use rolodex_core::DistinguishedName;
use std::fmt;
use tracing::warn;
use uuid::Uuid;

/// `userAccountControl` bit marking the account disabled.
const ACCOUNT_DISABLE: u32 = 0x0002;

/// The object kinds the mapper distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// A user account.
    User,
    /// A group.
    Group,
    /// A computer account.
    Computer,
    /// An organizational unit.
    OrgUnit,
    /// Anything else.
    Other,
}

impl ObjectKind {
    /// Classifies an entry by its `objectClass` values.
    ///
    /// Active Directory computer objects also carry the `user` object
    /// class, so the computer check runs first; an entry classified as a
    /// kind is never also another kind.
    #[must_use]
    pub fn of(entry: &Entry) -> Self {
        let classes = entry.values("objectClass");
        let has = |name: &str| classes.iter().any(|class| class.eq_ignore_ascii_case(name));

        if has("computer") {
            Self::Computer
        } else if has("user") || has("person") || has("inetOrgPerson") || has("posixAccount") {
            Self::User
        } else if has("group")
            || has("groupOfNames")
            || has("groupOfUniqueNames")
            || has("posixGroup")
        {
            Self::Group
        } else if has("organizationalUnit") {
            Self::OrgUnit
        } else {
            Self::Other
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::User => "user",
            Self::Group => "group",
            Self::Computer => "computer",
            Self::OrgUnit => "organizational unit",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Decodes `objectGUID`, which Active Directory stores in little-endian
/// byte order.
pub(crate) fn decode_guid(entry: &Entry) -> Option<Uuid> {
    let raw = entry.first_bytes("objectGUID")?;
    let bytes: [u8; 16] = raw.try_into().ok()?;
    Some(Uuid::from_bytes_le(bytes))
}

/// Parses an LDAP GeneralizedTime value such as `20230815123045.0Z`.
pub(crate) fn decode_time(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, "%Y%m%d%H%M%S%.fZ")
        .ok()
        .map(|naive| naive.and_utc())
        .or_else(|| {
            DateTime::parse_from_str(value, "%Y%m%d%H%M%S%.f%z")
                .ok()
                .map(|with_offset| with_offset.with_timezone(&Utc))
        })
}

/// Reads the enabled flag out of `userAccountControl`. Entries without the
/// attribute (non-AD schemas) count as enabled.
pub(crate) fn decode_enabled(entry: &Entry) -> bool {
    entry
        .first("userAccountControl")
        .and_then(|value| value.trim().parse::<u32>().ok())
        .map_or(true, |flags| flags & ACCOUNT_DISABLE == 0)
}

/// True when `lockoutTime` is present and non-zero.
pub(crate) fn decode_locked(entry: &Entry) -> bool {
    entry
        .first("lockoutTime")
        .and_then(|value| value.trim().parse::<i64>().ok())
        .map_or(false, |stamp| stamp > 0)
}

/// Parses the DN-valued attribute, skipping values that do not parse.
pub(crate) fn decode_member_dns(entry: &Entry, attribute: &str) -> Vec<DistinguishedName> {
    entry
        .values(attribute)
        .into_iter()
        .filter_map(|value| match DistinguishedName::parse(value) {
            Ok(dn) => Some(dn),
            Err(err) => {
                warn!(value, error = %err, "skipping unparseable member DN");
                None
            }
        })
        .collect()
}
