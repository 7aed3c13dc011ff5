//! High-level directory lookups.
//!
//! [`Directory`] wraps an authenticated [`Session`] and answers the common
//! questions (find a user, find a group, check a password) without the
//! caller assembling filters or mapping entries by hand. Lookups run against
//! the configured base DN; [`Directory::scoped`] derives a facade rooted at
//! a different base over the same session.

use crate::config::DirectoryConfig;
use crate::entry::Entry;
use crate::search::Query;
use crate::session::Session;
use crate::{Computer, Group, OrgUnit, User};
use async_trait::async_trait;
use rolodex_core::{BindCredentials, DistinguishedName, Filter, Result};
use std::sync::Arc;
use tracing::debug;

/// Runs queries for the facade. Split out so tests can substitute a scripted
/// backend for a live session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait Backend: Send + Sync {
    /// Runs `query` to completion and collects the entries.
    async fn search(&self, query: Query) -> Result<Vec<Entry>>;

    /// Checks `password` by binding as `bind_dn` on a dedicated connection.
    async fn verify_credentials(&self, bind_dn: &str, password: &str) -> Result<bool>;
}

/// The live backend: queries go to the wrapped session, credential checks
/// bind on a fresh connection so the shared session keeps its own bind.
struct SessionBackend {
    session: Arc<Session>,
}

#[async_trait]
impl Backend for SessionBackend {
    async fn search(&self, query: Query) -> Result<Vec<Entry>> {
        self.session.search(&query)?.entries().await
    }

    async fn verify_credentials(&self, bind_dn: &str, password: &str) -> Result<bool> {
        let session = Session::open(self.session.config().clone()).await?;
        let outcome = session.bind(&BindCredentials::new(bind_dn, password)).await;
        session.close().await;
        match outcome {
            Ok(()) => Ok(true),
            Err(err) if err.is_authentication() => {
                debug!(bind_dn, error = %err, "credential check rejected");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }
}

/// High-level lookup interface over a directory session.
#[derive(Clone)]
pub struct Directory {
    backend: Arc<dyn Backend>,
    config: Arc<DirectoryConfig>,
    base: DistinguishedName,
}

impl Directory {
    /// Wraps `session`, rooting lookups at the session's base DN.
    #[must_use]
    pub fn new(session: Session, config: DirectoryConfig) -> Self {
        let base = session.config().base_dn().clone();
        Self {
            backend: Arc::new(SessionBackend {
                session: Arc::new(session),
            }),
            config: Arc::new(config),
            base,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_backend(
        backend: Arc<dyn Backend>,
        config: DirectoryConfig,
        base: DistinguishedName,
    ) -> Self {
        Self {
            backend,
            config: Arc::new(config),
            base,
        }
    }

    /// Returns a facade rooted at `base`, sharing this one's session.
    #[must_use]
    pub fn scoped(&self, base: DistinguishedName) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            config: Arc::clone(&self.config),
            base,
        }
    }

    /// Base DN lookups run against.
    #[must_use]
    pub const fn base_dn(&self) -> &DistinguishedName {
        &self.base
    }

    /// Returns the first entry matching `filter`, with all attributes.
    ///
    /// # Errors
    ///
    /// [`rolodex_core::Error::InvalidFilter`] when the filter string does
    /// not parse, or any error the search itself surfaces.
    pub async fn find(&self, filter: &str) -> Result<Option<Entry>> {
        let filter = Filter::parse(filter)?;
        let entries = self.run(filter, &[]).await?;
        Ok(entries.into_iter().next())
    }

    /// Returns every entry matching `filter`, with all attributes.
    ///
    /// # Errors
    ///
    /// [`rolodex_core::Error::InvalidFilter`] when the filter string does
    /// not parse, or any error the search itself surfaces.
    pub async fn find_all(&self, filter: &str) -> Result<Vec<Entry>> {
        let filter = Filter::parse(filter)?;
        self.run(filter, &[]).await
    }

    /// Looks up the user matching `term` (account name, principal name,
    /// mail, or whatever the configured template matches).
    ///
    /// # Errors
    ///
    /// Search errors, or [`rolodex_core::Error::Mapping`] when the matching
    /// entry cannot be read as a user.
    pub async fn find_user(&self, term: &str) -> Result<Option<User>> {
        let filter = self.config.user_filter(term)?;
        let entries = self.run(filter, self.config.user_attributes()).await?;
        entries.first().map(User::from_entry).transpose()
    }

    /// Looks up every user matching `term`.
    ///
    /// # Errors
    ///
    /// Search errors, or [`rolodex_core::Error::Mapping`] when an entry
    /// cannot be read as a user.
    pub async fn find_users(&self, term: &str) -> Result<Vec<User>> {
        let filter = self.config.user_filter(term)?;
        let entries = self.run(filter, self.config.user_attributes()).await?;
        entries.iter().map(User::from_entry).collect()
    }

    /// Looks up the group named `term`.
    ///
    /// # Errors
    ///
    /// Search errors, or [`rolodex_core::Error::Mapping`] when the matching
    /// entry cannot be read as a group.
    pub async fn find_group(&self, term: &str) -> Result<Option<Group>> {
        let filter = self.config.group_filter(term)?;
        let entries = self.run(filter, self.config.group_attributes()).await?;
        entries.first().map(Group::from_entry).transpose()
    }

    /// Looks up every group matching `term`.
    ///
    /// # Errors
    ///
    /// Search errors, or [`rolodex_core::Error::Mapping`] when an entry
    /// cannot be read as a group.
    pub async fn find_groups(&self, term: &str) -> Result<Vec<Group>> {
        let filter = self.config.group_filter(term)?;
        let entries = self.run(filter, self.config.group_attributes()).await?;
        entries.iter().map(Group::from_entry).collect()
    }

    /// Looks up the computer matching `term`.
    ///
    /// # Errors
    ///
    /// Search errors, or [`rolodex_core::Error::Mapping`] when the matching
    /// entry cannot be read as a computer.
    pub async fn find_computer(&self, term: &str) -> Result<Option<Computer>> {
        let filter = self.config.computer_filter(term)?;
        let entries = self.run(filter, self.config.computer_attributes()).await?;
        entries.first().map(Computer::from_entry).transpose()
    }

    /// Looks up every computer matching `term`.
    ///
    /// # Errors
    ///
    /// Search errors, or [`rolodex_core::Error::Mapping`] when an entry
    /// cannot be read as a computer.
    pub async fn find_computers(&self, term: &str) -> Result<Vec<Computer>> {
        let filter = self.config.computer_filter(term)?;
        let entries = self.run(filter, self.config.computer_attributes()).await?;
        entries.iter().map(Computer::from_entry).collect()
    }

    /// Looks up the organizational unit named `term`.
    ///
    /// # Errors
    ///
    /// Search errors, or [`rolodex_core::Error::Mapping`] when the matching
    /// entry cannot be read as an organizational unit.
    pub async fn find_ou(&self, term: &str) -> Result<Option<OrgUnit>> {
        let filter = self.config.ou_filter(term)?;
        let entries = self.run(filter, self.config.ou_attributes()).await?;
        entries.first().map(OrgUnit::from_entry).transpose()
    }

    /// Looks up every organizational unit matching `term`.
    ///
    /// # Errors
    ///
    /// Search errors, or [`rolodex_core::Error::Mapping`] when an entry
    /// cannot be read as an organizational unit.
    pub async fn find_ous(&self, term: &str) -> Result<Vec<OrgUnit>> {
        let filter = self.config.ou_filter(term)?;
        let entries = self.run(filter, self.config.ou_attributes()).await?;
        entries.iter().map(OrgUnit::from_entry).collect()
    }

    /// Checks `password` for the user matching `account`.
    ///
    /// Returns `Ok(false)` when no user matches or the server rejects the
    /// credentials, and `Err` only when the check could not be carried out
    /// (unreachable server, protocol failure). Callers can treat the bool
    /// as the authentication verdict.
    ///
    /// # Errors
    ///
    /// Search or connection errors. A rejected password is not an error.
    pub async fn authenticate(&self, account: &str, password: &str) -> Result<bool> {
        // An empty password would turn the simple bind into an
        // unauthenticated bind (RFC 4513 section 5.1.2), which servers
        // answer with success.
        if password.is_empty() {
            return Ok(false);
        }
        let Some(user) = self.find_user(account).await? else {
            debug!(account, "authenticate: no matching user");
            return Ok(false);
        };
        self.backend
            .verify_credentials(user.dn.as_str(), password)
            .await
    }

    async fn run(&self, filter: Filter, attributes: &[String]) -> Result<Vec<Entry>> {
        let query = Query::builder(filter)
            .base(self.base.clone())
            .attributes(attributes.iter().cloned())
            .build();
        self.backend.search(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rolodex_core::Error;
    use rolodex_proto::message::{PartialAttribute, SearchResultEntry};

    fn base() -> DistinguishedName {
        "dc=example,dc=com".parse().unwrap()
    }

    fn directory(backend: MockBackend) -> Directory {
        Directory::with_backend(Arc::new(backend), DirectoryConfig::new(), base())
    }

    fn user_entry(account: &str) -> Entry {
        Entry::from_wire(SearchResultEntry {
            dn: format!("cn={account},ou=People,dc=example,dc=com"),
            attributes: vec![
                PartialAttribute::new("objectClass", vec!["top", "person", "user"]),
                PartialAttribute::new("sAMAccountName", vec![account]),
                PartialAttribute::new("cn", vec![account]),
            ],
        })
        .unwrap()
    }

    fn group_entry(name: &str) -> Entry {
        Entry::from_wire(SearchResultEntry {
            dn: format!("cn={name},ou=Groups,dc=example,dc=com"),
            attributes: vec![
                PartialAttribute::new("objectClass", vec!["group"]),
                PartialAttribute::new("cn", vec![name]),
            ],
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_find_user_maps_the_first_entry() {
        let mut backend = MockBackend::new();
        backend
            .expect_search()
            .withf(|query| {
                query.filter().to_string().contains("(sAMAccountName=jdoe)")
                    && query.base().map(DistinguishedName::as_str) == Some("dc=example,dc=com")
            })
            .times(1)
            .returning(|_| Ok(vec![user_entry("jdoe")]));

        let user = directory(backend).find_user("jdoe").await.unwrap();
        assert_eq!(user.unwrap().account_name, "jdoe");
    }

    #[tokio::test]
    async fn test_find_user_returns_none_when_nothing_matches() {
        let mut backend = MockBackend::new();
        backend.expect_search().returning(|_| Ok(Vec::new()));

        let user = directory(backend).find_user("ghost").await.unwrap();
        assert!(user.is_none());
    }

    #[tokio::test]
    async fn test_find_users_maps_every_entry() {
        let mut backend = MockBackend::new();
        backend
            .expect_search()
            .returning(|_| Ok(vec![user_entry("jdoe"), user_entry("jsmith")]));

        let users = directory(backend).find_users("j*").await.unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[1].account_name, "jsmith");
    }

    #[tokio::test]
    async fn test_find_user_surfaces_mapping_errors() {
        let mut backend = MockBackend::new();
        backend
            .expect_search()
            .returning(|_| Ok(vec![group_entry("ops")]));

        let err = directory(backend).find_user("ops").await.unwrap_err();
        assert!(matches!(err, Error::Mapping(_)));
    }

    #[tokio::test]
    async fn test_scoped_lookups_use_the_new_base() {
        let mut backend = MockBackend::new();
        backend
            .expect_search()
            .withf(|query| {
                query.base().map(DistinguishedName::as_str)
                    == Some("ou=Berlin,dc=example,dc=com")
            })
            .times(1)
            .returning(|_| Ok(Vec::new()));

        let scoped = directory(backend).scoped("ou=Berlin,dc=example,dc=com".parse().unwrap());
        assert_eq!(scoped.base_dn().as_str(), "ou=Berlin,dc=example,dc=com");
        let user = scoped.find_user("jdoe").await.unwrap();
        assert!(user.is_none());
    }

    #[tokio::test]
    async fn test_find_rejects_malformed_filters_without_searching() {
        let backend = MockBackend::new();

        let err = directory(backend).find("(cn=").await.unwrap_err();
        assert!(matches!(err, Error::InvalidFilter(_)));
    }

    #[tokio::test]
    async fn test_find_returns_raw_entries() {
        let mut backend = MockBackend::new();
        backend
            .expect_search()
            .withf(|query| query.attributes().is_empty())
            .returning(|_| Ok(vec![user_entry("jdoe"), user_entry("jsmith")]));

        let entry = directory(backend).find("(cn=j*)").await.unwrap().unwrap();
        assert_eq!(entry.first("sAMAccountName"), Some("jdoe"));
    }

    #[tokio::test]
    async fn test_find_group_uses_the_group_template() {
        let mut backend = MockBackend::new();
        backend
            .expect_search()
            .withf(|query| query.filter().to_string().contains("(cn=ops)"))
            .returning(|_| Ok(vec![group_entry("ops")]));

        let group = directory(backend).find_group("ops").await.unwrap();
        assert_eq!(group.unwrap().name, "ops");
    }

    #[tokio::test]
    async fn test_authenticate_accepts_valid_credentials() {
        let mut backend = MockBackend::new();
        backend
            .expect_search()
            .returning(|_| Ok(vec![user_entry("jdoe")]));
        backend
            .expect_verify_credentials()
            .withf(|bind_dn, password| {
                bind_dn == "cn=jdoe,ou=People,dc=example,dc=com" && password == "hunter2"
            })
            .times(1)
            .returning(|_, _| Ok(true));

        let verdict = directory(backend).authenticate("jdoe", "hunter2").await;
        assert!(verdict.unwrap());
    }

    #[tokio::test]
    async fn test_authenticate_rejects_bad_passwords() {
        let mut backend = MockBackend::new();
        backend
            .expect_search()
            .returning(|_| Ok(vec![user_entry("jdoe")]));
        backend
            .expect_verify_credentials()
            .returning(|_, _| Ok(false));

        let verdict = directory(backend).authenticate("jdoe", "wrong").await;
        assert!(!verdict.unwrap());
    }

    #[tokio::test]
    async fn test_authenticate_unknown_account_never_binds() {
        // No verify_credentials expectation: a bind attempt would panic.
        let mut backend = MockBackend::new();
        backend.expect_search().returning(|_| Ok(Vec::new()));

        let verdict = directory(backend).authenticate("ghost", "hunter2").await;
        assert!(!verdict.unwrap());
    }

    #[tokio::test]
    async fn test_authenticate_empty_password_short_circuits() {
        // No expectations at all: the guard must answer before any search.
        let backend = MockBackend::new();

        let verdict = directory(backend).authenticate("jdoe", "").await;
        assert!(!verdict.unwrap());
    }
}
