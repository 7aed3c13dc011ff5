//! Session and directory configuration.
//!
//! [`SessionConfig`] describes how to reach and authenticate against a
//! directory server. [`DirectoryConfig`] describes how directory objects are
//! located: one filter template and one attribute selection per object kind.

use rolodex_core::filter;
use rolodex_core::{BindCredentials, DistinguishedName, Error, Filter, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;
use validator::Validate;

/// Default TCP connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default per-operation timeout in seconds.
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 30;

/// Default page size requested through the simple paged results control.
pub const DEFAULT_PAGE_SIZE: u32 = 500;

/// Default LDAP port, used when the URL does not carry one.
pub const DEFAULT_PORT: u16 = 389;

/// Configuration for a directory session.
///
/// Built once and handed to [`Session::open`](crate::Session::open). The URL
/// must use the `ldap://` scheme; TLS endpoints are rejected at construction
/// time rather than failing later inside the transport.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SessionConfig {
    /// Directory server URL (e.g. "ldap://dc1.example.com:389")
    #[validate(url)]
    url: String,

    /// Credentials presented in the initial bind
    credentials: BindCredentials,

    /// Default search base for queries that do not override it
    base_dn: DistinguishedName,

    /// TCP connect timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_connect_timeout_secs")]
    connect_timeout_secs: u64,

    /// Per-operation timeout in seconds, covering bind and each search
    #[validate(range(min = 1, max = 3600))]
    #[serde(default = "default_operation_timeout_secs")]
    operation_timeout_secs: u64,

    /// Entries requested per page through the paged results control
    #[validate(range(min = 1, max = 5000))]
    #[serde(default = "default_page_size")]
    page_size: u32,
}

const fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

const fn default_operation_timeout_secs() -> u64 {
    DEFAULT_OPERATION_TIMEOUT_SECS
}

const fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl SessionConfig {
    /// Create a session configuration with default timeouts and page size.
    ///
    /// # Arguments
    ///
    /// * `url` - Directory server URL, `ldap://` scheme only
    /// * `credentials` - Bind identity, or [`BindCredentials::anonymous`]
    /// * `base_dn` - Default search base
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL does not parse, uses a scheme
    /// other than `ldap`, or names no host.
    pub fn new(
        url: impl Into<String>,
        credentials: BindCredentials,
        base_dn: DistinguishedName,
    ) -> Result<Self> {
        let config = Self {
            url: url.into(),
            credentials,
            base_dn,
            connect_timeout_secs: default_connect_timeout_secs(),
            operation_timeout_secs: default_operation_timeout_secs(),
            page_size: default_page_size(),
        };

        config.validate()?;
        let parsed = Url::parse(&config.url)?;
        match parsed.scheme() {
            "ldap" => {}
            "ldaps" => {
                return Err(Error::Config(
                    "ldaps:// is not supported; connect over ldap://".to_string(),
                ));
            }
            other => {
                return Err(Error::Config(format!(
                    "unsupported URL scheme `{other}`, expected ldap://"
                )));
            }
        }
        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(Error::Config(
                "directory URL names no host".to_string(),
            ));
        }

        Ok(config)
    }

    /// Set the TCP connect timeout in seconds.
    #[must_use]
    pub const fn with_connect_timeout(mut self, seconds: u64) -> Self {
        self.connect_timeout_secs = seconds;
        self
    }

    /// Set the per-operation timeout in seconds.
    #[must_use]
    pub const fn with_operation_timeout(mut self, seconds: u64) -> Self {
        self.operation_timeout_secs = seconds;
        self
    }

    /// Set the page size requested through the paged results control.
    #[must_use]
    pub const fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }

    /// The configured directory URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The bind credentials.
    #[must_use]
    pub const fn credentials(&self) -> &BindCredentials {
        &self.credentials
    }

    /// The default search base.
    #[must_use]
    pub const fn base_dn(&self) -> &DistinguishedName {
        &self.base_dn
    }

    /// TCP connect timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Per-operation timeout.
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Page size requested through the paged results control.
    #[must_use]
    pub const fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Resolve the host and port to connect to.
    ///
    /// The port defaults to [`DEFAULT_PORT`] when the URL does not carry one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL does not parse or names no host,
    /// which can happen when the configuration was deserialized rather than
    /// built through [`SessionConfig::new`].
    pub fn server_addr(&self) -> Result<(String, u16)> {
        let url = Url::parse(&self.url)?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::Config("directory URL names no host".to_string()))?;
        Ok((host.to_string(), url.port().unwrap_or(DEFAULT_PORT)))
    }
}

/// Filter templates and attribute selections for directory lookups.
///
/// Each template carries a `{term}` placeholder. Rendering substitutes the
/// search term with filter metacharacters escaped, so a hostile term cannot
/// splice extra assertions into the filter. The defaults cover Active
/// Directory and plain LDAP schemas at the same time; override a template
/// when the target schema is known.
///
/// Classification reads `objectClass`, so every attribute selection should
/// keep it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Filter template for user lookups
    #[serde(default = "default_user_filter_template")]
    user_filter_template: String,

    /// Filter template for group lookups
    #[serde(default = "default_group_filter_template")]
    group_filter_template: String,

    /// Filter template for computer lookups
    #[serde(default = "default_computer_filter_template")]
    computer_filter_template: String,

    /// Filter template for organizational unit lookups
    #[serde(default = "default_ou_filter_template")]
    ou_filter_template: String,

    /// Attributes requested for user entries
    #[serde(default = "default_user_attributes")]
    user_attributes: Vec<String>,

    /// Attributes requested for group entries
    #[serde(default = "default_group_attributes")]
    group_attributes: Vec<String>,

    /// Attributes requested for computer entries
    #[serde(default = "default_computer_attributes")]
    computer_attributes: Vec<String>,

    /// Attributes requested for organizational unit entries
    #[serde(default = "default_ou_attributes")]
    ou_attributes: Vec<String>,
}

fn default_user_filter_template() -> String {
    "(&(objectClass=user)(!(objectClass=computer))(|(sAMAccountName={term})(userPrincipalName={term})(mail={term})(uid={term})))".to_string()
}

fn default_group_filter_template() -> String {
    "(&(|(objectClass=group)(objectClass=groupOfNames))(cn={term}))".to_string()
}

fn default_computer_filter_template() -> String {
    "(&(objectClass=computer)(|(cn={term})(sAMAccountName={term})(dNSHostName={term})))"
        .to_string()
}

fn default_ou_filter_template() -> String {
    "(&(objectClass=organizationalUnit)(ou={term}))".to_string()
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn default_user_attributes() -> Vec<String> {
    to_strings(&[
        "objectClass",
        "objectGUID",
        "cn",
        "sAMAccountName",
        "userPrincipalName",
        "uid",
        "mail",
        "displayName",
        "givenName",
        "sn",
        "memberOf",
        "userAccountControl",
        "whenCreated",
        "whenChanged",
    ])
}

fn default_group_attributes() -> Vec<String> {
    to_strings(&[
        "objectClass",
        "objectGUID",
        "cn",
        "description",
        "member",
        "memberOf",
        "gidNumber",
        "whenCreated",
    ])
}

fn default_computer_attributes() -> Vec<String> {
    to_strings(&[
        "objectClass",
        "objectGUID",
        "cn",
        "sAMAccountName",
        "dNSHostName",
        "operatingSystem",
        "operatingSystemVersion",
        "userAccountControl",
        "whenCreated",
    ])
}

fn default_ou_attributes() -> Vec<String> {
    to_strings(&["objectClass", "objectGUID", "ou", "name", "description"])
}

impl DirectoryConfig {
    /// Create a directory configuration with the default templates and
    /// attribute selections.
    #[must_use]
    pub fn new() -> Self {
        Self {
            user_filter_template: default_user_filter_template(),
            group_filter_template: default_group_filter_template(),
            computer_filter_template: default_computer_filter_template(),
            ou_filter_template: default_ou_filter_template(),
            user_attributes: default_user_attributes(),
            group_attributes: default_group_attributes(),
            computer_attributes: default_computer_attributes(),
            ou_attributes: default_ou_attributes(),
        }
    }

    /// Override the user filter template.
    #[must_use]
    pub fn with_user_filter_template(mut self, template: impl Into<String>) -> Self {
        self.user_filter_template = template.into();
        self
    }

    /// Override the group filter template.
    #[must_use]
    pub fn with_group_filter_template(mut self, template: impl Into<String>) -> Self {
        self.group_filter_template = template.into();
        self
    }

    /// Override the computer filter template.
    #[must_use]
    pub fn with_computer_filter_template(mut self, template: impl Into<String>) -> Self {
        self.computer_filter_template = template.into();
        self
    }

    /// Override the organizational unit filter template.
    #[must_use]
    pub fn with_ou_filter_template(mut self, template: impl Into<String>) -> Self {
        self.ou_filter_template = template.into();
        self
    }

    /// Override the attributes requested for user entries.
    #[must_use]
    pub fn with_user_attributes(mut self, attributes: Vec<String>) -> Self {
        self.user_attributes = attributes;
        self
    }

    /// Override the attributes requested for group entries.
    #[must_use]
    pub fn with_group_attributes(mut self, attributes: Vec<String>) -> Self {
        self.group_attributes = attributes;
        self
    }

    /// Override the attributes requested for computer entries.
    #[must_use]
    pub fn with_computer_attributes(mut self, attributes: Vec<String>) -> Self {
        self.computer_attributes = attributes;
        self
    }

    /// Override the attributes requested for organizational unit entries.
    #[must_use]
    pub fn with_ou_attributes(mut self, attributes: Vec<String>) -> Self {
        self.ou_attributes = attributes;
        self
    }

    /// Render the user filter template for a search term.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the template lacks the `{term}`
    /// placeholder, or [`Error::InvalidFilter`] if the rendered filter does
    /// not parse.
    pub fn user_filter(&self, term: &str) -> Result<Filter> {
        render(&self.user_filter_template, term)
    }

    /// Render the group filter template for a search term.
    ///
    /// # Errors
    ///
    /// See [`DirectoryConfig::user_filter`].
    pub fn group_filter(&self, term: &str) -> Result<Filter> {
        render(&self.group_filter_template, term)
    }

    /// Render the computer filter template for a search term.
    ///
    /// # Errors
    ///
    /// See [`DirectoryConfig::user_filter`].
    pub fn computer_filter(&self, term: &str) -> Result<Filter> {
        render(&self.computer_filter_template, term)
    }

    /// Render the organizational unit filter template for a search term.
    ///
    /// # Errors
    ///
    /// See [`DirectoryConfig::user_filter`].
    pub fn ou_filter(&self, term: &str) -> Result<Filter> {
        render(&self.ou_filter_template, term)
    }

    /// Attributes requested for user entries.
    #[must_use]
    pub fn user_attributes(&self) -> &[String] {
        &self.user_attributes
    }

    /// Attributes requested for group entries.
    #[must_use]
    pub fn group_attributes(&self) -> &[String] {
        &self.group_attributes
    }

    /// Attributes requested for computer entries.
    #[must_use]
    pub fn computer_attributes(&self) -> &[String] {
        &self.computer_attributes
    }

    /// Attributes requested for organizational unit entries.
    #[must_use]
    pub fn ou_attributes(&self) -> &[String] {
        &self.ou_attributes
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Substitute the escaped term into a template and parse the result.
fn render(template: &str, term: &str) -> Result<Filter> {
    if !template.contains("{term}") {
        return Err(Error::Config(format!(
            "filter template `{template}` lacks the {{term}} placeholder"
        )));
    }
    let rendered = template.replace("{term}", &filter::escape_value(term));
    Ok(Filter::parse(&rendered)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SessionConfig {
        SessionConfig::new(
            "ldap://dc1.example.com",
            BindCredentials::new("cn=svc,dc=example,dc=com", "hunter2"),
            "dc=example,dc=com".parse().unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn new_applies_defaults() {
        let config = config();
        assert_eq!(config.url(), "ldap://dc1.example.com");
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.operation_timeout(), Duration::from_secs(30));
        assert_eq!(config.page_size(), 500);
        assert_eq!(config.base_dn().as_str(), "dc=example,dc=com");
    }

    #[test]
    fn builder_overrides() {
        let config = config()
            .with_connect_timeout(5)
            .with_operation_timeout(120)
            .with_page_size(50);
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.operation_timeout(), Duration::from_secs(120));
        assert_eq!(config.page_size(), 50);
    }

    #[test]
    fn rejects_ldaps_scheme() {
        let err = SessionConfig::new(
            "ldaps://dc1.example.com",
            BindCredentials::anonymous(),
            "dc=example,dc=com".parse().unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("ldaps")));
    }

    #[test]
    fn rejects_other_schemes() {
        let err = SessionConfig::new(
            "http://dc1.example.com",
            BindCredentials::anonymous(),
            "dc=example,dc=com".parse().unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("http")));
    }

    #[test]
    fn rejects_url_without_host() {
        let err = SessionConfig::new(
            "ldap:example.com",
            BindCredentials::anonymous(),
            "dc=example,dc=com".parse().unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn server_addr_defaults_port() {
        let (host, port) = config().server_addr().unwrap();
        assert_eq!(host, "dc1.example.com");
        assert_eq!(port, 389);
    }

    #[test]
    fn server_addr_honors_explicit_port() {
        let config = SessionConfig::new(
            "ldap://dc1.example.com:3268",
            BindCredentials::anonymous(),
            "dc=example,dc=com".parse().unwrap(),
        )
        .unwrap();
        assert_eq!(config.server_addr().unwrap().1, 3268);
    }

    #[test]
    fn deserialized_config_can_be_validated() {
        let json = r#"{
            "url": "ldap://dc1.example.com",
            "credentials": {"bind_dn": "cn=svc,dc=example,dc=com", "password": "hunter2"},
            "base_dn": "dc=example,dc=com",
            "connect_timeout_secs": 0
        }"#;
        let config: SessionConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn serialization_skips_password() {
        let value = serde_json::to_value(config()).unwrap();
        assert!(value["credentials"].get("password").is_none());
        assert_eq!(value["credentials"]["bind_dn"], "cn=svc,dc=example,dc=com");
    }

    #[test]
    fn default_templates_render() {
        let config = DirectoryConfig::new();
        config.user_filter("alice").unwrap();
        config.group_filter("admins").unwrap();
        config.computer_filter("ws-042").unwrap();
        config.ou_filter("Engineering").unwrap();
    }

    #[test]
    fn rendered_filter_escapes_term() {
        let config = DirectoryConfig::new();
        let filter = config.group_filter("x)(objectClass=*").unwrap();
        assert_eq!(
            filter.to_string(),
            "(&(|(objectClass=group)(objectClass=groupOfNames))(cn=x\\29\\28objectClass=\\2a))"
        );
    }

    #[test]
    fn template_without_placeholder_is_rejected() {
        let config = DirectoryConfig::new().with_user_filter_template("(cn=fixed)");
        let err = config.user_filter("alice").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn custom_template_overrides_default() {
        let config = DirectoryConfig::new().with_user_filter_template("(uid={term})");
        let filter = config.user_filter("alice").unwrap();
        assert_eq!(filter.to_string(), "(uid=alice)");
    }
}
