//! Bind credentials with a protected password.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Credentials for a simple bind.
///
/// The bind name is usually a distinguished name, but Active Directory also
/// accepts `user@domain` and `DOMAIN\user` spellings, so it is kept as an
/// opaque string. The password lives in a [`SecretString`] and stays out of
/// both `Debug` output and serialized form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindCredentials {
    /// Name to bind as
    bind_dn: String,

    /// Password for the bind
    #[serde(skip_serializing)]
    password: SecretString,
}

impl BindCredentials {
    /// Create credentials for a simple bind.
    #[must_use]
    pub fn new(bind_dn: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            bind_dn: bind_dn.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Credentials for an anonymous bind (empty name, empty password).
    #[must_use]
    pub fn anonymous() -> Self {
        Self::new("", "")
    }

    /// The name to bind as.
    #[must_use]
    pub fn bind_dn(&self) -> &str {
        &self.bind_dn
    }

    /// The protected password. Call
    /// [`expose_secret`](secrecy::ExposeSecret::expose_secret) only at the
    /// point the bind request is built.
    #[must_use]
    pub fn password(&self) -> &SecretString {
        &self.password
    }

    /// Returns true for the anonymous (empty name, empty password) form.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.bind_dn.is_empty() && self.password.expose_secret().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_and_accessors() {
        let creds = BindCredentials::new("cn=admin,dc=example,dc=com", "hunter2");
        assert_eq!(creds.bind_dn(), "cn=admin,dc=example,dc=com");
        assert_eq!(creds.password().expose_secret(), "hunter2");
        assert!(!creds.is_anonymous());
    }

    #[test]
    fn test_anonymous() {
        let creds = BindCredentials::anonymous();
        assert_eq!(creds.bind_dn(), "");
        assert_eq!(creds.password().expose_secret(), "");
        assert!(creds.is_anonymous());
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = BindCredentials::new("cn=admin,dc=example,dc=com", "hunter2");
        let debug = format!("{creds:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("cn=admin"));
    }

    #[test]
    fn test_serialization_skips_password() {
        let creds = BindCredentials::new("cn=admin,dc=example,dc=com", "hunter2");
        let json = serde_json::to_string(&creds).unwrap();
        assert!(json.contains("cn=admin,dc=example,dc=com"));
        assert!(!json.contains("hunter2"));
        assert!(!json.contains("password"));
    }

    #[test]
    fn test_deserialization() {
        let creds: BindCredentials = serde_json::from_str(
            r#"{"bind_dn":"cn=reader,dc=example,dc=com","password":"pw"}"#,
        )
        .unwrap();
        assert_eq!(creds.bind_dn(), "cn=reader,dc=example,dc=com");
        assert_eq!(creds.password().expose_secret(), "pw");
    }
}
