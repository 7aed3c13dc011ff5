//! Error types for directory operations.
//!
//! This module provides the error hierarchy for the rolodex client, including
//! the LDAP result codes that bind and search responses carry. Callers can
//! always distinguish a network-level failure ([`Error::Connection`]) from a
//! rejected bind ([`Error::Authentication`]) and from a search the server
//! answered with a non-success result ([`Error::Query`]).

use std::fmt;
use thiserror::Error;

/// Main error type for directory operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Network-level failure: dial, read, write, or the peer hung up
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The server rejected the bind
    #[error("Bind rejected ({code}): {message}")]
    Authentication {
        /// Result code from the bind response
        code: ResultCode,
        /// Diagnostic message from the server, possibly empty
        message: String,
    },

    /// The server answered a query with a non-success result
    #[error("Query failed ({code}): {message}")]
    Query {
        /// Result code from the response
        code: ResultCode,
        /// Diagnostic message from the server, possibly empty
        message: String,
    },

    /// A filter string did not parse
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// A distinguished name did not parse
    #[error("Invalid distinguished name: {0}")]
    InvalidDn(String),

    /// The peer sent bytes that do not decode as an LDAP message
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Operation deadline expired
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Configuration was rejected
    #[error("Configuration error: {0}")]
    Config(String),

    /// An entry could not be converted into the requested record type
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// The session is closed and can no longer carry operations
    #[error("Session closed")]
    SessionClosed,
}

/// Specialized result type for directory operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Connection(_) => "CONNECTION",
            Self::Authentication { .. } => "AUTHENTICATION",
            Self::Query { .. } => "QUERY",
            Self::InvalidFilter(_) => "INVALID_FILTER",
            Self::InvalidDn(_) => "INVALID_DN",
            Self::Protocol(_) => "PROTOCOL",
            Self::Timeout(_) => "TIMEOUT",
            Self::Config(_) => "CONFIG",
            Self::Mapping(_) => "MAPPING",
            Self::SessionClosed => "SESSION_CLOSED",
        }
    }

    /// Returns the LDAP result code carried by this error, if any.
    #[must_use]
    pub const fn result_code(&self) -> Option<ResultCode> {
        match self {
            Self::Authentication { code, .. } | Self::Query { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if this error means the server rejected the presented
    /// credentials, as opposed to the server being unreachable.
    #[must_use]
    pub const fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns true if this error is the server reporting that the search
    /// base does not exist.
    #[must_use]
    pub const fn is_no_such_object(&self) -> bool {
        matches!(
            self,
            Self::Query {
                code: ResultCode::NoSuchObject,
                ..
            }
        )
    }

    /// Returns true if this error should be logged as a serious error.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(
            self,
            Self::Protocol(_) | Self::Config(_) | Self::SessionClosed
        )
    }
}

// Conversions from external error types
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Connection(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Config(err.to_string())
    }
}

/// LDAP result codes (RFC 4511 appendix A) relevant to a read-only client.
///
/// Codes the client never needs to branch on are preserved verbatim in
/// [`ResultCode::Unrecognized`] so nothing the server says is lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    /// 0: the operation completed successfully
    Success,
    /// 1: the server hit an internal sequencing problem
    OperationsError,
    /// 2: the request violated the protocol
    ProtocolError,
    /// 3: the server-side time limit was reached
    TimeLimitExceeded,
    /// 4: more entries matched than the size limit allows
    SizeLimitExceeded,
    /// 7: the requested authentication method is not supported
    AuthMethodNotSupported,
    /// 8: the server requires stronger authentication
    StrongerAuthRequired,
    /// 10: the server returned a referral instead of the result
    Referral,
    /// 11: an administrative limit was reached
    AdminLimitExceeded,
    /// 12: a critical control was not understood
    UnavailableCriticalExtension,
    /// 16: the named attribute does not exist on the entry
    NoSuchAttribute,
    /// 17: the attribute type is not defined by the schema
    UndefinedAttributeType,
    /// 19: an attribute value violated a constraint
    ConstraintViolation,
    /// 32: the named object does not exist in the directory
    NoSuchObject,
    /// 34: a distinguished name in the request was malformed
    InvalidDnSyntax,
    /// 48: anonymous or wrong-type credentials were presented
    InappropriateAuthentication,
    /// 49: the presented credentials are invalid
    InvalidCredentials,
    /// 50: the bound identity lacks access to the target
    InsufficientAccessRights,
    /// 51: the server is too busy to serve the request
    Busy,
    /// 52: the server is shutting down or offline
    Unavailable,
    /// 53: the server refuses to perform the operation
    UnwillingToPerform,
    /// 80: an internal failure not covered by another code
    Other,
    /// Any code this client has no dedicated handling for
    Unrecognized(u32),
}

impl ResultCode {
    /// Maps a raw result code from the wire.
    #[must_use]
    pub const fn from_code(code: u32) -> Self {
        match code {
            0 => Self::Success,
            1 => Self::OperationsError,
            2 => Self::ProtocolError,
            3 => Self::TimeLimitExceeded,
            4 => Self::SizeLimitExceeded,
            7 => Self::AuthMethodNotSupported,
            8 => Self::StrongerAuthRequired,
            10 => Self::Referral,
            11 => Self::AdminLimitExceeded,
            12 => Self::UnavailableCriticalExtension,
            16 => Self::NoSuchAttribute,
            17 => Self::UndefinedAttributeType,
            19 => Self::ConstraintViolation,
            32 => Self::NoSuchObject,
            34 => Self::InvalidDnSyntax,
            48 => Self::InappropriateAuthentication,
            49 => Self::InvalidCredentials,
            50 => Self::InsufficientAccessRights,
            51 => Self::Busy,
            52 => Self::Unavailable,
            53 => Self::UnwillingToPerform,
            80 => Self::Other,
            other => Self::Unrecognized(other),
        }
    }

    /// Returns the numeric code as sent on the wire.
    #[must_use]
    pub const fn code(&self) -> u32 {
        match self {
            Self::Success => 0,
            Self::OperationsError => 1,
            Self::ProtocolError => 2,
            Self::TimeLimitExceeded => 3,
            Self::SizeLimitExceeded => 4,
            Self::AuthMethodNotSupported => 7,
            Self::StrongerAuthRequired => 8,
            Self::Referral => 10,
            Self::AdminLimitExceeded => 11,
            Self::UnavailableCriticalExtension => 12,
            Self::NoSuchAttribute => 16,
            Self::UndefinedAttributeType => 17,
            Self::ConstraintViolation => 19,
            Self::NoSuchObject => 32,
            Self::InvalidDnSyntax => 34,
            Self::InappropriateAuthentication => 48,
            Self::InvalidCredentials => 49,
            Self::InsufficientAccessRights => 50,
            Self::Busy => 51,
            Self::Unavailable => 52,
            Self::UnwillingToPerform => 53,
            Self::Other => 80,
            Self::Unrecognized(code) => *code,
        }
    }

    /// Returns true for the success code.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::OperationsError => "operationsError",
            Self::ProtocolError => "protocolError",
            Self::TimeLimitExceeded => "timeLimitExceeded",
            Self::SizeLimitExceeded => "sizeLimitExceeded",
            Self::AuthMethodNotSupported => "authMethodNotSupported",
            Self::StrongerAuthRequired => "strongerAuthRequired",
            Self::Referral => "referral",
            Self::AdminLimitExceeded => "adminLimitExceeded",
            Self::UnavailableCriticalExtension => "unavailableCriticalExtension",
            Self::NoSuchAttribute => "noSuchAttribute",
            Self::UndefinedAttributeType => "undefinedAttributeType",
            Self::ConstraintViolation => "constraintViolation",
            Self::NoSuchObject => "noSuchObject",
            Self::InvalidDnSyntax => "invalidDNSyntax",
            Self::InappropriateAuthentication => "inappropriateAuthentication",
            Self::InvalidCredentials => "invalidCredentials",
            Self::InsufficientAccessRights => "insufficientAccessRights",
            Self::Busy => "busy",
            Self::Unavailable => "unavailable",
            Self::UnwillingToPerform => "unwillingToPerform",
            Self::Other => "other",
            Self::Unrecognized(code) => return write!(f, "code {code}"),
        };
        f.write_str(name)
    }
}
