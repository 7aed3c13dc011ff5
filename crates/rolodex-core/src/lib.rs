//! # rolodex-core
//!
//! Core types shared by the rolodex directory client crates.
//!
//! This crate provides the vocabulary used across the workspace: the error
//! hierarchy with LDAP result codes, strongly-typed distinguished names,
//! search filter expressions, and bind credentials.
//!
//! ## Modules
//!
//! - [`error`] - Error types and LDAP result code mapping
//! - [`dn`] - Strongly-typed distinguished names
//! - [`filter`] - Search filter expressions and string-form parsing
//! - [`credentials`] - Bind credentials with protected secrets

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod credentials;
pub mod dn;
pub mod error;
pub mod filter;

// Re-export commonly used types
pub use credentials::BindCredentials;
pub use dn::DistinguishedName;
pub use error::{Error, Result, ResultCode};
pub use filter::Filter;
