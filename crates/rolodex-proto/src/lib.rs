//! # rolodex-proto
//!
//! Wire protocol for the rolodex directory client: a minimal BER codec and
//! the LDAP v3 message subset a read-only client exchanges (RFC 4511), plus
//! the simple paged results control (RFC 2696).
//!
//! Encoding and decoding are symmetric for every message in the subset, so
//! the same types drive both the client and the scripted servers its tests
//! talk to.
//!
//! ## Modules
//!
//! - [`ber`] - BER primitives, definite lengths only
//! - [`message`] - LDAP message envelope and protocol operations
//! - [`control`] - Request/response controls

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod ber;
pub mod control;
pub mod message;

pub use ber::{frame_len, DecodeError, MAX_FRAME_LEN};
pub use control::{Control, PagedResults};
pub use message::{LdapMessage, ProtocolOp, SearchScope};
