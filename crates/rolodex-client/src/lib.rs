//! Asynchronous LDAP v3 directory client.
//!
//! This crate is the client layer of the rolodex workspace: [`Session`]
//! owns a connection and its bind state, [`Query`] and [`SearchStream`]
//! run paged searches against it, and [`Directory`] answers the typed
//! questions ([`User`], [`Group`], [`Computer`], [`OrgUnit`]) on top.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod computer;
mod config;
mod connection;
mod directory;
mod entry;
mod group;
mod mapper;
mod org_unit;
mod search;
mod session;
mod user;

pub use computer::{Computer, ComputerBuilder};
pub use config::{
    DirectoryConfig, SessionConfig, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_OPERATION_TIMEOUT_SECS,
    DEFAULT_PAGE_SIZE, DEFAULT_PORT,
};
pub use directory::Directory;
pub use entry::Entry;
pub use group::{Group, GroupBuilder};
pub use mapper::ObjectKind;
pub use org_unit::{OrgUnit, OrgUnitBuilder};
pub use search::{Query, QueryBuilder, SearchStream};
pub use session::{AuthState, Session};
pub use user::{User, UserBuilder};

pub use rolodex_core::{BindCredentials, DistinguishedName, Error, Filter, ResultCode};
pub use rolodex_proto::SearchScope;

/// Convenient result alias that reuses the core error type.
pub type Result<T> = rolodex_core::Result<T>;
