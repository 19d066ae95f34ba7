//! Authentication for Ldapgate
//!
//! Turns an HTTP Basic-Auth header into an authenticated username by
//! checking the credentials against an LDAP directory, with a short-lived
//! verdict cache in front of the directory.

pub mod basic;
pub mod cache;
pub mod error;
pub mod ldap;
pub mod metrics;

pub use basic::{extract_credentials, Credentials};
pub use cache::{CacheVerdict, KeyValueCache, MemoryCache};
pub use error::DirectoryError;
pub use ldap::{
    AuthenticationResult, BindOutcome, ConnectionAcquirer, DenyReason, DirectoryConnection,
    DirectoryEntry, FilterTemplate, HealthProber, LdapAuthenticator, LdapConfig, LdapPool,
    ResolveOutcome, UserResolver,
};
