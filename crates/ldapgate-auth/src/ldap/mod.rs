//! LDAP-backed credential verification

mod authenticator;
mod health;
mod pool;
mod resolver;
mod types;

#[cfg(test)]
mod testing;

pub use authenticator::LdapAuthenticator;
pub use health::HealthProber;
pub use pool::{ConnectionAcquirer, DirectoryConnection, LdapPool};
pub use resolver::UserResolver;
pub use types::{
    AuthenticationResult, BindOutcome, DenyReason, DirectoryEntry, FilterTemplate, LdapConfig,
    ResolveOutcome, PROBE_USERNAME, USERNAME_PLACEHOLDER,
};
