//! Ldapgate Core Library
//!
//! Configuration, errors and constants shared by the Ldapgate crates.

pub mod config;
pub mod error;

pub use config::GateConfig;
pub use error::{Error, Result};

/// Ldapgate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name advertised by the capability-discovery endpoint
pub const PROJECT_NAME: &str = "ldapgate";

/// Capability key under which the LDAP authentication backend is advertised
pub const LDAP_CAPABILITY: &str = "ldap";

/// Reference URL advertised with the LDAP capability
pub const LDAP_CAPABILITY_URL: &str = "https://github.com/mozilla-services/kinto-ldap";

/// Human-readable description advertised with the LDAP capability
pub const LDAP_CAPABILITY_DESCRIPTION: &str =
    "Basic Auth user are validated against an LDAP server.";
