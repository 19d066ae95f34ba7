//! LDAP types and runtime configuration
//!
//! Covers:
//! - Runtime directory settings built from the validated config section
//! - The user search filter template
//! - Search, bind and authentication outcomes

use ldapgate_core::config::LdapConfigSection;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

// ============================================================================
// Filter Template
// ============================================================================

/// Name of the username placeholder in the filter template
pub const USERNAME_PLACEHOLDER: &str = "mail";

/// Sentinel substituted when validating the template and when probing health
pub const PROBE_USERNAME: &str = "demo";

/// User search filter with exactly one `{mail}` placeholder.
///
/// `{{` and `}}` stand for literal braces. The template is split around the
/// placeholder once, at startup, so rendering cannot fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterTemplate {
    template: String,
    prefix: String,
    suffix: String,
}

impl FilterTemplate {
    /// Validate `template` with a dry-run substitution of [`PROBE_USERNAME`].
    pub fn parse(template: &str) -> ldapgate_core::Result<Self> {
        let invalid = |reason: String| {
            ldapgate_core::Error::InvalidConfig(format!(
                "Invalid ldap.filter_template {:?}: {}",
                template, reason
            ))
        };

        let (pieces, substitutions) = split_placeholders(template).map_err(invalid)?;

        match substitutions {
            0 => return Err(invalid(format!("missing {{{}}} placeholder", USERNAME_PLACEHOLDER))),
            1 => {}
            n => {
                return Err(invalid(format!(
                    "{{{}}} placeholder used {} times, expected once",
                    USERNAME_PLACEHOLDER, n
                )))
            }
        }

        let mut pieces = pieces.into_iter();
        let prefix = pieces.next().unwrap_or_default();
        let suffix = pieces.next().unwrap_or_default();

        let filter = Self {
            template: template.to_string(),
            prefix,
            suffix,
        };

        if filter.substitute(PROBE_USERNAME) == template {
            return Err(invalid("substitution leaves the template unchanged".to_string()));
        }

        Ok(filter)
    }

    /// Build the search filter for `username`, escaping filter metacharacters
    pub fn render(&self, username: &str) -> String {
        self.substitute(&ldap3::ldap_escape(username))
    }

    /// The template as configured
    pub fn as_str(&self) -> &str {
        &self.template
    }

    fn substitute(&self, value: &str) -> String {
        format!("{}{}{}", self.prefix, value, self.suffix)
    }
}

/// Split `template` on `{mail}` placeholders, resolving brace escapes.
fn split_placeholders(template: &str) -> Result<(Vec<String>, usize), String> {
    let mut pieces = vec![String::new()];
    let mut substitutions = 0;
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                push_char(&mut pieces, '{');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => name.push(c),
                        None => return Err("unbalanced '{'".to_string()),
                    }
                }
                if name != USERNAME_PLACEHOLDER {
                    return Err(format!("unknown placeholder {{{}}}", name));
                }
                substitutions += 1;
                pieces.push(String::new());
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                push_char(&mut pieces, '}');
            }
            '}' => return Err("unbalanced '}'".to_string()),
            c => push_char(&mut pieces, c),
        }
    }

    Ok((pieces, substitutions))
}

fn push_char(pieces: &mut [String], c: char) {
    if let Some(last) = pieces.last_mut() {
        last.push(c);
    }
}

// ============================================================================
// LDAP Configuration
// ============================================================================

/// Validated directory settings
#[derive(Clone)]
pub struct LdapConfig {
    /// LDAP server URL (ldap:// or ldaps://)
    pub endpoint: String,

    /// Base DN for user searches
    pub base_dn: String,

    /// User search filter
    pub filter: FilterTemplate,

    /// Privileged bind DN (anonymous when `None`)
    pub bind_dn: Option<String>,

    /// Privileged bind password
    pub bind_password: Option<String>,

    pub start_tls: bool,
    pub skip_tls_verify: bool,

    /// Maximum concurrent directory connections
    pub pool_size: usize,

    /// Connection retries after the first failed attempt
    pub retry_max: u32,

    /// Pause between connection attempts
    pub retry_delay: Duration,

    /// Bound on pool acquisition and on each directory operation
    pub timeout: Duration,

    /// Lifetime of a cached verdict
    pub cache_ttl: Duration,
}

impl LdapConfig {
    /// Build runtime settings, rejecting any invalid value
    pub fn from_section(section: &LdapConfigSection) -> ldapgate_core::Result<Self> {
        section.validate()?;

        Ok(Self {
            endpoint: section.endpoint.clone(),
            base_dn: section.base_dn.clone(),
            filter: FilterTemplate::parse(&section.filter_template)?,
            bind_dn: section.bind_dn.clone(),
            bind_password: section.bind_password.clone(),
            start_tls: section.start_tls,
            skip_tls_verify: section.skip_tls_verify,
            pool_size: section.pool_size,
            retry_max: section.pool_retry_max,
            retry_delay: seconds("pool_retry_delay_secs", section.pool_retry_delay_secs)?,
            timeout: seconds("pool_timeout_secs", section.pool_timeout_secs)?,
            cache_ttl: seconds("cache_ttl_seconds", section.cache_ttl_seconds)?,
        })
    }
}

fn seconds(name: &str, value: f64) -> ldapgate_core::Result<Duration> {
    Duration::try_from_secs_f64(value).map_err(|e| {
        ldapgate_core::Error::InvalidConfig(format!("ldap.{} = {}: {}", name, value, e))
    })
}

impl fmt::Debug for LdapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LdapConfig")
            .field("endpoint", &self.endpoint)
            .field("base_dn", &self.base_dn)
            .field("filter", &self.filter.as_str())
            .field("bind_dn", &self.bind_dn)
            .field("bind_password", &self.bind_password.as_ref().map(|_| "<redacted>"))
            .field("start_tls", &self.start_tls)
            .field("pool_size", &self.pool_size)
            .field("retry_max", &self.retry_max)
            .field("retry_delay", &self.retry_delay)
            .field("timeout", &self.timeout)
            .field("cache_ttl", &self.cache_ttl)
            .finish()
    }
}

// ============================================================================
// Directory Results
// ============================================================================

/// Entry returned by a directory search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Distinguished name
    pub dn: String,

    /// Raw attributes (only the DN is used downstream)
    pub attributes: HashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: HashMap::new(),
        }
    }
}

/// Result of resolving a username to a DN
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// Exactly one entry matched
    Found(String),
    /// No entry matched
    NotFound,
    /// Several entries matched; never grants access
    Ambiguous(usize),
    /// Connection, bind or search failure
    Unreachable(String),
}

/// Result of binding as the resolved user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    Success,
    InvalidCredentials,
    Unreachable(String),
}

// ============================================================================
// Authentication Result
// ============================================================================

/// Why credentials were refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Bind rejected the password
    InvalidCredentials,
    /// A cached "invalid" verdict matched
    CachedDenial,
    /// The username matched no entry
    UnknownUser,
    /// The username matched several entries
    AmbiguousUser,
    /// Empty passwords are never sent to the directory
    EmptyPassword,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::InvalidCredentials => "invalid_credentials",
            DenyReason::CachedDenial => "cached_denial",
            DenyReason::UnknownUser => "unknown_user",
            DenyReason::AmbiguousUser => "ambiguous_user",
            DenyReason::EmptyPassword => "empty_password",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one authentication attempt.
///
/// `Denied` and `Indeterminate` both mean "no identity" to the caller; they
/// differ only in how they are logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationResult {
    Authenticated(String),
    Denied(DenyReason),
    /// The directory could not give an answer
    Indeterminate(String),
}

impl AuthenticationResult {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthenticationResult::Authenticated(_))
    }

    pub fn userid(&self) -> Option<&str> {
        match self {
            AuthenticationResult::Authenticated(username) => Some(username),
            _ => None,
        }
    }

    pub fn into_userid(self) -> Option<String> {
        match self {
            AuthenticationResult::Authenticated(username) => Some(username),
            _ => None,
        }
    }

    /// Label used for the attempts counter
    pub fn outcome(&self) -> &'static str {
        match self {
            AuthenticationResult::Authenticated(_) => "authenticated",
            AuthenticationResult::Denied(_) => "denied",
            AuthenticationResult::Indeterminate(_) => "indeterminate",
        }
    }
}
