//! Configuration for Ldapgate

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upper bound on every duration setting: one year
pub const MAX_SECONDS: f64 = 365.0 * 24.0 * 3600.0;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub ldap: LdapConfigSection,
}

impl GateConfig {
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::InternalError(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> crate::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load from `LDAPGATE_*` environment variables.
    ///
    /// A variable that is set but cannot be parsed is a configuration error.
    pub fn from_env() -> crate::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading variables through `lookup`
    pub fn from_lookup<F>(lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("LDAPGATE_BIND_ADDRESS") {
            config.server.bind_address = addr;
        }
        if let Some(port) = parse_var(&lookup, "LDAPGATE_PORT")? {
            config.server.port = port;
        }
        if let Some(timeout) = parse_var(&lookup, "LDAPGATE_REQUEST_TIMEOUT_SECS")? {
            config.server.request_timeout_secs = timeout;
        }
        if let Some(level) = lookup("LDAPGATE_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(format) = lookup("LDAPGATE_LOG_FORMAT") {
            config.logging.format = format;
        }
        if let Some(secret) = lookup("LDAPGATE_USERID_HMAC_SECRET") {
            config.auth.userid_hmac_secret = secret;
        }
        if let Some(realm) = lookup("LDAPGATE_REALM") {
            config.auth.realm = realm;
        }

        // LDAP from environment
        let ldap = &mut config.ldap;
        if let Some(endpoint) = lookup("LDAPGATE_LDAP_ENDPOINT") {
            ldap.endpoint = endpoint;
        }
        if let Some(base_dn) = lookup("LDAPGATE_LDAP_BASE_DN") {
            ldap.base_dn = base_dn;
        }
        if let Some(template) = lookup("LDAPGATE_LDAP_FILTER_TEMPLATE") {
            ldap.filter_template = template;
        }
        if let Some(dn) = lookup("LDAPGATE_LDAP_BIND_DN") {
            ldap.bind_dn = Some(dn);
        }
        if let Some(password) = lookup("LDAPGATE_LDAP_BIND_PASSWORD") {
            ldap.bind_password = Some(password);
        }
        if let Some(start_tls) = parse_bool_var(&lookup, "LDAPGATE_LDAP_START_TLS")? {
            ldap.start_tls = start_tls;
        }
        if let Some(skip) = parse_bool_var(&lookup, "LDAPGATE_LDAP_SKIP_TLS_VERIFY")? {
            ldap.skip_tls_verify = skip;
        }
        if let Some(size) = parse_var(&lookup, "LDAPGATE_LDAP_POOL_SIZE")? {
            ldap.pool_size = size;
        }
        if let Some(retries) = parse_var(&lookup, "LDAPGATE_LDAP_POOL_RETRY_MAX")? {
            ldap.pool_retry_max = retries;
        }
        if let Some(delay) = parse_var(&lookup, "LDAPGATE_LDAP_POOL_RETRY_DELAY_SECS")? {
            ldap.pool_retry_delay_secs = delay;
        }
        if let Some(timeout) = parse_var(&lookup, "LDAPGATE_LDAP_POOL_TIMEOUT_SECS")? {
            ldap.pool_timeout_secs = timeout;
        }
        if let Some(ttl) = parse_var(&lookup, "LDAPGATE_LDAP_CACHE_TTL_SECONDS")? {
            ldap.cache_ttl_seconds = ttl;
        }

        Ok(config)
    }

    /// Validate every section. Any error here must abort startup.
    pub fn validate(&self) -> crate::Result<()> {
        self.auth.validate()?;
        self.ldap.validate()?;

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(crate::Error::InvalidConfig(format!(
                "Unknown log format: {}",
                self.logging.format
            )));
        }

        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> crate::Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|raw| {
            raw.trim().parse().map_err(|e| {
                crate::Error::InvalidConfig(format!("{}={:?} is invalid: {}", name, raw, e))
            })
        })
        .transpose()
}

fn parse_bool_var<F>(lookup: &F, name: &str) -> crate::Result<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(crate::Error::InvalidConfig(format!(
                "{}={:?} is not a boolean",
                name, raw
            ))),
        })
        .transpose()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8888,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Basic-Auth settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Server-held secret keying the credential cache digests
    #[serde(default)]
    pub userid_hmac_secret: String,

    /// Realm advertised in the `WWW-Authenticate` challenge
    #[serde(default = "default_realm")]
    pub realm: String,
}

fn default_realm() -> String {
    "Realm".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            userid_hmac_secret: String::new(),
            realm: default_realm(),
        }
    }
}

impl AuthConfig {
    pub fn validate(&self) -> crate::Result<()> {
        if self.userid_hmac_secret.is_empty() {
            return Err(crate::Error::InvalidConfig(
                "auth.userid_hmac_secret is required".into(),
            ));
        }
        if self.realm.contains('"') {
            return Err(crate::Error::InvalidConfig(
                "auth.realm must not contain double quotes".into(),
            ));
        }
        Ok(())
    }
}

/// LDAP directory section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdapConfigSection {
    /// LDAP server URL (ldap:// or ldaps://)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Base DN for the user subtree search
    /// Example: "o=com,dc=mozilla"
    #[serde(default)]
    pub base_dn: String,

    /// User search filter with a single `{mail}` placeholder
    /// Example: "(mail={mail})" or "(uid={mail})"
    #[serde(default = "default_filter_template")]
    pub filter_template: String,

    /// Privileged DN used for searches (anonymous when absent)
    #[serde(default)]
    pub bind_dn: Option<String>,

    /// Privileged bind password
    #[serde(default)]
    pub bind_password: Option<String>,

    /// Use STARTTLS
    #[serde(default)]
    pub start_tls: bool,

    /// Skip TLS certificate verification
    #[serde(default)]
    pub skip_tls_verify: bool,

    /// Maximum number of concurrent directory connections
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Connection attempts retried after the first failure
    #[serde(default = "default_pool_retry_max")]
    pub pool_retry_max: u32,

    /// Delay between connection attempts (seconds)
    #[serde(default = "default_pool_retry_delay")]
    pub pool_retry_delay_secs: f64,

    /// Bound on pool acquisition and on each directory operation (seconds)
    #[serde(default = "default_pool_timeout")]
    pub pool_timeout_secs: f64,

    /// Lifetime of a cached verdict (seconds)
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: f64,
}

fn default_endpoint() -> String {
    "ldap://localhost:389".to_string()
}

fn default_filter_template() -> String {
    "(mail={mail})".to_string()
}

fn default_pool_size() -> usize {
    10
}

fn default_pool_retry_max() -> u32 {
    3
}

fn default_pool_retry_delay() -> f64 {
    0.1
}

fn default_pool_timeout() -> f64 {
    30.0
}

fn default_cache_ttl() -> f64 {
    30.0
}

impl Default for LdapConfigSection {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            base_dn: String::new(),
            filter_template: default_filter_template(),
            bind_dn: None,
            bind_password: None,
            start_tls: false,
            skip_tls_verify: false,
            pool_size: default_pool_size(),
            pool_retry_max: default_pool_retry_max(),
            pool_retry_delay_secs: default_pool_retry_delay(),
            pool_timeout_secs: default_pool_timeout(),
            cache_ttl_seconds: default_cache_ttl(),
        }
    }
}

impl LdapConfigSection {
    /// Validate the section. The filter template is checked separately when
    /// the runtime LDAP configuration is built.
    pub fn validate(&self) -> crate::Result<()> {
        if self.endpoint.is_empty() {
            return Err(crate::Error::InvalidConfig("ldap.endpoint is required".into()));
        }

        if !self.endpoint.starts_with("ldap://") && !self.endpoint.starts_with("ldaps://") {
            return Err(crate::Error::InvalidConfig(
                "ldap.endpoint must start with ldap:// or ldaps://".into(),
            ));
        }

        if self.base_dn.is_empty() {
            return Err(crate::Error::InvalidConfig("ldap.base_dn is required".into()));
        }

        if self.bind_password.is_some() && self.bind_dn.is_none() {
            return Err(crate::Error::InvalidConfig(
                "ldap.bind_password is set but ldap.bind_dn is not".into(),
            ));
        }

        if self.pool_size == 0 {
            return Err(crate::Error::InvalidConfig(
                "ldap.pool_size must be greater than zero".into(),
            ));
        }

        check_seconds("ldap.pool_retry_delay_secs", self.pool_retry_delay_secs, true)?;
        check_seconds("ldap.pool_timeout_secs", self.pool_timeout_secs, false)?;
        check_seconds("ldap.cache_ttl_seconds", self.cache_ttl_seconds, false)?;

        Ok(())
    }
}

fn check_seconds(name: &str, value: f64, allow_zero: bool) -> crate::Result<()> {
    let valid = value.is_finite() && (value > 0.0 || (allow_zero && value == 0.0));
    if !valid {
        return Err(crate::Error::InvalidConfig(format!(
            "{} must be a positive number of seconds, got {}",
            name, value
        )));
    }
    if value > MAX_SECONDS {
        return Err(crate::Error::InvalidConfig(format!(
            "{} must be at most {} seconds, got {}",
            name, MAX_SECONDS, value
        )));
    }
    Ok(())
}
