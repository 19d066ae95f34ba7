//! Authentication decision engine
//!
//! Header -> credentials -> verdict cache -> resolve DN -> bind as user.
//! Every request that gets past the cache costs one search connection and
//! one bind connection.

use crate::basic::{extract_credentials, Credentials};
use crate::cache::{CacheVerdict, KeyValueCache};
use crate::error::DirectoryError;
use crate::ldap::pool::ConnectionAcquirer;
use crate::ldap::resolver::UserResolver;
use crate::ldap::types::{
    AuthenticationResult, BindOutcome, DenyReason, LdapConfig, ResolveOutcome,
};
use crate::metrics::{
    record_attempt, record_cache_hit, record_cache_miss, record_directory_error, DirectoryStage,
};
use ldapgate_crypto::credentials_digest;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct LdapAuthenticator {
    resolver: Arc<UserResolver>,
    acquirer: Arc<dyn ConnectionAcquirer>,
    cache: Arc<dyn KeyValueCache>,
    hmac_secret: String,
    cache_ttl: Duration,
}

impl LdapAuthenticator {
    pub fn new(
        config: &LdapConfig,
        hmac_secret: impl Into<String>,
        acquirer: Arc<dyn ConnectionAcquirer>,
        cache: Arc<dyn KeyValueCache>,
    ) -> Self {
        Self {
            resolver: Arc::new(UserResolver::new(config, acquirer.clone())),
            acquirer,
            cache,
            hmac_secret: hmac_secret.into(),
            cache_ttl: config.cache_ttl,
        }
    }

    /// Resolver sharing this authenticator's connection source
    pub fn resolver(&self) -> Arc<UserResolver> {
        self.resolver.clone()
    }

    /// Username for a valid `Authorization` header, `None` otherwise
    pub async fn authenticate(&self, header: Option<&str>) -> Option<String> {
        let credentials = extract_credentials(header)?;
        self.check(&credentials).await.into_userid()
    }

    /// Full decision for already extracted credentials
    pub async fn check(&self, credentials: &Credentials) -> AuthenticationResult {
        let result = self.check_cached(credentials).await;
        self.log_result(credentials, &result);
        record_attempt(result.outcome());
        result
    }

    /// Check against the directory without reading or writing the cache
    pub async fn verify_uncached(&self, credentials: &Credentials) -> AuthenticationResult {
        if credentials.password.is_empty() {
            return AuthenticationResult::Denied(DenyReason::EmptyPassword);
        }
        let result = self.verify(credentials).await;
        self.log_result(credentials, &result);
        result
    }

    async fn check_cached(&self, credentials: &Credentials) -> AuthenticationResult {
        // An empty password would turn the bind into an unauthenticated one
        if credentials.password.is_empty() {
            return AuthenticationResult::Denied(DenyReason::EmptyPassword);
        }

        let key = credentials_digest(
            &self.hmac_secret,
            &credentials.username,
            &credentials.password,
        );

        match self.cache.get(&key).await.as_deref().and_then(CacheVerdict::parse) {
            Some(CacheVerdict::Valid) => {
                record_cache_hit();
                return AuthenticationResult::Authenticated(credentials.username.clone());
            }
            Some(CacheVerdict::Invalid) => {
                record_cache_hit();
                return AuthenticationResult::Denied(DenyReason::CachedDenial);
            }
            None => record_cache_miss(),
        }

        let result = self.verify(credentials).await;

        let verdict = match &result {
            AuthenticationResult::Authenticated(_) => Some(CacheVerdict::Valid),
            AuthenticationResult::Denied(DenyReason::InvalidCredentials) => {
                Some(CacheVerdict::Invalid)
            }
            _ => None,
        };
        if let Some(verdict) = verdict {
            self.cache.set(&key, verdict.as_str(), self.cache_ttl).await;
        }

        result
    }

    async fn verify(&self, credentials: &Credentials) -> AuthenticationResult {
        let dn = match self.resolver.resolve(&credentials.username).await {
            ResolveOutcome::Found(dn) => dn,
            ResolveOutcome::NotFound => {
                return AuthenticationResult::Denied(DenyReason::UnknownUser)
            }
            ResolveOutcome::Ambiguous(count) => {
                warn!(
                    "Username {} matched {} directory entries",
                    credentials.username, count
                );
                return AuthenticationResult::Denied(DenyReason::AmbiguousUser);
            }
            ResolveOutcome::Unreachable(reason) => {
                return AuthenticationResult::Indeterminate(reason)
            }
        };

        match self.bind(&dn, &credentials.password).await {
            BindOutcome::Success => {
                AuthenticationResult::Authenticated(credentials.username.clone())
            }
            BindOutcome::InvalidCredentials => {
                AuthenticationResult::Denied(DenyReason::InvalidCredentials)
            }
            BindOutcome::Unreachable(reason) => AuthenticationResult::Indeterminate(reason),
        }
    }

    async fn bind(&self, dn: &str, password: &str) -> BindOutcome {
        match self.acquirer.acquire(Some(dn), Some(password)).await {
            Ok(mut conn) => {
                conn.release().await;
                BindOutcome::Success
            }
            Err(DirectoryError::InvalidCredentials) => BindOutcome::InvalidCredentials,
            Err(DirectoryError::Unreachable(reason)) => {
                record_directory_error(DirectoryStage::Bind);
                BindOutcome::Unreachable(reason)
            }
        }
    }

    fn log_result(&self, credentials: &Credentials, result: &AuthenticationResult) {
        match result {
            AuthenticationResult::Authenticated(username) => {
                debug!("Authenticated {}", username)
            }
            AuthenticationResult::Denied(reason) => {
                info!("Denied {}: {}", credentials.username, reason)
            }
            AuthenticationResult::Indeterminate(reason) => warn!(
                "Could not verify {}, directory unavailable: {}",
                credentials.username, reason
            ),
        }
    }
}
