//! Directory connection pool
//!
//! [`ConnectionAcquirer`] is the seam the resolver, authenticator and health
//! prober depend on. [`LdapPool`] implements it over `ldap3`: it bounds the
//! number of live connections, retries failed connection attempts and
//! applies the configured timeout to every directory operation.

use crate::error::DirectoryError;
use crate::ldap::types::{DirectoryEntry, LdapConfig};
use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

/// Attribute list requesting no attributes, only the DN
const NO_ATTRS: &str = "1.1";

/// LDAP result code: invalidCredentials
const RC_INVALID_CREDENTIALS: u32 = 49;

/// LDAP result code: unwillingToPerform (disabled or locked accounts)
const RC_UNWILLING_TO_PERFORM: u32 = 53;

/// A bound directory connection.
///
/// Dropping it gives its pool slot back. Callers should still call
/// [`release`](DirectoryConnection::release) on the normal path so the
/// server sees an unbind.
#[async_trait]
pub trait DirectoryConnection: Send {
    /// Subtree search under `base_dn`
    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
    ) -> Result<Vec<DirectoryEntry>, DirectoryError>;

    /// Unbind from the server
    async fn release(&mut self);
}

/// Hands out connections bound as the given identity.
///
/// `bind_dn = None` yields an anonymous connection. A rejected bind is
/// reported as [`DirectoryError::InvalidCredentials`]; every other failure,
/// including pool exhaustion past the timeout, as
/// [`DirectoryError::Unreachable`].
#[async_trait]
pub trait ConnectionAcquirer: Send + Sync {
    async fn acquire(
        &self,
        bind_dn: Option<&str>,
        password: Option<&str>,
    ) -> Result<Box<dyn DirectoryConnection>, DirectoryError>;
}

/// `ldap3`-backed pool
pub struct LdapPool {
    endpoint: String,
    start_tls: bool,
    skip_tls_verify: bool,
    retry_max: u32,
    retry_delay: Duration,
    timeout: Duration,
    permits: Arc<Semaphore>,
}

impl LdapPool {
    pub fn new(config: &LdapConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            start_tls: config.start_tls,
            skip_tls_verify: config.skip_tls_verify,
            retry_max: config.retry_max,
            retry_delay: config.retry_delay,
            timeout: config.timeout,
            permits: Arc::new(Semaphore::new(config.pool_size)),
        }
    }

    /// Free connection slots
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Connect and bind, retrying transport failures
    async fn connect_with_retry(
        &self,
        bind_dn: Option<&str>,
        password: Option<&str>,
    ) -> Result<Ldap, DirectoryError> {
        let mut last_error = None;

        for attempt in 0..=self.retry_max {
            if attempt > 0 {
                debug!("Retry attempt {} for {}", attempt, self.endpoint);
                tokio::time::sleep(self.retry_delay).await;
            }

            match self.connect_once(bind_dn, password).await {
                Ok(ldap) => return Ok(ldap),
                Err(DirectoryError::InvalidCredentials) => {
                    return Err(DirectoryError::InvalidCredentials)
                }
                Err(e) => {
                    warn!(
                        "LDAP connection to {} failed (attempt {}): {}",
                        self.endpoint,
                        attempt + 1,
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| DirectoryError::unreachable("Unknown error")))
    }

    async fn connect_once(
        &self,
        bind_dn: Option<&str>,
        password: Option<&str>,
    ) -> Result<Ldap, DirectoryError> {
        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.timeout)
            .set_starttls(self.start_tls)
            .set_no_tls_verify(self.skip_tls_verify);

        debug!("Connecting to LDAP server: {}", self.endpoint);

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &self.endpoint)
            .await
            .map_err(|e| {
                DirectoryError::unreachable(format!("Failed to connect to LDAP server: {}", e))
            })?;

        ldap3::drive!(conn);

        let Some(dn) = bind_dn else {
            return Ok(ldap);
        };

        let result = ldap
            .with_timeout(self.timeout)
            .simple_bind(dn, password.unwrap_or_default())
            .await
            .map_err(|e| DirectoryError::unreachable(format!("Bind failed: {}", e)))?;

        match result.rc {
            0 => Ok(ldap),
            RC_INVALID_CREDENTIALS | RC_UNWILLING_TO_PERFORM => {
                let _ = ldap.unbind().await;
                Err(DirectoryError::InvalidCredentials)
            }
            rc => {
                let _ = ldap.unbind().await;
                Err(DirectoryError::unreachable(format!(
                    "Bind failed with code: {}",
                    rc
                )))
            }
        }
    }
}

#[async_trait]
impl ConnectionAcquirer for LdapPool {
    async fn acquire(
        &self,
        bind_dn: Option<&str>,
        password: Option<&str>,
    ) -> Result<Box<dyn DirectoryConnection>, DirectoryError> {
        let permit = tokio::time::timeout(self.timeout, self.permits.clone().acquire_owned())
            .await
            .map_err(|_| DirectoryError::unreachable("Timed out waiting for a pooled connection"))?
            .map_err(|_| DirectoryError::unreachable("Connection pool closed"))?;

        let ldap = self.connect_with_retry(bind_dn, password).await?;

        Ok(Box::new(PooledConnection {
            ldap,
            timeout: self.timeout,
            _permit: permit,
        }))
    }
}

/// Connection holding one pool slot until dropped
struct PooledConnection {
    ldap: Ldap,
    timeout: Duration,
    _permit: OwnedSemaphorePermit,
}

#[async_trait]
impl DirectoryConnection for PooledConnection {
    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
    ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        let (rs, _res) = self
            .ldap
            .with_timeout(self.timeout)
            .search(base_dn, Scope::Subtree, filter, vec![NO_ATTRS])
            .await
            .map_err(|e| DirectoryError::unreachable(format!("Search failed: {}", e)))?
            .success()
            .map_err(|e| DirectoryError::unreachable(format!("Search error: {}", e)))?;

        Ok(rs
            .into_iter()
            .map(|result| {
                let entry = SearchEntry::construct(result);
                DirectoryEntry {
                    dn: entry.dn,
                    attributes: entry.attrs,
                }
            })
            .collect())
    }

    async fn release(&mut self) {
        if let Err(e) = self.ldap.unbind().await {
            debug!("LDAP unbind failed: {}", e);
        }
    }
}
