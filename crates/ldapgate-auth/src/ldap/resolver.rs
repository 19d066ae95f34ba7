//! Username to distinguished-name resolution
//!
//! One privileged (or anonymous) connection and one subtree search per call.
//! Nothing is cached here: verdicts are cached by the authenticator, keyed
//! by the credential pair.

use crate::error::DirectoryError;
use crate::ldap::pool::ConnectionAcquirer;
use crate::ldap::types::{FilterTemplate, LdapConfig, ResolveOutcome};
use crate::metrics::{record_directory_error, DirectoryStage};
use std::sync::Arc;
use tracing::{debug, error, warn};

pub struct UserResolver {
    acquirer: Arc<dyn ConnectionAcquirer>,
    base_dn: String,
    filter: FilterTemplate,
    bind_dn: Option<String>,
    bind_password: Option<String>,
}

impl UserResolver {
    pub fn new(config: &LdapConfig, acquirer: Arc<dyn ConnectionAcquirer>) -> Self {
        Self {
            acquirer,
            base_dn: config.base_dn.clone(),
            filter: config.filter.clone(),
            bind_dn: config.bind_dn.clone(),
            bind_password: config.bind_password.clone(),
        }
    }

    /// Resolve `username` to the DN of the single entry matching the filter
    pub async fn resolve(&self, username: &str) -> ResolveOutcome {
        let mut conn = match self
            .acquirer
            .acquire(self.bind_dn.as_deref(), self.bind_password.as_deref())
            .await
        {
            Ok(conn) => conn,
            Err(DirectoryError::InvalidCredentials) => {
                error!(
                    "LDAP service bind rejected for {}",
                    self.bind_dn.as_deref().unwrap_or("<anonymous>")
                );
                record_directory_error(DirectoryStage::Bind);
                return ResolveOutcome::Unreachable("Service bind rejected".to_string());
            }
            Err(e) => {
                record_directory_error(DirectoryStage::Search);
                return ResolveOutcome::Unreachable(e.to_string());
            }
        };

        let filter = self.filter.render(username);
        debug!("Searching for user with filter: {}", filter);

        let result = conn.search(&self.base_dn, &filter).await;
        conn.release().await;

        let entries = match result {
            Ok(entries) => entries,
            Err(e) => {
                warn!("User search under {} failed: {}", self.base_dn, e);
                record_directory_error(DirectoryStage::Search);
                return ResolveOutcome::Unreachable(e.to_string());
            }
        };

        let mut entries = entries.into_iter();
        match (entries.next(), entries.next()) {
            (None, _) => ResolveOutcome::NotFound,
            (Some(entry), None) => {
                debug!("Found user DN: {}", entry.dn);
                ResolveOutcome::Found(entry.dn)
            }
            (Some(_), Some(_)) => ResolveOutcome::Ambiguous(2 + entries.count()),
        }
    }
}
