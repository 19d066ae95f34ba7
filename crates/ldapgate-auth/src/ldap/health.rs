//! Directory reachability probe

use crate::ldap::resolver::UserResolver;
use crate::ldap::types::{ResolveOutcome, PROBE_USERNAME};
use crate::metrics::{record_directory_error, DirectoryStage};
use std::sync::Arc;
use tracing::error;

/// Checks that the directory answers a user search.
///
/// Any answer counts, including "no such user": only a failure to get an
/// answer makes the directory unhealthy.
#[derive(Clone)]
pub struct HealthProber {
    resolver: Arc<UserResolver>,
}

impl HealthProber {
    pub fn new(resolver: Arc<UserResolver>) -> Self {
        Self { resolver }
    }

    pub async fn probe(&self) -> bool {
        match self.resolver.resolve(PROBE_USERNAME).await {
            ResolveOutcome::Unreachable(reason) => {
                error!("Heartbeat failure: LDAP directory unreachable: {}", reason);
                record_directory_error(DirectoryStage::Probe);
                false
            }
            _ => true,
        }
    }
}
