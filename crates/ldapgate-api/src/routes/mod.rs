//! HTTP handlers

use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::middleware::AuthenticatedUser;
use crate::server::AppState;

/// Capability-discovery response
#[derive(Debug, Serialize)]
pub struct ServerInfo {
    pub project_name: &'static str,
    pub project_version: &'static str,
    pub capabilities: BTreeMap<&'static str, Capability>,
}

/// One advertised capability
#[derive(Debug, Serialize)]
pub struct Capability {
    pub version: &'static str,
    pub url: &'static str,
    pub description: &'static str,
}

/// Identity of the caller
#[derive(Debug, Serialize)]
pub struct WhoAmI {
    pub userid: String,
}

/// `GET /`
pub async fn capabilities() -> Json<ServerInfo> {
    let mut capabilities = BTreeMap::new();
    capabilities.insert(
        ldapgate_core::LDAP_CAPABILITY,
        Capability {
            version: ldapgate_core::VERSION,
            url: ldapgate_core::LDAP_CAPABILITY_URL,
            description: ldapgate_core::LDAP_CAPABILITY_DESCRIPTION,
        },
    );

    Json(ServerInfo {
        project_name: ldapgate_core::PROJECT_NAME,
        project_version: ldapgate_core::VERSION,
        capabilities,
    })
}

/// `GET /__heartbeat__`: 503 unless every indicator is up
pub async fn heartbeat(
    State(state): State<AppState>,
) -> (StatusCode, Json<BTreeMap<&'static str, bool>>) {
    let mut checks = BTreeMap::new();
    checks.insert(ldapgate_core::LDAP_CAPABILITY, state.prober.probe().await);

    let status = if checks.values().all(|up| *up) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(checks))
}

/// `GET /__lbheartbeat__`: process liveness only
pub async fn lbheartbeat() -> Json<Value> {
    Json(json!({}))
}

/// `GET /whoami`
pub async fn whoami(Extension(user): Extension<AuthenticatedUser>) -> Json<WhoAmI> {
    Json(WhoAmI {
        userid: user.userid(),
    })
}
