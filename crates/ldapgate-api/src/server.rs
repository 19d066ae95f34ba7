//! HTTP server implementation

use axum::{http::StatusCode, middleware, routing::get, Router};
use ldapgate_auth::{
    ConnectionAcquirer, HealthProber, KeyValueCache, LdapAuthenticator, LdapConfig, LdapPool,
    MemoryCache,
};
use ldapgate_core::{config::GateConfig, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::{
    cors::CorsLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::{debug, info, warn};

use crate::metrics::{metrics_handler, metrics_middleware, MetricsRecorder};
use crate::middleware::basic_auth;
use crate::routes;

/// Period of the cache sweep and histogram upkeep task
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GateConfig>,
    pub authenticator: Arc<LdapAuthenticator>,
    pub prober: HealthProber,
    pub metrics: Arc<MetricsRecorder>,
}

impl AppState {
    /// Wire the authenticator and prober to an already built connection
    /// source and cache
    pub fn new(
        config: GateConfig,
        ldap: &LdapConfig,
        acquirer: Arc<dyn ConnectionAcquirer>,
        cache: Arc<dyn KeyValueCache>,
    ) -> Self {
        let authenticator = Arc::new(LdapAuthenticator::new(
            ldap,
            config.auth.userid_hmac_secret.clone(),
            acquirer,
            cache,
        ));
        let prober = HealthProber::new(authenticator.resolver());

        Self {
            config: Arc::new(config),
            authenticator,
            prober,
            metrics: Arc::new(MetricsRecorder::new()),
        }
    }
}

/// Ldapgate HTTP server
pub struct GateServer {
    config: GateConfig,
}

impl GateServer {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<()> {
        self.config.validate()?;
        let ldap = LdapConfig::from_section(&self.config.ldap)?;
        debug!("Directory settings: {:?}", ldap);

        let pool = Arc::new(LdapPool::new(&ldap));
        let cache = Arc::new(MemoryCache::new());
        let state = AppState::new(self.config.clone(), &ldap, pool, cache.clone());
        info!("Prometheus metrics initialized");

        let addr = format!("{}:{}", self.config.server.bind_address, self.config.server.port);
        let listener = TcpListener::bind(&addr).await?;

        spawn_startup_check(state.prober.clone(), ldap.endpoint.clone());
        spawn_maintenance(cache, state.metrics.clone());

        let app = create_router(state);

        info!("Ldapgate listening on http://{}", addr);
        info!("Authenticating against {} under {}", ldap.endpoint, ldap.base_dn);
        info!("Prometheus metrics at http://{}/metrics", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Ldapgate stopped");
        Ok(())
    }
}

/// Build the router over `state`
pub fn create_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    let protected = Router::new()
        .route("/whoami", get(routes::whoami))
        .route_layer(middleware::from_fn_with_state(state.clone(), basic_auth));

    Router::new()
        // Metrics endpoint (no auth required)
        .route("/metrics", get(metrics_handler))
        .route("/", get(routes::capabilities))
        .route("/__heartbeat__", get(routes::heartbeat))
        .route("/__lbheartbeat__", get(routes::lbheartbeat))
        .merge(protected)
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            metrics_middleware,
        ))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        ))
        // Request headers stay out of spans: they carry credentials
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Report directory reachability once, without holding up the listener
fn spawn_startup_check(prober: HealthProber, endpoint: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        if prober.probe().await {
            info!("LDAP directory {} is reachable", endpoint);
        } else {
            warn!("LDAP directory {} is not reachable yet", endpoint);
        }
    })
}

fn spawn_maintenance(cache: Arc<MemoryCache>, metrics: Arc<MetricsRecorder>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
        loop {
            interval.tick().await;
            metrics.run_upkeep();

            let purged = cache.purge_expired().await;
            if purged > 0 {
                debug!("Purged {} expired verdicts", purged);
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use base64::{engine::general_purpose::STANDARD, Engine};
    use ldapgate_auth::{DirectoryConnection, DirectoryEntry, DirectoryError};
    use ldapgate_core::config::{AuthConfig, LdapConfigSection};
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tower::ServiceExt;

    const ALICE_DN: &str = "uid=alice,o=com,dc=mozilla";
    const ALICE_PASSWORD: &str = "correct horse";

    /// Directory knowing a single user, searchable anonymously
    #[derive(Default)]
    struct StaticDirectory {
        down: AtomicBool,
    }

    #[async_trait]
    impl ConnectionAcquirer for StaticDirectory {
        async fn acquire(
            &self,
            bind_dn: Option<&str>,
            password: Option<&str>,
        ) -> std::result::Result<Box<dyn DirectoryConnection>, DirectoryError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(DirectoryError::unreachable("connection refused"));
            }
            match bind_dn {
                Some(ALICE_DN) if password != Some(ALICE_PASSWORD) => {
                    Err(DirectoryError::InvalidCredentials)
                }
                _ => Ok(Box::new(StaticConnection)),
            }
        }
    }

    struct StaticConnection;

    #[async_trait]
    impl DirectoryConnection for StaticConnection {
        async fn search(
            &mut self,
            _base_dn: &str,
            filter: &str,
        ) -> std::result::Result<Vec<DirectoryEntry>, DirectoryError> {
            if filter == "(mail=alice@example.com)" {
                Ok(vec![DirectoryEntry::new(ALICE_DN)])
            } else {
                Ok(Vec::new())
            }
        }

        async fn release(&mut self) {}
    }

    /// Directory whose connection attempts never complete
    struct HangingDirectory;

    #[async_trait]
    impl ConnectionAcquirer for HangingDirectory {
        async fn acquire(
            &self,
            _bind_dn: Option<&str>,
            _password: Option<&str>,
        ) -> std::result::Result<Box<dyn DirectoryConnection>, DirectoryError> {
            std::future::pending().await
        }
    }

    fn test_config() -> GateConfig {
        GateConfig {
            auth: AuthConfig {
                userid_hmac_secret: "secret".to_string(),
                realm: "Kinto".to_string(),
            },
            ldap: LdapConfigSection {
                base_dn: "o=com,dc=mozilla".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn state_with(acquirer: Arc<dyn ConnectionAcquirer>) -> AppState {
        let config = test_config();
        let ldap = LdapConfig::from_section(&config.ldap).unwrap();
        AppState::new(config, &ldap, acquirer, Arc::new(MemoryCache::new()))
    }

    fn app(directory: Arc<StaticDirectory>) -> Router {
        create_router(state_with(directory))
    }

    fn get_request(uri: &str, authorization: Option<String>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn basic(username: &str, password: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)))
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_capabilities_advertise_ldap() {
        let response = app(Arc::default())
            .oneshot(get_request("/", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["project_name"], "ldapgate");
        let ldap = &body["capabilities"]["ldap"];
        assert_eq!(ldap["url"], "https://github.com/mozilla-services/kinto-ldap");
        assert_eq!(
            ldap["description"],
            "Basic Auth user are validated against an LDAP server."
        );
        assert_eq!(ldap["version"], ldapgate_core::VERSION);
    }

    #[tokio::test]
    async fn test_heartbeat_up() {
        let response = app(Arc::default())
            .oneshot(get_request("/__heartbeat__", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!({"ldap": true}));
    }

    #[tokio::test]
    async fn test_heartbeat_down_is_503() {
        let directory = Arc::new(StaticDirectory::default());
        directory.down.store(true, Ordering::SeqCst);

        let response = app(directory)
            .oneshot(get_request("/__heartbeat__", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(response).await, serde_json::json!({"ldap": false}));
    }

    #[tokio::test]
    async fn test_lbheartbeat_ignores_directory() {
        let directory = Arc::new(StaticDirectory::default());
        directory.down.store(true, Ordering::SeqCst);

        let response = app(directory)
            .oneshot(get_request("/__lbheartbeat__", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_whoami_requires_credentials() {
        let response = app(Arc::default())
            .oneshot(get_request("/whoami", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Basic realm=\"Kinto\""
        );
    }

    #[tokio::test]
    async fn test_whoami_returns_prefixed_userid() {
        let response = app(Arc::default())
            .oneshot(get_request(
                "/whoami",
                Some(basic("alice@example.com", ALICE_PASSWORD)),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({"userid": "ldap:alice@example.com"})
        );
    }

    #[tokio::test]
    async fn test_whoami_wrong_password() {
        let response = app(Arc::default())
            .oneshot(get_request("/whoami", Some(basic("alice@example.com", "nope"))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_whoami_directory_down_fails_closed() {
        let directory = Arc::new(StaticDirectory::default());
        directory.down.store(true, Ordering::SeqCst);

        let response = app(directory)
            .oneshot(get_request(
                "/whoami",
                Some(basic("alice@example.com", ALICE_PASSWORD)),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let app = app(Arc::default());
        app.clone()
            .oneshot(get_request("/__lbheartbeat__", None))
            .await
            .unwrap();

        let response = app.oneshot(get_request("/metrics", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("ldapgate_http_requests_total"));
    }

    #[tokio::test]
    async fn test_startup_check_does_not_block_serving() {
        let state = state_with(Arc::new(HangingDirectory));

        let handle = spawn_startup_check(state.prober.clone(), "ldap://blackhole".to_string());
        tokio::task::yield_now().await;
        assert!(!handle.is_finished());
        handle.abort();

        let response = tokio::time::timeout(
            Duration::from_secs(5),
            create_router(state).oneshot(get_request("/__lbheartbeat__", None)),
        )
        .await
        .expect("lbheartbeat must not wait on the directory")
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
