//! Server test utilities.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use promhub_core::config::{AdminConfig, AppConfig, RegistryConfig};
use promhub_registry::RegistryStore;
use promhub_server::{AppState, create_router};
use serde_json::Value;
use std::net::TcpListener;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// Raw admin token whose hash is `AdminConfig::for_testing()`.
#[allow(dead_code)]
pub const ADMIN_TOKEN: &str = "test-admin-token";

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a test server with open management routes.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server that requires the admin token.
    pub async fn with_admin_token() -> Self {
        Self::with_config(|config| config.admin = AdminConfig::for_testing()).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let mut config = AppConfig::for_testing();
        config.registry = RegistryConfig::Sqlite {
            path: temp_dir.path().join("registry.db"),
            max_connections: 1,
        };
        modifier(&mut config);

        let registry = promhub_registry::from_config(&config.registry)
            .await
            .expect("Failed to create registry");

        let state = AppState::new(config, registry).expect("Failed to create app state");
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying registry.
    pub fn registry(&self) -> Arc<dyn RegistryStore> {
        self.state.registry.clone()
    }

    /// Send a request without credentials.
    pub async fn request(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        json_request(&self.router, method, uri, body, None).await
    }
}

/// Helper to make JSON requests.
#[allow(dead_code)]
pub async fn json_request(
    router: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    auth_token: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = auth_token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }

    let body = match body {
        Some(v) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };

    let request = builder.body(body).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let json: Value = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
    };

    (status, json)
}

/// Whether the sandbox allows binding a loopback port for mock upstreams.
#[allow(dead_code)]
pub fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}
