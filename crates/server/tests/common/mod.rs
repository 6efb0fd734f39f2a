//! Common test utilities for driving the status service in-process.
//!
//! The fixture builds the real router over a SQLite file in a temporary
//! directory, so requests go through the same handlers, store and
//! transition checks as in production.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use reprocess_core::config::{Config, DatabaseConfig};
use reprocess_core::service::LocalStatusService;
use reprocess_core::status::SqliteStatusStore;
use reprocess_server::state::AppState;

/// Re-export fixtures for test convenience
pub use reprocess_core::testing::fixtures;

/// Test fixture around an in-process router.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_order_intake() {
///     let fixture = TestFixture::new();
///     let response = fixture.post("/api/v1/orders", fixture.new_order(&[fixtures::LANDSAT_SCENE])).await;
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    pub router: Router,
    /// Direct handle on the service behind the router
    pub service: Arc<LocalStatusService>,
    pub config: Config,
    /// Holds the SQLite file
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

impl TestFixture {
    pub fn new() -> Self {
        let mut settings = BTreeMap::new();
        settings.insert(
            "distribution.cache.home.url".to_string(),
            "http://cache.example.org".to_string(),
        );
        Self::with_settings(settings)
    }

    pub fn with_settings(settings: BTreeMap<String, String>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("status.db");

        let config = Config {
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            settings,
            ..Config::default()
        };

        let store = SqliteStatusStore::new(&db_path).expect("Failed to create status store");
        let service = Arc::new(LocalStatusService::new(
            Arc::new(store),
            config.retention.clone(),
        ));
        service
            .seed_settings(&config.settings)
            .expect("Failed to seed settings");

        let state = Arc::new(AppState::new(config.clone(), Arc::clone(&service)));
        let router = reprocess_server::api::create_router(state);

        Self {
            router,
            service,
            config,
            temp_dir,
        }
    }

    /// Body for `POST /api/v1/orders`.
    pub fn new_order(&self, scenes: &[&str]) -> Value {
        json!({
            "submitter": "ops@example.org",
            "options": { "include_customized_source_data": true },
            "scenes": scenes,
        })
    }

    /// Create an order over HTTP and return its id.
    pub async fn create_order(&self, scenes: &[&str]) -> String {
        let response = self.post("/api/v1/orders", self.new_order(scenes)).await;
        assert_eq!(response.status, StatusCode::CREATED, "body: {}", response.text);
        response.body["id"]
            .as_str()
            .expect("order id")
            .to_string()
    }

    /// Move a scene along one edge over HTTP; returns `updated`.
    pub async fn move_scene(&self, order_id: &str, scene_id: &str, status: &str) -> bool {
        let response = self
            .post(
                &scene_path(order_id, scene_id, "status"),
                json!({ "location": "test-host", "status": status }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "body: {}", response.text);
        response.body["updated"].as_bool().expect("updated flag")
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).into_owned();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body, text }
    }
}

pub fn scene_path(order_id: &str, scene_id: &str, action: &str) -> String {
    format!("/api/v1/orders/{}/scenes/{}/{}", order_id, scene_id, action)
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status, $response.status, $response.text
        );
    };
}
