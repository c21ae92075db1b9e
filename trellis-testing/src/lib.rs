//! Testing utilities for Trellis routers.
//!
//! [`TestClient`] drives a [`Router`] in-process, through the same dispatch
//! and error policy the HTTP listener uses, without opening a socket.
//!
//! ```no_run
//! use std::sync::Arc;
//! use trellis_core::{Context, Router};
//! use trellis_testing::{TestClient, TestRequest};
//!
//! # async fn example() {
//! let mut router = Router::new();
//! router.get("/hello", |ctx: Context| async move {
//!     let name = ctx.query("name", "Guest");
//!     ctx.send_string(format!("Hello {name}"))
//! });
//!
//! let client = TestClient::new(Arc::new(router));
//! let response = client.send(TestRequest::get("/hello").query("name", "Ibra")).await;
//! response.assert_status(200);
//! assert_eq!(response.body_string(), "Hello Ibra");
//! # }
//! ```

mod request;

pub use request::TestRequest;

use std::sync::Arc;
use trellis_core::{HttpResponse, Router};

/// Test HTTP client for making requests to a router
pub struct TestClient {
    router: Arc<Router>,
}

impl TestClient {
    pub fn new(router: Arc<Router>) -> Self {
        Self { router }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.send(TestRequest::get(path)).await
    }

    pub async fn post(&self, path: &str, body: impl Into<Vec<u8>>) -> TestResponse {
        self.send(TestRequest::post(path).body(body)).await
    }

    pub async fn send(&self, request: TestRequest) -> TestResponse {
        TestResponse {
            response: self.router.handle(request.build()).await,
        }
    }
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    response: HttpResponse,
}

impl TestResponse {
    pub fn status(&self) -> u16 {
        self.response.status
    }

    /// Panic unless the status is `expected`, showing the body.
    #[track_caller]
    pub fn assert_status(&self, expected: u16) -> &Self {
        assert_eq!(
            self.response.status,
            expected,
            "unexpected status, body: {}",
            self.body_string()
        );
        self
    }

    pub fn body(&self) -> &[u8] {
        &self.response.body
    }

    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.response.body).into_owned()
    }

    pub fn body_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.response.body)
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.response.header(name)
    }

    pub fn into_inner(self) -> HttpResponse {
        self.response
    }
}
