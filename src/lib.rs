// Trellis - a small async HTTP layer
//
// Routes map (method, pattern) pairs to async handlers that read the request
// and write the response through a shared `Context`.

// Re-export core functionality
pub use trellis_core::*;

// Logging macros and configuration
pub use trellis_log;

// Re-export optional crates
#[cfg(feature = "config")]
pub use trellis_config;

#[cfg(feature = "testing")]
pub use trellis_testing;

/// Prelude for common imports
pub mod prelude {
    pub use trellis_core::{Application, Context, Error, HttpMethod, HttpRequest, HttpResponse, Router};

    #[cfg(feature = "config")]
    pub use trellis_config::ServerConfig;

    #[cfg(feature = "testing")]
    pub use trellis_testing::{TestClient, TestRequest};
}
