// Core library for the Trellis HTTP layer
// Route table, per-request context, handler invocation and response writers.

pub mod application;
pub mod context;
pub mod error;
pub mod form;
pub mod handler;
pub mod http;
pub mod routing;
pub mod status;

// Re-export commonly used types
pub use application::{Application, DEFAULT_BODY_LIMIT};
pub use context::Context;
pub use error::*;
pub use form::{FormFile, MultipartData};
pub use handler::{BoxFuture, HandlerFn};
pub use http::*;
pub use routing::{Route, RouteMatch, Router, Segment};
pub use status::*;
