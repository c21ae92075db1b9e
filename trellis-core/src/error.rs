// Error types for the Trellis request layer

use crate::HttpStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A file or form part the handler asked for does not exist.
    #[error("Not Found: {0}")]
    NotFound(String),

    /// The request body could not be decoded into the requested shape.
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    /// Error that carries the status it should be answered with.
    #[error("{message}")]
    Status { code: u16, message: String },

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl Error {
    /// Build an error that is answered with `code` instead of 500.
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Error::Status {
            code,
            message: message.into(),
        }
    }

    /// Status used when this error escapes to the client.
    ///
    /// Errors returned by handlers are answered with 500 regardless of this
    /// mapping (see [`crate::handler::invoke`]); only router-level errors and
    /// [`Error::Status`] carry their own code.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::RouteNotFound(_) => HttpStatus::NotFound.code(),
            Error::MethodNotAllowed(_) => HttpStatus::MethodNotAllowed.code(),
            Error::PayloadTooLarge(_) => HttpStatus::PayloadTooLarge.code(),
            Error::Status { code, .. } => *code,
            _ => HttpStatus::InternalServerError.code(),
        }
    }

    pub fn http_status(&self) -> HttpStatus {
        HttpStatus::from_code(self.status_code()).unwrap_or(HttpStatus::InternalServerError)
    }

    pub fn is_client_error(&self) -> bool {
        self.http_status().is_client_error()
    }

    pub fn is_server_error(&self) -> bool {
        self.http_status().is_server_error()
    }
}
