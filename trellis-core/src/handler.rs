// Handler storage and invocation
//
// Handlers are async closures taking the request `Context` and returning
// `Result<(), Error>`. They write the response through the context; the
// dispatcher reads it back once the handler's future completes.

use crate::{Context, Error, HttpRequest, HttpResponse, HttpStatus};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use trellis_log::{debug, error};

/// Boxed future returned by a type-erased handler.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// A type-erased route handler.
pub type HandlerFn = Arc<dyn Fn(Context) -> BoxFuture<Result<(), Error>> + Send + Sync>;

/// Erase an async closure into a [`HandlerFn`].
pub fn from_fn<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    Arc::new(move |ctx: Context| -> BoxFuture<Result<(), Error>> { Box::pin(f(ctx)) })
}

/// Run `handler` for `request` and turn the outcome into a response.
///
/// On error the status is, in order: the status carried by
/// [`Error::Status`], the status the handler set before failing, or 500.
/// The body is replaced by a JSON error document.
pub async fn invoke(handler: &HandlerFn, request: HttpRequest) -> HttpResponse {
    let method = request.method.clone();
    let path = request.path.clone();
    let ctx = Context::new(request);

    let result = handler(ctx.clone()).await;
    let (response, status_set) = ctx.take_response();

    match result {
        Ok(()) => {
            debug!(target: "trellis::handler", "{method} {path} -> {}", response.status);
            response
        }
        Err(err) => {
            let status = match &err {
                Error::Status { code, .. } => *code,
                _ if status_set => response.status,
                _ => HttpStatus::InternalServerError.code(),
            };
            error!(target: "trellis::handler", "{method} {path} -> {status}: {err}");

            let mut failure = HttpResponse::from_error(status, &err);
            // keep headers the handler set, except the ones describing the old body
            for (name, value) in response.headers {
                if !name.eq_ignore_ascii_case("content-type")
                    && !name.eq_ignore_ascii_case("content-disposition")
                {
                    failure.headers.entry(name).or_insert(value);
                }
            }
            failure
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> HttpRequest {
        HttpRequest::new("GET", "/")
    }

    #[tokio::test]
    async fn test_ok_handler_response_is_returned() {
        let handler = from_fn(|ctx: Context| async move { ctx.send_string("Hello World") });
        let response = invoke(&handler, request()).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body_ref(), b"Hello World");
    }

    #[tokio::test]
    async fn test_error_defaults_to_500() {
        let handler = from_fn(|_ctx: Context| async move {
            Err::<(), _>(Error::NotFound("missing".into()))
        });
        let response = invoke(&handler, request()).await;
        assert_eq!(response.status, 500);
        assert_eq!(response.header("Content-Type"), Some("application/json"));
    }

    #[tokio::test]
    async fn test_preset_status_survives_error() {
        let handler = from_fn(|ctx: Context| async move {
            ctx.status(422).set("X-Trace", "abc");
            Err::<(), _>(Error::Decode("bad payload".into()))
        });
        let response = invoke(&handler, request()).await;
        assert_eq!(response.status, 422);
        assert_eq!(response.header("X-Trace"), Some("abc"));
    }

    #[tokio::test]
    async fn test_status_error_wins() {
        let handler = from_fn(|ctx: Context| async move {
            ctx.status(201);
            Err::<(), _>(Error::status(409, "taken"))
        });
        let response = invoke(&handler, request()).await;
        assert_eq!(response.status, 409);
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["error"], "taken");
    }

    #[tokio::test]
    async fn test_failed_download_drops_disposition() {
        let handler = from_fn(|ctx: Context| async move {
            ctx.set("Content-Disposition", "attachment");
            Err::<(), _>(Error::Internal("boom".into()))
        });
        let response = invoke(&handler, request()).await;
        assert_eq!(response.header("Content-Disposition"), None);
    }
}
