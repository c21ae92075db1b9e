// HTTP listener feeding the router

use crate::{Error, HttpRequest, HttpResponse, Router};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, body::Incoming as IncomingBody};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use trellis_log::{debug, error, info, warn};

/// Default cap on buffered request bodies (4 MiB).
pub const DEFAULT_BODY_LIMIT: usize = 4 * 1024 * 1024;

/// A frozen router plus the settings needed to serve it over HTTP/1.
pub struct Application {
    router: Arc<Router>,
    body_limit: usize,
}

impl Application {
    pub fn new(router: Router) -> Self {
        Self {
            router: Arc::new(router),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    /// Reject bodies larger than `bytes` with 413.
    pub fn with_body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    pub fn router(&self) -> Arc<Router> {
        Arc::clone(&self.router)
    }

    pub fn body_limit(&self) -> usize {
        self.body_limit
    }

    /// Bind `addr` and serve until the process exits.
    pub async fn listen(self, addr: SocketAddr) -> Result<(), Error> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, std::future::pending::<()>()).await
    }

    /// Serve connections from `listener` until `shutdown` resolves.
    /// Connections already accepted run to completion on their own tasks.
    pub async fn serve<S>(self, listener: TcpListener, shutdown: S) -> Result<(), Error>
    where
        S: Future<Output = ()>,
    {
        trellis_log::init();
        let addr = listener.local_addr()?;
        info!(target: "trellis::server", "listening on http://{addr}");

        tokio::pin!(shutdown);

        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(target: "trellis::server", "accept failed: {e}");
                        continue;
                    }
                },
                _ = &mut shutdown => {
                    info!(target: "trellis::server", "shutting down listener on {addr}");
                    return Ok(());
                }
            };

            let io = TokioIo::new(stream);
            let router = Arc::clone(&self.router);
            let body_limit = self.body_limit;

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<IncomingBody>| {
                    let router = Arc::clone(&router);
                    async move { Ok::<_, Infallible>(handle_request(req, router, body_limit).await) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(target: "trellis::server", "connection from {peer} ended: {err}");
                }
            });
        }
    }
}

/// Convert a hyper request, dispatch it, and convert the response back.
async fn handle_request(
    req: Request<IncomingBody>,
    router: Arc<Router>,
    body_limit: usize,
) -> Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();
    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    let mut request = HttpRequest::new(parts.method.as_str(), target);
    for (name, value) in &parts.headers {
        match value.to_str() {
            Ok(value) => request.insert_header(name.as_str(), value),
            Err(_) => debug!(target: "trellis::server", "dropping non-ASCII header {name}"),
        }
    }

    let response = match Limited::new(body, body_limit).collect().await {
        Ok(collected) => {
            request.body = collected.to_bytes().to_vec();
            router.handle(request).await
        }
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
            let err = Error::PayloadTooLarge(format!("body exceeds {body_limit} bytes"));
            warn!(target: "trellis::server", "{} {}: {err}", request.method, request.path);
            HttpResponse::from_error(err.status_code(), &err)
        }
        Err(err) => {
            let err = Error::status(400, format!("failed to read request body: {err}"));
            HttpResponse::from_error(400, &err)
        }
    };

    into_hyper_response(response)
}

fn into_hyper_response(response: HttpResponse) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(response.status);
    for (name, value) in &response.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    builder
        .body(Full::new(Bytes::from(response.body)))
        .unwrap_or_else(|e| {
            error!(target: "trellis::server", "failed to build response: {e}");
            let mut fallback = Response::new(Full::new(Bytes::new()));
            *fallback.status_mut() = hyper::StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}
