// Route table and request dispatch

use crate::handler::{self, HandlerFn};
use crate::{Context, Error, HttpMethod, HttpRequest, HttpResponse};
use std::collections::HashMap;
use std::future::Future;
use trellis_log::{debug, warn};

/// One segment of a route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(String),
}

/// Split a pattern such as `/users/:userId/orders/:orderId` into segments.
/// Empty segments (leading, trailing or doubled slashes) are dropped.
pub fn parse_pattern(pattern: &str) -> Vec<Segment> {
    pattern
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| match s.strip_prefix(':') {
            Some(name) => Segment::Param(name.to_string()),
            None => Segment::Literal(s.to_string()),
        })
        .collect()
}

/// Route definition with handler
#[derive(Clone)]
pub struct Route {
    pub method: HttpMethod,
    pub path: String,
    segments: Vec<Segment>,
    handler: HandlerFn,
}

impl Route {
    pub fn new<F, Fut>(method: HttpMethod, path: &str, handler: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        Self {
            method,
            path: path.to_string(),
            segments: parse_pattern(path),
            handler: handler::from_fn(handler),
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Parameter names in the order they appear in the pattern.
    pub fn param_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Param(name) => Some(name.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Match against a request path, returning the captured parameters.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        match_segments(&self.segments, path)
    }

    pub(crate) fn handler(&self) -> &HandlerFn {
        &self.handler
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .finish()
    }
}

/// Outcome of looking a request up in the route table.
#[derive(Debug)]
pub enum RouteMatch<'a> {
    Found {
        route: &'a Route,
        params: HashMap<String, String>,
    },
    /// The path is registered, but only for these methods.
    MethodNotAllowed(Vec<HttpMethod>),
    NotFound,
}

/// Route table. Build it once, then share it read-only behind an `Arc`.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    pub fn add_route(&mut self, route: Route) {
        debug!(target: "trellis::router", "registered {} {}", route.method, route.path);
        self.routes.push(route);
    }

    /// Register a handler for `method` and `pattern`.
    pub fn on<F, Fut>(&mut self, method: HttpMethod, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.add_route(Route::new(method, pattern, handler));
        self
    }

    pub fn get<F, Fut>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.on(HttpMethod::GET, pattern, handler)
    }

    pub fn post<F, Fut>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.on(HttpMethod::POST, pattern, handler)
    }

    pub fn put<F, Fut>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.on(HttpMethod::PUT, pattern, handler)
    }

    pub fn patch<F, Fut>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.on(HttpMethod::PATCH, pattern, handler)
    }

    pub fn delete<F, Fut>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.on(HttpMethod::DELETE, pattern, handler)
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Look up `method` and `path` (without query string). The first route
    /// registered for the method whose pattern matches wins.
    pub fn find(&self, method: &str, path: &str) -> RouteMatch<'_> {
        let mut allowed = Vec::new();

        for route in &self.routes {
            let Some(params) = route.matches(path) else {
                continue;
            };

            if route.method.as_str().eq_ignore_ascii_case(method) {
                return RouteMatch::Found { route, params };
            }

            if !allowed.contains(&route.method) {
                allowed.push(route.method);
            }
        }

        if allowed.is_empty() {
            RouteMatch::NotFound
        } else {
            RouteMatch::MethodNotAllowed(allowed)
        }
    }

    /// Dispatch a request. Handler failures are already turned into a
    /// response; only router-level failures come back as `Err`.
    pub async fn route(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        self.dispatch(request).await.map_err(|rejection| rejection.error)
    }

    /// Dispatch a request and always produce a response.
    pub async fn handle(&self, request: HttpRequest) -> HttpResponse {
        let method = request.method.clone();
        let path = request.path.clone();

        match self.dispatch(request).await {
            Ok(response) => response,
            Err(Rejection { error, allow }) => {
                let status = error.status_code();
                warn!(target: "trellis::router", "{method} {path} -> {status}: {error}");
                let mut response = HttpResponse::from_error(status, &error);
                if let Some(allow) = allow {
                    response.set_header("Allow", allow);
                }
                response
            }
        }
    }

    async fn dispatch(&self, mut request: HttpRequest) -> Result<HttpResponse, Rejection> {
        split_query(&mut request);

        match self.find(&request.method, &request.path) {
            RouteMatch::Found { route, params } => {
                debug!(
                    target: "trellis::router",
                    "{} {} matched {}", request.method, request.path, route.path
                );
                request.path_params = params;
                let handler = route.handler().clone();
                Ok(handler::invoke(&handler, request).await)
            }
            RouteMatch::MethodNotAllowed(allowed) => {
                let allow = allowed
                    .iter()
                    .map(HttpMethod::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                Err(Rejection {
                    error: Error::MethodNotAllowed(format!(
                        "{} {} (allow: {allow})",
                        request.method, request.path
                    )),
                    allow: Some(allow),
                })
            }
            RouteMatch::NotFound => Err(Rejection {
                error: Error::RouteNotFound(format!("{} {}", request.method, request.path)),
                allow: None,
            }),
        }
    }
}

/// A router-level failure, with the `Allow` value for 405s.
struct Rejection {
    error: Error,
    allow: Option<String>,
}

/// Move a `?query` suffix out of the path into `query_params`.
fn split_query(request: &mut HttpRequest) {
    if let Some((path, query)) = request.path.split_once('?') {
        let parsed = parse_query_string(query);
        for (key, value) in parsed {
            request.query_params.entry(key).or_insert(value);
        }
        request.path = path.to_string();
    }
}

fn match_segments(segments: &[Segment], path: &str) -> Option<HashMap<String, String>> {
    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if parts.len() != segments.len() {
        return None;
    }

    let mut params = HashMap::new();

    for (segment, part) in segments.iter().zip(parts) {
        match segment {
            Segment::Literal(literal) if literal == part => {}
            Segment::Literal(_) => return None,
            Segment::Param(name) => {
                let value = urlencoding::decode(part)
                    .map(|decoded| decoded.into_owned())
                    .unwrap_or_else(|_| part.to_string());
                params.insert(name.clone(), value);
            }
        }
    }

    Some(params)
}

/// Parse a query string. The first occurrence of a repeated key wins.
pub fn parse_query_string(query: &str) -> HashMap<String, String> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).unwrap_or_default();
    let mut params = HashMap::with_capacity(pairs.len());
    for (key, value) in pairs {
        params.entry(key).or_insert(value);
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_router(routes: &[(HttpMethod, &str)]) -> Router {
        let mut router = Router::new();
        for (method, path) in routes {
            let label = format!("{method} {path}");
            router.on(*method, path, move |ctx: Context| {
                let label = label.clone();
                async move { ctx.send_string(label) }
            });
        }
        router
    }

    #[test]
    fn test_parse_pattern() {
        assert_eq!(
            parse_pattern("/users/:userId/orders/:orderId"),
            vec![
                Segment::Literal("users".into()),
                Segment::Param("userId".into()),
                Segment::Literal("orders".into()),
                Segment::Param("orderId".into()),
            ]
        );
        assert!(parse_pattern("/").is_empty());
    }

    #[test]
    fn test_param_names_in_order() {
        let route = Route::new(HttpMethod::GET, "/a/:first/b/:second", |ctx: Context| async move {
            ctx.send_string("")
        });
        assert_eq!(route.param_names(), vec!["first", "second"]);
    }

    #[test]
    fn test_match_static_and_params() {
        let segments = parse_pattern("/users/:userId/orders/:orderId");
        let params = match_segments(&segments, "/users/ibra/orders/20").unwrap();
        assert_eq!(params.get("userId"), Some(&"ibra".to_string()));
        assert_eq!(params.get("orderId"), Some(&"20".to_string()));

        assert!(match_segments(&segments, "/users/ibra/carts/20").is_none());
        assert!(match_segments(&segments, "/users/ibra/orders").is_none());
    }

    #[test]
    fn test_match_root_and_trailing_slash() {
        assert!(match_segments(&parse_pattern("/"), "/").is_some());
        assert!(match_segments(&parse_pattern("/hello"), "/hello/").is_some());
        assert!(match_segments(&parse_pattern("/"), "/hello").is_none());
    }

    #[test]
    fn test_param_is_percent_decoded() {
        let params = match_segments(&parse_pattern("/files/:name"), "/files/my%20notes.txt").unwrap();
        assert_eq!(params.get("name"), Some(&"my notes.txt".to_string()));
    }

    #[test]
    fn test_query_string_decoding() {
        let params = parse_query_string("name=john+doe&email=test%40example.com&flag");
        assert_eq!(params.get("name"), Some(&"john doe".to_string()));
        assert_eq!(params.get("email"), Some(&"test@example.com".to_string()));
        assert_eq!(params.get("flag"), Some(&String::new()));
    }

    #[test]
    fn test_query_first_value_wins() {
        let params = parse_query_string("tag=rust&tag=web");
        assert_eq!(params.get("tag"), Some(&"rust".to_string()));
    }

    #[test]
    fn test_registration_order_wins() {
        let router = noop_router(&[
            (HttpMethod::GET, "/users/:id"),
            (HttpMethod::GET, "/users/me"),
        ]);
        match router.find("GET", "/users/me") {
            RouteMatch::Found { route, params } => {
                assert_eq!(route.path, "/users/:id");
                assert_eq!(params.get("id"), Some(&"me".to_string()));
            }
            other => panic!("expected a match, got {other:?}"),
        }
    }

    #[test]
    fn test_method_not_allowed_lists_methods() {
        let router = noop_router(&[(HttpMethod::GET, "/hello"), (HttpMethod::POST, "/hello")]);
        match router.find("DELETE", "/hello") {
            RouteMatch::MethodNotAllowed(allowed) => {
                assert_eq!(allowed, vec![HttpMethod::GET, HttpMethod::POST]);
            }
            other => panic!("expected 405, got {other:?}"),
        }
        assert!(matches!(router.find("GET", "/nope"), RouteMatch::NotFound));
    }

    #[tokio::test]
    async fn test_route_dispatches_with_query() {
        let router = noop_router(&[(HttpMethod::GET, "/search")]);
        let response = router
            .route(HttpRequest::new("GET", "/search?q=rust"))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body_ref(), b"GET /search");
    }

    #[tokio::test]
    async fn test_route_not_found_is_err() {
        let router = Router::new();
        let result = router.route(HttpRequest::new("GET", "/missing")).await;
        assert!(matches!(result, Err(Error::RouteNotFound(_))));
    }

    #[tokio::test]
    async fn test_handle_sets_allow_header() {
        let router = noop_router(&[(HttpMethod::POST, "/login")]);
        let response = router.handle(HttpRequest::new("GET", "/login")).await;
        assert_eq!(response.status, 405);
        assert_eq!(response.header("Allow"), Some("POST"));
    }

    #[tokio::test]
    async fn test_handle_allow_header_ignores_query() {
        let router = noop_router(&[(HttpMethod::GET, "/hello"), (HttpMethod::POST, "/hello")]);
        let response = router.handle(HttpRequest::new("PUT", "/hello?name=Ibra")).await;
        assert_eq!(response.status, 405);
        assert_eq!(response.header("Allow"), Some("GET, POST"));

        let response = router.handle(HttpRequest::new("GET", "/nope?x=1")).await;
        assert_eq!(response.status, 404);
        assert!(response.header("Allow").is_none());
    }
}
