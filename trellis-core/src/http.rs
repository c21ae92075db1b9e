// HTTP request and response types

use serde::Serialize;
use std::collections::HashMap;

/// HTTP methods a route can be registered for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    HEAD,
    OPTIONS,
}

impl HttpMethod {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Some(HttpMethod::GET),
            "POST" => Some(HttpMethod::POST),
            "PUT" => Some(HttpMethod::PUT),
            "DELETE" => Some(HttpMethod::DELETE),
            "PATCH" => Some(HttpMethod::PATCH),
            "HEAD" => Some(HttpMethod::HEAD),
            "OPTIONS" => Some(HttpMethod::OPTIONS),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::HEAD => "HEAD",
            HttpMethod::OPTIONS => "OPTIONS",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An incoming request, fully buffered.
///
/// `path` may still carry its query string when the request is built by
/// hand; the router splits it off and fills `query_params` before dispatch.
/// Header names are stored lowercased.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub path_params: HashMap<String, String>,
    pub query_params: HashMap<String, String>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: HashMap::new(),
            body: Vec::new(),
            path_params: HashMap::new(),
            query_params: HashMap::new(),
        }
    }

    /// Add a header. Repeated `Cookie` headers are folded with `; `, other
    /// repeated headers with `, `.
    pub fn insert_header(&mut self, name: &str, value: impl Into<String>) {
        let name = name.to_ascii_lowercase();
        let value = value.into();
        let separator = if name == "cookie" { "; " } else { ", " };

        self.headers
            .entry(name)
            .and_modify(|existing| {
                existing.push_str(separator);
                existing.push_str(&value);
            })
            .or_insert(value);
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert_header(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Media type of the body without parameters, lowercased
    /// (`multipart/form-data; boundary=x` gives `multipart/form-data`).
    pub fn media_type(&self) -> Option<String> {
        self.header("content-type").map(|value| {
            value
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
    }

    /// Cookies sent in the `Cookie` header, in the order they appear.
    pub fn cookies(&self) -> Vec<(&str, &str)> {
        let Some(raw) = self.header("cookie") else {
            return Vec::new();
        };

        raw.split(';')
            .filter_map(|pair| {
                let (name, value) = pair.split_once('=')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                let value = value.trim();
                let value = value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .unwrap_or(value);
                Some((name, value))
            })
            .collect()
    }

    /// First cookie with the given name.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies()
            .into_iter()
            .find(|(cookie_name, _)| *cookie_name == name)
            .map(|(_, value)| value)
    }

    pub fn param(&self, name: &str) -> Option<&String> {
        self.path_params.get(name)
    }

    pub fn query(&self, name: &str) -> Option<&String> {
        self.query_params.get(name)
    }
}

/// Response produced by a handler, before it is written to the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::ok()
    }
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn not_found() -> Self {
        Self::new(404)
    }

    pub fn internal_server_error() -> Self {
        Self::new(500)
    }

    /// Set a header, replacing any existing header with the same name
    /// regardless of case.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|key, _| !key.eq_ignore_ascii_case(name));
        self.headers.insert(name.to_string(), value.into());
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_json<T: Serialize>(mut self, value: &T) -> Result<Self, crate::Error> {
        self.body =
            serde_json::to_vec(value).map_err(|e| crate::Error::Serialization(e.to_string()))?;
        self.set_header("Content-Type", "application/json");
        Ok(self)
    }

    /// JSON failure document written when a request ends in an error.
    pub fn from_error(status: u16, err: &crate::Error) -> Self {
        let body = serde_json::json!({
            "error": err.to_string(),
            "status": status,
        });
        Self::new(status)
            .with_json(&body)
            .unwrap_or_else(|_| Self::new(status))
    }

    pub fn body_ref(&self) -> &[u8] {
        &self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse() {
        assert_eq!(HttpMethod::from_str("post"), Some(HttpMethod::POST));
        assert_eq!(HttpMethod::from_str("BREW"), None);
        assert_eq!(HttpMethod::DELETE.to_string(), "DELETE");
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let req = HttpRequest::new("GET", "/request").with_header("FirstName", "Ibra");
        assert_eq!(req.header("firstname"), Some("Ibra"));
        assert_eq!(req.header("FIRSTNAME"), Some("Ibra"));
        assert_eq!(req.header("lastname"), None);
    }

    #[test]
    fn test_repeated_headers_fold() {
        let req = HttpRequest::new("GET", "/")
            .with_header("Accept", "text/html")
            .with_header("accept", "application/json")
            .with_header("Cookie", "a=1")
            .with_header("Cookie", "b=2");
        assert_eq!(req.header("accept"), Some("text/html, application/json"));
        assert_eq!(req.cookie("a"), Some("1"));
        assert_eq!(req.cookie("b"), Some("2"));
    }

    #[test]
    fn test_cookie_parsing() {
        let req = HttpRequest::new("GET", "/")
            .with_header("Cookie", "lastname=Alfathar; theme=\"dark\"; =bogus; flag");
        assert_eq!(req.cookie("lastname"), Some("Alfathar"));
        assert_eq!(req.cookie("theme"), Some("dark"));
        assert_eq!(req.cookie("flag"), None);
        assert_eq!(req.cookies().len(), 2);
    }

    #[test]
    fn test_media_type_strips_parameters() {
        let req = HttpRequest::new("POST", "/upload")
            .with_header("Content-Type", "Multipart/Form-Data; boundary=abc");
        assert_eq!(req.media_type().as_deref(), Some("multipart/form-data"));
        assert_eq!(HttpRequest::new("GET", "/").media_type(), None);
    }

    #[test]
    fn test_response_set_header_replaces() {
        let mut res = HttpResponse::ok().with_header("content-type", "text/html");
        res.set_header("Content-Type", "text/plain");
        assert_eq!(res.headers.len(), 1);
        assert_eq!(res.header("CONTENT-TYPE"), Some("text/plain"));
    }

    #[test]
    fn test_error_document() {
        let res = HttpResponse::from_error(500, &crate::Error::Decode("bad".into()));
        assert_eq!(res.status, 500);
        let body: serde_json::Value = serde_json::from_slice(&res.body).unwrap();
        assert_eq!(body["status"], 500);
        assert_eq!(body["error"], "Decode error: bad");
    }
}
