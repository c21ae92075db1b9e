//! Per-request context
//!
//! A [`Context`] bundles the request accessors (query, headers, cookies, path
//! parameters, body decoding, multipart files) and the response writers
//! (strings, JSON, downloads, saving uploads). Handlers receive one by value;
//! clones share the same request and response so the dispatcher can collect
//! what the handler wrote.

use crate::form::{self, FormFile, MultipartData};
use crate::{Error, HttpRequest, HttpResponse};
use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;

const CONTENT_TYPE: &str = "Content-Type";
const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
const MULTIPART_FORM: &str = "multipart/form-data";

#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    request: HttpRequest,
    body: Bytes,
    response: Mutex<ResponseSlot>,
    multipart: OnceCell<MultipartData>,
}

#[derive(Default)]
struct ResponseSlot {
    response: HttpResponse,
    status_set: bool,
}

impl Context {
    pub fn new(mut request: HttpRequest) -> Self {
        let body = Bytes::from(std::mem::take(&mut request.body));
        Self {
            inner: Arc::new(Inner {
                request,
                body,
                response: Mutex::new(ResponseSlot::default()),
                multipart: OnceCell::new(),
            }),
        }
    }

    /// The request this context wraps. Its `body` has been moved into the
    /// context; use [`Context::body`].
    pub fn request(&self) -> &HttpRequest {
        &self.inner.request
    }

    pub fn method(&self) -> &str {
        &self.inner.request.method
    }

    pub fn path(&self) -> &str {
        &self.inner.request.path
    }

    /// Query string value, or `default` when the key is absent or empty.
    pub fn query(&self, name: &str, default: &str) -> String {
        self.inner
            .request
            .query(name)
            .filter(|value| !value.is_empty())
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    pub fn queries(&self) -> &HashMap<String, String> {
        &self.inner.request.query_params
    }

    /// Raw header value, empty when absent.
    pub fn header(&self, name: &str) -> String {
        self.inner
            .request
            .header(name)
            .unwrap_or_default()
            .to_string()
    }

    /// Cookie value, empty when absent.
    pub fn cookie(&self, name: &str) -> String {
        self.inner
            .request
            .cookie(name)
            .unwrap_or_default()
            .to_string()
    }

    /// Path capture for `:name`, empty when the route has no such parameter.
    pub fn param(&self, name: &str) -> String {
        self.inner
            .request
            .param(name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.inner.request.path_params
    }

    pub fn body(&self) -> Bytes {
        self.inner.body.clone()
    }

    /// Form field from a URL-encoded or multipart body. Empty when the field
    /// is absent or the body is not a form.
    pub async fn form_value(&self, name: &str) -> String {
        match self.inner.request.media_type().as_deref() {
            Some(FORM_URLENCODED) => form::parse_form_map(&self.inner.body)
                .ok()
                .and_then(|mut fields| fields.remove(name))
                .unwrap_or_default(),
            Some(MULTIPART_FORM) => self
                .multipart()
                .await
                .ok()
                .and_then(|data| data.field(name).map(str::to_string))
                .unwrap_or_default(),
            _ => String::new(),
        }
    }

    /// Decode the body into `T`, choosing the decoder from the content type:
    /// JSON (`application/json` or any `+json` type), URL-encoded forms and
    /// the text fields of multipart forms.
    pub async fn body_parse<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let media_type = self
            .inner
            .request
            .media_type()
            .ok_or_else(|| Error::Decode("missing Content-Type".to_string()))?;

        match media_type.as_str() {
            m if m == "application/json" || m.ends_with("+json") => {
                serde_json::from_slice(&self.inner.body)
                    .map_err(|e| Error::Decode(format!("Failed to parse JSON body: {}", e)))
            }
            FORM_URLENCODED => form::parse_form(&self.inner.body),
            MULTIPART_FORM => form::decode_fields(&self.multipart().await?.fields),
            other => Err(Error::Decode(format!("unsupported Content-Type: {other}"))),
        }
    }

    /// Uploaded file sent under the multipart field `name`.
    pub async fn form_file(&self, name: &str) -> Result<FormFile, Error> {
        self.multipart()
            .await?
            .file(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no uploaded file in field '{name}'")))
    }

    /// Parsed multipart body, cached after the first successful parse.
    pub async fn multipart(&self) -> Result<&MultipartData, Error> {
        if self.inner.request.media_type().as_deref() != Some(MULTIPART_FORM) {
            return Err(Error::Decode(format!(
                "expected {MULTIPART_FORM} body, got {}",
                self.inner.request.header("content-type").unwrap_or("none")
            )));
        }

        let content_type = self
            .inner
            .request
            .header("content-type")
            .unwrap_or_default()
            .to_string();
        let body = self.inner.body.clone();

        self.inner
            .multipart
            .get_or_try_init(|| async move { form::parse_multipart(&content_type, body).await })
            .await
    }

    /// Set the response status. A status set here is kept even if the
    /// handler fails afterwards.
    pub fn status(&self, code: u16) -> &Self {
        let mut slot = self.inner.response.lock();
        slot.response.status = code;
        slot.status_set = true;
        self
    }

    /// Set a response header.
    pub fn set(&self, name: &str, value: impl Into<String>) -> &Self {
        self.inner.response.lock().response.set_header(name, value);
        self
    }

    /// Respond with a text body.
    pub fn send_string(&self, body: impl Into<String>) -> Result<(), Error> {
        self.write_body(body.into().into_bytes(), TEXT_PLAIN);
        Ok(())
    }

    /// Respond with raw bytes.
    pub fn send(&self, body: impl Into<Vec<u8>>) -> Result<(), Error> {
        self.write_body(body.into(), "application/octet-stream");
        Ok(())
    }

    /// Respond with `value` serialized as JSON.
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), Error> {
        let body =
            serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))?;
        let mut slot = self.inner.response.lock();
        slot.response.body = body;
        slot.response.set_header(CONTENT_TYPE, "application/json");
        Ok(())
    }

    /// Respond with the file at `path` as an attachment named `filename`
    /// (the file name of `path` when `filename` is empty).
    pub async fn download(&self, path: impl AsRef<Path>, filename: &str) -> Result<(), Error> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(format!("file {} does not exist", path.display()))
            } else {
                Error::Io(e)
            }
        })?;

        let filename = if filename.is_empty() {
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        } else {
            filename.to_string()
        };
        let content_type = mime_guess::from_path(&filename)
            .first_or_octet_stream()
            .to_string();

        let mut slot = self.inner.response.lock();
        slot.response.body = data;
        slot.response.set_header(CONTENT_TYPE, content_type);
        slot.response.set_header(
            "Content-Disposition",
            format!("attachment; filename=\"{}\"", filename.replace('"', "\\\"")),
        );
        Ok(())
    }

    /// Write an uploaded file to `dest`. Parent directories are not created.
    pub async fn save_file(&self, file: &FormFile, dest: impl AsRef<Path>) -> Result<(), Error> {
        file.save_to(dest).await
    }

    fn write_body(&self, body: Vec<u8>, default_type: &str) {
        let mut slot = self.inner.response.lock();
        slot.response.body = body;
        if slot.response.header(CONTENT_TYPE).is_none() {
            slot.response.set_header(CONTENT_TYPE, default_type);
        }
    }

    /// Take the response written so far, and whether a status was set.
    pub(crate) fn take_response(&self) -> (HttpResponse, bool) {
        let mut slot = self.inner.response.lock();
        let slot = std::mem::take(&mut *slot);
        (slot.response, slot.status_set)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("method", &self.inner.request.method)
            .field("path", &self.inner.request.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct RegisterRequest {
        username: String,
        password: String,
        name: String,
    }

    fn ctx(request: HttpRequest) -> Context {
        Context::new(request)
    }

    #[test]
    fn test_accessors_default_to_empty() {
        let mut request = HttpRequest::new("GET", "/users/ibra")
            .with_header("firstname", "Ibra")
            .with_header("Cookie", "lastname=Alfathar");
        request.path_params.insert("userId".into(), "ibra".into());
        request.query_params.insert("name".into(), "Ibra".into());
        let ctx = ctx(request);

        assert_eq!(ctx.query("name", "Guest"), "Ibra");
        assert_eq!(ctx.query("missing", "Guest"), "Guest");
        assert_eq!(ctx.header("FirstName"), "Ibra");
        assert_eq!(ctx.header("lastname"), "");
        assert_eq!(ctx.cookie("lastname"), "Alfathar");
        assert_eq!(ctx.cookie("firstname"), "");
        assert_eq!(ctx.param("userId"), "ibra");
        assert_eq!(ctx.param("orderId"), "");
    }

    #[tokio::test]
    async fn test_form_value_urlencoded() {
        let ctx = ctx(HttpRequest::new("POST", "/hello")
            .with_header("Content-Type", FORM_URLENCODED)
            .with_body(b"name=Ibra".to_vec()));
        assert_eq!(ctx.form_value("name").await, "Ibra");
        assert_eq!(ctx.form_value("other").await, "");
    }

    #[tokio::test]
    async fn test_form_value_without_form_body() {
        let ctx = ctx(HttpRequest::new("POST", "/hello")
            .with_header("Content-Type", "application/json")
            .with_body(b"{\"name\":\"Ibra\"}".to_vec()));
        assert_eq!(ctx.form_value("name").await, "");
    }

    #[tokio::test]
    async fn test_body_parse_json_and_form() {
        let json = ctx(HttpRequest::new("POST", "/register")
            .with_header("Content-Type", "application/json; charset=utf-8")
            .with_body(br#"{"username" : "Ibra", "password" : "test123", "name" : "ibra"}"#.to_vec()));
        let parsed: RegisterRequest = json.body_parse().await.unwrap();
        assert_eq!(parsed.username, "Ibra");
        assert_eq!(parsed.password, "test123");

        let form = ctx(HttpRequest::new("POST", "/register")
            .with_header("Content-Type", FORM_URLENCODED)
            .with_body(b"username=Ibra&password=rahasia&name=ibra".to_vec()));
        let parsed: RegisterRequest = form.body_parse().await.unwrap();
        assert_eq!(parsed.password, "rahasia");
        assert_eq!(parsed.name, "ibra");
    }

    #[tokio::test]
    async fn test_body_parse_failures_are_decode_errors() {
        let malformed = ctx(HttpRequest::new("POST", "/register")
            .with_header("Content-Type", "application/json")
            .with_body(b"{\"username\":".to_vec()));
        let err = malformed.body_parse::<RegisterRequest>().await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));

        let xml = ctx(HttpRequest::new("POST", "/register")
            .with_header("Content-Type", "application/xml")
            .with_body(b"<user/>".to_vec()));
        let err = xml.body_parse::<RegisterRequest>().await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));

        let untyped = ctx(HttpRequest::new("POST", "/register").with_body(b"{}".to_vec()));
        assert!(untyped.body_parse::<RegisterRequest>().await.is_err());
    }

    #[tokio::test]
    async fn test_form_file_requires_multipart() {
        let ctx = ctx(HttpRequest::new("POST", "/upload")
            .with_header("Content-Type", FORM_URLENCODED)
            .with_body(b"file=x".to_vec()));
        assert!(matches!(ctx.form_file("file").await, Err(Error::Decode(_))));
    }

    #[tokio::test]
    async fn test_form_file_missing_field_is_not_found() {
        let body = "--b\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhi\r\n--b--\r\n";
        let ctx = ctx(HttpRequest::new("POST", "/upload")
            .with_header("Content-Type", "multipart/form-data; boundary=b")
            .with_body(body.as_bytes().to_vec()));

        assert!(matches!(ctx.form_file("file").await, Err(Error::NotFound(_))));
        assert_eq!(ctx.form_value("note").await, "hi");
    }

    #[tokio::test]
    async fn test_form_file_with_empty_filename_is_not_found() {
        let body = "--b\r\nContent-Disposition: form-data; name=\"file\"; filename=\"\"\r\n\
                    Content-Type: application/octet-stream\r\n\r\n\r\n--b--\r\n";
        let ctx = ctx(HttpRequest::new("POST", "/upload")
            .with_header("Content-Type", "multipart/form-data; boundary=b")
            .with_body(body.as_bytes().to_vec()));

        assert!(matches!(ctx.form_file("file").await, Err(Error::NotFound(_))));
        assert_eq!(ctx.form_value("file").await, "");
    }

    #[tokio::test]
    async fn test_empty_query_value_uses_default() {
        let mut request = HttpRequest::new("GET", "/hello");
        request.query_params.insert("name".into(), String::new());
        let ctx = ctx(request);

        assert_eq!(ctx.query("name", "Guest"), "Guest");
        assert_eq!(ctx.query("missing", "Guest"), "Guest");
    }

    #[test]
    fn test_send_string_keeps_preset_status() {
        let ctx = ctx(HttpRequest::new("GET", "/"));
        ctx.status(201).send_string("made").unwrap();
        let (response, status_set) = ctx.take_response();
        assert!(status_set);
        assert_eq!(response.status, 201);
        assert_eq!(response.header("content-type"), Some(TEXT_PLAIN));
        assert_eq!(response.body_ref(), b"made");
    }

    #[test]
    fn test_json_response() {
        let ctx = ctx(HttpRequest::new("GET", "/user"));
        ctx.json(&serde_json::json!({"username": "ibra", "name": "ibra alfathar"}))
            .unwrap();
        let (response, status_set) = ctx.take_response();
        assert!(!status_set);
        assert_eq!(response.status, 200);
        assert_eq!(response.header("Content-Type"), Some("application/json"));
        assert_eq!(
            String::from_utf8(response.body).unwrap(),
            r#"{"name":"ibra alfathar","username":"ibra"}"#
        );
    }

    #[tokio::test]
    async fn test_download_sets_attachment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contoh.txt");
        std::fs::write(&path, "sample file for upload").unwrap();

        let ctx = ctx(HttpRequest::new("GET", "/download"));
        ctx.download(&path, "").await.unwrap();
        let (response, _) = ctx.take_response();
        assert_eq!(
            response.header("Content-Disposition"),
            Some("attachment; filename=\"contoh.txt\"")
        );
        assert_eq!(response.header("Content-Type"), Some("text/plain"));
        assert_eq!(response.body_ref(), b"sample file for upload");
    }

    #[tokio::test]
    async fn test_download_missing_file() {
        let ctx = ctx(HttpRequest::new("GET", "/download"));
        let err = ctx.download("./does/not/exist.txt", "x.txt").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
