// Builder for test requests

use serde::Serialize;
use trellis_core::{HttpMethod, HttpRequest};

enum Part {
    Field {
        name: String,
        value: String,
    },
    File {
        name: String,
        filename: String,
        content_type: String,
        data: Vec<u8>,
    },
}

/// Request under construction. Bodies set by `form`, `json` and the
/// multipart helpers also set the matching `Content-Type`.
pub struct TestRequest {
    method: HttpMethod,
    path: String,
    headers: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
    query: Vec<(String, String)>,
    body: Vec<u8>,
    parts: Vec<Part>,
}

impl TestRequest {
    pub fn new(method: HttpMethod, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            headers: Vec::new(),
            cookies: Vec::new(),
            query: Vec::new(),
            body: Vec::new(),
            parts: Vec::new(),
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(HttpMethod::GET, path)
    }

    pub fn post(path: &str) -> Self {
        Self::new(HttpMethod::POST, path)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.push((name.to_string(), value.to_string()));
        self
    }

    pub fn query(mut self, name: &str, value: &str) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// URL-encoded form body.
    pub fn form(self, fields: &[(&str, &str)]) -> Self {
        let encoded = serde_urlencoded::to_string(fields).unwrap_or_default();
        self.header("Content-Type", "application/x-www-form-urlencoded")
            .body(encoded)
    }

    /// JSON body.
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        Ok(self.header("Content-Type", "application/json").body(body))
    }

    /// Add a text part to a multipart body.
    pub fn multipart_field(mut self, name: &str, value: &str) -> Self {
        self.parts.push(Part::Field {
            name: name.to_string(),
            value: value.to_string(),
        });
        self
    }

    /// Add a file part to a multipart body.
    pub fn multipart_file(mut self, name: &str, filename: &str, data: impl Into<Vec<u8>>) -> Self {
        self.parts.push(Part::File {
            name: name.to_string(),
            filename: filename.to_string(),
            content_type: "application/octet-stream".to_string(),
            data: data.into(),
        });
        self
    }

    pub fn build(self) -> HttpRequest {
        let target = if self.query.is_empty() {
            self.path
        } else {
            let query = serde_urlencoded::to_string(&self.query).unwrap_or_default();
            format!("{}?{}", self.path, query)
        };

        let mut request = HttpRequest::new(self.method.as_str(), target);
        for (name, value) in &self.headers {
            request.insert_header(name, value.as_str());
        }
        if !self.cookies.is_empty() {
            let cookie = self
                .cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            request.insert_header("Cookie", cookie);
        }

        if self.parts.is_empty() {
            request.body = self.body;
        } else {
            let boundary = format!("trellis-{}", uuid::Uuid::new_v4().simple());
            request.headers.remove("content-type");
            request.insert_header(
                "Content-Type",
                format!("multipart/form-data; boundary={boundary}"),
            );
            request.body = encode_multipart(&boundary, &self.parts);
        }

        request
    }
}

fn encode_multipart(boundary: &str, parts: &[Part]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        match part {
            Part::Field { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File {
                name,
                filename,
                content_type,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}
