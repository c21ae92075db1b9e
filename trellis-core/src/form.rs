//! Form processing and multipart support

use crate::Error;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;

/// Parse URL-encoded form data
pub fn parse_form<T: DeserializeOwned>(body: &[u8]) -> Result<T, Error> {
    serde_urlencoded::from_bytes(body)
        .map_err(|e| Error::Decode(format!("Failed to parse form data: {}", e)))
}

/// Parse URL-encoded form data into a HashMap. The first value of a
/// repeated field wins.
pub fn parse_form_map(body: &[u8]) -> Result<HashMap<String, String>, Error> {
    let pairs: Vec<(String, String)> = parse_form(body)?;
    let mut form = HashMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        form.entry(name).or_insert(value);
    }
    Ok(form)
}

/// Decode already-split text fields (for example multipart text parts)
/// into `T` with the same rules as a URL-encoded body.
pub fn decode_fields<T: DeserializeOwned>(fields: &HashMap<String, String>) -> Result<T, Error> {
    let encoded = serde_urlencoded::to_string(fields)
        .map_err(|e| Error::Decode(format!("Failed to encode form fields: {}", e)))?;
    parse_form(encoded.as_bytes())
}

/// Uploaded file data
#[derive(Debug, Clone)]
pub struct FormFile {
    /// Form field the file was sent under
    pub field_name: String,

    /// Client-supplied filename, reduced to its final path component
    pub filename: String,

    /// Content type (MIME type)
    pub content_type: String,

    /// File data
    pub data: Bytes,
}

impl FormFile {
    pub fn new(
        field_name: impl Into<String>,
        filename: &str,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            filename: base_name(filename).to_string(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Extension of the filename, if it has one.
    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.filename)
            .extension()
            .and_then(|ext| ext.to_str())
    }

    /// Write the file contents to `path`. Parent directories must exist.
    pub async fn save_to(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        tokio::fs::write(path, &self.data).await?;
        Ok(())
    }
}

/// Strip any directory part a client put into an upload filename.
fn base_name(filename: &str) -> &str {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
}

/// Parsed `multipart/form-data` body.
#[derive(Debug, Default)]
pub struct MultipartData {
    /// Text fields; the first value of a repeated field wins.
    pub fields: HashMap<String, String>,
    /// File fields; the first file of a repeated field wins.
    pub files: HashMap<String, FormFile>,
}

impl MultipartData {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn file(&self, name: &str) -> Option<&FormFile> {
        self.files.get(name)
    }
}

/// Parse a buffered multipart body. `content_type` is the full header value
/// and must carry the boundary parameter.
pub async fn parse_multipart(content_type: &str, body: Bytes) -> Result<MultipartData, Error> {
    let boundary = multer::parse_boundary(content_type)
        .map_err(|e| Error::Decode(format!("Invalid multipart content type: {}", e)))?;

    let stream = futures_util::stream::once(async move { Ok::<Bytes, std::io::Error>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);
    let mut data = MultipartData::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        // a part with an empty filename carries no file and is read as text
        let filename = field
            .file_name()
            .filter(|filename| !filename.is_empty())
            .map(str::to_string);

        if let Some(filename) = filename {
            let content_type = field
                .content_type()
                .map(|mime| mime.to_string())
                .unwrap_or_else(|| "application/octet-stream".to_string());
            let bytes = field.bytes().await.map_err(multipart_error)?;
            data.files
                .entry(name.clone())
                .or_insert_with(|| FormFile::new(name, &filename, content_type, bytes));
        } else {
            let text = field.text().await.map_err(multipart_error)?;
            data.fields.entry(name).or_insert(text);
        }
    }

    Ok(data)
}

fn multipart_error(err: multer::Error) -> Error {
    Error::Decode(format!("Failed to parse multipart body: {}", err))
}
