//! `multipart/form-data` parts and encoding.

use std::path::Path;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Content of a single part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartValue {
    Text(String),
    File {
        filename: String,
        content_type: String,
        data: Bytes,
    },
}

/// One named part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    name: String,
    value: PartValue,
}

impl Part {
    /// Text part.
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        let name = name.into();
        check_name(&name)?;
        Ok(Self {
            name,
            value: PartValue::Text(value.into()),
        })
    }

    /// Binary part with an explicit filename and content type.
    pub fn file(
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Result<Self> {
        let name = name.into();
        check_name(&name)?;
        let filename = filename.into();
        if filename.is_empty() {
            return Err(Error::invalid_part(format!(
                "file part {:?} has no filename",
                name
            )));
        }
        Ok(Self {
            name,
            value: PartValue::File {
                filename,
                content_type: content_type.into(),
                data: data.into(),
            },
        })
    }

    /// Binary part read from disk; filename and content type come from the path.
    pub fn from_path(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .and_then(|f| f.to_str())
            .ok_or_else(|| {
                Error::invalid_part(format!("path {} has no file name", path.display()))
            })?
            .to_string();
        let data = std::fs::read(path)?;
        Self::file(name, filename.clone(), guess_content_type(&filename), data)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &PartValue {
        &self.value
    }

    pub fn filename(&self) -> Option<&str> {
        match &self.value {
            PartValue::File { filename, .. } => Some(filename),
            PartValue::Text(_) => None,
        }
    }

    fn content(&self) -> &[u8] {
        match &self.value {
            PartValue::Text(text) => text.as_bytes(),
            PartValue::File { data, .. } => data,
        }
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_part("part field name is empty"));
    }
    if name.contains(['"', '\r', '\n']) {
        return Err(Error::invalid_part(format!(
            "part field name {:?} contains a quote or line break",
            name
        )));
    }
    Ok(())
}

/// Guess a content type from a file extension.
pub fn guess_content_type(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

/// Generate a boundary that does not occur in any part's content.
pub fn generate_boundary(parts: &[Part]) -> Result<String> {
    loop {
        let mut raw = [0u8; 16];
        getrandom::fill(&mut raw)
            .map_err(|e| Error::Io(std::io::Error::other(format!("RNG error: {}", e))))?;
        let boundary = format!("------------------------{}", hex::encode(raw));
        if boundary_is_free(&boundary, parts) {
            return Ok(boundary);
        }
    }
}

fn boundary_is_free(boundary: &str, parts: &[Part]) -> bool {
    let needle = boundary.as_bytes();
    parts.iter().all(|p| {
        let fields = [
            p.name.as_bytes(),
            p.filename().unwrap_or("").as_bytes(),
            p.content(),
        ];
        fields
            .iter()
            .all(|hay| !hay.windows(needle.len()).any(|w| w == needle))
    })
}

/// Encode parts with the given boundary.
///
/// Returns the body bytes; the matching content type is
/// `multipart/form-data; boundary=<boundary>`.
pub fn encode(parts: &[Part], boundary: &str) -> Bytes {
    let mut out = BytesMut::new();
    for part in parts {
        out.put_slice(b"--");
        out.put_slice(boundary.as_bytes());
        out.put_slice(b"\r\n");
        match &part.value {
            PartValue::Text(text) => {
                out.put_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                        part.name
                    )
                    .as_bytes(),
                );
                out.put_slice(text.as_bytes());
            }
            PartValue::File {
                filename,
                content_type,
                data,
            } => {
                out.put_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        part.name,
                        escape_quoted(filename)
                    )
                    .as_bytes(),
                );
                out.put_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
                out.put_slice(data);
            }
        }
        out.put_slice(b"\r\n");
    }
    out.put_slice(b"--");
    out.put_slice(boundary.as_bytes());
    out.put_slice(b"--\r\n");
    out.freeze()
}

fn escape_quoted(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Content type header value for a boundary.
pub fn content_type(boundary: &str) -> String {
    format!("multipart/form-data; boundary={}", boundary)
}
