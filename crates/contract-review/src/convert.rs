//! Document to Markdown conversion.
//!
//! Word and PDF files are sent to an external conversion backend over HTTP.
//! Plain-text files never leave the process.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::upload::{extension_of, mime_for};

/// Backend path for Word conversion.
pub const WORD_ENDPOINT: &str = "/api/contracts/convert/word-to-md";

/// Backend path for PDF conversion.
pub const PDF_ENDPOINT: &str = "/api/contracts/convert/pdf-to-md";

/// Kind of an uploaded document, derived from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    /// `.docx`
    Word,
    /// `.pdf`
    Pdf,
    /// `.txt`
    Text,
}

impl DocumentKind {
    /// Every supported kind.
    pub const ALL: [Self; 3] = [Self::Word, Self::Pdf, Self::Text];

    /// The extension including the dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Word => ".docx",
            Self::Pdf => ".pdf",
            Self::Text => ".txt",
        }
    }

    /// Match an extension such as `.PDF` (case-insensitive, dot required).
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<Self> {
        let extension = extension.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.extension() == extension)
    }

    /// Derive the kind from a file name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFileType`] for any other extension.
    pub fn from_file_name(file_name: &str) -> Result<Self> {
        let extension = extension_of(file_name);
        Self::from_extension(&extension).ok_or_else(|| Error::UnsupportedFileType {
            extension,
            allowed: Self::ALL.map(Self::extension).join(", "),
        })
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Word => "Word",
            Self::Pdf => "PDF",
            Self::Text => "text",
        })
    }
}

/// Turns an uploaded document into Markdown.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// Convert `bytes` of the given kind. `file_name` is passed through to
    /// backends that want it.
    async fn to_markdown(
        &self,
        kind: DocumentKind,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<String>;
}

/// Converter backed by the HTTP conversion service.
#[derive(Debug, Clone)]
pub struct RemoteConverter {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ConvertResponse {
    markdown_content: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    detail: String,
}

impl RemoteConverter {
    /// Create a converter for the backend at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// The backend base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post(
        &self,
        endpoint: &str,
        kind: DocumentKind,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<String> {
        let part = reqwest::multipart::Part::bytes(bytes.to_vec())
            .file_name(file_name.to_string())
            .mime_str(mime_for(kind))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let url = format!("{}{endpoint}", self.base_url);
        debug!(url = %url, kind = %kind, size = bytes.len(), "Sending document to converter");

        let response = self.client.post(&url).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|err| err.detail)
                .unwrap_or_else(|_| status.to_string());
            warn!(status = status.as_u16(), detail = %detail, "Converter rejected document");
            return Err(Error::conversion(detail));
        }

        let body: ConvertResponse = response.json().await?;
        Ok(body.markdown_content)
    }
}

#[async_trait]
impl DocumentConverter for RemoteConverter {
    async fn to_markdown(
        &self,
        kind: DocumentKind,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<String> {
        match kind {
            DocumentKind::Word => self.post(WORD_ENDPOINT, kind, file_name, bytes).await,
            DocumentKind::Pdf => self.post(PDF_ENDPOINT, kind, file_name, bytes).await,
            DocumentKind::Text => Ok(decode_text(file_name, bytes)),
        }
    }
}

/// Converter used when no backend is configured. Handles text files only.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextOnlyConverter;

#[async_trait]
impl DocumentConverter for TextOnlyConverter {
    async fn to_markdown(
        &self,
        kind: DocumentKind,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<String> {
        match kind {
            DocumentKind::Text => Ok(decode_text(file_name, bytes)),
            DocumentKind::Word => Err(Error::ConverterUnavailable("Word")),
            DocumentKind::Pdf => Err(Error::ConverterUnavailable("PDF")),
        }
    }
}

/// Decode a text upload as UTF-8, replacing invalid sequences.
#[must_use]
pub fn decode_text(file_name: &str, bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix("\u{feff}".as_bytes()).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(err) => {
            warn!(file = file_name, error = %err, "Text file is not valid UTF-8, decoding lossily");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Multipart;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;

    async fn word_to_md(mut multipart: Multipart) -> impl IntoResponse {
        while let Ok(Some(field)) = multipart.next_field().await {
            if field.name() == Some("file") {
                let name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.unwrap();
                return (
                    StatusCode::OK,
                    Json(json!({
                        "success": true,
                        "markdown_content": format!("# {name}\n\n{} bytes", bytes.len()),
                    })),
                );
            }
        }
        (StatusCode::BAD_REQUEST, Json(json!({ "detail": "missing file" })))
    }

    async fn pdf_to_md() -> impl IntoResponse {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": "PDF转换失败: broken xref" })),
        )
    }

    async fn spawn_backend() -> String {
        let app = Router::new()
            .route(WORD_ENDPOINT, post(word_to_md))
            .route(PDF_ENDPOINT, post(pdf_to_md));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve backend");
        });
        format!("http://{addr}/")
    }

    #[test]
    fn test_kind_from_file_name() {
        assert_eq!(DocumentKind::from_file_name("a.docx").unwrap(), DocumentKind::Word);
        assert_eq!(DocumentKind::from_file_name("B.PDF").unwrap(), DocumentKind::Pdf);
        assert_eq!(DocumentKind::from_file_name("c.d.txt").unwrap(), DocumentKind::Text);

        let err = DocumentKind::from_file_name("old.doc").unwrap_err();
        assert!(matches!(err, Error::UnsupportedFileType { ref extension, .. } if extension == ".doc"));
        assert!(DocumentKind::from_file_name("noext").is_err());
    }

    #[test]
    fn test_decode_text() {
        assert_eq!(decode_text("a.txt", "合同正文".as_bytes()), "合同正文");
        assert_eq!(decode_text("a.txt", "\u{feff}abc".as_bytes()), "abc");
        assert_eq!(decode_text("a.txt", &[b'a', 0xff, b'b']), "a\u{fffd}b");
    }

    #[tokio::test]
    async fn test_text_only_converter() {
        let converter = TextOnlyConverter;
        let md = converter
            .to_markdown(DocumentKind::Text, "a.txt", b"hello")
            .await
            .unwrap();
        assert_eq!(md, "hello");

        let err = converter
            .to_markdown(DocumentKind::Pdf, "a.pdf", b"%PDF")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConverterUnavailable("PDF")));
    }

    #[tokio::test]
    async fn test_remote_converter_word() {
        let base = spawn_backend().await;
        let converter = RemoteConverter::new(&base, Duration::from_secs(5)).unwrap();
        assert!(!converter.base_url().ends_with('/'));

        let md = converter
            .to_markdown(DocumentKind::Word, "合同.docx", b"PK\x03\x04data")
            .await
            .unwrap();
        assert_eq!(md, "# 合同.docx\n\n8 bytes");
    }

    #[tokio::test]
    async fn test_remote_converter_reports_backend_detail() {
        let base = spawn_backend().await;
        let converter = RemoteConverter::new(&base, Duration::from_secs(5)).unwrap();

        let err = converter
            .to_markdown(DocumentKind::Pdf, "a.pdf", b"%PDF-1.7")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conversion(ref detail) if detail.contains("broken xref")));
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_remote_converter_decodes_text_locally() {
        let converter =
            RemoteConverter::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let md = converter
            .to_markdown(DocumentKind::Text, "a.txt", "第一条".as_bytes())
            .await
            .unwrap();
        assert_eq!(md, "第一条");
    }
}
