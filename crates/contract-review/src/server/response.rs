//! Response envelope and error mapping.

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::error::Error;

/// Characters left alone by `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Body of every JSON API response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope<T> {
    /// Whether the request succeeded.
    pub success: bool,
    /// Payload of a successful request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Human readable status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Internal error detail, development only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> Envelope<T> {
    /// Successful response carrying `data`.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error: None,
        }
    }

    /// Attach a message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl Envelope<()> {
    /// Successful response with only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
            error: None,
        }
    }

    /// Failed response.
    pub fn failure(message: impl Into<String>, error: Option<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
            error,
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Detail of a failed request, kept on the response for the development
/// error middleware.
#[derive(Debug, Clone)]
pub(crate) struct FailureDetail {
    pub(crate) message: String,
    pub(crate) detail: String,
}

/// An error answered as `{success: false, message}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    detail: Option<String>,
}

impl ApiError {
    /// Error with an explicit status and message.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            detail: None,
        }
    }

    /// 400 with `message`.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// 400 `缺少合同ID`.
    #[must_use]
    pub fn missing_contract_id() -> Self {
        Self::bad_request("缺少合同ID")
    }

    /// 404 `合同不存在`.
    #[must_use]
    pub fn contract_not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "合同不存在")
    }

    /// 404 `规则不存在`.
    #[must_use]
    pub fn rule_not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "规则不存在")
    }

    /// Attach an internal detail.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Response status.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// User facing message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let message = match &err {
            Error::NotFound { entity, .. } => match *entity {
                "contract" => "合同不存在".to_string(),
                "rule" => "规则不存在".to_string(),
                "contract file" => "合同文件内容不存在".to_string(),
                _ => "资源不存在".to_string(),
            },
            Error::InvalidInput(message) => message.clone(),
            Error::UnsupportedFileType { allowed, .. } => format!("仅支持 {allowed} 文件"),
            Error::FileTooLarge { max, .. } => {
                format!("文件大小超过限制（最大 {}）", crate::model::format_file_size(*max as u64))
            }
            Error::FileNameTooLong { max, .. } => format!("文件名过长（最多 {max} 字节）"),
            Error::Conversion(_) | Error::Http(_) => "文档转换失败".to_string(),
            Error::ConverterUnavailable(_) => "文档转换服务不可用".to_string(),
            Error::Csv(_) => "数据格式错误".to_string(),
            _ => "服务器内部错误，请稍后重试".to_string(),
        };

        Self {
            status: err.status_code(),
            message,
            detail: Some(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let logged = self.detail.as_deref().unwrap_or(&self.message);
        if self.status.is_server_error() {
            error!(status = self.status.as_u16(), error = %logged, "Request failed");
        } else if self.status == StatusCode::NOT_FOUND {
            debug!(error = %logged, "Not found");
        } else {
            warn!(status = self.status.as_u16(), error = %logged, "Request rejected");
        }

        let mut response =
            (self.status, Envelope::failure(self.message.clone(), None)).into_response();
        // Only errors with an internal cause have anything extra to show.
        if let Some(detail) = self.detail {
            response.extensions_mut().insert(FailureDetail {
                message: self.message,
                detail,
            });
        }
        response
    }
}

/// Handler result.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Answer for unknown routes.
pub(crate) async fn fallback() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "接口不存在")
}

/// `encodeURIComponent` equivalent for header file names.
pub(crate) fn encode_file_name(name: &str) -> String {
    utf8_percent_encode(name, URI_COMPONENT).to_string()
}

/// File response with a `Content-Disposition` of the given kind.
pub(crate) fn file_response(
    content_type: &str,
    disposition: &str,
    file_name: &str,
    body: impl Into<Body>,
) -> Response {
    let encoded = encode_file_name(file_name);
    let disposition = format!("{disposition}; filename=\"{encoded}\"; filename*=UTF-8''{encoded}");

    let mut response = Response::new(body.into());
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    response
}
