//! Shared plumbing for the HTTP-backed capabilities.

use std::time::Duration;
use std::{error::Error as StdError, fmt};

use serde_json::Value;
use taskweave_core::api::CapabilityError;

const BODY_PREVIEW_LIMIT: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorKind {
    Timeout,
    Connect,
    Request,
    Body,
    Decode,
    Status,
    Unknown,
}

impl HttpErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Request => "request",
            Self::Body => "body",
            Self::Decode => "decode",
            Self::Status => "status",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for HttpErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct HttpError {
    kind: HttpErrorKind,
    status: Option<u16>,
    url: Option<String>,
    message: String,
    timeout: Option<Duration>,
    source: Option<anyhow::Error>,
}

impl HttpError {
    pub fn kind(&self) -> HttpErrorKind {
        self.kind
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub(crate) fn from_reqwest(err: reqwest::Error, url: String, timeout: Duration) -> Self {
        let kind = if err.is_timeout() {
            HttpErrorKind::Timeout
        } else if err.is_connect() {
            HttpErrorKind::Connect
        } else if err.is_request() {
            HttpErrorKind::Request
        } else if err.is_body() {
            HttpErrorKind::Body
        } else if err.is_decode() {
            HttpErrorKind::Decode
        } else {
            HttpErrorKind::Unknown
        };
        HttpError {
            kind,
            status: err.status().map(|s| s.as_u16()),
            url: Some(url),
            message: err.to_string(),
            timeout: Some(timeout),
            source: Some(anyhow::Error::new(err)),
        }
    }

    pub(crate) fn status_error(status: u16, url: String, preview: String) -> Self {
        HttpError {
            kind: HttpErrorKind::Status,
            status: Some(status),
            url: Some(url),
            message: preview,
            timeout: None,
            source: None,
        }
    }

    pub(crate) fn decode_error(status: u16, url: String, err: serde_json::Error, preview: String) -> Self {
        HttpError {
            kind: HttpErrorKind::Decode,
            status: Some(status),
            url: Some(url),
            message: format!("failed to decode response body: {} | body={}", err, preview),
            timeout: None,
            source: Some(anyhow::Error::new(err)),
        }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http error kind={}", self.kind)?;
        if let Some(status) = self.status {
            write!(f, " status={}", status)?;
        }
        if let Some(url) = &self.url {
            write!(f, " url={}", url)?;
        }
        write!(f, ": {}", self.message)
    }
}

impl StdError for HttpError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|err| &**err as &(dyn StdError + 'static))
    }
}

/// Network trouble, throttling and server errors are worth retrying; other
/// statuses mean the request itself was refused.
impl From<HttpError> for CapabilityError {
    fn from(err: HttpError) -> Self {
        match err.kind {
            HttpErrorKind::Timeout => {
                CapabilityError::Timeout(err.timeout.unwrap_or_default())
            }
            HttpErrorKind::Connect | HttpErrorKind::Body | HttpErrorKind::Unknown => {
                CapabilityError::Transient(err.to_string())
            }
            HttpErrorKind::Status => match err.status {
                Some(429) | Some(500..=599) => CapabilityError::Transient(err.to_string()),
                _ => CapabilityError::Rejected(err.to_string()),
            },
            HttpErrorKind::Decode => CapabilityError::InvalidResponse(err.to_string()),
            HttpErrorKind::Request => CapabilityError::Rejected(err.to_string()),
        }
    }
}

pub(crate) fn preview_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    let mut out = String::new();
    let mut truncated = false;
    for (idx, ch) in trimmed.chars().enumerate() {
        if idx >= BODY_PREVIEW_LIMIT {
            truncated = true;
            break;
        }
        out.push(ch);
    }

    if truncated {
        out.push_str("...");
    }

    out
}

/// Bearer auth only when a key is configured.
pub(crate) fn auth(req: reqwest::RequestBuilder, api_key: &str) -> reqwest::RequestBuilder {
    if api_key.trim().is_empty() {
        req
    } else {
        req.bearer_auth(api_key)
    }
}

pub(crate) async fn parse_json_response(
    resp: reqwest::Response,
    timeout: Duration,
) -> Result<Value, HttpError> {
    let status = resp.status();
    let url = resp.url().to_string();
    let body = resp
        .text()
        .await
        .map_err(|err| HttpError::from_reqwest(err, url.clone(), timeout))?;

    if !status.is_success() {
        let preview = preview_body(&body);
        return Err(HttpError::status_error(status.as_u16(), url, preview));
    }

    if body.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str::<Value>(&body).map_err(|err| {
        let preview = preview_body(&body);
        HttpError::decode_error(status.as_u16(), url, err, preview)
    })
}

pub(crate) async fn ensure_success(resp: reqwest::Response, timeout: Duration) -> Result<(), HttpError> {
    let status = resp.status();
    let url = resp.url().to_string();

    if status.is_success() {
        return Ok(());
    }

    let body = resp
        .text()
        .await
        .map_err(|err| HttpError::from_reqwest(err, url.clone(), timeout))?;
    Err(HttpError::status_error(status.as_u16(), url, preview_body(&body)))
}

pub(crate) fn build_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}
