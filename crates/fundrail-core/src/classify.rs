//! Error classification for authenticated custodian calls.
//!
//! Classification is state-free: the (code, retryable) decision is a pure
//! function of the transport status and the parsed error body, never of
//! elapsed time or attempt count. Retry execution belongs to the caller;
//! this layer only attaches the `retryable` verdict.

use std::fmt::{Display, Formatter};

use serde::Deserialize;

use crate::error::{ConfigError, ValidationError};
use crate::http_client::{HttpError, HttpResponse};

/// Canonical classification of a failed custodian call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustodianErrorKind {
    /// Missing or malformed credential material discovered at call time.
    Config,
    /// Batch or request content rejected before any network call.
    Validation,
    /// Network failure with no response object; the original transport
    /// error passes through unchanged.
    Transport,
    /// Deadline exceeded or canceled in flight.
    Timeout,
    /// Non-2xx with no recognizable structured body.
    Protocol,
    /// 409: an idempotency key was reused. Permanently non-retryable.
    DuplicateRedemption,
    /// 400: the provider rejected the request shape.
    BadRequest,
    /// 429.
    RateLimited,
    /// HTTP 404 on a known route; providers return this transiently.
    RouteNotFound,
    /// 500, 502, 503.
    ServerError,
    /// Any other non-2xx carrying a recognizable structured error body,
    /// or a provider soft error on a 2xx.
    UnknownProvider,
    /// Provider-level "no such transfer" signaled inside a response body.
    NotFound,
    /// Fault caught at a panic-safety boundary; logged, never propagated
    /// as a panic.
    Internal,
}

/// Structured error body shared by the custodian APIs. Every provider
/// returns some subset of these fields; a body with none of them set is
/// not recognizable as a provider error.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ProviderErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub status: Option<i64>,
}

impl ProviderErrorBody {
    fn is_recognizable(&self) -> bool {
        self.message.is_some()
            || self.label.is_some()
            || !self.errors.is_empty()
            || self.status.is_some()
    }

    fn summary(&self) -> Option<String> {
        if let Some(label) = self.label.as_deref().filter(|l| !l.is_empty()) {
            return Some(label.to_string());
        }
        if let Some(message) = self.message.as_deref().filter(|m| !m.is_empty()) {
            return Some(message.to_string());
        }
        if !self.errors.is_empty() {
            return Some(self.errors.join("; "));
        }
        self.status.map(|s| format!("provider status {s}"))
    }
}

/// Classified error returned by every custodian operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustodianError {
    kind: CustodianErrorKind,
    message: String,
    retryable: bool,
    http_status: Option<u16>,
}

impl CustodianError {
    pub fn config(message: impl Into<String>) -> Self {
        Self {
            kind: CustodianErrorKind::Config,
            message: message.into(),
            retryable: false,
            http_status: None,
        }
    }

    pub fn duplicate_redemption(message: impl Into<String>) -> Self {
        Self {
            kind: CustodianErrorKind::DuplicateRedemption,
            message: message.into(),
            retryable: false,
            http_status: Some(409),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            kind: CustodianErrorKind::BadRequest,
            message: message.into(),
            retryable: false,
            http_status: Some(400),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: CustodianErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
            http_status: Some(429),
        }
    }

    pub fn route_not_found(message: impl Into<String>) -> Self {
        Self {
            kind: CustodianErrorKind::RouteNotFound,
            message: message.into(),
            retryable: true,
            http_status: Some(404),
        }
    }

    pub fn server_error(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: CustodianErrorKind::ServerError,
            message: message.into(),
            retryable: true,
            http_status: Some(status),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: CustodianErrorKind::Timeout,
            message: message.into(),
            retryable: true,
            http_status: None,
        }
    }

    pub fn unknown_provider(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: CustodianErrorKind::UnknownProvider,
            message: message.into(),
            retryable: false,
            http_status: Some(status),
        }
    }

    pub fn protocol(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: CustodianErrorKind::Protocol,
            message: message.into(),
            retryable: false,
            http_status: Some(status),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: CustodianErrorKind::NotFound,
            message: message.into(),
            retryable: false,
            http_status: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: CustodianErrorKind::Internal,
            message: message.into(),
            retryable: false,
            http_status: None,
        }
    }

    pub const fn kind(&self) -> CustodianErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn http_status(&self) -> Option<u16> {
        self.http_status
    }

    /// Stable dotted code for logs and caller-side dispatch.
    pub const fn code(&self) -> &'static str {
        match self.kind {
            CustodianErrorKind::Config => "custodian.config",
            CustodianErrorKind::Validation => "custodian.invalid_request",
            CustodianErrorKind::Transport => "custodian.transport",
            CustodianErrorKind::Timeout => "custodian.timeout",
            CustodianErrorKind::Protocol => "custodian.protocol",
            CustodianErrorKind::DuplicateRedemption => "custodian.duplicate_redemption",
            CustodianErrorKind::BadRequest => "custodian.bad_request",
            CustodianErrorKind::RateLimited => "custodian.rate_limited",
            CustodianErrorKind::RouteNotFound => "custodian.route_not_found",
            CustodianErrorKind::ServerError => "custodian.server_error",
            CustodianErrorKind::UnknownProvider => "custodian.unknown_provider_error",
            CustodianErrorKind::NotFound => "custodian.not_found",
            CustodianErrorKind::Internal => "custodian.internal",
        }
    }
}

impl Display for CustodianError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for CustodianError {}

impl From<ValidationError> for CustodianError {
    fn from(error: ValidationError) -> Self {
        Self {
            kind: CustodianErrorKind::Validation,
            message: error.to_string(),
            retryable: false,
            http_status: None,
        }
    }
}

impl From<ConfigError> for CustodianError {
    fn from(error: ConfigError) -> Self {
        Self {
            kind: CustodianErrorKind::Config,
            message: error.to_string(),
            retryable: false,
            http_status: None,
        }
    }
}

impl From<HttpError> for CustodianError {
    fn from(error: HttpError) -> Self {
        classify_transport(error)
    }
}

/// Map a transport-level failure (no response object received).
///
/// Deadline/cancellation failures become the timeout code; anything else
/// passes through with its message and retryable verdict intact.
pub fn classify_transport(error: HttpError) -> CustodianError {
    if error.timed_out() {
        return CustodianError::timeout(error.message().to_string());
    }
    CustodianError {
        kind: CustodianErrorKind::Transport,
        message: error.message().to_string(),
        retryable: error.retryable(),
        http_status: None,
    }
}

/// Classify a received response against the canonical status table.
///
/// Returns `None` when there is nothing to surface: a clean 2xx, or a
/// non-2xx outside the table with no recognizable body (the caller keeps
/// its original error representation in that case).
pub fn classify(status: u16, body: &str) -> Option<CustodianError> {
    let parsed: Option<ProviderErrorBody> = serde_json::from_str(body).ok();
    let detail = parsed
        .as_ref()
        .and_then(ProviderErrorBody::summary)
        .unwrap_or_else(|| snippet(body));

    match status {
        200..=299 => {
            // Soft error: a 2xx whose body still carries an error label.
            let parsed = parsed?;
            let label = parsed.label.as_deref().filter(|l| !l.is_empty())?;
            Some(CustodianError::unknown_provider(
                status,
                format!("provider error on success response: {label}"),
            ))
        }
        409 => Some(CustodianError::duplicate_redemption(detail)),
        400 => Some(CustodianError::bad_request(detail)),
        429 => Some(CustodianError::rate_limited(detail)),
        404 => Some(CustodianError::route_not_found(detail)),
        500 | 502 | 503 => Some(CustodianError::server_error(status, detail)),
        _ => {
            let parsed = parsed?;
            if !parsed.is_recognizable() {
                return None;
            }
            Some(CustodianError::unknown_provider(status, detail))
        }
    }
}

/// Screen a response: surface classified and soft errors, keep successes.
///
/// Non-2xx responses that classify to nothing become protocol errors so
/// the caller always gets a structured failure for a failed call.
pub fn screen(response: HttpResponse) -> Result<HttpResponse, CustodianError> {
    match classify(response.status, &response.body) {
        Some(error) => Err(error),
        None if response.is_success() => Ok(response),
        None => Err(CustodianError::protocol(
            response.status,
            format!("request failed with status {}: {}", response.status, snippet(&response.body)),
        )),
    }
}

fn snippet(body: &str) -> String {
    const MAX: usize = 256;
    let trimmed = body.trim();
    if trimmed.len() <= MAX {
        return trimmed.to_string();
    }
    let mut end = MAX;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}
