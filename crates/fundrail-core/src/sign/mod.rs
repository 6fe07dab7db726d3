//! Per-custodian request signing.
//!
//! Each strategy turns a payload plus long-lived secret material into a
//! [`SignedRequest`]: the immutable description of one authenticated call.
//! Strategies are deterministic given (payload, credential, nonce), and
//! nonces never repeat for the same credential, so a descriptor is
//! one-shot: replaying it re-sends the identical signature, regenerating
//! it produces a fresh one.

pub mod bearer;
pub mod hmac;
pub mod jwt;

use std::collections::BTreeMap;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::http_client::{HttpMethod, HttpRequest};

pub use bearer::{TokenManager, TokenPayload, TokenResponse};
pub use hmac::{PayloadSigner, SubmitType};
pub use jwt::JwtSigner;

/// Authentication artifacts for one outbound request.
///
/// Immutable once produced. Headers carry everything the transport needs;
/// the body is returned exactly as it was signed so the bytes that were
/// hashed are the bytes that ship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    method: HttpMethod,
    path: String,
    body: String,
    headers: BTreeMap<String, String>,
}

impl SignedRequest {
    pub(crate) fn new(
        method: HttpMethod,
        path: impl Into<String>,
        body: impl Into<String>,
        headers: BTreeMap<String, String>,
    ) -> Self {
        Self {
            method,
            path: path.into(),
            body: body.into(),
            headers,
        }
    }

    pub const fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Materialize a transport request against a base URL.
    pub fn into_http_request(self, base_url: &str) -> HttpRequest {
        let url = join_url(base_url, &self.path);
        let mut request = HttpRequest::new(self.method, url);
        for (name, value) in self.headers {
            request = request.with_header(name, value);
        }
        if !self.body.is_empty() {
            request = request.with_json_body(self.body);
        }
        request
    }
}

pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Timestamp-derived nonce. Nanosecond resolution keeps nonces strictly
/// increasing per credential; the value fits an i64 until the year 2262.
pub fn unix_nano_nonce() -> i64 {
    i64::try_from(OffsetDateTime::now_utc().unix_timestamp_nanos()).unwrap_or(i64::MAX)
}

/// Random nonce for strategies that want replay protection without
/// ordering.
pub fn uuid_nonce() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_request_materializes_headers_and_body() {
        let mut headers = BTreeMap::new();
        headers.insert(String::from("x-api-key"), String::from("key-1"));
        let signed = SignedRequest::new(
            HttpMethod::Post,
            "/v1/payouts/bulk",
            r#"{"id":1}"#,
            headers,
        );

        let request = signed.into_http_request("https://api.example.test/");
        assert_eq!(request.url, "https://api.example.test/v1/payouts/bulk");
        assert_eq!(request.headers.get("x-api-key").map(String::as_str), Some("key-1"));
        assert_eq!(request.body.as_deref(), Some(r#"{"id":1}"#));
    }

    #[test]
    fn empty_body_is_not_sent() {
        let signed = SignedRequest::new(HttpMethod::Post, "/v1/status", "", BTreeMap::new());
        let request = signed.into_http_request("https://api.example.test");
        assert_eq!(request.body, None);
    }

    #[test]
    fn nano_nonces_are_monotonic() {
        let first = unix_nano_nonce();
        let second = unix_nano_nonce();
        assert!(second >= first);
    }

    #[test]
    fn uuid_nonces_do_not_repeat() {
        assert_ne!(uuid_nonce(), uuid_nonce());
    }
}
