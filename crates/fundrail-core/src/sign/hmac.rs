//! HMAC-payload-signature strategy: the JSON payload rides base64-encoded
//! in a header, authenticated by an HMAC-SHA384 signature over those
//! base64 bytes.

use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha384;

use crate::classify::CustodianError;
use crate::error::ConfigError;
use crate::http_client::HttpMethod;
use crate::sign::SignedRequest;

type HmacSha384 = Hmac<Sha384>;

pub const PAYLOAD_HEADER: &str = "x-meridian-payload";
pub const API_KEY_HEADER: &str = "x-meridian-apikey";
pub const SIGNATURE_HEADER: &str = "x-meridian-signature";

/// Explicit selection of how a payload is submitted.
///
/// Configuration, never inference: a caller that wants signing must say
/// so, and a signing request without a secret is an error rather than a
/// silent downgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitType {
    /// Payload header only, no authentication material.
    NoSign,
    /// Payload + API key + HMAC-SHA384 signature headers.
    Hmac,
    /// Payload header only; the caller attaches its own OAuth bearer and
    /// the API-key header is omitted.
    Oauth,
}

impl SubmitType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoSign => "none",
            Self::Hmac => "hmac",
            Self::Oauth => "oauth",
        }
    }
}

impl FromStr for SubmitType {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::NoSign),
            "hmac" => Ok(Self::Hmac),
            "oauth" => Ok(Self::Oauth),
            other => Err(ConfigError::InvalidSubmitType {
                value: other.to_owned(),
            }),
        }
    }
}

/// Canonicalize a payload to base64. Already-base64 input passes through
/// unchanged so a pre-encoded payload is not double-wrapped.
pub fn canonical_payload(payload: &str) -> String {
    if !payload.is_empty() && BASE64.decode(payload).is_ok() {
        payload.to_string()
    } else {
        BASE64.encode(payload)
    }
}

/// Hex HMAC-SHA384 over the base64 payload bytes.
pub fn hmac_signature(secret: &[u8], base64_payload: &str) -> Result<String, CustodianError> {
    let mut mac = HmacSha384::new_from_slice(secret)
        .map_err(|e| CustodianError::config(format!("hmac secret rejected: {e}")))?;
    mac.update(base64_payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Header-producing signer for the HMAC strategy.
#[derive(Clone)]
pub struct PayloadSigner {
    submit_type: SubmitType,
    api_key: Option<String>,
    secret: Option<Vec<u8>>,
}

impl Debug for PayloadSigner {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadSigner")
            .field("submit_type", &self.submit_type)
            .field("api_key", &self.api_key.as_deref().map(|_| "<redacted>"))
            .field("secret", &self.secret.as_deref().map(|_| "<redacted>"))
            .finish()
    }
}

impl PayloadSigner {
    pub fn no_sign() -> Self {
        Self {
            submit_type: SubmitType::NoSign,
            api_key: None,
            secret: None,
        }
    }

    pub fn hmac(api_key: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            submit_type: SubmitType::Hmac,
            api_key: Some(api_key.into()),
            secret: Some(secret.into()),
        }
    }

    pub fn oauth() -> Self {
        Self {
            submit_type: SubmitType::Oauth,
            api_key: None,
            secret: None,
        }
    }

    pub fn from_config(
        submit_type: SubmitType,
        api_key: Option<String>,
        secret: Option<Vec<u8>>,
    ) -> Self {
        Self {
            submit_type,
            api_key,
            secret,
        }
    }

    pub const fn submit_type(&self) -> SubmitType {
        self.submit_type
    }

    /// Produce the authenticated descriptor for one call.
    ///
    /// The payload travels in [`PAYLOAD_HEADER`]; the HTTP body stays
    /// empty. Requests in `Hmac` mode without a key or secret fail with a
    /// configuration error.
    pub fn sign(
        &self,
        method: HttpMethod,
        path: &str,
        payload_json: &str,
    ) -> Result<SignedRequest, CustodianError> {
        let payload = canonical_payload(payload_json);
        let mut headers = BTreeMap::new();
        headers.insert(String::from(PAYLOAD_HEADER), payload.clone());

        match self.submit_type {
            SubmitType::NoSign | SubmitType::Oauth => {}
            SubmitType::Hmac => {
                let api_key = self.api_key.as_deref().ok_or_else(|| {
                    CustodianError::config("hmac submit type requires an api key")
                })?;
                let secret = self.secret.as_deref().ok_or_else(|| {
                    CustodianError::config("hmac submit type requires a shared secret")
                })?;
                headers.insert(String::from(API_KEY_HEADER), api_key.to_string());
                headers.insert(
                    String::from(SIGNATURE_HEADER),
                    hmac_signature(secret, &payload)?,
                );
            }
        }

        Ok(SignedRequest::new(method, path, "", headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_json_is_base64_wrapped_once() {
        let canonical = canonical_payload(r#"{"nonce":1}"#);
        assert_eq!(canonical, BASE64.encode(r#"{"nonce":1}"#));
        // Feeding the canonical form back through is a no-op.
        assert_eq!(canonical_payload(&canonical), canonical);
    }

    #[test]
    fn same_payload_and_secret_reproduce_the_signature() {
        let payload = canonical_payload(r#"{"nonce":42,"amount":1.0}"#);
        let first = hmac_signature(b"secret", &payload).expect("signs");
        let second = hmac_signature(b"secret", &payload).expect("signs");
        assert_eq!(first, second);
        // 384-bit digest, hex-encoded.
        assert_eq!(first.len(), 96);
    }

    #[test]
    fn nonce_changes_flow_through_to_the_signature() {
        let first = hmac_signature(b"secret", &canonical_payload(r#"{"nonce":1}"#)).expect("signs");
        let second =
            hmac_signature(b"secret", &canonical_payload(r#"{"nonce":2}"#)).expect("signs");
        assert_ne!(first, second);
    }

    #[test]
    fn hmac_mode_emits_all_three_headers() {
        let signer = PayloadSigner::hmac("key-1", b"secret".to_vec());
        let signed = signer
            .sign(HttpMethod::Post, "/v1/payouts/bulk", r#"{"nonce":1}"#)
            .expect("signs");

        assert!(signed.headers().contains_key(PAYLOAD_HEADER));
        assert_eq!(
            signed.headers().get(API_KEY_HEADER).map(String::as_str),
            Some("key-1")
        );
        assert!(signed.headers().contains_key(SIGNATURE_HEADER));
        assert_eq!(signed.body(), "");
    }

    #[test]
    fn oauth_mode_omits_the_api_key_header() {
        let signer = PayloadSigner::oauth();
        let signed = signer
            .sign(HttpMethod::Post, "/v1/payouts/bulk", r#"{"nonce":1}"#)
            .expect("signs");

        assert!(signed.headers().contains_key(PAYLOAD_HEADER));
        assert!(!signed.headers().contains_key(API_KEY_HEADER));
        assert!(!signed.headers().contains_key(SIGNATURE_HEADER));
    }

    #[test]
    fn hmac_mode_without_secret_is_a_config_error() {
        let signer = PayloadSigner::from_config(SubmitType::Hmac, Some(String::from("k")), None);
        let error = signer
            .sign(HttpMethod::Post, "/v1/payouts/bulk", "{}")
            .expect_err("missing secret must fail");
        assert_eq!(error.code(), "custodian.config");
    }

    #[test]
    fn submit_type_parses_from_config_strings() {
        assert_eq!("hmac".parse::<SubmitType>(), Ok(SubmitType::Hmac));
        assert_eq!("OAuth".parse::<SubmitType>(), Ok(SubmitType::Oauth));
        assert_eq!("none".parse::<SubmitType>(), Ok(SubmitType::NoSign));
        assert!("basic".parse::<SubmitType>().is_err());
    }
}
