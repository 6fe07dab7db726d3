//! Scrip custodian client.
//!
//! Token-issuance and redemption service. Auth is a static bearer from
//! configuration; there is no per-call signing. Scrip moves credentials,
//! not funds, so it sits outside the bulk-payout capability; its error
//! surface runs through the same classifier, and the 409
//! duplicate-redemption verdict originates here.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::classify::{classify_transport, screen, CustodianError};
use crate::config;
use crate::custodians::decode_json;
use crate::error::ConfigError;
use crate::http_client::{HttpAuth, HttpClient, HttpRequest, HttpResponse};
use crate::sign::join_url;

/// One registered credential issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuer {
    pub name: String,
    pub public_key: String,
}

/// Blind-signature bundle returned for a batch of blinded tokens.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SignedCredentials {
    pub batch_proof: String,
    pub signed_tokens: Vec<String>,
}

/// Proof material presented to redeem one credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRedemption {
    #[serde(rename = "t")]
    pub preimage: String,
    pub payload: String,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize)]
struct CreateIssuerRequest<'a> {
    name: &'a str,
    max_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
struct SignCredentialsRequest<'a> {
    blinded_tokens: &'a [String],
}

/// Construction parameters for [`ScripClient`].
#[derive(Clone)]
pub struct ScripConfig {
    pub base_url: String,
    pub token: Option<String>,
}

impl Debug for ScripConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScripConfig")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_deref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ScripConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: config::require_env(config::SCRIP_URL)?,
            token: config::optional_env(config::SCRIP_TOKEN),
        })
    }
}

/// Scrip API client.
pub struct ScripClient {
    base_url: String,
    transport: Arc<dyn HttpClient>,
    auth: HttpAuth,
}

impl Debug for ScripClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScripClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &(self.auth != HttpAuth::None))
            .finish()
    }
}

impl ScripClient {
    pub fn new(config: ScripConfig, transport: Arc<dyn HttpClient>) -> Self {
        let auth = match config.token {
            Some(token) => HttpAuth::BearerToken(token),
            None => HttpAuth::None,
        };
        Self {
            base_url: config.base_url,
            transport,
            auth,
        }
    }

    /// Register a new issuer with a signing-token budget.
    pub async fn create_issuer(&self, name: &str, max_tokens: u32) -> Result<(), CustodianError> {
        let body = serde_json::to_string(&CreateIssuerRequest { name, max_tokens })
            .map_err(|e| CustodianError::internal(format!("issuer serialization failed: {e}")))?;
        let request = HttpRequest::post(join_url(&self.base_url, "/v1/issuer/"))
            .with_json_body(body)
            .with_auth(&self.auth);

        self.execute_screened(request).await?;
        info!(issuer = name, max_tokens, "issuer created");
        Ok(())
    }

    pub async fn get_issuer(&self, name: &str) -> Result<Issuer, CustodianError> {
        let path = format!("/v1/issuer/{}", urlencoding::encode(name));
        let request = HttpRequest::get(join_url(&self.base_url, &path)).with_auth(&self.auth);
        let response = self.execute_screened(request).await?;
        decode_json(&response)
    }

    /// Blind-sign a batch of tokens under the named issuer.
    pub async fn sign_credentials(
        &self,
        issuer: &str,
        blinded_tokens: &[String],
    ) -> Result<SignedCredentials, CustodianError> {
        let body = serde_json::to_string(&SignCredentialsRequest { blinded_tokens })
            .map_err(|e| CustodianError::internal(format!("token serialization failed: {e}")))?;
        let path = format!("/v1/blinded-tokens/{}", urlencoding::encode(issuer));
        let request = HttpRequest::post(join_url(&self.base_url, &path))
            .with_json_body(body)
            .with_auth(&self.auth);

        let response = self.execute_screened(request).await?;
        decode_json(&response)
    }

    /// Redeem one credential. Re-presenting spent proof material yields
    /// the classifier's permanently non-retryable duplicate verdict.
    pub async fn redeem_credentials(
        &self,
        issuer: &str,
        redemption: &CredentialRedemption,
    ) -> Result<(), CustodianError> {
        let body = serde_json::to_string(redemption).map_err(|e| {
            CustodianError::internal(format!("redemption serialization failed: {e}"))
        })?;
        let path = format!("/v1/blinded-tokens/{}/redemption", urlencoding::encode(issuer));
        let request = HttpRequest::post(join_url(&self.base_url, &path))
            .with_json_body(body)
            .with_auth(&self.auth);

        self.execute_screened(request).await?;
        Ok(())
    }

    async fn execute_screened(
        &self,
        request: HttpRequest,
    ) -> Result<HttpResponse, CustodianError> {
        let response = self
            .transport
            .execute(request)
            .await
            .map_err(classify_transport)?;
        screen(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::CustodianErrorKind;
    use crate::http_client::HttpError;
    use futures::executor::block_on;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    struct RecordingHttpClient {
        response: Result<HttpResponse, HttpError>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl RecordingHttpClient {
        fn respond_with(response: HttpResponse) -> Self {
            Self {
                response: Ok(response),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn recorded_requests(&self) -> Vec<HttpRequest> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .clone()
        }
    }

    impl HttpClient for RecordingHttpClient {
        fn execute<'a>(
            &'a self,
            request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .push(request);
            let response = self.response.clone();
            Box::pin(async move { response })
        }
    }

    fn client(transport: Arc<dyn HttpClient>) -> ScripClient {
        ScripClient::new(
            ScripConfig {
                base_url: String::from("https://scrip.example.test"),
                token: Some(String::from("scrip-tok")),
            },
            transport,
        )
    }

    fn redemption() -> CredentialRedemption {
        CredentialRedemption {
            preimage: String::from("preimage-1"),
            payload: String::from("acct-1"),
            signature: String::from("sig-1"),
        }
    }

    #[test]
    fn duplicate_redemption_is_permanently_non_retryable() {
        let transport = Arc::new(RecordingHttpClient::respond_with(HttpResponse {
            status: 409,
            body: String::from(r#"{"message":"duplicate redemption"}"#),
        }));
        let scrip = client(transport);

        let error = block_on(scrip.redeem_credentials("origin-x", &redemption()))
            .expect_err("replay must fail");
        assert_eq!(error.kind(), CustodianErrorKind::DuplicateRedemption);
        assert_eq!(error.code(), "custodian.duplicate_redemption");
        assert!(!error.retryable());
    }

    #[test]
    fn bearer_token_and_issuer_budget_travel_on_create() {
        let transport = Arc::new(RecordingHttpClient::respond_with(HttpResponse {
            status: 201,
            body: String::new(),
        }));
        let scrip = client(transport.clone());

        block_on(scrip.create_issuer("origin-x", 40)).expect("creates");

        let requests = transport.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].headers.get("authorization").map(String::as_str),
            Some("Bearer scrip-tok")
        );
        let body: serde_json::Value =
            serde_json::from_str(requests[0].body.as_deref().expect("body")).expect("parses");
        assert_eq!(body["name"], "origin-x");
        assert_eq!(body["max_tokens"], 40);
    }

    #[test]
    fn issuer_fetch_decodes_the_record() {
        let transport = Arc::new(RecordingHttpClient::respond_with(HttpResponse::ok_json(
            r#"{"name":"origin-x","public_key":"pk-1"}"#,
        )));
        let scrip = client(transport.clone());

        let issuer = block_on(scrip.get_issuer("origin-x")).expect("decodes");
        assert_eq!(
            issuer,
            Issuer {
                name: String::from("origin-x"),
                public_key: String::from("pk-1"),
            }
        );
        assert!(transport.recorded_requests()[0]
            .url
            .ends_with("/v1/issuer/origin-x"));
    }

    #[test]
    fn redemption_proof_fields_use_the_wire_names() {
        let transport = Arc::new(RecordingHttpClient::respond_with(HttpResponse::ok_json("{}")));
        let scrip = client(transport.clone());

        block_on(scrip.redeem_credentials("origin-x", &redemption())).expect("redeems");

        let requests = transport.recorded_requests();
        let body: serde_json::Value =
            serde_json::from_str(requests[0].body.as_deref().expect("body")).expect("parses");
        assert_eq!(body["t"], "preimage-1");
        assert_eq!(body["payload"], "acct-1");
        assert_eq!(body["signature"], "sig-1");
        assert!(requests[0]
            .url
            .ends_with("/v1/blinded-tokens/origin-x/redemption"));
    }
}
