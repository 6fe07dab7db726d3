//! Zenith custodian client.
//!
//! Crypto exchange settling bulk transfers in the asset currency. Every
//! call carries a freshly minted RS256 JWT binding the call path, a
//! random nonce, and a hash of the exact body bytes. Transfer statuses
//! come back as numeric codes.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::classify::{classify_transport, screen, CustodianError, CustodianErrorKind};
use crate::config;
use crate::custodian::{Custodian, CustodianFuture, CustodianId};
use crate::custodians::decode_json;
use crate::domain::{PayoutStatus, TransferBatch, TransferOutcome};
use crate::error::{ConfigError, ValidationError};
use crate::http_client::{HttpClient, HttpMethod};
use crate::sign::JwtSigner;

const BULK_TRANSFER_PATH: &str = "/v1/bulk-transfer";

/// Body code the provider uses for "no such transfer".
const NOT_FOUND_CODE: i64 = 404;

#[derive(Debug, Clone, Serialize)]
struct TransferRequestItem {
    id: String,
    destination: String,
    amount: f64,
    currency: String,
}

#[derive(Debug, Clone, Serialize)]
struct BulkTransferRequest {
    transfers: Vec<TransferRequestItem>,
}

#[derive(Debug, Clone, Deserialize)]
struct TransferStatusBody {
    id: String,
    code: i64,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct BulkTransferResponse {
    #[serde(default)]
    data: Vec<TransferStatusBody>,
}

/// Map a numeric transfer code onto the canonical vocabulary. The 404
/// body code is handled before mapping; every other undocumented code
/// resolves to [`PayoutStatus::Unknown`].
pub const fn map_status_code(code: i64) -> PayoutStatus {
    match code {
        1 => PayoutStatus::Pending,
        2 => PayoutStatus::Complete,
        3 => PayoutStatus::Failed,
        _ => PayoutStatus::Unknown,
    }
}

/// Construction parameters for [`ZenithClient`].
///
/// The credential pair is optional at construction so wiring can happen
/// without secrets; any signed call without it fails with a
/// configuration error.
#[derive(Clone)]
pub struct ZenithConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub signing_key_pem: Option<String>,
    /// Per-item ceiling in the transfer currency; `None` disables it.
    pub transfer_cap: Option<Decimal>,
}

impl Debug for ZenithConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZenithConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_deref().map(|_| "<redacted>"))
            .field(
                "signing_key_pem",
                &self.signing_key_pem.as_deref().map(|_| "<redacted>"),
            )
            .field("transfer_cap", &self.transfer_cap)
            .finish()
    }
}

impl ZenithConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let transfer_cap = match config::optional_env(config::ZENITH_TRANSFER_CAP) {
            Some(raw) => Some(raw.parse::<Decimal>().map_err(|_| {
                ConfigError::InvalidEnvValue {
                    name: config::ZENITH_TRANSFER_CAP,
                    value: raw,
                }
            })?),
            None => None,
        };
        Ok(Self {
            base_url: config::require_env(config::ZENITH_URL)?,
            api_key: config::optional_env(config::ZENITH_API_KEY),
            signing_key_pem: config::optional_env(config::ZENITH_SIGNING_KEY),
            transfer_cap,
        })
    }
}

/// Authenticated Zenith API client.
pub struct ZenithClient {
    base_url: String,
    transport: Arc<dyn HttpClient>,
    signer: Option<JwtSigner>,
    transfer_cap: Option<Decimal>,
}

impl Debug for ZenithClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZenithClient")
            .field("base_url", &self.base_url)
            .field("signer", &self.signer.is_some())
            .field("transfer_cap", &self.transfer_cap)
            .finish()
    }
}

impl ZenithClient {
    /// A supplied-but-malformed signing key fails here; an absent
    /// credential pair defers to call time.
    pub fn new(config: ZenithConfig, transport: Arc<dyn HttpClient>) -> Result<Self, ConfigError> {
        let signer = match (config.api_key, config.signing_key_pem) {
            (Some(api_key), Some(pem)) => Some(JwtSigner::new(api_key, pem.as_bytes())?),
            _ => None,
        };
        Ok(Self {
            base_url: config.base_url,
            transport,
            signer,
            transfer_cap: config.transfer_cap,
        })
    }

    fn signer(&self) -> Result<&JwtSigner, CustodianError> {
        self.signer.as_ref().ok_or_else(|| {
            ConfigError::MissingCredentials {
                custodian: "zenith",
                detail: "api key and signing key are required for signed calls",
            }
            .into()
        })
    }

    fn enforce_cap(&self, batch: &TransferBatch) -> Result<(), CustodianError> {
        let Some(cap) = self.transfer_cap else {
            return Ok(());
        };
        for record in batch.records() {
            if record.amount().as_decimal() > cap {
                return Err(ValidationError::TransferCapExceeded {
                    amount: record.amount().as_decimal().normalize().to_string(),
                    cap: cap.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Submit the batch as one bulk transfer.
    pub async fn submit_bulk_transfer(
        &self,
        batch: &TransferBatch,
    ) -> Result<Vec<TransferOutcome>, CustodianError> {
        self.enforce_cap(batch)?;

        let payload = BulkTransferRequest {
            transfers: batch
                .records()
                .iter()
                .map(|record| TransferRequestItem {
                    id: record.id().to_string(),
                    destination: record.destination().to_string(),
                    amount: record.amount().wire_value(),
                    currency: record.currency().to_string(),
                })
                .collect(),
        };
        let body = serde_json::to_string(&payload).map_err(|e| {
            CustodianError::internal(format!("bulk transfer serialization failed: {e}"))
        })?;

        let signed = self
            .signer()?
            .sign_now(HttpMethod::Post, BULK_TRANSFER_PATH, &body)?;
        let response = self
            .transport
            .execute(signed.into_http_request(&self.base_url))
            .await
            .map_err(classify_transport)?;
        let response = screen(response)?;
        let decoded: BulkTransferResponse = decode_json(&response)?;

        let mut outcomes = Vec::with_capacity(decoded.data.len());
        for item in decoded.data {
            outcomes.push(outcome_from_body(item)?);
        }
        info!(
            custodian = %CustodianId::Zenith,
            submitted = outcomes.len(),
            "bulk transfer submitted"
        );
        Ok(outcomes)
    }

    /// Current status of one transfer. A 404 body code is a not-found
    /// error, distinct from the transient HTTP-level 404.
    pub async fn check_transfer_status(
        &self,
        transfer_id: &str,
    ) -> Result<TransferOutcome, CustodianError> {
        let path = format!("/v1/transfer/{transfer_id}");
        let signed = self.signer()?.sign_now(HttpMethod::Get, &path, "")?;
        let response = self
            .transport
            .execute(signed.into_http_request(&self.base_url))
            .await
            .map_err(classify_transport)?;
        let response = screen(response)?;
        let body: TransferStatusBody = decode_json(&response)?;
        outcome_from_body(body)
    }
}

fn outcome_from_body(body: TransferStatusBody) -> Result<TransferOutcome, CustodianError> {
    if body.code == NOT_FOUND_CODE {
        return Err(CustodianError::not_found(format!(
            "transfer {} not found",
            body.id
        )));
    }
    let outcome = TransferOutcome::new(&body.id, map_status_code(body.code), body.code.to_string());
    Ok(match body.message.filter(|m| !m.is_empty()) {
        Some(message) => outcome.with_note(message),
        None => outcome,
    })
}

impl Custodian for ZenithClient {
    fn id(&self) -> CustodianId {
        CustodianId::Zenith
    }

    fn submit_bulk<'a>(
        &'a self,
        batch: &'a TransferBatch,
    ) -> CustodianFuture<'a, Vec<TransferOutcome>> {
        Box::pin(self.submit_bulk_transfer(batch))
    }

    /// Per-item reconciliation; an id the provider no longer knows is
    /// reported as `Unknown` rather than aborting the whole sweep.
    fn check_status<'a>(
        &'a self,
        batch: &'a TransferBatch,
    ) -> CustodianFuture<'a, Vec<TransferOutcome>> {
        Box::pin(async move {
            let mut outcomes = Vec::with_capacity(batch.len());
            for record in batch.records() {
                match self.check_transfer_status(record.id()).await {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(error) if error.kind() == CustodianErrorKind::NotFound => {
                        outcomes.push(
                            TransferOutcome::new(record.id(), PayoutStatus::Unknown, "404")
                                .with_note(error.message()),
                        );
                    }
                    Err(error) => return Err(error),
                }
            }
            Ok(outcomes)
        })
    }
}
