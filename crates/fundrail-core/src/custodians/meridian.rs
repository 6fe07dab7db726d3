//! Meridian custodian client.
//!
//! Digital-asset exchange whose API reads the request from signed
//! headers: the JSON payload travels base64-encoded in a header, next to
//! an HMAC-SHA384 signature, and the HTTP body stays empty. Every
//! payload embeds the call path and a strictly increasing nonce.
//! Transfer references are deterministic, so reconciliation needs no
//! stored provider ids.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::classify::{classify_transport, screen, CustodianError};
use crate::config;
use crate::custodian::{Custodian, CustodianFuture, CustodianId};
use crate::custodians::decode_json;
use crate::domain::{OriginTag, PayoutStatus, TransferBatch, TransferOutcome};
use crate::error::ConfigError;
use crate::http_client::{HttpClient, HttpMethod};
use crate::sign::{unix_nano_nonce, PayloadSigner, SubmitType};

const BULK_PAYOUT_PATH: &str = "/v1/payouts/bulk";
const STATUS_PATH: &str = "/v1/payout/status";
const ACCOUNT_LIST_PATH: &str = "/v1/account/list";
const BALANCES_PATH: &str = "/v1/balances";

const DEFAULT_ACCOUNT: &str = "primary";

#[derive(Debug, Clone, Serialize)]
struct PayoutItem {
    tx_ref: String,
    amount: f64,
    currency: String,
    destination: String,
    account: String,
}

#[derive(Debug, Clone, Serialize)]
struct BulkPayoutPayload<'a> {
    request: &'a str,
    nonce: i64,
    payouts: &'a [PayoutItem],
}

#[derive(Debug, Clone, Serialize)]
struct StatusPayload<'a> {
    request: &'a str,
    nonce: i64,
    tx_ref: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct ListPayload<'a> {
    request: &'a str,
    nonce: i64,
}

/// Per-payout verdict returned by the bulk and status endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PayoutResult {
    /// `"Ok"` or `"Error"`.
    pub result: String,
    pub tx_ref: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Account {
    pub name: String,
    #[serde(default)]
    pub class: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Balance {
    pub currency: String,
    pub amount: Decimal,
    pub available: Decimal,
}

/// Map a payout result onto the canonical vocabulary: an `Error` result
/// is failed regardless of status; otherwise the status string decides.
pub fn map_payout_result(result: &PayoutResult) -> PayoutStatus {
    if result.result == "Error" {
        return PayoutStatus::Failed;
    }
    match result.status.as_deref() {
        Some("Pending") => PayoutStatus::Pending,
        Some("Completed") => PayoutStatus::Complete,
        _ => PayoutStatus::Unknown,
    }
}

/// Deterministic provider-side reference for one transfer: the same
/// (origin, id, destination, currency) always produces the same
/// reference, which doubles as the provider's idempotency key.
pub fn generate_tx_ref(
    origin: OriginTag,
    transfer_id: &str,
    destination: &str,
    currency: &str,
) -> String {
    let key = [origin.as_str(), transfer_id, destination, currency].join("_");
    bs58::encode(Sha256::digest(key.as_bytes())).into_string()
}

/// Construction parameters for [`MeridianClient`].
#[derive(Clone)]
pub struct MeridianConfig {
    pub base_url: String,
    pub submit_type: SubmitType,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
}

impl Debug for MeridianConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeridianConfig")
            .field("base_url", &self.base_url)
            .field("submit_type", &self.submit_type)
            .field("api_key", &self.api_key.as_deref().map(|_| "<redacted>"))
            .field("api_secret", &self.api_secret.as_deref().map(|_| "<redacted>"))
            .finish()
    }
}

impl MeridianConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let submit_type = match config::optional_env(config::MERIDIAN_SUBMIT_TYPE) {
            Some(raw) => raw.parse()?,
            None => SubmitType::Hmac,
        };
        Ok(Self {
            base_url: config::require_env(config::MERIDIAN_URL)?,
            submit_type,
            api_key: config::optional_env(config::MERIDIAN_API_KEY),
            api_secret: config::optional_env(config::MERIDIAN_API_SECRET),
        })
    }
}

/// Authenticated Meridian API client.
pub struct MeridianClient {
    base_url: String,
    transport: Arc<dyn HttpClient>,
    signer: PayloadSigner,
    account: String,
}

impl Debug for MeridianClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeridianClient")
            .field("base_url", &self.base_url)
            .field("signer", &self.signer)
            .field("account", &self.account)
            .finish()
    }
}

impl MeridianClient {
    pub fn new(config: MeridianConfig, transport: Arc<dyn HttpClient>) -> Self {
        let signer = PayloadSigner::from_config(
            config.submit_type,
            config.api_key,
            config.api_secret.map(String::into_bytes),
        );
        Self {
            base_url: config.base_url,
            transport,
            signer,
            account: String::from(DEFAULT_ACCOUNT),
        }
    }

    /// Debit a different provider-side account than `primary`.
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = account.into();
        self
    }

    /// Submit the batch as one bulk payout under deterministic references.
    pub async fn upload_bulk_payout(
        &self,
        batch: &TransferBatch,
    ) -> Result<Vec<TransferOutcome>, CustodianError> {
        let payouts: Vec<PayoutItem> = batch
            .records()
            .iter()
            .map(|record| PayoutItem {
                tx_ref: generate_tx_ref(
                    record.origin(),
                    record.id(),
                    record.destination(),
                    record.currency(),
                ),
                amount: record.amount().wire_value(),
                currency: record.currency().to_string(),
                destination: record.destination().to_string(),
                account: self.account.clone(),
            })
            .collect();

        let mut ids_by_ref = HashMap::with_capacity(batch.len());
        for (record, item) in batch.records().iter().zip(&payouts) {
            ids_by_ref.insert(item.tx_ref.clone(), record.id().to_string());
        }

        let payload = BulkPayoutPayload {
            request: BULK_PAYOUT_PATH,
            nonce: unix_nano_nonce(),
            payouts: &payouts,
        };
        let results: Vec<PayoutResult> = self.send_signed(BULK_PAYOUT_PATH, &payload).await?;
        info!(
            custodian = %CustodianId::Meridian,
            submitted = results.len(),
            "bulk payout uploaded"
        );

        Ok(results
            .into_iter()
            .map(|result| {
                let transfer_id = ids_by_ref
                    .get(result.tx_ref.as_str())
                    .cloned()
                    .unwrap_or_else(|| result.tx_ref.clone());
                outcome_from_result(&transfer_id, result)
            })
            .collect())
    }

    /// Current verdict for one transfer reference.
    pub async fn check_tx_status(&self, tx_ref: &str) -> Result<TransferOutcome, CustodianError> {
        let payload = StatusPayload {
            request: STATUS_PATH,
            nonce: unix_nano_nonce(),
            tx_ref,
        };
        let result: PayoutResult = self.send_signed(STATUS_PATH, &payload).await?;
        Ok(outcome_from_result(tx_ref, result))
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, CustodianError> {
        let payload = ListPayload {
            request: ACCOUNT_LIST_PATH,
            nonce: unix_nano_nonce(),
        };
        self.send_signed(ACCOUNT_LIST_PATH, &payload).await
    }

    pub async fn fetch_balances(&self) -> Result<Vec<Balance>, CustodianError> {
        let payload = ListPayload {
            request: BALANCES_PATH,
            nonce: unix_nano_nonce(),
        };
        self.send_signed(BALANCES_PATH, &payload).await
    }

    async fn send_signed<P: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        payload: &P,
    ) -> Result<T, CustodianError> {
        let body = serde_json::to_string(payload).map_err(|e| {
            CustodianError::internal(format!("payload serialization failed: {e}"))
        })?;
        let signed = self.signer.sign(HttpMethod::Post, path, &body)?;
        let response = self
            .transport
            .execute(signed.into_http_request(&self.base_url))
            .await
            .map_err(classify_transport)?;
        let response = screen(response)?;
        decode_json(&response)
    }
}

fn outcome_from_result(transfer_id: &str, result: PayoutResult) -> TransferOutcome {
    let status = map_payout_result(&result);
    let provider_status = result
        .status
        .clone()
        .unwrap_or_else(|| result.result.clone());
    let outcome = TransferOutcome::new(transfer_id, status, provider_status);
    match result.reason.filter(|r| !r.is_empty()) {
        Some(reason) => outcome.with_note(reason),
        None => outcome,
    }
}

impl Custodian for MeridianClient {
    fn id(&self) -> CustodianId {
        CustodianId::Meridian
    }

    fn submit_bulk<'a>(
        &'a self,
        batch: &'a TransferBatch,
    ) -> CustodianFuture<'a, Vec<TransferOutcome>> {
        Box::pin(self.upload_bulk_payout(batch))
    }

    /// Per-item reconciliation by recomputed reference; the outcome keeps
    /// the caller's transfer id.
    fn check_status<'a>(
        &'a self,
        batch: &'a TransferBatch,
    ) -> CustodianFuture<'a, Vec<TransferOutcome>> {
        Box::pin(async move {
            let mut outcomes = Vec::with_capacity(batch.len());
            for record in batch.records() {
                let tx_ref = generate_tx_ref(
                    record.origin(),
                    record.id(),
                    record.destination(),
                    record.currency(),
                );
                let mut outcome = self.check_tx_status(&tx_ref).await?;
                outcome.transfer_id = record.id().to_string();
                outcomes.push(outcome);
            }
            Ok(outcomes)
        })
    }
}
