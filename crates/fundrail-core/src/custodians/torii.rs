//! Torii custodian client.
//!
//! Fiat/crypto exchange taking bulk JPY-settled withdrawals. Auth is a
//! client-credentials token refresh; every payout is gated on a price
//! quote whose token both fixes the conversion rate and authorizes the
//! withdrawal. A call answered with 401 refreshes the bearer once and
//! retries the original request one time.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::classify::{classify_transport, screen, CustodianError};
use crate::config;
use crate::custodian::{Custodian, CustodianFuture, CustodianId};
use crate::custodians::decode_json;
use crate::domain::{PayoutStatus, TransferBatch, TransferOutcome};
use crate::error::{ConfigError, ValidationError};
use crate::http_client::{HttpClient, HttpRequest, HttpResponse};
use crate::metrics::{MetricsSink, NoopMetrics};
use crate::quote_cache::QuoteCache;
use crate::sign::{join_url, TokenManager, TokenPayload, TokenResponse};

const TOKEN_PATH: &str = "/v1/auth/token";
const PRICE_PATH: &str = "/v1/payout/price";
const BULK_WITHDRAW_PATH: &str = "/v1/payout/bulk-withdraw";
const BULK_STATUS_PATH: &str = "/v1/payout/bulk-status";
const INVENTORY_PATH: &str = "/v1/account/inventory";

pub const DEFAULT_PRODUCT_CODE: &str = "BAT_JPY";

/// JPY notional ceiling applied per withdrawal unless configuration
/// overrides it.
pub const DEFAULT_TRANSFER_CAP: Decimal = Decimal::from_parts(100_000, 0, 0, false, 0);

/// Price quote for one product pair. The embedded price token authorizes
/// a payout at this rate until the token's own expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub product_code: String,
    pub main_currency: String,
    pub sub_currency: String,
    pub rate: Decimal,
    pub price_token: String,
}

/// Simulation parameters attached to a dry-run submission.
///
/// The placeholder statuses are what the provider echoes back for the
/// submit and status calls; defaults mirror the provider's documented
/// simulator behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DryRunOptions {
    pub request_api_transfer_status: String,
    pub process_time_sec: u32,
    pub status_api_transfer_status: String,
}

impl Default for DryRunOptions {
    fn default() -> Self {
        Self {
            request_api_transfer_status: String::from("SUCCESS"),
            process_time_sec: 0,
            status_api_transfer_status: String::from("EXECUTED"),
        }
    }
}

/// One balance line from the inventory endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InventoryEntry {
    pub currency_code: String,
    pub amount: Decimal,
    pub available: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
struct InventoryResponse {
    inventory: Vec<InventoryEntry>,
}

#[derive(Debug, Clone, Serialize)]
struct WithdrawalRequest {
    currency_code: String,
    amount: f64,
    deposit_id: String,
    transfer_id: String,
    source_from: String,
}

#[derive(Debug, Clone, Serialize)]
struct BulkWithdrawRequest {
    dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    dry_run_option: Option<DryRunOptions>,
    price_token: String,
    withdrawals: Vec<WithdrawalRequest>,
}

#[derive(Debug, Clone, Deserialize)]
struct BulkWithdrawResponse {
    #[serde(default)]
    dry_run: bool,
    withdrawals: Vec<WithdrawalResponse>,
}

#[derive(Debug, Clone, Deserialize)]
struct WithdrawalResponse {
    transfer_id: String,
    transfer_status: String,
    #[serde(default)]
    message: Option<String>,
}

// The provider has shipped both spellings of NOT_FOUND.
const FAILED_TRANSFER_STATUSES: [&str; 14] = [
    "NO_INV",
    "INVALID_MEMO",
    "NOT_FOUNTD",
    "NOT_FOUND",
    "INVALID_AMOUNT",
    "NOT_ALLOWED_TO_SEND",
    "NOT_ALLOWED_TO_RECV",
    "LOCKED_BY_QUICK_DEPOSIT",
    "SESSION_SEND_LIMIT",
    "SESSION_TIME_OUT",
    "EXPIRED",
    "NOPOSITION",
    "OTHER_ERROR",
    "MONTHLY_SEND_LIMIT",
];

/// Map a raw transfer status onto the canonical vocabulary. Strings the
/// provider has not documented resolve to [`PayoutStatus::Unknown`].
pub fn map_transfer_status(raw: &str) -> PayoutStatus {
    match raw {
        "SUCCESS" | "EXECUTED" => PayoutStatus::Complete,
        "CREATED" | "PENDING" => PayoutStatus::Pending,
        s if FAILED_TRANSFER_STATUSES.contains(&s) => PayoutStatus::Failed,
        _ => PayoutStatus::Unknown,
    }
}

/// Construction parameters for [`ToriiClient`].
#[derive(Clone)]
pub struct ToriiConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub extra_client_secret: String,
    /// Ledger tag the provider requires on each withdrawal.
    pub source_from: String,
    pub product_code: String,
    /// Per-withdrawal ceiling on `amount * rate` in the quote currency.
    pub transfer_cap: Decimal,
    pub quote_cache_path: Option<PathBuf>,
    pub dry_run: Option<DryRunOptions>,
}

impl Debug for ToriiConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToriiConfig")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("extra_client_secret", &"<redacted>")
            .field("source_from", &self.source_from)
            .field("product_code", &self.product_code)
            .field("transfer_cap", &self.transfer_cap)
            .field("quote_cache_path", &self.quote_cache_path)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl ToriiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let transfer_cap = match config::optional_env(config::TORII_TRANSFER_CAP) {
            Some(raw) => raw
                .parse::<Decimal>()
                .map_err(|_| ConfigError::InvalidEnvValue {
                    name: config::TORII_TRANSFER_CAP,
                    value: raw,
                })?,
            None => DEFAULT_TRANSFER_CAP,
        };
        Ok(Self {
            base_url: config::require_env(config::TORII_URL)?,
            client_id: config::require_env(config::TORII_CLIENT_ID)?,
            client_secret: config::require_env(config::TORII_CLIENT_SECRET)?,
            extra_client_secret: config::require_env(config::TORII_EXTRA_CLIENT_SECRET)?,
            source_from: config::optional_env(config::TORII_SOURCE_FROM)
                .unwrap_or_else(|| String::from("self")),
            product_code: String::from(DEFAULT_PRODUCT_CODE),
            transfer_cap,
            quote_cache_path: config::optional_env(config::QUOTE_CACHE_PATH).map(PathBuf::from),
            dry_run: None,
        })
    }
}

/// Authenticated Torii API client.
#[derive(Clone)]
pub struct ToriiClient {
    base_url: String,
    transport: Arc<dyn HttpClient>,
    credentials: TokenPayload,
    tokens: Arc<TokenManager>,
    source_from: String,
    product_code: String,
    transfer_cap: Decimal,
    dry_run: Option<DryRunOptions>,
    quote_cache: QuoteCache,
    metrics: Arc<dyn MetricsSink>,
}

impl Debug for ToriiClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToriiClient")
            .field("base_url", &self.base_url)
            .field("source_from", &self.source_from)
            .field("product_code", &self.product_code)
            .field("transfer_cap", &self.transfer_cap)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl ToriiClient {
    pub fn new(config: ToriiConfig, transport: Arc<dyn HttpClient>) -> Self {
        let quote_cache = match config.quote_cache_path {
            Some(path) => QuoteCache::new(path),
            None => QuoteCache::default(),
        };
        Self {
            base_url: config.base_url,
            transport,
            credentials: TokenPayload::client_credentials(
                config.client_id,
                config.client_secret,
                config.extra_client_secret,
            ),
            tokens: Arc::new(TokenManager::new()),
            source_from: config.source_from,
            product_code: config.product_code,
            transfer_cap: config.transfer_cap,
            dry_run: config.dry_run,
            quote_cache,
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Seed the bearer slot, for callers that obtained a token elsewhere.
    pub fn with_bearer_token(self, token: impl Into<String>) -> Self {
        self.tokens.store(token);
        self
    }

    /// Exchange the client-credentials triple for a fresh access token and
    /// store it as the default bearer.
    ///
    /// Any fault inside the refresh, panics included, surfaces as an error
    /// value; a failed refresh leaves the previous token in place.
    pub async fn refresh_token(&self) -> Result<String, CustodianError> {
        match AssertUnwindSafe(self.refresh_token_inner())
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let detail = panic_message(&panic);
                error!(custodian = %CustodianId::Torii, detail, "token refresh panicked");
                Err(CustodianError::internal(format!(
                    "token refresh fault: {detail}"
                )))
            }
        }
    }

    async fn refresh_token_inner(&self) -> Result<String, CustodianError> {
        let body = serde_json::to_string(&self.credentials).map_err(|e| {
            CustodianError::internal(format!("token payload serialization failed: {e}"))
        })?;
        let request =
            HttpRequest::post(join_url(&self.base_url, TOKEN_PATH)).with_json_body(body);

        let response = self
            .transport
            .execute(request)
            .await
            .map_err(classify_transport)?;
        let response = screen(response)?;
        let token: TokenResponse = decode_json(&response)?;

        self.tokens.store(&token.access_token);
        debug!(custodian = %CustodianId::Torii, "bearer token refreshed");
        Ok(token.access_token)
    }

    /// Send a request under the current bearer, refreshing once and
    /// retrying once if the provider answers 401.
    async fn send_authorized(&self, request: HttpRequest) -> Result<HttpResponse, CustodianError> {
        if self.tokens.current().is_none() {
            self.refresh_token().await?;
        }

        let first = self
            .transport
            .execute(request.clone().with_auth(&self.tokens.auth()))
            .await
            .map_err(classify_transport)?;
        if first.status != 401 {
            return Ok(first);
        }

        debug!(custodian = %CustodianId::Torii, "bearer rejected, refreshing once");
        self.refresh_token().await?;
        self.transport
            .execute(request.with_auth(&self.tokens.auth()))
            .await
            .map_err(classify_transport)
    }

    /// Fetch the current quote for a product pair.
    ///
    /// With `allow_cached` set, an unexpired cached quote for the same
    /// product is served without a network call. Fresh quotes are cached
    /// best-effort under their price token's expiry.
    pub async fn fetch_quote(
        &self,
        product_code: &str,
        allow_cached: bool,
    ) -> Result<Quote, CustodianError> {
        if allow_cached {
            if let Some(quote) = self.quote_cache.get::<Quote>() {
                if quote.product_code == product_code {
                    debug!(product_code, "serving cached quote");
                    return Ok(quote);
                }
            }
        }

        let request = HttpRequest::get(join_url(&self.base_url, PRICE_PATH))
            .with_query_pair("product_code", product_code);
        let response = self.send_authorized(request).await?;
        let response = screen(response)?;
        let quote: Quote = decode_json(&response)?;

        self.quote_cache.put(&quote, &quote.price_token);
        Ok(quote)
    }

    /// Submit every record of the batch in one bulk withdrawal.
    pub async fn upload_bulk_payout(
        &self,
        batch: &TransferBatch,
    ) -> Result<Vec<TransferOutcome>, CustodianError> {
        let quote = self.fetch_quote(&self.product_code, true).await?;
        let payload = self.bulk_payload(batch, &quote)?;
        let outcomes = self.post_bulk(BULK_WITHDRAW_PATH, &payload).await?;
        info!(
            custodian = %CustodianId::Torii,
            submitted = outcomes.len(),
            dry_run = payload.dry_run,
            "bulk payout uploaded"
        );
        Ok(outcomes)
    }

    /// Re-ask the provider for the settlement status of every record.
    ///
    /// The status endpoint takes the same withdrawal payload as the
    /// submission, so the batch (and a valid price token) travel again.
    pub async fn check_payout_status(
        &self,
        batch: &TransferBatch,
    ) -> Result<Vec<TransferOutcome>, CustodianError> {
        let quote = self.fetch_quote(&self.product_code, true).await?;
        let payload = self.bulk_payload(batch, &quote)?;
        self.post_bulk(BULK_STATUS_PATH, &payload).await
    }

    /// Balance snapshot per currency code.
    pub async fn check_inventory(
        &self,
    ) -> Result<HashMap<String, InventoryEntry>, CustodianError> {
        let request = HttpRequest::get(join_url(&self.base_url, INVENTORY_PATH));
        let response = self.send_authorized(request).await?;
        let response = screen(response)?;
        let decoded: InventoryResponse = decode_json(&response)?;
        Ok(decoded
            .inventory
            .into_iter()
            .map(|entry| (entry.currency_code.clone(), entry))
            .collect())
    }

    /// Spawn a background task exporting available balances as gauges.
    ///
    /// Polls once per `every` until `shutdown` observes `true` or the
    /// sender is dropped. A panic inside one poll is caught and logged;
    /// the watcher keeps running.
    pub fn watch_balance(
        &self,
        every: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(panic) =
                            AssertUnwindSafe(client.poll_balances()).catch_unwind().await
                        {
                            let detail = panic_message(&panic);
                            error!(custodian = %CustodianId::Torii, detail, "balance poll panicked");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!(custodian = %CustodianId::Torii, "balance watcher stopping");
                            break;
                        }
                    }
                }
            }
        })
    }

    async fn poll_balances(&self) {
        match self.check_inventory().await {
            Ok(inventory) => {
                for (currency, entry) in &inventory {
                    if let Some(available) = entry.available.to_f64() {
                        self.metrics.gauge(
                            "custodian_balance_available",
                            &[
                                ("custodian", CustodianId::Torii.as_str()),
                                ("currency", currency),
                            ],
                            available,
                        );
                    }
                }
            }
            Err(error) => {
                warn!(custodian = %CustodianId::Torii, error = %error, "balance poll failed");
            }
        }
    }

    async fn post_bulk(
        &self,
        path: &str,
        payload: &BulkWithdrawRequest,
    ) -> Result<Vec<TransferOutcome>, CustodianError> {
        let body = serde_json::to_string(payload).map_err(|e| {
            CustodianError::internal(format!("bulk payload serialization failed: {e}"))
        })?;
        let request = HttpRequest::post(join_url(&self.base_url, path)).with_json_body(body);

        let response = self.send_authorized(request).await?;
        let response = screen(response)?;
        let decoded: BulkWithdrawResponse = decode_json(&response)?;
        if decoded.dry_run {
            debug!(custodian = %CustodianId::Torii, "provider answered in dry-run mode");
        }
        Ok(map_outcomes(decoded))
    }

    /// Build the withdrawal list, enforcing the notional cap per record
    /// at the quoted rate.
    fn bulk_payload(
        &self,
        batch: &TransferBatch,
        quote: &Quote,
    ) -> Result<BulkWithdrawRequest, CustodianError> {
        let mut withdrawals = Vec::with_capacity(batch.len());
        for record in batch.records() {
            let notional = record.amount().as_decimal() * quote.rate;
            if notional > self.transfer_cap {
                return Err(ValidationError::TransferCapExceeded {
                    amount: notional.normalize().to_string(),
                    cap: self.transfer_cap.to_string(),
                }
                .into());
            }
            withdrawals.push(WithdrawalRequest {
                currency_code: record.currency().to_string(),
                amount: record.amount().wire_value(),
                deposit_id: record.destination().to_string(),
                transfer_id: record.id().to_string(),
                source_from: self.source_from.clone(),
            });
        }

        Ok(BulkWithdrawRequest {
            dry_run: self.dry_run.is_some(),
            dry_run_option: self.dry_run.clone(),
            price_token: quote.price_token.clone(),
            withdrawals,
        })
    }
}

impl Custodian for ToriiClient {
    fn id(&self) -> CustodianId {
        CustodianId::Torii
    }

    fn submit_bulk<'a>(
        &'a self,
        batch: &'a TransferBatch,
    ) -> CustodianFuture<'a, Vec<TransferOutcome>> {
        Box::pin(self.upload_bulk_payout(batch))
    }

    fn check_status<'a>(
        &'a self,
        batch: &'a TransferBatch,
    ) -> CustodianFuture<'a, Vec<TransferOutcome>> {
        Box::pin(self.check_payout_status(batch))
    }
}

fn map_outcomes(response: BulkWithdrawResponse) -> Vec<TransferOutcome> {
    response
        .withdrawals
        .into_iter()
        .map(|w| {
            let status = map_transfer_status(&w.transfer_status);
            let outcome = TransferOutcome::new(&w.transfer_id, status, &w.transfer_status);
            match w.message.filter(|m| !m.is_empty()) {
                Some(message) => outcome.with_note(message),
                None => outcome,
            }
        })
        .collect()
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("opaque panic payload")
}
