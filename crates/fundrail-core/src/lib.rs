//! # Fundrail Core
//!
//! Authenticated custodian clients and payout orchestration for the
//! fundrail payout service.
//!
//! ## Overview
//!
//! This crate provides the foundational components for fundrail:
//!
//! - **Per-custodian signing strategies** (bearer-token refresh, RS256 JWT
//!   with body-hash claims, HMAC-SHA384 over base64 payloads)
//! - **A state-free error classifier** turning transport statuses and
//!   provider error bodies into stable codes with retry verdicts
//! - **Validated transfer batches** with origin-tag whitelisting and
//!   precision-checked amounts
//! - **A file-backed quote cache** keyed on the price token's own expiry
//! - **Custodian clients** (Torii, Zenith, Meridian, Scrip) behind one
//!   bulk-payout capability trait
//! - **Submission pacing** via a quota-based throttling queue
//!
//! ## Feature Flags
//!
//! | Flag | Description |
//! |------|-------------|
//! | `default` | Standard feature set |
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`classify`] | Error taxonomy, status-table classification, soft errors |
//! | [`config`] | Environment-sourced configuration loaders |
//! | [`custodian`] | `Custodian` capability trait, ids, registry |
//! | [`custodians`] | Provider clients (Torii, Zenith, Meridian, Scrip) |
//! | [`domain`] | Amounts, transfer records, batches, canonical statuses |
//! | [`error`] | Validation and configuration error types |
//! | [`http_client`] | HTTP transport abstraction (reqwest/noop) |
//! | [`metrics`] | Injected metrics sink |
//! | [`policy`] | Per-custodian throttling/backoff descriptors |
//! | [`quote_cache`] | File-backed price-quote cache |
//! | [`sign`] | Signing strategies and signed-request descriptors |
//! | [`throttle`] | Quota-based submission pacing |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use fundrail_core::{ReqwestHttpClient, ToriiClient, ToriiConfig, TransferBatch};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Configure the Torii client from FUNDRAIL_TORII_* variables
//!     let transport = Arc::new(ReqwestHttpClient::new());
//!     let torii = ToriiClient::new(ToriiConfig::from_env()?, transport);
//!
//!     // A batch validates amounts and origin tags up front
//!     let batch = TransferBatch::from_rows(
//!         vec![("tx-1", "deposit-9", "1.25", "tipping")],
//!         "BAT",
//!     )?;
//!
//!     for outcome in torii.upload_bulk_payout(&batch).await? {
//!         println!("{} -> {}", outcome.transfer_id, outcome.status);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────┐
//! │  Payout Service   │
//! └─────────┬─────────┘
//!           │
//!           ▼
//! ┌───────────────────┐     ┌───────────────────┐
//! │ CustodianRegistry │────▶│ ThrottlingQueue   │
//! └─────────┬─────────┘     └───────────────────┘
//!           │
//!           ▼
//! ┌───────────────────┐     ┌───────────────────┐
//! │ Custodian Client  │────▶│ Signing Strategy  │
//! │ (Torii, Zenith..) │     │ (bearer/jwt/hmac) │
//! └─────────┬─────────┘     └───────────────────┘
//!           │                         │
//!           ▼                         ▼
//! ┌───────────────────┐     ┌───────────────────┐
//! │ HTTP Transport    │────▶│ Error Classifier  │
//! │ (reqwest/noop)    │     │ (retry verdicts)  │
//! └───────────────────┘     └───────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! All operations return `Result` types with classified errors:
//!
//! ```rust
//! use fundrail_core::{CustodianError, CustodianErrorKind};
//!
//! fn handle_error(error: CustodianError) {
//!     match error.kind() {
//!         CustodianErrorKind::RateLimited | CustodianErrorKind::ServerError => {
//!             // Wait and retry
//!         }
//!         CustodianErrorKind::DuplicateRedemption => {
//!             // Permanently settled, never retry
//!         }
//!         CustodianErrorKind::Config | CustodianErrorKind::Validation => {
//!             // Fix configuration or input
//!         }
//!         _ => {}
//!     }
//! }
//! ```
//!
//! ## Security
//!
//! - Secret material is read from environment variables only and redacted
//!   from all `Debug` output
//! - Signed bodies ship byte-identical to what was hashed
//! - Input validation rejects a batch before any network call

pub mod classify;
pub mod config;
pub mod custodian;
pub mod custodians;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod metrics;
pub mod policy;
pub mod quote_cache;
pub mod sign;
pub mod throttle;

// Re-export commonly used types at crate root for convenience

// Custodian capability and registry
pub use custodian::{
    Custodian, CustodianFuture, CustodianId, CustodianRegistry, CustodianRegistryBuilder,
};

// Provider clients
pub use custodians::meridian::{Account, Balance, MeridianClient, MeridianConfig, PayoutResult};
pub use custodians::scrip::{
    CredentialRedemption, Issuer, ScripClient, ScripConfig, SignedCredentials,
};
pub use custodians::torii::{DryRunOptions, InventoryEntry, Quote, ToriiClient, ToriiConfig};
pub use custodians::zenith::{ZenithClient, ZenithConfig};

// Error classification
pub use classify::{
    classify, classify_transport, screen, CustodianError, CustodianErrorKind, ProviderErrorBody,
};

// Domain models
pub use domain::{
    Amount, OriginTag, PayoutStatus, TransferBatch, TransferOutcome, TransferRecord, MAX_SCALE,
    ROUND_TRIP_TOLERANCE,
};

// Error types
pub use error::{ConfigError, ValidationError};

// HTTP transport types
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, NoopHttpClient,
    ReqwestHttpClient, DEFAULT_TIMEOUT_MS,
};

// Metrics
pub use metrics::{MetricsSink, NoopMetrics};

// Throttling policies
pub use policy::{BackoffPolicy, CustodianPolicy};

// Quote cache
pub use quote_cache::{QuoteCache, DEFAULT_CACHE_PATH};

// Signing strategies
pub use sign::{
    JwtSigner, PayloadSigner, SignedRequest, SubmitType, TokenManager, TokenPayload, TokenResponse,
};

// Throttling
pub use throttle::ThrottlingQueue;
