use thiserror::Error;

/// Validation and contract errors exposed by `fundrail-core`.
///
/// Validation failures abort an operation before any network call and are
/// never retried by this layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("transfer batch cannot be empty")]
    EmptyBatch,
    #[error("transfer id cannot be empty")]
    EmptyTransferId,
    #[error("destination cannot be empty")]
    EmptyDestination,

    #[error("invalid origin tag '{value}', expected one of tipping, ad-rewards, user-drain")]
    InvalidOriginTag { value: String },

    #[error("amount '{value}' exceeds 8 decimal digits of precision")]
    AmountScaleTooLarge { value: String },
    #[error("amount '{value}' does not survive float round-trip within 1e-8")]
    AmountPrecisionLoss { value: String },
    #[error("amount must be positive: '{value}'")]
    AmountNotPositive { value: String },
    #[error("amount '{value}' is not a valid decimal")]
    AmountUnparseable { value: String },

    #[error("transfer of {amount} exceeds the per-request cap of {cap}")]
    TransferCapExceeded { amount: String, cap: String },

    #[error("invalid custodian '{value}', expected one of torii, zenith, meridian, scrip")]
    InvalidCustodian { value: String },
}

/// Configuration errors raised while constructing a custodian client.
///
/// Construction fails fast: a client with missing or malformed secret
/// material is never handed to the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required environment variable {name} is not set")]
    MissingEnv { name: &'static str },
    #[error("credential bundle for {custodian} is missing: {detail}")]
    MissingCredentials {
        custodian: &'static str,
        detail: &'static str,
    },
    #[error("signing key is not valid RSA PEM: {detail}")]
    InvalidSigningKey { detail: String },
    #[error("invalid submit type '{value}', expected one of none, hmac, oauth")]
    InvalidSubmitType { value: String },
    #[error("environment variable {name} holds an invalid value '{value}'")]
    InvalidEnvValue { name: &'static str, value: String },
    #[error("invalid proxy url '{value}'")]
    InvalidProxyUrl { value: String },
    #[error("invalid base url '{value}' for {custodian}")]
    InvalidBaseUrl { custodian: &'static str, value: String },
}
