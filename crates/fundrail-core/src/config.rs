//! Environment-sourced configuration.
//!
//! Every custodian is configured through its own named `FUNDRAIL_*`
//! variables, validated at client construction. Missing required material
//! fails fast with a [`ConfigError`] naming the variable; a half-configured
//! client is never handed to the caller.

use std::env;
use std::sync::Arc;

use crate::error::ConfigError;
use crate::http_client::{HttpClient, ReqwestHttpClient};

pub const PROXY_URL: &str = "FUNDRAIL_PROXY_URL";
pub const QUOTE_CACHE_PATH: &str = "FUNDRAIL_QUOTE_CACHE_PATH";

pub const TORII_URL: &str = "FUNDRAIL_TORII_URL";
pub const TORII_CLIENT_ID: &str = "FUNDRAIL_TORII_CLIENT_ID";
pub const TORII_CLIENT_SECRET: &str = "FUNDRAIL_TORII_CLIENT_SECRET";
pub const TORII_EXTRA_CLIENT_SECRET: &str = "FUNDRAIL_TORII_EXTRA_CLIENT_SECRET";
pub const TORII_SOURCE_FROM: &str = "FUNDRAIL_TORII_SOURCE_FROM";
pub const TORII_TRANSFER_CAP: &str = "FUNDRAIL_TORII_TRANSFER_CAP";

pub const ZENITH_URL: &str = "FUNDRAIL_ZENITH_URL";
pub const ZENITH_API_KEY: &str = "FUNDRAIL_ZENITH_API_KEY";
pub const ZENITH_SIGNING_KEY: &str = "FUNDRAIL_ZENITH_SIGNING_KEY";
pub const ZENITH_TRANSFER_CAP: &str = "FUNDRAIL_ZENITH_TRANSFER_CAP";

pub const MERIDIAN_URL: &str = "FUNDRAIL_MERIDIAN_URL";
pub const MERIDIAN_API_KEY: &str = "FUNDRAIL_MERIDIAN_API_KEY";
pub const MERIDIAN_API_SECRET: &str = "FUNDRAIL_MERIDIAN_API_SECRET";
pub const MERIDIAN_SUBMIT_TYPE: &str = "FUNDRAIL_MERIDIAN_SUBMIT_TYPE";

pub const SCRIP_URL: &str = "FUNDRAIL_SCRIP_URL";
pub const SCRIP_TOKEN: &str = "FUNDRAIL_SCRIP_TOKEN";

/// Read a required variable, failing fast when unset or empty.
pub fn require_env(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingEnv { name }),
    }
}

/// Read an optional variable; empty values count as unset.
pub fn optional_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Build the production transport, routed through `FUNDRAIL_PROXY_URL`
/// when one is configured.
pub fn transport_from_env() -> Result<Arc<dyn HttpClient>, ConfigError> {
    match optional_env(PROXY_URL) {
        Some(proxy) => Ok(Arc::new(ReqwestHttpClient::with_proxy(&proxy)?)),
        None => Ok(Arc::new(ReqwestHttpClient::new())),
    }
}
