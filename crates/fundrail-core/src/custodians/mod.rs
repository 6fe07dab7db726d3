//! Provider-specific custodian clients.
//!
//! One module per custodian, each owning its wire formats, signing wiring,
//! and provider-status table. All of them speak through the
//! [`HttpClient`](crate::http_client::HttpClient) trait and surface
//! failures as [`CustodianError`].

pub mod meridian;
pub mod scrip;
pub mod torii;
pub mod zenith;

use serde::de::DeserializeOwned;

use crate::classify::CustodianError;
use crate::http_client::HttpResponse;

/// Decode a screened response body, reporting undecodable bodies as
/// protocol errors carrying the HTTP status.
pub(crate) fn decode_json<T: DeserializeOwned>(
    response: &HttpResponse,
) -> Result<T, CustodianError> {
    response
        .decode()
        .map_err(|e| CustodianError::protocol(response.status, e.message().to_string()))
}
