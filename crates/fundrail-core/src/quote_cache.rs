//! File-backed quote cache.
//!
//! A fetched quote carries a price token that embeds its own expiry; the
//! cache persists the quote next to that decoded expiry and serves it in
//! place of a network call while unexpired. Caching is an optimization,
//! never a correctness boundary: corrupt or unwritable state degrades to
//! a miss, and concurrent writers are last-write-wins.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, warn};

pub const DEFAULT_CACHE_PATH: &str = "./fundrail-quote.json";

/// Persisted record wrapping a quote with its decoded expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SavedQuote<Q> {
    body: Q,
    #[serde(with = "time::serde::rfc3339")]
    expiry: OffsetDateTime,
}

/// Single-file quote cache.
#[derive(Debug, Clone)]
pub struct QuoteCache {
    path: PathBuf,
}

impl Default for QuoteCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_PATH)
    }
}

impl QuoteCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cached quote, treating absent, corrupt, or expired
    /// records as a miss.
    pub fn get<Q: DeserializeOwned>(&self) -> Option<Q> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "quote cache unreadable");
                return None;
            }
        };

        let saved: SavedQuote<Q> = match serde_json::from_str(&raw) {
            Ok(saved) => saved,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "quote cache corrupt, treating as miss");
                return None;
            }
        };

        if saved.expiry <= OffsetDateTime::now_utc() {
            debug!(path = %self.path.display(), expiry = %saved.expiry, "cached quote expired");
            return None;
        }

        Some(saved.body)
    }

    /// Persist a quote, deriving the expiry from its price token.
    ///
    /// Best-effort: an undecodable token or a write failure skips caching
    /// and never surfaces to the caller.
    pub fn put<Q: Serialize>(&self, quote: &Q, price_token: &str) {
        let Some(expiry) = token_expiry(price_token) else {
            debug!("price token has no decodable expiry, skipping cache write");
            return;
        };

        let saved = SavedQuote {
            body: quote,
            expiry,
        };
        let serialized = match serde_json::to_string(&saved) {
            Ok(serialized) => serialized,
            Err(e) => {
                warn!(error = %e, "quote not serializable, skipping cache write");
                return;
            }
        };

        if let Err(e) = std::fs::write(&self.path, serialized) {
            warn!(path = %self.path.display(), error = %e, "quote cache write failed");
        }
    }
}

#[derive(Deserialize)]
struct ExpClaim {
    exp: i64,
}

/// Decode the `exp` claim from a JWT-shaped price token without verifying
/// the signature. The token is opaque authorization material; only its
/// lifetime matters here.
fn token_expiry(price_token: &str) -> Option<OffsetDateTime> {
    let payload_segment = price_token.split('.').nth(1)?;
    let payload = URL_SAFE_NO_PAD.decode(payload_segment).ok()?;
    let claim: ExpClaim = serde_json::from_slice(&payload).ok()?;
    OffsetDateTime::from_unix_timestamp(claim.exp).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct FakeQuote {
        product_code: String,
        rate: f64,
        price_token: String,
    }

    fn token_with_exp(exp: i64) -> String {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{exp}}}"#));
        format!("{header}.{payload}.sig")
    }

    fn quote(token: String) -> FakeQuote {
        FakeQuote {
            product_code: String::from("BTC_JPY"),
            rate: 6_500_000.0,
            price_token: token,
        }
    }

    #[test]
    fn round_trips_an_unexpired_quote() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = QuoteCache::new(dir.path().join("quote.json"));

        let future = OffsetDateTime::now_utc().unix_timestamp() + 600;
        let original = quote(token_with_exp(future));
        cache.put(&original, &original.price_token);

        let cached: FakeQuote = cache.get().expect("unexpired quote is served");
        assert_eq!(cached, original);
    }

    #[test]
    fn expired_record_is_a_miss() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = QuoteCache::new(dir.path().join("quote.json"));

        let past = OffsetDateTime::now_utc().unix_timestamp() - 600;
        let original = quote(token_with_exp(past));
        cache.put(&original, &original.price_token);

        assert_eq!(cache.get::<FakeQuote>(), None);
    }

    #[test]
    fn absent_file_is_a_miss() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = QuoteCache::new(dir.path().join("missing.json"));
        assert_eq!(cache.get::<FakeQuote>(), None);
    }

    #[test]
    fn corrupt_record_is_a_miss_not_a_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("quote.json");
        std::fs::write(&path, "{not json").expect("write");

        let cache = QuoteCache::new(path);
        assert_eq!(cache.get::<FakeQuote>(), None);
    }

    #[test]
    fn token_without_expiry_skips_the_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("quote.json");
        let cache = QuoteCache::new(path.clone());

        cache.put(&quote(String::from("opaque-token")), "opaque-token");

        assert!(!path.exists(), "no record should be written");
    }

    #[test]
    fn expiry_decodes_from_the_token_payload_segment() {
        let expiry = token_expiry(&token_with_exp(1_700_000_000)).expect("decodable");
        assert_eq!(expiry.unix_timestamp(), 1_700_000_000);
        assert_eq!(token_expiry("garbage"), None);
        assert_eq!(token_expiry("a.!!!.c"), None);
    }
}
