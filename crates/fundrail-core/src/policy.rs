use std::time::Duration;

use crate::custodian::CustodianId;

/// Request-pacing and retry descriptors for one custodian.
///
/// fundrail never sleeps or retries on its own; these describe what the
/// caller's retry loop should do with a `retryable` error.
#[derive(Debug, Clone, PartialEq)]
pub struct CustodianPolicy {
    pub custodian: CustodianId,
    pub max_concurrency: usize,
    pub quota_window: Duration,
    pub quota_limit: u32,
    pub retry_backoff: BackoffPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub max_retries: u32,
}

impl CustodianPolicy {
    /// Torii allows 500 private-API calls per 5 minutes per credential.
    pub fn torii_default() -> Self {
        Self {
            custodian: CustodianId::Torii,
            max_concurrency: 4,
            quota_window: Duration::from_secs(300),
            quota_limit: 500,
            retry_backoff: BackoffPolicy {
                initial_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(60),
                multiplier: 2.0,
                max_retries: 3,
            },
        }
    }

    pub fn zenith_default() -> Self {
        Self {
            custodian: CustodianId::Zenith,
            max_concurrency: 2,
            quota_window: Duration::from_secs(60),
            quota_limit: 100,
            retry_backoff: BackoffPolicy {
                initial_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(30),
                multiplier: 2.0,
                max_retries: 3,
            },
        }
    }

    /// Meridian's private endpoints allow 600 requests per minute.
    pub fn meridian_default() -> Self {
        Self {
            custodian: CustodianId::Meridian,
            max_concurrency: 10,
            quota_window: Duration::from_secs(60),
            quota_limit: 600,
            retry_backoff: BackoffPolicy {
                initial_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(30),
                multiplier: 2.0,
                max_retries: 3,
            },
        }
    }

    pub fn default_for(custodian: CustodianId) -> Option<Self> {
        match custodian {
            CustodianId::Torii => Some(Self::torii_default()),
            CustodianId::Zenith => Some(Self::zenith_default()),
            CustodianId::Meridian => Some(Self::meridian_default()),
            // Scrip is an internal service without a published quota.
            CustodianId::Scrip => None,
        }
    }
}
