//! The polymorphic custodian capability.
//!
//! Each provider client hand-rolls its own wire formats and signing, but
//! callers see one capability: submit a validated batch, reconcile its
//! status in the canonical vocabulary. Clients are selected at
//! construction by a registry keyed on custodian name.

use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::classify::CustodianError;
use crate::config;
use crate::custodians::meridian::{MeridianClient, MeridianConfig};
use crate::custodians::torii::{ToriiClient, ToriiConfig};
use crate::custodians::zenith::{ZenithClient, ZenithConfig};
use crate::domain::{TransferBatch, TransferOutcome};
use crate::error::{ConfigError, ValidationError};
use crate::http_client::{HttpClient, NoopHttpClient};

/// Canonical custodian identifiers used in configuration and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustodianId {
    Torii,
    Zenith,
    Meridian,
    Scrip,
}

impl CustodianId {
    pub const ALL: [Self; 4] = [Self::Torii, Self::Zenith, Self::Meridian, Self::Scrip];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Torii => "torii",
            Self::Zenith => "zenith",
            Self::Meridian => "meridian",
            Self::Scrip => "scrip",
        }
    }
}

impl Display for CustodianId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CustodianId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "torii" => Ok(Self::Torii),
            "zenith" => Ok(Self::Zenith),
            "meridian" => Ok(Self::Meridian),
            "scrip" => Ok(Self::Scrip),
            other => Err(ValidationError::InvalidCustodian {
                value: other.to_owned(),
            }),
        }
    }
}

pub type CustodianFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, CustodianError>> + Send + 'a>>;

/// Bulk payout capability shared by the fund-moving custodians.
///
/// Batches arrive pre-validated ([`TransferBatch`] construction is
/// fail-fast); implementations translate them to provider wire formats,
/// attach authentication, and map provider statuses back to the
/// canonical four-state vocabulary.
pub trait Custodian: Send + Sync + Debug {
    fn id(&self) -> CustodianId;

    /// Submit the whole batch in one provider bulk call and report each
    /// item's initial status.
    fn submit_bulk<'a>(
        &'a self,
        batch: &'a TransferBatch,
    ) -> CustodianFuture<'a, Vec<TransferOutcome>>;

    /// Reconcile current settlement status for every item in the batch.
    fn check_status<'a>(
        &'a self,
        batch: &'a TransferBatch,
    ) -> CustodianFuture<'a, Vec<TransferOutcome>>;
}

/// Payout-custodian registry keyed on custodian name.
pub struct CustodianRegistry {
    clients: HashMap<CustodianId, Arc<dyn Custodian>>,
}

impl CustodianRegistry {
    pub fn new(clients: Vec<Arc<dyn Custodian>>) -> Self {
        let clients = clients.into_iter().map(|c| (c.id(), c)).collect();
        Self { clients }
    }

    pub fn get(&self, id: CustodianId) -> Option<Arc<dyn Custodian>> {
        self.clients.get(&id).cloned()
    }

    /// Resolve a custodian, erroring the way a misconfigured payout run
    /// should: immediately and non-retryably.
    pub fn require(&self, id: CustodianId) -> Result<Arc<dyn Custodian>, CustodianError> {
        self.get(id)
            .ok_or_else(|| CustodianError::config(format!("custodian '{id}' is not registered")))
    }

    pub fn ids(&self) -> Vec<CustodianId> {
        let mut ids: Vec<CustodianId> = self.clients.keys().copied().collect();
        ids.sort_by_key(|id| id.as_str());
        ids
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

/// Builder assembling a [`CustodianRegistry`] from configuration.
///
/// `from_env` registers every payout custodian whose `FUNDRAIL_<NAME>_URL`
/// is set, and fails fast when a configured custodian is missing the rest
/// of its credential bundle. Scrip is not registered here: token
/// issuance/redemption is not a bulk-payout capability and has its own
/// client.
#[derive(Default)]
pub struct CustodianRegistryBuilder {
    transport: Option<Arc<dyn HttpClient>>,
    use_mock: bool,
    manual: Vec<Arc<dyn Custodian>>,
}

impl CustodianRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the no-op transport, for wiring tests that never hit the
    /// network.
    pub fn with_mock_mode(mut self) -> Self {
        self.use_mock = true;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn HttpClient>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Register an already-built client, overriding anything the
    /// environment would configure for its id.
    pub fn with_custodian(mut self, custodian: Arc<dyn Custodian>) -> Self {
        self.manual.push(custodian);
        self
    }

    pub fn build(self) -> Result<CustodianRegistry, ConfigError> {
        let transport: Arc<dyn HttpClient> = match (&self.transport, self.use_mock) {
            (_, true) => Arc::new(NoopHttpClient),
            (Some(transport), false) => Arc::clone(transport),
            (None, false) => config::transport_from_env()?,
        };

        let manual_ids: Vec<CustodianId> = self.manual.iter().map(|c| c.id()).collect();
        let mut clients: Vec<Arc<dyn Custodian>> = self.manual;

        if config::optional_env(config::TORII_URL).is_some()
            && !manual_ids.contains(&CustodianId::Torii)
        {
            let client = ToriiClient::new(ToriiConfig::from_env()?, Arc::clone(&transport));
            clients.push(Arc::new(client));
        }
        if config::optional_env(config::ZENITH_URL).is_some()
            && !manual_ids.contains(&CustodianId::Zenith)
        {
            let client = ZenithClient::new(ZenithConfig::from_env()?, Arc::clone(&transport))?;
            clients.push(Arc::new(client));
        }
        if config::optional_env(config::MERIDIAN_URL).is_some()
            && !manual_ids.contains(&CustodianId::Meridian)
        {
            let client = MeridianClient::new(MeridianConfig::from_env()?, Arc::clone(&transport));
            clients.push(Arc::new(client));
        }

        Ok(CustodianRegistry::new(clients))
    }
}
