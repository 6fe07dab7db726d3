use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::amount::Amount;
use crate::error::ValidationError;

/// Namespace for deterministic ids of collapsed transfers.
const COLLAPSE_NAMESPACE: Uuid = Uuid::from_u128(0x5b208c1d_e1c4_4799_bcc2_0b08b9c660f5);

/// Whitelisted classification of why funds leave the system.
///
/// Used for compliance/accounting segregation; anything outside this set
/// is rejected before a batch touches the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OriginTag {
    Tipping,
    AdRewards,
    UserDrain,
}

impl OriginTag {
    pub const ALL: [Self; 3] = [Self::Tipping, Self::AdRewards, Self::UserDrain];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tipping => "tipping",
            Self::AdRewards => "ad-rewards",
            Self::UserDrain => "user-drain",
        }
    }
}

impl Display for OriginTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OriginTag {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tipping" => Ok(Self::Tipping),
            "ad-rewards" => Ok(Self::AdRewards),
            "user-drain" => Ok(Self::UserDrain),
            other => Err(ValidationError::InvalidOriginTag {
                value: other.to_owned(),
            }),
        }
    }
}

/// One domestic transfer instruction.
///
/// Immutable once built; the id stays stable across submission and status
/// checks so callers can reconcile outcomes.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRecord {
    id: String,
    destination: String,
    amount: Amount,
    origin: OriginTag,
    currency: String,
}

impl TransferRecord {
    /// Build a record from the raw fields a payout request carries.
    /// Amount and origin tag are parsed and validated here, so an invalid
    /// item can never enter a batch.
    pub fn new(
        id: impl Into<String>,
        destination: impl Into<String>,
        amount: &str,
        origin: &str,
        currency: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ValidationError::EmptyTransferId);
        }
        let destination = destination.into();
        if destination.trim().is_empty() {
            return Err(ValidationError::EmptyDestination);
        }
        Ok(Self {
            id,
            destination,
            amount: amount.parse()?,
            origin: origin.parse()?,
            currency: currency.into(),
        })
    }

    /// Build a record from already-typed parts.
    pub fn from_parts(
        id: impl Into<String>,
        destination: impl Into<String>,
        amount: Amount,
        origin: OriginTag,
        currency: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ValidationError::EmptyTransferId);
        }
        let destination = destination.into();
        if destination.trim().is_empty() {
            return Err(ValidationError::EmptyDestination);
        }
        Ok(Self {
            id,
            destination,
            amount,
            origin,
            currency: currency.into(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub const fn amount(&self) -> Amount {
        self.amount
    }

    pub const fn origin(&self) -> OriginTag {
        self.origin
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }
}

/// An immutable batch of transfer instructions.
///
/// Construction is fail-fast: the first invalid item rejects the whole
/// batch and nothing is submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferBatch {
    records: Vec<TransferRecord>,
}

impl TransferBatch {
    pub fn new(records: Vec<TransferRecord>) -> Result<Self, ValidationError> {
        if records.is_empty() {
            return Err(ValidationError::EmptyBatch);
        }
        Ok(Self { records })
    }

    /// Build a batch from raw `(id, destination, amount, origin)` rows in
    /// a single currency. Stops at the first invalid row.
    pub fn from_rows<'a, I>(rows: I, currency: &str) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (&'a str, &'a str, &'a str, &'a str)>,
    {
        let mut records = Vec::new();
        for (id, destination, amount, origin) in rows {
            records.push(TransferRecord::new(id, destination, amount, origin, currency)?);
        }
        Self::new(records)
    }

    pub fn records(&self) -> &[TransferRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sum of all record amounts, exact.
    pub fn total(&self) -> Decimal {
        self.records
            .iter()
            .map(|r| r.amount().as_decimal())
            .sum()
    }

    /// Split into submission chunks of at most `max_items` records each.
    pub fn chunked(&self, max_items: usize) -> Vec<&[TransferRecord]> {
        if max_items == 0 {
            return vec![self.records.as_slice()];
        }
        self.records.chunks(max_items).collect()
    }

    /// Merge records sharing a (destination, currency) pair into a single
    /// record carrying the summed amount.
    ///
    /// Custodians treat a destination as one ledger entry per request, so
    /// duplicate destinations in one bulk call would collide. The merged
    /// record's id is deterministic: a v5 UUID over the sorted source ids,
    /// reproducible on resubmission. The first record's origin tag is
    /// kept; mixing origins for one destination is the caller's call to
    /// avoid.
    pub fn collapse_by_destination(&self) -> Result<Self, ValidationError> {
        let mut groups: BTreeMap<(String, String), Vec<&TransferRecord>> = BTreeMap::new();
        for record in &self.records {
            groups
                .entry((record.destination.clone(), record.currency.clone()))
                .or_default()
                .push(record);
        }

        let mut collapsed = Vec::with_capacity(groups.len());
        for ((destination, currency), members) in groups {
            if members.len() == 1 {
                collapsed.push(members[0].clone());
                continue;
            }

            let mut source_ids: Vec<&str> = members.iter().map(|r| r.id.as_str()).collect();
            source_ids.sort_unstable();
            let joined = source_ids.join(",");
            let id = Uuid::new_v5(&COLLAPSE_NAMESPACE, joined.as_bytes()).to_string();

            let total: Decimal = members.iter().map(|r| r.amount.as_decimal()).sum();
            let amount = Amount::from_decimal(total)?;

            collapsed.push(TransferRecord {
                id,
                destination,
                amount,
                origin: members[0].origin,
                currency,
            });
        }

        Self::new(collapsed)
    }
}
