//! Domain model for payout batches: validated amounts, whitelisted origin
//! tags, immutable transfer batches, and the canonical status vocabulary.

pub mod amount;
pub mod status;
pub mod transfer;

pub use amount::{Amount, MAX_SCALE, ROUND_TRIP_TOLERANCE};
pub use status::{PayoutStatus, TransferOutcome};
pub use transfer::{OriginTag, TransferBatch, TransferRecord};
