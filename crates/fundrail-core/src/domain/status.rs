use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Canonical settlement status exposed to callers.
///
/// Every provider-specific status vocabulary maps into exactly these four
/// states; strings outside a provider's table resolve to `Unknown`, never
/// to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    Pending,
    Complete,
    Failed,
    Unknown,
}

impl PayoutStatus {
    pub const ALL: [Self; 4] = [Self::Pending, Self::Complete, Self::Failed, Self::Unknown];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }

    /// Terminal states end an item's lifecycle; pending and unknown items
    /// stay eligible for further status checks.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl Display for PayoutStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayoutStatus {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "complete" => Ok(Self::Complete),
            "failed" => Ok(Self::Failed),
            "unknown" => Ok(Self::Unknown),
            _ => Err(()),
        }
    }
}

/// Per-item reconciliation result from a bulk status check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub transfer_id: String,
    pub status: PayoutStatus,
    /// Raw provider status string, preserved for audit trails.
    pub provider_status: String,
    /// Failure reason when the provider supplies one.
    pub note: Option<String>,
}

impl TransferOutcome {
    pub fn new(
        transfer_id: impl Into<String>,
        status: PayoutStatus,
        provider_status: impl Into<String>,
    ) -> Self {
        Self {
            transfer_id: transfer_id.into(),
            status,
            provider_status: provider_status.into(),
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}
