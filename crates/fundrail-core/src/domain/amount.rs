use std::fmt::{Display, Formatter};
use std::str::FromStr;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use crate::error::ValidationError;

/// Maximum decimal digits of scale a payout amount may carry.
pub const MAX_SCALE: u32 = 8;

/// Absolute tolerance for the float round-trip check: 1e-8.
pub const ROUND_TRIP_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 8);

/// A validated payout amount.
///
/// Several custodian APIs only accept floating-point amounts on the wire.
/// An `Amount` is constructed from exact decimal input and proves at
/// construction time that converting to `f64` and back reproduces the
/// original value within 1e-8; amounts that fail the round-trip are
/// rejected before any network call rather than silently losing
/// precision. The validated `f64` is kept alongside so the wire value
/// never has to be recomputed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Amount {
    value: Decimal,
    wire: f64,
}

impl Amount {
    pub fn from_decimal(value: Decimal) -> Result<Self, ValidationError> {
        let value = value.normalize();
        if value <= Decimal::ZERO {
            return Err(ValidationError::AmountNotPositive {
                value: value.to_string(),
            });
        }
        if value.scale() > MAX_SCALE {
            return Err(ValidationError::AmountScaleTooLarge {
                value: value.to_string(),
            });
        }

        let wire = value
            .to_f64()
            .ok_or_else(|| ValidationError::AmountPrecisionLoss {
                value: value.to_string(),
            })?;
        let round_tripped =
            Decimal::from_f64(wire).ok_or_else(|| ValidationError::AmountPrecisionLoss {
                value: value.to_string(),
            })?;
        let drift = (value - round_tripped).abs();
        if drift > ROUND_TRIP_TOLERANCE {
            return Err(ValidationError::AmountPrecisionLoss {
                value: value.to_string(),
            });
        }

        Ok(Self { value, wire })
    }

    /// Convert an integer minor-unit amount (`minor` units at `scale`
    /// decimal places) into a validated amount.
    pub fn from_minor_units(minor: i64, scale: u32) -> Result<Self, ValidationError> {
        if scale > MAX_SCALE {
            return Err(ValidationError::AmountScaleTooLarge {
                value: format!("{minor}e-{scale}"),
            });
        }
        Self::from_decimal(Decimal::new(minor, scale))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.value
    }

    /// Floating-point value sent to custodians that refuse exact decimals.
    /// Already proven to round-trip within tolerance.
    pub const fn wire_value(&self) -> f64 {
        self.wire
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.value, f)
    }
}

impl FromStr for Amount {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let decimal =
            Decimal::from_str(value.trim()).map_err(|_| ValidationError::AmountUnparseable {
                value: value.to_owned(),
            })?;
        Self::from_decimal(decimal)
    }
}
