//! Order quantity normalization.
//!
//! Converts a quote-currency notional into a base-asset quantity the
//! exchange will accept under its LOT_SIZE filter.

use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;
use tracing::debug;

use crate::types::LotConstraint;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    /// Rounded quantity is below the exchange minimum. Expected when the
    /// notional is small relative to price; not a fault.
    #[error("quantity {quantity} is below minimum {min}")]
    Insufficient { quantity: Decimal, min: Decimal },

    #[error("price must be positive, got {0}")]
    InvalidPrice(Decimal),

    #[error("step size must be positive, got {0}")]
    InvalidStepSize(Decimal),
}

/// Compute `notional / price`, rounded half-up to the step size precision.
///
/// Precision is the count of significant fractional digits in
/// `constraint.step_size` (`0.00001` → 5, `0.00010` → 4, `1` → 0).
pub fn normalize(
    notional: Decimal,
    price: Decimal,
    constraint: &LotConstraint,
) -> Result<Decimal, QuantityError> {
    if price <= Decimal::ZERO {
        return Err(QuantityError::InvalidPrice(price));
    }
    if constraint.step_size <= Decimal::ZERO {
        return Err(QuantityError::InvalidStepSize(constraint.step_size));
    }

    let raw = notional / price;
    let precision = constraint.precision();
    let quantity = raw
        .round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero)
        .normalize();

    debug!(%raw, precision, %quantity, "Quantity normalized");

    if quantity < constraint.min_quantity {
        return Err(QuantityError::Insufficient {
            quantity,
            min: constraint.min_quantity,
        });
    }
    Ok(quantity)
}
