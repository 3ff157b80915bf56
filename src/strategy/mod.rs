//! Buy gating — quantity normalization, purchase throttle, and the
//! dip/recurring decision engine.

pub mod decision;
pub mod quantity;
pub mod throttle;

pub use decision::{DecisionConfig, DecisionEngine};
pub use quantity::{normalize, QuantityError};
