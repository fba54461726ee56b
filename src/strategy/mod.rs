// Target selection and pricing
pub mod moving_average_cross;
pub mod price_band;
pub mod volatility_ranker;

pub use moving_average_cross::{purchase_decision, MovingAverageCross};
pub use price_band::{
    ceiling_guard, compute_ask, compute_bid, order_quantity, round_cents, PriceBand,
};
pub use volatility_ranker::{pick_most_volatile, RankedSecurity, SelectionMode, VolatilityRanker};

use crate::models::Signal;
use crate::Result;

/// Base trait for signal strategies over close prices
pub trait Strategy: Send + Sync {
    /// Generate a trading signal from closes, oldest first
    fn generate_signal(&self, closes: &[f64]) -> Result<Signal>;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum closes required for this strategy
    fn min_samples_required(&self) -> usize;
}
