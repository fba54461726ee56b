// Technical indicators module
// Moving averages and bar-range volatility

pub mod moving_average;
pub mod volatility;

pub use moving_average::{calculate_sma, moving_average};
pub use volatility::{average_range_percent, max_high, trailing};
