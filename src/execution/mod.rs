// Order execution and the trading loops
pub mod cycle;
pub mod market_data;
pub mod movavg_trader;
pub mod order_lifecycle;
pub mod speculator;

pub use cycle::{upstream_backoff, CycleContext, Shutdown, ShutdownTrigger};
pub use market_data::MarketDataGateway;
pub use movavg_trader::{Book, MovingAverageTrader};
pub use order_lifecycle::{
    truncate_last_digit, BuyOutcome, LifecycleConfig, OrderLifecycleController, SellOutcome,
};
pub use speculator::{SessionStats, Speculator};
