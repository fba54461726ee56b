use crate::config::Settings;
use crate::models::Quote;

/// Fixed profit floor added on top of the spread when pricing the sell
pub const MIN_PROFIT_FLOOR: f64 = 0.001;

/// Round to whole cents
pub fn round_cents(price: f64) -> f64 {
    (price * 100.0).round() / 100.0
}

/// Limit buy price `spread_percent` under the current bid
pub fn compute_bid(quote: &Quote, spread_percent: f64) -> f64 {
    round_cents(quote.bid_price * (1.0 - spread_percent))
}

/// Limit sell price above the fill, covering the spread plus the profit floor
pub fn compute_ask(fill_price: f64, spread_percent: f64) -> f64 {
    round_cents(fill_price * (1.0 + MIN_PROFIT_FLOOR + spread_percent))
}

/// True when the bid is too close to the recent high to be worth placing
pub fn ceiling_guard(
    candidate_bid: f64,
    max_price_over_window: f64,
    max_bid_fraction: f64,
) -> bool {
    candidate_bid >= max_bid_fraction * max_price_over_window
}

/// Quantity affordable with `cash` at `bid_price`, rounded down to `decimals` places
pub fn order_quantity(cash: f64, bid_price: f64, decimals: u32) -> f64 {
    if bid_price <= 0.0 {
        return 0.0;
    }
    let scale = 10f64.powi(decimals as i32);
    (cash / bid_price * scale).floor() / scale
}

/// Bid/ask pricing with the configured parameters
#[derive(Debug, Clone, Copy)]
pub struct PriceBand {
    pub spread_percent: f64,
    pub max_bid_fraction: f64,
    pub quantity_decimals: u32,
}

impl PriceBand {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            spread_percent: settings.spread_percent,
            max_bid_fraction: settings.max_bid_fraction,
            quantity_decimals: settings.quantity_decimals,
        }
    }

    pub fn bid(&self, quote: &Quote) -> f64 {
        compute_bid(quote, self.spread_percent)
    }

    pub fn ask(&self, fill_price: f64) -> f64 {
        compute_ask(fill_price, self.spread_percent)
    }

    pub fn too_expensive(&self, bid: f64, max_price_over_window: f64) -> bool {
        ceiling_guard(bid, max_price_over_window, self.max_bid_fraction)
    }

    pub fn quantity(&self, cash: f64, bid: f64) -> f64 {
        order_quantity(cash, bid, self.quantity_decimals)
    }
}
