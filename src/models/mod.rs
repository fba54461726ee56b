use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A tradeable asset symbol (e.g. "BTC")
///
/// Symbols are compared by exact equality everywhere; "ETC" and "ETH" never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Security(String);

impl Security {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Security {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Security {
    fn from(symbol: &str) -> Self {
        Self::new(symbol)
    }
}

/// OHLC bar for one interval, oldest-first in every sequence we hand out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl PriceBar {
    /// high >= max(open, close) and low <= min(open, close)
    pub fn is_consistent(&self) -> bool {
        self.high >= self.open.max(self.close) && self.low <= self.open.min(self.close)
    }

    /// Trading range of the bar
    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

/// Fresh bid/ask snapshot, never cached
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid_price: f64,
    pub ask_price: f64,
}

/// Trading signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

/// Bar width for historical queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    FiveMinute,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::FiveMinute => "5minute",
        }
    }

    pub fn minutes(&self) -> u64 {
        match self {
            Interval::FiveMinute => 5,
        }
    }
}

/// How far back a historical query reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Span {
    Day,
    Week,
}

impl Span {
    pub fn as_str(&self) -> &'static str {
        match self {
            Span::Day => "day",
            Span::Week => "week",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    /// Good til canceled
    Gtc,
}

/// Venue-reported order state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    Submitted,
    Confirmed,
    Filled,
    Canceled,
    Rejected,
    Unknown(String),
}

impl OrderState {
    /// Parse the venue's state string (case and whitespace insensitive)
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "submitted" | "queued" | "unconfirmed" => OrderState::Submitted,
            "confirmed" | "partially_filled" => OrderState::Confirmed,
            "filled" => OrderState::Filled,
            "canceled" | "cancelled" => OrderState::Canceled,
            "rejected" | "failed" => OrderState::Rejected,
            other => OrderState::Unknown(other.to_string()),
        }
    }
}

/// Limit order as submitted to the venue
#[derive(Debug, Clone, PartialEq)]
pub struct LimitOrder {
    pub security: Security,
    pub side: OrderSide,
    pub limit_price: f64,
    pub quantity: f64,
    pub time_in_force: TimeInForce,
}

/// Result of a status poll
#[derive(Debug, Clone, PartialEq)]
pub struct OrderStatus {
    pub state: OrderState,
    pub price: Option<f64>,
    pub quantity: Option<f64>,
}

/// Executed order details
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    pub price: f64,
    pub quantity: f64,
}

/// Holding reported by the venue
#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub security: Security,
    pub quantity: f64,
    pub quantity_held_for_sell: f64,
}

impl Holding {
    /// Quantity not already committed to an open sell order
    pub fn free_quantity(&self) -> f64 {
        (self.quantity - self.quantity_held_for_sell).max(0.0)
    }
}
