use crate::models::{
    Holding, Interval, LimitOrder, OrderState, OrderStatus, PriceBar, Quote, Security, Span,
};
use crate::Result;

/// Venue answer to an order submission
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitResponse {
    Accepted { id: String, state: OrderState },
    Rejected { message: String },
}

/// Venue answer to a cancel request
#[derive(Debug, Clone, PartialEq)]
pub enum CancelResponse {
    State(OrderState),
    Rejected { message: String },
}

/// Brokerage order/quote API
///
/// Every method is a single round trip. Implementations never retry; network
/// and auth failures come back as `TradeError::UpstreamUnavailable`, venue
/// refusals come back as `Rejected` responses.
#[allow(async_fn_in_trait)]
pub trait Brokerage {
    async fn submit_limit_order(&self, order: &LimitOrder) -> Result<SubmitResponse>;

    async fn get_order_status(&self, order_id: &str) -> Result<OrderStatus>;

    async fn cancel_order(&self, order_id: &str) -> Result<CancelResponse>;

    async fn get_quote(&self, security: &Security) -> Result<Quote>;

    /// Bars oldest-first
    async fn get_historicals(
        &self,
        security: &Security,
        interval: Interval,
        span: Span,
    ) -> Result<Vec<PriceBar>>;

    async fn get_positions(&self) -> Result<Vec<Holding>>;

    /// Cash available to place new buy orders
    async fn buying_power(&self) -> Result<f64>;
}
