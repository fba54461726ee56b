use super::cycle::{upstream_backoff, CycleContext, Shutdown};
use crate::api::{Brokerage, CancelResponse, SubmitResponse};
use crate::config::Settings;
use crate::error::{RejectReason, TradeError};
use crate::models::{Fill, LimitOrder, OrderSide, OrderState, OrderStatus, TimeInForce};
use crate::Result;
use std::time::Duration;
use tokio::time::Instant;

/// Pause before resubmitting a truncated quantity
const INCREMENT_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Pause before resubmitting a sell the venue refused for an unknown reason
const SELL_REJECT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Timing and retry knobs for one controller
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub spread_percent: f64,
    pub poll_interval: Duration,
    pub buy_timeout: Duration,
    pub deadline_extension: Duration,
    pub insufficient_holdings_delay: Duration,
    pub max_increment_retries: u32,
}

impl LifecycleConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            spread_percent: settings.spread_percent,
            poll_interval: settings.poll_interval(),
            buy_timeout: settings.buy_timeout(),
            deadline_extension: settings.deadline_extension(),
            insufficient_holdings_delay: settings.insufficient_holdings_delay(),
            max_increment_retries: settings.max_increment_retries,
        }
    }
}

/// How a buy cycle ended
#[derive(Debug, Clone, PartialEq)]
pub enum BuyOutcome {
    Filled(Fill),
    Canceled,
    /// Shutdown requested; any pending buy has been canceled
    Interrupted,
}

/// How a sell cycle ended
#[derive(Debug, Clone, PartialEq)]
pub enum SellOutcome {
    Filled(Fill),
    /// Shutdown requested; the order, if any, stays listed at the venue
    Interrupted { order_id: Option<String> },
}

/// Submission loop result
enum Submitted {
    /// Accepted order id and the quantity the venue took
    Order(String, f64),
    Interrupted,
}

/// Drives one buy-then-sell cycle through the brokerage
///
/// Venue rejections are handled here; `UpstreamUnavailable` is propagated
/// untouched for the caller to back off on.
pub struct OrderLifecycleController<'a, B> {
    broker: &'a B,
    config: LifecycleConfig,
    shutdown: Shutdown,
}

impl<'a, B: Brokerage> OrderLifecycleController<'a, B> {
    pub fn new(broker: &'a B, config: LifecycleConfig, shutdown: Shutdown) -> Self {
        Self {
            broker,
            config,
            shutdown,
        }
    }

    /// Place a limit buy and wait for it to fill or time out
    ///
    /// # Arguments
    /// * `ctx` - Cycle state; records the pending order and the extension
    /// * `bid_price` - Limit price in USD
    /// * `quantity` - Starting quantity, truncated on increment rejections
    ///
    /// On timeout the market is checked once: if the live bid sits within half
    /// the spread of our bid the deadline is pushed out a single time, otherwise
    /// the order is canceled.
    pub async fn run_buy_cycle(
        &self,
        ctx: &mut CycleContext,
        bid_price: f64,
        quantity: f64,
    ) -> Result<BuyOutcome> {
        if let Some(order_id) = ctx.pending_buy.clone() {
            tracing::warn!(
                security = %ctx.security,
                order_id = %order_id,
                "Resuming a buy left pending, canceling"
            );
            let ordered = Fill {
                price: bid_price,
                quantity,
            };
            return self.cancel_buy(ctx, &order_id, ordered).await;
        }

        let (order_id, quantity) = match self
            .submit_with_retry(ctx, OrderSide::Buy, bid_price, quantity)
            .await?
        {
            Submitted::Order(id, quantity) => (id, quantity),
            Submitted::Interrupted => return Ok(BuyOutcome::Interrupted),
        };
        let ordered = Fill {
            price: bid_price,
            quantity,
        };
        ctx.pending_buy = Some(order_id.clone());

        let mut deadline = Instant::now() + self.config.buy_timeout;

        loop {
            if self.shutdown.sleep(self.config.poll_interval).await {
                tracing::warn!(
                    security = %ctx.security,
                    order_id = %order_id,
                    "Interrupted with a pending buy, canceling"
                );
                if let BuyOutcome::Filled(fill) = self.cancel_buy(ctx, &order_id, ordered).await? {
                    tracing::warn!(
                        security = %ctx.security,
                        price = fill.price,
                        quantity = fill.quantity,
                        "Buy filled before it could be canceled; holding assets"
                    );
                }
                return Ok(BuyOutcome::Interrupted);
            }

            let status = self.broker.get_order_status(&order_id).await?;
            match status.state {
                OrderState::Filled => {
                    ctx.pending_buy = None;
                    let fill = fill_from(&status, ordered);
                    tracing::info!(
                        security = %ctx.security,
                        price = fill.price,
                        quantity = fill.quantity,
                        "BUY ORDER FILLED"
                    );
                    return Ok(BuyOutcome::Filled(fill));
                }
                OrderState::Canceled | OrderState::Rejected => {
                    ctx.pending_buy = None;
                    tracing::info!(
                        security = %ctx.security,
                        state = ?status.state,
                        "Buy order closed by the venue"
                    );
                    return Ok(BuyOutcome::Canceled);
                }
                ref state => {
                    tracing::debug!(order_id = %order_id, state = ?state, "Buy pending");
                }
            }

            if Instant::now() >= deadline {
                if !ctx.extension_used && self.close_to_target(ctx, bid_price).await? {
                    ctx.extension_used = true;
                    deadline += self.config.deadline_extension;
                    tracing::info!(
                        security = %ctx.security,
                        extension_secs = self.config.deadline_extension.as_secs(),
                        "Market is close to our bid, extending deadline once"
                    );
                    continue;
                }

                tracing::info!(
                    security = %ctx.security,
                    order_id = %order_id,
                    "Buy timed out, canceling"
                );
                return self.cancel_buy(ctx, &order_id, ordered).await;
            }
        }
    }

    /// Place a limit sell and poll until it fills
    ///
    /// Sells are good-til-canceled and never time out. Insufficient holdings
    /// (bought assets not yet spendable) are retried unchanged after a delay.
    pub async fn run_sell_cycle(
        &self,
        ctx: &mut CycleContext,
        ask_price: f64,
        quantity: f64,
    ) -> Result<SellOutcome> {
        loop {
            let (order_id, listed_quantity) = match ctx.pending_sell.clone() {
                Some(id) => {
                    tracing::info!(
                        security = %ctx.security,
                        order_id = %id,
                        "Resuming listed sell"
                    );
                    (id, quantity)
                }
                None => match self
                    .submit_with_retry(ctx, OrderSide::Sell, ask_price, quantity)
                    .await?
                {
                    Submitted::Order(id, quantity) => (id, quantity),
                    Submitted::Interrupted => {
                        return Ok(SellOutcome::Interrupted { order_id: None })
                    }
                },
            };
            ctx.pending_sell = Some(order_id.clone());

            loop {
                if self.shutdown.sleep(self.config.poll_interval).await {
                    tracing::info!(
                        security = %ctx.security,
                        order_id = %order_id,
                        "Interrupted; sell order stays listed"
                    );
                    return Ok(SellOutcome::Interrupted {
                        order_id: Some(order_id),
                    });
                }

                let status = self.broker.get_order_status(&order_id).await?;
                match status.state {
                    OrderState::Filled => {
                        ctx.pending_sell = None;
                        let fill = fill_from(
                            &status,
                            Fill {
                                price: ask_price,
                                quantity: listed_quantity,
                            },
                        );
                        tracing::info!(
                            security = %ctx.security,
                            price = fill.price,
                            quantity = fill.quantity,
                            "SELL ORDER FILLED"
                        );
                        return Ok(SellOutcome::Filled(fill));
                    }
                    OrderState::Canceled | OrderState::Rejected => {
                        ctx.pending_sell = None;
                        tracing::warn!(
                            security = %ctx.security,
                            order_id = %order_id,
                            state = ?status.state,
                            "Sell order closed without a fill, relisting"
                        );
                        break;
                    }
                    ref state => {
                        tracing::debug!(order_id = %order_id, state = ?state, "Sell pending");
                    }
                }
            }
        }
    }

    /// `run_buy_cycle` that keeps hold of its order across upstream failures
    ///
    /// A failure with a buy pending backs off and then cancels that same order
    /// instead of placing another. After `max_retries` failures the error is
    /// returned with the order id still recorded in `ctx`.
    pub async fn run_buy_cycle_resuming(
        &self,
        ctx: &mut CycleContext,
        bid_price: f64,
        quantity: f64,
        max_retries: u32,
    ) -> Result<BuyOutcome> {
        let mut attempt = 0;
        loop {
            match self.run_buy_cycle(ctx, bid_price, quantity).await {
                Err(e)
                    if e.is_upstream() && ctx.pending_buy.is_some() && attempt < max_retries =>
                {
                    attempt += 1;
                    let backoff = upstream_backoff(attempt);
                    tracing::warn!(
                        security = %ctx.security,
                        order_id = ?ctx.pending_buy,
                        attempt,
                        backoff_secs = backoff.as_secs(),
                        "Lost contact with pending buy: {}",
                        e
                    );
                    // The cancel still has to happen after an interrupted wait
                    self.shutdown.sleep(backoff).await;
                }
                result => return result,
            }
        }
    }

    /// `run_sell_cycle` that keeps polling the listed order across upstream
    /// failures, giving up after `max_retries` with the id left in `ctx`
    pub async fn run_sell_cycle_resuming(
        &self,
        ctx: &mut CycleContext,
        ask_price: f64,
        quantity: f64,
        max_retries: u32,
    ) -> Result<SellOutcome> {
        let mut attempt = 0;
        loop {
            match self.run_sell_cycle(ctx, ask_price, quantity).await {
                Err(e)
                    if e.is_upstream() && ctx.pending_sell.is_some() && attempt < max_retries =>
                {
                    attempt += 1;
                    let backoff = upstream_backoff(attempt);
                    tracing::warn!(
                        security = %ctx.security,
                        order_id = ?ctx.pending_sell,
                        attempt,
                        backoff_secs = backoff.as_secs(),
                        "Lost contact with listed sell: {}",
                        e
                    );
                    if self.shutdown.sleep(backoff).await {
                        return Ok(SellOutcome::Interrupted {
                            order_id: ctx.pending_sell.clone(),
                        });
                    }
                }
                result => return result,
            }
        }
    }

    /// Submit until the venue accepts, adjusting for known rejections
    async fn submit_with_retry(
        &self,
        ctx: &CycleContext,
        side: OrderSide,
        price: f64,
        quantity: f64,
    ) -> Result<Submitted> {
        let mut quantity = quantity;
        let mut increment_retries = 0;

        loop {
            let order = LimitOrder {
                security: ctx.security.clone(),
                side,
                limit_price: price,
                quantity,
                time_in_force: TimeInForce::Gtc,
            };

            tracing::info!(
                "LIMIT {}: {} {} at ${:.2}",
                side.as_str().to_uppercase(),
                ctx.security,
                quantity,
                price
            );

            let message = match self.broker.submit_limit_order(&order).await? {
                SubmitResponse::Accepted {
                    state: OrderState::Rejected,
                    ..
                } => "order rejected".to_string(),
                SubmitResponse::Accepted { id, state } => {
                    tracing::info!(order_id = %id, state = ?state, "Order accepted");
                    return Ok(Submitted::Order(id, quantity));
                }
                SubmitResponse::Rejected { message } => message,
            };

            let delay = match RejectReason::classify(&message) {
                RejectReason::InvalidIncrement => {
                    increment_retries += 1;
                    let reduced = truncate_last_digit(quantity)
                        .filter(|_| increment_retries <= self.config.max_increment_retries)
                        .ok_or_else(|| TradeError::QuantityTooSmall {
                            security: ctx.security.clone(),
                            quantity,
                        })?;
                    tracing::warn!(
                        security = %ctx.security,
                        from = quantity,
                        to = reduced,
                        "Quantity has invalid increment, reducing"
                    );
                    quantity = reduced;
                    INCREMENT_RETRY_DELAY
                }
                RejectReason::InsufficientHoldings if side == OrderSide::Sell => {
                    tracing::info!(
                        security = %ctx.security,
                        "Holdings not yet available, retrying sell"
                    );
                    self.config.insufficient_holdings_delay
                }
                reason if side == OrderSide::Sell => {
                    tracing::warn!(security = %ctx.security, %reason, "Sell rejected, retrying");
                    SELL_REJECT_RETRY_DELAY
                }
                reason => {
                    return Err(TradeError::OrderRejected {
                        security: ctx.security.clone(),
                        reason,
                    });
                }
            };

            if self.shutdown.sleep(delay).await {
                return Ok(Submitted::Interrupted);
            }
        }
    }

    /// Single timeout check: is the live bid within half the spread of ours?
    async fn close_to_target(&self, ctx: &CycleContext, bid_price: f64) -> Result<bool> {
        let quote = self.broker.get_quote(&ctx.security).await?;
        if quote.bid_price <= 0.0 {
            return Ok(false);
        }

        let gap = (quote.bid_price - bid_price) / quote.bid_price;
        tracing::debug!(
            security = %ctx.security,
            market_bid = quote.bid_price,
            our_bid = bid_price,
            gap,
            "Checked distance to target"
        );
        Ok(gap < 0.5 * self.config.spread_percent)
    }

    /// Cancel a pending buy and wait for the venue to confirm
    ///
    /// Keeps going through shutdown; an order that cannot be canceled any more
    /// is resolved from its current status.
    async fn cancel_buy(
        &self,
        ctx: &mut CycleContext,
        order_id: &str,
        ordered: Fill,
    ) -> Result<BuyOutcome> {
        loop {
            let status = match self.broker.cancel_order(order_id).await? {
                CancelResponse::State(OrderState::Canceled) => {
                    ctx.pending_buy = None;
                    tracing::info!(
                        security = %ctx.security,
                        order_id = %order_id,
                        "BUY ORDER CANCELED"
                    );
                    return Ok(BuyOutcome::Canceled);
                }
                CancelResponse::Rejected { message }
                    if RejectReason::classify(&message) == RejectReason::NotCancelable =>
                {
                    let status = self.broker.get_order_status(order_id).await?;
                    ctx.pending_buy = None;
                    return Ok(match status.state {
                        OrderState::Filled => BuyOutcome::Filled(fill_from(&status, ordered)),
                        state => {
                            tracing::info!(
                                order_id = %order_id,
                                state = ?state,
                                "Order no longer cancelable, treating as closed"
                            );
                            BuyOutcome::Canceled
                        }
                    });
                }
                CancelResponse::Rejected { message } => {
                    tracing::warn!(order_id = %order_id, %message, "Cancel refused, retrying");
                    self.broker.get_order_status(order_id).await?
                }
                CancelResponse::State(_) => self.broker.get_order_status(order_id).await?,
            };

            match status.state {
                OrderState::Canceled | OrderState::Rejected => {
                    ctx.pending_buy = None;
                    tracing::info!(
                        security = %ctx.security,
                        order_id = %order_id,
                        "BUY ORDER CANCELED"
                    );
                    return Ok(BuyOutcome::Canceled);
                }
                OrderState::Filled => {
                    ctx.pending_buy = None;
                    return Ok(BuyOutcome::Filled(fill_from(&status, ordered)));
                }
                _ => tokio::time::sleep(self.config.poll_interval).await,
            }
        }
    }
}

/// Fill details from a terminal status, falling back to what was ordered
fn fill_from(status: &OrderStatus, ordered: Fill) -> Fill {
    Fill {
        price: status.price.unwrap_or(ordered.price),
        quantity: status.quantity.unwrap_or(ordered.quantity),
    }
}

/// Drop the least significant digit of a decimal quantity
///
/// Returns None once nothing is left to drop or the result is not positive.
pub fn truncate_last_digit(quantity: f64) -> Option<f64> {
    let mut digits = format!("{}", quantity);
    if !digits.contains('.') {
        return None;
    }

    digits.pop();
    if digits.ends_with('.') {
        digits.pop();
    }

    digits.parse::<f64>().ok().filter(|q| *q > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_last_digit() {
        assert_eq!(truncate_last_digit(0.25252525), Some(0.2525252));
        assert_eq!(truncate_last_digit(1.5), Some(1.0));
        assert_eq!(truncate_last_digit(0.1), None);
        assert_eq!(truncate_last_digit(3.0), None);
    }

    #[test]
    fn test_fill_falls_back_to_order() {
        let status = OrderStatus {
            state: OrderState::Filled,
            price: Some(99.5),
            quantity: None,
        };
        let ordered = Fill {
            price: 99.0,
            quantity: 0.25,
        };
        assert_eq!(
            fill_from(&status, ordered),
            Fill {
                price: 99.5,
                quantity: 0.25
            }
        );
    }

    #[test]
    fn test_config_from_settings() {
        let config = LifecycleConfig::from_settings(&Settings::default());
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.deadline_extension, Duration::from_secs(180));
        assert_eq!(config.max_increment_retries, 8);
    }
}
