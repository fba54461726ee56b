use super::cycle::{CycleContext, Shutdown};
use super::market_data::MarketDataGateway;
use super::order_lifecycle::{BuyOutcome, LifecycleConfig, OrderLifecycleController, SellOutcome};
use crate::api::Brokerage;
use crate::config::Settings;
use crate::error::TradeError;
use crate::models::{Security, Signal};
use crate::strategy::{order_quantity, round_cents, MovingAverageCross, Strategy};
use crate::Result;
use std::time::Duration;

/// Smallest cash balance worth buying with
const MIN_BUY_CASH: f64 = 1.00;

/// Cash and position tracked across cycles
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Book {
    pub cash: f64,
    pub shares: f64,
}

/// Live moving average trader on a single security
///
/// Every cycle: buy all-in when the last close dips under the short average,
/// sell all free shares when it rises over the long average.
pub struct MovingAverageTrader<'a, B> {
    broker: &'a B,
    security: Security,
    strategy: MovingAverageCross,
    lifecycle: LifecycleConfig,
    quantity_decimals: u32,
    cycle: Duration,
    max_upstream_retries: u32,
    shutdown: Shutdown,
}

impl<'a, B: Brokerage> MovingAverageTrader<'a, B> {
    pub fn new(broker: &'a B, security: Security, settings: &Settings, shutdown: Shutdown) -> Self {
        let mut lifecycle = LifecycleConfig::from_settings(settings);
        lifecycle.buy_timeout = Duration::from_secs(settings.ma_buy_timeout_secs);
        lifecycle.poll_interval = Duration::from_secs(settings.ma_poll_interval_secs);

        Self {
            broker,
            security,
            strategy: MovingAverageCross::new(settings.ma_short_window, settings.ma_long_window),
            lifecycle,
            quantity_decimals: settings.quantity_decimals,
            cycle: Duration::from_secs(settings.ma_cycle_secs),
            max_upstream_retries: settings.max_upstream_retries,
            shutdown,
        }
    }

    /// Trade until shutdown, starting from `cash` and no position
    pub async fn run(&self, cash: f64) -> Result<Book> {
        let begin_cash = cash;
        let mut book = Book { cash, shares: 0.0 };
        let mut failures: u32 = 0;

        tracing::info!(
            security = %self.security,
            cash,
            short_window = self.strategy.short_window(),
            long_window = self.strategy.long_window(),
            "Starting moving average trader"
        );

        loop {
            match self.step(&mut book).await {
                Ok(()) => failures = 0,
                Err(e) if e.is_upstream() => {
                    failures += 1;
                    if failures > self.max_upstream_retries {
                        return Err(e);
                    }
                    tracing::warn!(attempt = failures, "Upstream unavailable: {}", e);
                }
                Err(TradeError::InsufficientData(reason)) => {
                    tracing::warn!(security = %self.security, "Skipping cycle: {}", reason);
                }
                Err(e) => return Err(e),
            }

            tracing::info!(
                cash = book.cash,
                shares = book.shares,
                pnl = book.cash - begin_cash,
                "Cycle done"
            );

            if self.shutdown.sleep(self.cycle).await {
                return Ok(book);
            }
        }
    }

    /// One decision and, if called for, one order cycle
    pub async fn step(&self, book: &mut Book) -> Result<()> {
        let gateway = MarketDataGateway::new(self.broker);
        let closes = gateway.weekly_closes(&self.security).await?;
        let signal = self.strategy.generate_signal(&closes)?;
        let price = match closes.last() {
            Some(close) => round_cents(*close),
            None => return Ok(()),
        };

        tracing::info!(security = %self.security, price, ?signal, "Decision");

        let controller = OrderLifecycleController::new(
            self.broker,
            self.lifecycle.clone(),
            self.shutdown.clone(),
        );
        let mut ctx = CycleContext::new(self.security.clone());
        let result = self.act(&controller, &gateway, &mut ctx, signal, price, book).await;

        if let Err(e) = &result {
            if ctx.pending_buy.is_some() || ctx.pending_sell.is_some() {
                tracing::error!(
                    cycle = %ctx.id,
                    security = %self.security,
                    pending_buy = ?ctx.pending_buy,
                    pending_sell = ?ctx.pending_sell,
                    "Order left unresolved: {}",
                    e
                );
            }
        }
        result
    }

    /// Carry out `signal` at `price`, updating the book on fills
    async fn act(
        &self,
        controller: &OrderLifecycleController<'_, B>,
        gateway: &MarketDataGateway<'_, B>,
        ctx: &mut CycleContext,
        signal: Signal,
        price: f64,
        book: &mut Book,
    ) -> Result<()> {
        let retries = self.max_upstream_retries;

        match signal {
            Signal::Buy if book.cash > MIN_BUY_CASH => {
                let quantity = order_quantity(book.cash, price, self.quantity_decimals);
                match controller
                    .run_buy_cycle_resuming(ctx, price, quantity, retries)
                    .await?
                {
                    BuyOutcome::Filled(fill) => {
                        book.shares += fill.quantity;
                        book.cash = (book.cash - fill.price * fill.quantity).max(0.0);
                    }
                    BuyOutcome::Canceled | BuyOutcome::Interrupted => {}
                }
            }
            Signal::Buy => tracing::info!("Cannot buy; no cash"),
            Signal::Sell => {
                let shares = gateway.free_shares(&self.security).await?;
                if shares <= 0.0 {
                    tracing::info!("Cannot sell; no shares");
                    return Ok(());
                }
                if let SellOutcome::Filled(fill) = controller
                    .run_sell_cycle_resuming(ctx, price, shares, retries)
                    .await?
                {
                    book.cash += fill.price * fill.quantity;
                    book.shares = (book.shares - fill.quantity).max(0.0);
                }
            }
            Signal::Hold => tracing::info!("Holding"),
        }

        Ok(())
    }
}
