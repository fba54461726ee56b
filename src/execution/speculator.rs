use super::cycle::{upstream_backoff, CycleContext, Shutdown};
use super::market_data::MarketDataGateway;
use super::order_lifecycle::{BuyOutcome, LifecycleConfig, OrderLifecycleController, SellOutcome};
use crate::api::Brokerage;
use crate::config::Settings;
use crate::error::TradeError;
use crate::models::Security;
use crate::persistence::{CounterStore, TradeLedger};
use crate::strategy::{PriceBand, RankedSecurity, SelectionMode, VolatilityRanker};
use crate::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::time::Duration;

/// Wait between buying power checks
const FUNDS_POLL: Duration = Duration::from_secs(10);

/// Counters for one run of the idle loop
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStats {
    pub cycles_started: u32,
    pub buys_filled: u32,
    pub buys_canceled: u32,
    pub sells_filled: u32,
    pub skipped_near_high: u32,
    /// Cycles abandoned because the venue refused the order
    pub refused: u32,
    pub upstream_failures: u32,
    pub session_profit: f64,
}

/// How one pass of the loop ended
#[derive(Debug, Clone, PartialEq)]
enum CycleEnd {
    TooExpensive,
    Refused,
    Canceled,
    Sold { profit: f64 },
    Interrupted,
}

enum Step {
    Continue,
    Stop,
}

/// Idle speculation loop
///
/// Repeatedly picks the most volatile candidate, bids a spread under the
/// market, and lists whatever fills a spread above the fill price.
pub struct Speculator<'a, B, S> {
    broker: &'a B,
    ledger: &'a TradeLedger<S>,
    settings: &'a Settings,
    ranker: VolatilityRanker,
    band: PriceBand,
    shutdown: Shutdown,
    avoid: HashSet<Security>,
    stats: SessionStats,
    rng: StdRng,
}

impl<'a, B: Brokerage, S: CounterStore> Speculator<'a, B, S> {
    pub fn new(
        broker: &'a B,
        ledger: &'a TradeLedger<S>,
        settings: &'a Settings,
        shutdown: Shutdown,
    ) -> Self {
        let mode = match settings.pinned() {
            Some(security) => SelectionMode::Pinned(security),
            None => SelectionMode::Ranked,
        };

        Self {
            broker,
            ledger,
            settings,
            ranker: VolatilityRanker::new(mode),
            band: PriceBand::from_settings(settings),
            shutdown,
            avoid: HashSet::new(),
            stats: SessionStats::default(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic jitter and avoid-set resets
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Run until no candidate is left, shutdown is requested, or upstream
    /// failures exceed the retry budget
    pub async fn run(&mut self) -> Result<SessionStats> {
        let gateway = MarketDataGateway::new(self.broker);
        let cash = match self.settings.spec_cash {
            Some(cash) => cash,
            None => gateway.buying_power().await?,
        };

        tracing::info!(
            cash,
            spread_percent = self.band.spread_percent,
            mode = ?self.ranker.mode(),
            "Starting idle speculation"
        );

        let mut failures: u32 = 0;

        loop {
            if self.shutdown.is_requested() {
                break;
            }

            match self.iteration(&gateway, cash).await {
                Ok(Step::Continue) => failures = 0,
                Ok(Step::Stop) => break,
                Err(e) if e.is_upstream() => {
                    failures += 1;
                    self.stats.upstream_failures += 1;
                    if failures > self.settings.max_upstream_retries {
                        tracing::error!("Giving up after {} upstream failures: {}", failures, e);
                        return Err(e);
                    }

                    let backoff = upstream_backoff(failures);
                    tracing::warn!(
                        attempt = failures,
                        backoff_secs = backoff.as_secs(),
                        "Upstream unavailable: {}",
                        e
                    );
                    if self.shutdown.sleep(backoff).await {
                        break;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            cycles = self.stats.cycles_started,
            filled = self.stats.buys_filled,
            canceled = self.stats.buys_canceled,
            sold = self.stats.sells_filled,
            profit = self.stats.session_profit,
            "Idle speculation finished"
        );

        Ok(self.stats.clone())
    }

    async fn iteration(&mut self, gateway: &MarketDataGateway<'_, B>, cash: f64) -> Result<Step> {
        if !self.wait_for_funds(gateway, cash).await? {
            return Ok(Step::Stop);
        }

        if !self.ranker.is_pinned() && self.rng.gen_ratio(2, 7) && !self.avoid.is_empty() {
            tracing::debug!("Resetting avoid set");
            self.avoid.clear();
        }

        let target = match self.select(gateway).await? {
            Some(target) => target,
            None => {
                tracing::info!("Could not find a security to speculate on");
                return Ok(Step::Stop);
            }
        };
        let security = target.security.clone();

        tracing::info!(
            "Most volatile security is {} at {:.1}% change",
            security,
            target.range_percent
        );

        self.ledger.mark_active(&security).await?;
        self.stats.cycles_started += 1;

        let mut ctx = CycleContext::new(security.clone());
        let result = match self.trade(gateway, &mut ctx, cash).await {
            Err(e) if ctx.pending_buy.is_some() || ctx.pending_sell.is_some() => {
                // Cycle is still open at the venue; keep it out of the ranking
                tracing::error!(
                    cycle = %ctx.id,
                    security = %security,
                    pending_buy = ?ctx.pending_buy,
                    pending_sell = ?ctx.pending_sell,
                    "Order left unresolved, security stays active: {}",
                    e
                );
                return Err(e);
            }
            result => result,
        };

        let released = self.ledger.release(&security).await;
        let end = match result {
            Ok(end) => end,
            Err(e @ (TradeError::OrderRejected { .. } | TradeError::QuantityTooSmall { .. })) => {
                tracing::warn!(security = %security, "Skipping security: {}", e);
                self.stats.refused += 1;
                CycleEnd::Refused
            }
            Err(e) => return Err(e),
        };
        released?;

        let pause = match end {
            CycleEnd::Interrupted => return Ok(Step::Stop),
            CycleEnd::TooExpensive => {
                self.avoid.insert(security);
                self.rng.gen_range(10..=30)
            }
            CycleEnd::Refused => {
                self.avoid.insert(security);
                self.rng.gen_range(10..=20)
            }
            CycleEnd::Canceled => self.rng.gen_range(10..=20),
            CycleEnd::Sold { profit } => {
                self.avoid.insert(security);
                let total = self.ledger.add_profit(profit).await?;
                self.stats.session_profit += profit;
                tracing::info!("SALE PROFIT: ${:.2}", profit);
                tracing::info!("TOTAL RUN PROFIT: ${:.2}", total);
                self.rng.gen_range(10..=20)
            }
        };

        if self.shutdown.sleep(Duration::from_secs(pause)).await {
            return Ok(Step::Stop);
        }
        Ok(Step::Continue)
    }

    /// Block until buying power covers `cash`; false if interrupted
    async fn wait_for_funds(&self, gateway: &MarketDataGateway<'_, B>, cash: f64) -> Result<bool> {
        loop {
            let available = gateway.buying_power().await?;
            if available >= cash {
                return Ok(true);
            }
            tracing::info!(
                "Waiting for buying power (want ${:.2} have ${:.2})",
                cash,
                available
            );
            if self.shutdown.sleep(FUNDS_POLL).await {
                return Ok(false);
            }
        }
    }

    /// Rank candidates; an empty result retries once with the avoid set cleared
    async fn select(
        &mut self,
        gateway: &MarketDataGateway<'_, B>,
    ) -> Result<Option<RankedSecurity>> {
        let candidates = self.settings.candidate_securities();
        let window = self.settings.volatility_window_minutes;

        loop {
            let active = self.ledger.active_set().await?;
            let target = self
                .ranker
                .select_target(gateway, &candidates, &active, &self.avoid, window)
                .await?;

            match target {
                Some(target) => return Ok(Some(target)),
                None if !self.avoid.is_empty() => {
                    tracing::info!("Retrying {} avoided securities", self.avoid.len());
                    self.avoid.clear();
                }
                None => return Ok(None),
            }
        }
    }

    /// One buy-then-sell cycle on a security already marked active
    async fn trade(
        &mut self,
        gateway: &MarketDataGateway<'_, B>,
        ctx: &mut CycleContext,
        cash: f64,
    ) -> Result<CycleEnd> {
        let security = ctx.security.clone();
        let quote = gateway.fetch_quote(&security).await?;
        let bid = self.band.bid(&quote);

        if let Some(max_price) = gateway
            .max_price_over(&security, self.settings.ceiling_lookback_minutes)
            .await?
        {
            if self.band.too_expensive(bid, max_price) {
                tracing::info!(
                    "Not bidding ${:.2} on {} b/c price is near max: ${:.2}",
                    bid,
                    security,
                    max_price
                );
                self.stats.skipped_near_high += 1;
                return Ok(CycleEnd::TooExpensive);
            }
        }

        let quantity = self.band.quantity(cash, bid);
        let controller = OrderLifecycleController::new(
            self.broker,
            LifecycleConfig::from_settings(self.settings),
            self.shutdown.clone(),
        );
        let retries = self.settings.max_upstream_retries;

        let bought = match controller
            .run_buy_cycle_resuming(ctx, bid, quantity, retries)
            .await?
        {
            BuyOutcome::Filled(fill) => fill,
            BuyOutcome::Canceled => {
                self.stats.buys_canceled += 1;
                return Ok(CycleEnd::Canceled);
            }
            BuyOutcome::Interrupted => return Ok(CycleEnd::Interrupted),
        };
        self.stats.buys_filled += 1;

        // Let the bought asset become spendable
        if self.shutdown.sleep(self.settings.settle_delay()).await {
            tracing::warn!(security = %security, "Interrupted before listing bought assets");
            return Ok(CycleEnd::Interrupted);
        }

        let ask = self.band.ask(bought.price);
        let sold = match controller
            .run_sell_cycle_resuming(ctx, ask, bought.quantity, retries)
            .await?
        {
            SellOutcome::Filled(fill) => fill,
            SellOutcome::Interrupted { .. } => return Ok(CycleEnd::Interrupted),
        };
        self.stats.sells_filled += 1;

        tracing::info!(
            cycle = %ctx.id,
            security = %security,
            elapsed_secs = ctx.elapsed().num_seconds(),
            "Cycle complete"
        );

        Ok(CycleEnd::Sold {
            profit: (sold.price - bought.price) * sold.quantity,
        })
    }
}
