use crate::api::Brokerage;
use crate::indicators::{max_high, trailing};
use crate::models::{Interval, PriceBar, Quote, Security, Span};
use crate::Result;

/// Read-only market data adapter over the brokerage API
///
/// Performs no retries; upstream failures propagate to the caller.
pub struct MarketDataGateway<'a, B> {
    broker: &'a B,
}

impl<'a, B: Brokerage> MarketDataGateway<'a, B> {
    pub fn new(broker: &'a B) -> Self {
        Self { broker }
    }

    /// Historical bars, oldest first, with malformed bars dropped
    pub async fn fetch_history(
        &self,
        security: &Security,
        interval: Interval,
        span: Span,
    ) -> Result<Vec<PriceBar>> {
        let bars = self
            .broker
            .get_historicals(security, interval, span)
            .await?;
        let total = bars.len();

        let bars: Vec<PriceBar> = bars.into_iter().filter(PriceBar::is_consistent).collect();
        if bars.len() < total {
            tracing::warn!(
                security = %security,
                dropped = total - bars.len(),
                "Dropped inconsistent price bars"
            );
        }

        Ok(bars)
    }

    pub async fn fetch_quote(&self, security: &Security) -> Result<Quote> {
        self.broker.get_quote(security).await
    }

    /// 5-minute bars covering the trailing `minutes` of today's history
    pub async fn recent_bars(&self, security: &Security, minutes: u64) -> Result<Vec<PriceBar>> {
        let interval = Interval::FiveMinute;
        let bars = self.fetch_history(security, interval, Span::Day).await?;
        let n = (minutes / interval.minutes()).max(1) as usize;
        Ok(trailing(&bars, n).to_vec())
    }

    /// Highest `high` over the trailing `minutes`, None without data
    pub async fn max_price_over(&self, security: &Security, minutes: u64) -> Result<Option<f64>> {
        let bars = self.recent_bars(security, minutes).await?;
        Ok(max_high(&bars))
    }

    /// Close prices over a week of 5-minute bars
    pub async fn weekly_closes(&self, security: &Security) -> Result<Vec<f64>> {
        Ok(self
            .fetch_history(security, Interval::FiveMinute, Span::Week)
            .await?
            .iter()
            .map(|b| b.close)
            .collect())
    }

    /// Quantity of `security` not already held for an open sell
    pub async fn free_shares(&self, security: &Security) -> Result<f64> {
        Ok(self
            .broker
            .get_positions()
            .await?
            .iter()
            .find(|h| &h.security == security)
            .map(|h| h.free_quantity())
            .unwrap_or(0.0))
    }

    pub async fn buying_power(&self) -> Result<f64> {
        self.broker.buying_power().await
    }
}
