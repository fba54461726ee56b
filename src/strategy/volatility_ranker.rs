use crate::api::Brokerage;
use crate::execution::MarketDataGateway;
use crate::error::TradeError;
use crate::indicators::average_range_percent;
use crate::models::Security;
use crate::Result;
use std::collections::{BTreeSet, HashSet};

/// Security chosen for the next cycle and its score
#[derive(Debug, Clone, PartialEq)]
pub struct RankedSecurity {
    pub security: Security,
    /// Mean bar range as a percent of the latest close
    pub range_percent: f64,
}

/// How the next target is chosen
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionMode {
    /// Most volatile eligible candidate
    Ranked,
    /// Always this security; ranking is skipped entirely
    Pinned(Security),
}

impl SelectionMode {
    /// Pinned mode, validated only against the raw candidate list
    pub fn pinned(security: Security, candidates: &[Security]) -> Result<Self> {
        if !candidates.contains(&security) {
            return Err(TradeError::Config(format!(
                "{} not in candidate list",
                security
            )));
        }
        Ok(SelectionMode::Pinned(security))
    }
}

/// Score returned for a pinned security, which is never measured
const PINNED_SCORE: f64 = 999.0;

/// Picks the most volatile candidate that is neither in flight nor avoided
#[derive(Debug, Clone)]
pub struct VolatilityRanker {
    mode: SelectionMode,
}

impl VolatilityRanker {
    pub fn new(mode: SelectionMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> &SelectionMode {
        &self.mode
    }

    pub fn is_pinned(&self) -> bool {
        matches!(self.mode, SelectionMode::Pinned(_))
    }

    /// Choose the next security to trade
    ///
    /// # Arguments
    /// * `candidates` - Candidate list, in tie-break order
    /// * `active_set` - Securities mid-cycle (persisted)
    /// * `avoid_set` - Securities skipped for this run
    /// * `history_window_minutes` - Trailing window the range is averaged over
    ///
    /// Returns None when every candidate is excluded or has no usable data.
    pub async fn select_target<B: Brokerage>(
        &self,
        gateway: &MarketDataGateway<'_, B>,
        candidates: &[Security],
        active_set: &BTreeSet<Security>,
        avoid_set: &HashSet<Security>,
        history_window_minutes: u64,
    ) -> Result<Option<RankedSecurity>> {
        if let SelectionMode::Pinned(security) = &self.mode {
            return Ok(Some(RankedSecurity {
                security: security.clone(),
                range_percent: PINNED_SCORE,
            }));
        }

        let mut scores = Vec::new();

        for security in candidates {
            if active_set.contains(security) {
                tracing::info!("Not considering {} because it is actively trading", security);
                continue;
            }
            if avoid_set.contains(security) {
                tracing::info!("Not considering {} because it is avoided", security);
                continue;
            }

            let bars = gateway
                .recent_bars(security, history_window_minutes)
                .await?;

            match average_range_percent(&bars) {
                Some(pct) => {
                    tracing::debug!(
                        security = %security,
                        range_percent = pct,
                        "Measured volatility"
                    );
                    scores.push((security.clone(), pct));
                }
                None => tracing::warn!("No usable history for {}, skipping", security),
            }
        }

        Ok(pick_most_volatile(scores))
    }
}

/// Highest score wins; ties go to the first one seen
///
/// Candidates with a non-positive range never win.
pub fn pick_most_volatile(
    scores: impl IntoIterator<Item = (Security, f64)>,
) -> Option<RankedSecurity> {
    let mut best: Option<RankedSecurity> = None;

    for (security, range_percent) in scores {
        let current = best.as_ref().map(|b| b.range_percent).unwrap_or(0.0);
        if range_percent > current {
            best = Some(RankedSecurity {
                security,
                range_percent,
            });
        }
    }

    best
}
