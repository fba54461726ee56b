use crate::models::PriceBar;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Market scenario types for synthetic data generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketScenario {
    /// Steady uptrend with noise (+2% daily average)
    Uptrend,
    /// Steady downtrend with noise (-2% daily average)
    Downtrend,
    /// Sideways/choppy market (±1% around mean)
    Sideways,
    /// High volatility (±5% large swings)
    Volatile,
}

impl MarketScenario {
    pub fn all() -> [MarketScenario; 4] {
        [
            MarketScenario::Uptrend,
            MarketScenario::Downtrend,
            MarketScenario::Sideways,
            MarketScenario::Volatile,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            MarketScenario::Uptrend => "Uptrend (+2% daily)",
            MarketScenario::Downtrend => "Downtrend (-2% daily)",
            MarketScenario::Sideways => "Sideways (mean-reverting)",
            MarketScenario::Volatile => "Volatile (±5% swings)",
        }
    }
}

/// Generates synthetic price bars for offline replays
pub struct SyntheticDataGenerator {
    rng: StdRng,
    base_price: f64,
}

impl SyntheticDataGenerator {
    /// Create a new generator with a seed for reproducibility
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_price: 150.0,
        }
    }

    /// Generate bars for a specific market scenario
    ///
    /// # Arguments
    /// * `scenario` - The market scenario to simulate
    /// * `num_bars` - Number of bars to generate
    /// * `interval_minutes` - Minutes between bars (5 matches live history)
    pub fn generate(
        &mut self,
        scenario: MarketScenario,
        num_bars: usize,
        interval_minutes: i64,
    ) -> Vec<PriceBar> {
        let start_time = Utc::now() - Duration::minutes(num_bars as i64 * interval_minutes);
        let intervals_per_day = 24.0 * 60.0 / interval_minutes as f64;
        let mean_price = self.base_price;
        let mut price = self.base_price;
        let mut bars = Vec::with_capacity(num_bars);

        for i in 0..num_bars {
            let timestamp = start_time + Duration::minutes(i as i64 * interval_minutes);

            price += match scenario {
                MarketScenario::Uptrend => {
                    price * 0.02 / intervals_per_day + price * self.rng.gen_range(-0.001..0.001)
                }
                MarketScenario::Downtrend => {
                    price * -0.02 / intervals_per_day + price * self.rng.gen_range(-0.001..0.001)
                }
                MarketScenario::Sideways => {
                    // 10% pull to the mean
                    (mean_price - price) * 0.1 + price * self.rng.gen_range(-0.01..0.01)
                }
                MarketScenario::Volatile => price * self.rng.gen_range(-0.05..0.05),
            };

            // Prevent price from going too low
            price = price.max(self.base_price * 0.5);

            bars.push(self.create_bar(price, timestamp));
        }

        bars
    }

    /// OHLC around a close price
    fn create_bar(&mut self, price: f64, timestamp: DateTime<Utc>) -> PriceBar {
        let noise_pct = 0.002; // ±0.2% intrabar movement

        let high = price * (1.0 + self.rng.gen_range(0.0..noise_pct));
        let low = price * (1.0 - self.rng.gen_range(0.0..noise_pct));
        let open = (price * (1.0 + self.rng.gen_range(-noise_pct..noise_pct))).clamp(low, high);

        PriceBar {
            timestamp,
            open,
            high,
            low,
            close: price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_uptrend() {
        let mut gen = SyntheticDataGenerator::new(42);
        let bars = gen.generate(MarketScenario::Uptrend, 500, 5);

        assert_eq!(bars.len(), 500);

        let first_price = bars.first().unwrap().close;
        let last_price = bars.last().unwrap().close;
        assert!(
            last_price > first_price,
            "Uptrend should end higher: {} -> {}",
            first_price,
            last_price
        );
    }

    #[test]
    fn test_generate_downtrend() {
        let mut gen = SyntheticDataGenerator::new(42);
        let bars = gen.generate(MarketScenario::Downtrend, 500, 5);

        let first_price = bars.first().unwrap().close;
        let last_price = bars.last().unwrap().close;
        assert!(
            last_price < first_price,
            "Downtrend should end lower: {} -> {}",
            first_price,
            last_price
        );
    }

    #[test]
    fn test_generate_sideways() {
        let mut gen = SyntheticDataGenerator::new(42);
        let bars = gen.generate(MarketScenario::Sideways, 500, 5);

        // Should stay roughly around base price (±10%)
        let base = gen.base_price;
        for bar in &bars {
            assert!(
                bar.close > base * 0.9 && bar.close < base * 1.1,
                "Sideways should stay near base: {} vs {}",
                bar.close,
                base
            );
        }
    }

    #[test]
    fn test_same_seed_same_series() {
        let a = SyntheticDataGenerator::new(7).generate(MarketScenario::Volatile, 50, 5);
        let b = SyntheticDataGenerator::new(7).generate(MarketScenario::Volatile, 50, 5);
        let closes_a: Vec<f64> = a.iter().map(|b| b.close).collect();
        let closes_b: Vec<f64> = b.iter().map(|b| b.close).collect();
        assert_eq!(closes_a, closes_b);
    }

    #[test]
    fn test_bars_are_consistent() {
        let mut gen = SyntheticDataGenerator::new(42);
        for scenario in MarketScenario::all() {
            for bar in gen.generate(scenario, 100, 5) {
                assert!(bar.is_consistent(), "{:?} produced {:?}", scenario, bar);
            }
        }
    }
}
