use crate::indicators::moving_average;
use crate::models::Signal;
use crate::strategy::purchase_decision;

/// Below this much cash a buy is not attempted
const MIN_BUY_CASH: f64 = 1.00;

/// Result of one replay
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    pub initial_cash: f64,
    pub final_cash: f64,
    pub ticks: usize,
    pub buys: usize,
    pub sells: usize,
    /// Sells skipped because the price was under the last buy
    pub refused_sells: usize,
}

impl SimulationReport {
    pub fn return_pct(&self) -> f64 {
        if self.initial_cash == 0.0 {
            return 0.0;
        }
        (self.final_cash - self.initial_cash) / self.initial_cash * 100.0
    }
}

/// Replays the moving average rule over a price history without touching a venue
#[derive(Debug, Clone, Copy)]
pub struct SimulationRunner {
    pub ticks: usize,
    pub initial_cash: f64,
}

impl SimulationRunner {
    pub fn new(ticks: usize, initial_cash: f64) -> Self {
        Self {
            ticks,
            initial_cash,
        }
    }

    /// Compute both averages from `history` and replay
    pub fn run_windows(
        &self,
        history: &[f64],
        long_window: usize,
        short_window: usize,
    ) -> SimulationReport {
        let long_avg = moving_average(history, long_window);
        let short_avg = moving_average(history, short_window);
        self.run(history, &long_avg, &short_avg)
    }

    /// Replay the most recent `ticks` points
    ///
    /// The three series are aligned on their last element; the replay covers
    /// as many trailing points as all of them have. Buys go all-in, sells
    /// close the whole position and never at or under the last buy price.
    /// Any open position is liquidated at the final price.
    pub fn run(&self, history: &[f64], long_avg: &[f64], short_avg: &[f64]) -> SimulationReport {
        let n = self
            .ticks
            .min(history.len())
            .min(long_avg.len())
            .min(short_avg.len());

        let history = &history[history.len() - n..];
        let long_avg = &long_avg[long_avg.len() - n..];
        let short_avg = &short_avg[short_avg.len() - n..];

        let mut report = SimulationReport {
            initial_cash: self.initial_cash,
            final_cash: self.initial_cash,
            ticks: n,
            buys: 0,
            sells: 0,
            refused_sells: 0,
        };
        let mut cash = self.initial_cash;
        let mut shares = 0.0;
        let mut last_buy_price = 0.0;

        for i in 0..n {
            let price = history[i];

            match purchase_decision(price, short_avg[i], long_avg[i]) {
                Signal::Buy if cash > MIN_BUY_CASH => {
                    shares = cash / price;
                    cash = 0.0;
                    last_buy_price = price;
                    report.buys += 1;
                    tracing::debug!(tick = i, price, shares, "Simulated buy");
                }
                Signal::Sell if shares > 0.0 => {
                    if price > last_buy_price {
                        cash = shares * price;
                        shares = 0.0;
                        report.sells += 1;
                        tracing::debug!(tick = i, price, cash, "Simulated sell");
                    } else {
                        report.refused_sells += 1;
                    }
                }
                _ => {}
            }
        }

        if shares > 0.0 {
            if let Some(last) = history.last() {
                cash += shares * last;
            }
        }

        report.final_cash = cash;
        report
    }
}

/// Final cash after replaying the moving average rule
pub fn simulate(
    history: &[f64],
    long_avg: &[f64],
    short_avg: &[f64],
    ticks: usize,
    initial_cash: f64,
) -> f64 {
    SimulationRunner::new(ticks, initial_cash)
        .run(history, long_avg, short_avg)
        .final_cash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buy_low_sell_high() {
        // Dip under the short average, then rise over the long one
        let history = vec![10.0, 8.0, 12.0];
        let short = vec![9.0, 9.0, 9.0];
        let long = vec![11.0, 11.0, 11.0];

        let report = SimulationRunner::new(3, 50.0).run(&history, &long, &short);
        assert_eq!(report.buys, 1);
        assert_eq!(report.sells, 1);
        assert!((report.final_cash - 75.0).abs() < 1e-9);
        assert!((report.return_pct() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_never_sells_at_a_loss() {
        // Buy at 8, long average collapses so 7.5 looks like a sell
        let history = vec![8.0, 7.5];
        let short = vec![9.0, 7.0];
        let long = vec![11.0, 7.0];

        let report = SimulationRunner::new(2, 40.0).run(&history, &long, &short);
        assert_eq!(report.sells, 0);
        assert_eq!(report.refused_sells, 1);
        // Liquidated at the final price
        assert!((report.final_cash - 37.5).abs() < 1e-9);
    }

    #[test]
    fn test_aligns_series_on_the_tail() {
        let history = vec![100.0, 100.0, 10.0, 8.0, 12.0];
        let short = vec![9.0, 9.0, 9.0];
        let long = vec![11.0, 11.0, 11.0];

        let report = SimulationRunner::new(100, 50.0).run(&history, &long, &short);
        assert_eq!(report.ticks, 3);
        assert!((report.final_cash - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_deterministic() {
        let history: Vec<f64> = (0..500)
            .map(|i| 100.0 + ((i as f64) * 0.37).sin() * 5.0)
            .collect();
        let long = moving_average(&history, 72);
        let short = moving_average(&history, 12);

        let first = simulate(&history, &long, &short, 300, 50.0);
        let second = simulate(&history, &long, &short, 300, 50.0);
        assert_eq!(first, second);
        assert!(first > 0.0);
    }

    #[test]
    fn test_empty_history_keeps_cash() {
        assert_eq!(simulate(&[], &[], &[], 10, 50.0), 50.0);
    }
}
