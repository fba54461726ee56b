use super::Strategy;
use crate::error::TradeError;
use crate::indicators::calculate_sma;
use crate::models::Signal;
use crate::Result;

/// Price against a short and a long moving average
///
/// Buy when the price dips under the short average, sell when it rises over
/// the long average. The buy check wins when both hold.
pub fn purchase_decision(price: f64, short_avg: f64, long_avg: f64) -> Signal {
    if price < short_avg {
        Signal::Buy
    } else if price > long_avg {
        Signal::Sell
    } else {
        Signal::Hold
    }
}

/// Moving average dip/peak strategy over 5-minute closes
#[derive(Debug, Clone)]
pub struct MovingAverageCross {
    short_window: usize,
    long_window: usize,
}

impl MovingAverageCross {
    pub fn new(short_window: usize, long_window: usize) -> Self {
        Self {
            short_window,
            long_window,
        }
    }

    pub fn short_window(&self) -> usize {
        self.short_window
    }

    pub fn long_window(&self) -> usize {
        self.long_window
    }
}

impl Default for MovingAverageCross {
    fn default() -> Self {
        // 1 hour and 6 hours of 5-minute bars
        Self::new(12, 72)
    }
}

impl Strategy for MovingAverageCross {
    fn generate_signal(&self, closes: &[f64]) -> Result<Signal> {
        if closes.len() < self.min_samples_required() {
            return Err(TradeError::InsufficientData(format!(
                "{} closes, need {}",
                closes.len(),
                self.min_samples_required()
            )));
        }

        let price = closes[closes.len() - 1];
        let short = calculate_sma(closes, self.short_window);
        let long = calculate_sma(closes, self.long_window);

        match (short, long) {
            (Some(short), Some(long)) => {
                let signal = purchase_decision(price, short, long);
                tracing::debug!(price, short, long, ?signal, "Moving average decision");
                Ok(signal)
            }
            _ => Ok(Signal::Hold),
        }
    }

    fn name(&self) -> &str {
        "MovingAverageCross"
    }

    fn min_samples_required(&self) -> usize {
        self.short_window.max(self.long_window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purchase_decision() {
        assert_eq!(purchase_decision(9.0, 10.0, 12.0), Signal::Buy);
        assert_eq!(purchase_decision(13.0, 10.0, 12.0), Signal::Sell);
        assert_eq!(purchase_decision(11.0, 10.0, 12.0), Signal::Hold);
        // Buy wins when the price is under the short but over the long
        assert_eq!(purchase_decision(9.0, 10.0, 8.0), Signal::Buy);
    }

    #[test]
    fn test_signal_from_closes() {
        let strategy = MovingAverageCross::new(2, 4);

        // short = 5.5, long = 7.5, price = 5
        let falling = vec![10.0, 9.0, 6.0, 5.0];
        assert_eq!(strategy.generate_signal(&falling).unwrap(), Signal::Buy);

        // short = 8.5, long = 6.5, price = 9
        let rising = vec![4.0, 5.0, 8.0, 9.0];
        assert_eq!(strategy.generate_signal(&rising).unwrap(), Signal::Sell);
    }

    #[test]
    fn test_insufficient_data() {
        let strategy = MovingAverageCross::default();
        assert!(strategy.generate_signal(&[1.0, 2.0]).is_err());
    }
}
