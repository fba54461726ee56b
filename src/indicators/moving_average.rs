/// Calculate Simple Moving Average (SMA) over the most recent `period` prices
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Trailing moving average series
///
/// One value per input index >= `window - 1`, so the output has
/// `prices.len() - window + 1` entries and lines up with the tail of `prices`.
/// Returns an empty series when there is not enough data.
pub fn moving_average(prices: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || prices.len() < window {
        return Vec::new();
    }

    prices
        .windows(window)
        .map(|w| w.iter().sum::<f64>() / window as f64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0];
        let sma = calculate_sma(&prices, 5);
        assert_eq!(sma, Some(104.0));
    }

    #[test]
    fn test_sma_insufficient_data() {
        let prices = vec![100.0, 102.0];
        let sma = calculate_sma(&prices, 5);
        assert!(sma.is_none());
    }

    #[test]
    fn test_moving_average_series() {
        let averages = moving_average(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_eq!(averages, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_moving_average_length_and_values() {
        let prices: Vec<f64> = (0..50).map(|i| 100.0 + ((i * 7) % 13) as f64).collect();

        for window in 1..=prices.len() {
            let averages = moving_average(&prices, window);
            assert_eq!(averages.len(), prices.len() - window + 1);

            for (i, avg) in averages.iter().enumerate() {
                let expected: f64 =
                    prices[i..i + window].iter().sum::<f64>() / window as f64;
                assert!((avg - expected).abs() < 1e-9);
            }

            // Last value agrees with the point SMA
            let last = *averages.last().unwrap();
            assert!((last - calculate_sma(&prices, window).unwrap()).abs() < 1e-9);
        }
    }

    #[test]
    fn test_moving_average_not_enough_data() {
        assert!(moving_average(&[1.0, 2.0], 3).is_empty());
        assert!(moving_average(&[1.0, 2.0], 0).is_empty());
        assert!(moving_average(&[], 1).is_empty());
    }
}
