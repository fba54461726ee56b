use crate::models::PriceBar;

/// Mean bar range over `bars` as a percent of the latest close
///
/// Returns None for an empty window or a non-positive close.
pub fn average_range_percent(bars: &[PriceBar]) -> Option<f64> {
    let last = bars.last()?;
    if last.close <= 0.0 {
        return None;
    }

    let avg_range = bars.iter().map(PriceBar::range).sum::<f64>() / bars.len() as f64;
    Some(avg_range / last.close * 100.0)
}

/// Highest `high` across the bars
pub fn max_high(bars: &[PriceBar]) -> Option<f64> {
    bars.iter().map(|b| b.high).reduce(f64::max)
}

/// The most recent `n` bars (all of them when fewer exist)
pub fn trailing(bars: &[PriceBar], n: usize) -> &[PriceBar] {
    &bars[bars.len().saturating_sub(n)..]
}
