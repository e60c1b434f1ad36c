/// RSI (Relative Strength Index) indicator, updated one close at a time.
///
/// Uses Wilder's smoothed moving average (same as TradingView / standard RSI),
/// seeded with the simple average of the first `period` changes.
/// Yields `None` until `period + 1` closes have been observed.
#[derive(Debug, Clone)]
pub struct RsiIndicator {
    pub period: usize,
    prev_close: Option<f64>,
    seed_changes: usize,
    avg_gain: f64,
    avg_loss: f64,
}

impl RsiIndicator {
    pub fn new(period: usize) -> Self {
        assert!(period >= 2, "RSI period must be >= 2");
        Self {
            period,
            prev_close: None,
            seed_changes: 0,
            avg_gain: 0.0,
            avg_loss: 0.0,
        }
    }

    /// Feed the next close and return the updated RSI, if warmed up.
    pub fn update(&mut self, close: f64) -> Option<f64> {
        let Some(prev) = self.prev_close.replace(close) else {
            return None;
        };

        let change = close - prev;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        let period = self.period as f64;

        if self.seed_changes < self.period {
            // Accumulate the simple average of the first `period` changes
            self.avg_gain += gain / period;
            self.avg_loss += loss / period;
            self.seed_changes += 1;
        } else {
            self.avg_gain = (self.avg_gain * (period - 1.0) + gain) / period;
            self.avg_loss = (self.avg_loss * (period - 1.0) + loss) / period;
        }

        self.value()
    }

    /// Current RSI without consuming a new close.
    pub fn value(&self) -> Option<f64> {
        if self.seed_changes < self.period {
            return None;
        }
        if self.avg_loss == 0.0 {
            return Some(100.0);
        }
        let rs = self.avg_gain / self.avg_loss;
        Some(100.0 - 100.0 / (1.0 + rs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(rsi: &mut RsiIndicator, closes: &[f64]) -> Option<f64> {
        closes.iter().fold(None, |_, &c| rsi.update(c))
    }

    /// Batch reference: simple-average seed followed by Wilder smoothing.
    fn batch_rsi(period: usize, closes: &[f64]) -> Option<f64> {
        if closes.len() < period + 1 {
            return None;
        }
        let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
        let initial = &changes[..period];
        let mut avg_gain = initial.iter().filter(|&&c| c > 0.0).sum::<f64>() / period as f64;
        let mut avg_loss =
            initial.iter().filter(|&&c| c < 0.0).map(|c| c.abs()).sum::<f64>() / period as f64;
        for &change in &changes[period..] {
            let gain = if change > 0.0 { change } else { 0.0 };
            let loss = if change < 0.0 { change.abs() } else { 0.0 };
            avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
            avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
        }
        if avg_loss == 0.0 {
            return Some(100.0);
        }
        Some(100.0 - 100.0 / (1.0 + avg_gain / avg_loss))
    }

    #[test]
    fn rsi_returns_none_when_insufficient_data() {
        let mut rsi = RsiIndicator::new(14);
        // Need at least period+1 = 15 values
        assert!(feed(&mut rsi, &[100.0; 14]).is_none());
    }

    #[test]
    fn rsi_returns_some_with_sufficient_data() {
        let mut rsi = RsiIndicator::new(14);
        let prices: Vec<f64> = (0..15).map(|i| 100.0 + i as f64).collect();
        assert!(feed(&mut rsi, &prices).is_some());
    }

    #[test]
    fn rsi_all_gains_returns_100() {
        let mut rsi = RsiIndicator::new(3);
        let value = feed(&mut rsi, &[10.0, 11.0, 12.0, 13.0, 14.0]).unwrap();
        assert!((value - 100.0).abs() < 1e-6, "Expected ~100, got {value}");
    }

    #[test]
    fn rsi_all_losses_returns_0() {
        let mut rsi = RsiIndicator::new(3);
        let value = feed(&mut rsi, &[14.0, 13.0, 12.0, 11.0, 10.0]).unwrap();
        assert!(value.abs() < 1e-6, "Expected ~0, got {value}");
    }

    #[test]
    fn incremental_matches_batch_reference() {
        // Prices sourced from Investopedia RSI example (rounded)
        let prices = vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.15, 43.61, 44.33, 44.83, 45.10,
            45.15, 44.34, 44.09, 44.60, 45.20, 44.80, 43.90, 44.10,
        ];
        let mut rsi = RsiIndicator::new(14);
        for end in 1..=prices.len() {
            let incremental = rsi.update(prices[end - 1]);
            let batch = batch_rsi(14, &prices[..end]);
            match (incremental, batch) {
                (None, None) => {}
                (Some(a), Some(b)) => assert!((a - b).abs() < 1e-9, "at {end}: {a} vs {b}"),
                other => panic!("warm-up mismatch at {end}: {other:?}"),
            }
        }
        let v = rsi.value().unwrap();
        assert!((0.0..=100.0).contains(&v), "RSI out of range: {v}");
    }
}
