use std::cmp::Ordering;

use common::PriceBar;

/// Synthetic series of `left.close - right.close` on the dates both series share.
///
/// Both inputs must be ascending by timestamp. Each output bar carries the
/// spread in every OHLC field and zero volume.
pub fn spread_series(left: &[PriceBar], right: &[PriceBar]) -> Vec<PriceBar> {
    let mut out = Vec::with_capacity(left.len().min(right.len()));
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        match left[i].timestamp.cmp(&right[j].timestamp) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                out.push(PriceBar::flat(
                    left[i].timestamp,
                    left[i].close - right[j].close,
                ));
                i += 1;
                j += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    fn bars(days: &[i64], closes: &[f64]) -> Vec<PriceBar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        days.iter()
            .zip(closes)
            .map(|(&d, &c)| PriceBar::flat(start + Duration::days(d), c))
            .collect()
    }

    #[test]
    fn inner_joins_on_shared_dates() {
        let btc = bars(&[0, 1, 2, 4], &[100.0, 110.0, 120.0, 140.0]);
        let eth = bars(&[1, 2, 3, 4], &[10.0, 30.0, 40.0, 150.0]);
        let spread = spread_series(&btc, &eth);

        let closes: Vec<f64> = spread.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![100.0, 90.0, -10.0]);
        assert_eq!(spread[0].timestamp, btc[1].timestamp);
        assert!(spread.iter().all(|b| b.open == b.close && b.volume == 0.0));
    }

    #[test]
    fn disjoint_series_produce_nothing() {
        let a = bars(&[0, 2], &[1.0, 2.0]);
        let b = bars(&[1, 3], &[1.0, 2.0]);
        assert!(spread_series(&a, &b).is_empty());
    }
}
