//! Test fixtures shared by the tool and crew tests

use chrono::{Duration, TimeZone, Utc};

use crate::api::{MockPriceSource, PriceBar};

/// `n` daily bars with closes rising from 100 by 1 per day
pub fn bars(n: usize) -> Vec<PriceBar> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let close = 100.0 + i as f64;
            PriceBar {
                timestamp: start + Duration::days(i as i64),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                adj_close: close,
                volume: 1_000 + i as u64,
            }
        })
        .collect()
}

/// Price source answering `times` quote and history calls with 260 bars
pub fn healthy_prices(times: usize) -> MockPriceSource {
    let mut prices = MockPriceSource::new();
    prices
        .expect_latest_quote()
        .times(times)
        .returning(|_| Ok(bars(260)[259].clone()));
    prices
        .expect_history()
        .times(times)
        .returning(|_, _| Ok(bars(260)));
    prices
}
