//! Builders for cycle inputs shared by the integration tests.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;

use edgewatch::types::*;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

/// A liquid market two months from resolution, with no extra data.
pub fn make_market(id: &str, probability: f64) -> MarketFeed {
    MarketFeed::new(MarketSnapshot {
        id: id.into(),
        question: format!("Will {id} happen?"),
        category: MarketCategory::Politics,
        probability,
        liquidity: 50_000.0,
        volume_history: Vec::new(),
        probability_history: Vec::new(),
        days_to_resolution: 60.0,
        observed_at: t0(),
    })
}

pub fn with_reference(mut feed: MarketFeed, probability: f64) -> MarketFeed {
    feed.references.push(ExternalReference {
        source: "betfair".into(),
        probability,
        observed_at: t0() - Duration::minutes(5),
    });
    feed
}

/// Six 10,000 USD buckets across the 24h baseline, then `window_volume`
/// in the last 4h.
pub fn with_volume(mut feed: MarketFeed, window_volume: f64) -> MarketFeed {
    for i in 0..6 {
        feed.snapshot.volume_history.push(VolumeBucket {
            start: t0() - Duration::hours(8 + 4 * i),
            volume: 10_000.0,
        });
    }
    feed.snapshot.volume_history.push(VolumeBucket {
        start: t0() - Duration::hours(4),
        volume: window_volume,
    });
    feed
}

/// Daily samples over the last week followed by one an hour ago.
pub fn with_history(mut feed: MarketFeed, daily: &[f64], previous: f64) -> MarketFeed {
    let n = daily.len() as i64;
    for (i, p) in daily.iter().enumerate() {
        feed.snapshot.probability_history.push(ProbabilityPoint {
            at: t0() - Duration::days(n - i as i64),
            probability: *p,
        });
    }
    feed.snapshot.probability_history.push(ProbabilityPoint {
        at: t0() - Duration::hours(1),
        probability: previous,
    });
    feed
}

pub fn fresh_wallet(market_id: &str, side: Side, size_usd: f64) -> WalletActivity {
    WalletActivity {
        wallet: "0xfresh".into(),
        market_id: market_id.into(),
        side,
        size_usd,
        wallet_age_hours: Some(12.0),
        trade_count: Some(1),
        success_rate: None,
        market_concentration: Some(0.95),
        largest_other_bet_usd: Some(200.0),
    }
}

pub fn make_position(market_id: &str, side: Side, stake: Decimal, entry: f64) -> OpenPosition {
    OpenPosition {
        market_id: market_id.into(),
        side,
        stake,
        entry_probability: entry,
        correlated_market_id: None,
    }
}

pub fn make_input(markets: Vec<MarketFeed>) -> CycleInput {
    CycleInput {
        markets,
        correlations: None,
    }
}
