mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::*;
use spreadbot::config::Settings;
use spreadbot::execution::{Book, MovingAverageTrader, Shutdown};
use spreadbot::models::{Holding, OrderSide, OrderState, PriceBar, Security};

/// Flat closes at 100 with a final close at `last`
fn closes_ending_at(last: f64) -> Vec<PriceBar> {
    let start = Utc::now() - ChronoDuration::days(1);
    let mut closes = vec![100.0; 80];
    closes.push(last);
    closes
        .into_iter()
        .enumerate()
        .map(|(i, close)| PriceBar {
            timestamp: start + ChronoDuration::minutes(5 * i as i64),
            open: close,
            high: close,
            low: close,
            close,
        })
        .collect()
}

fn trader(broker: &ScriptedBroker) -> MovingAverageTrader<'_, ScriptedBroker> {
    MovingAverageTrader::new(
        broker,
        Security::from("ETH"),
        &Settings::default(),
        Shutdown::never(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_dip_under_short_average_buys_all_in() {
    let broker = ScriptedBroker::new()
        .with_history("ETH", closes_ending_at(90.0))
        .with_submits(vec![accepted("b1")])
        .with_statuses(vec![filled(90.0, 0.5)]);
    let mut book = Book {
        cash: 50.0,
        shares: 0.0,
    };

    trader(&broker).step(&mut book).await.unwrap();

    let orders = broker.orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].side, OrderSide::Buy);
    assert_eq!(orders[0].limit_price, 90.0);
    assert_eq!(orders[0].quantity, 0.55555555);
    assert_eq!(book.shares, 0.5);
    assert!((book.cash - 5.0).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_rise_over_long_average_sells_free_shares() {
    let broker = ScriptedBroker::new()
        .with_history("ETH", closes_ending_at(110.0))
        .with_positions(vec![Holding {
            security: Security::from("ETH"),
            quantity: 1.5,
            quantity_held_for_sell: 0.5,
        }])
        .with_submits(vec![accepted("s1")])
        .with_statuses(vec![status(OrderState::Confirmed), filled(110.0, 1.0)]);
    let mut book = Book {
        cash: 0.0,
        shares: 1.0,
    };

    trader(&broker).step(&mut book).await.unwrap();

    let orders = broker.orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].side, OrderSide::Sell);
    assert_eq!(orders[0].quantity, 1.0);
    assert_eq!(book.shares, 0.0);
    assert!((book.cash - 110.0).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_no_cash_no_buy() {
    let broker = ScriptedBroker::new().with_history("ETH", closes_ending_at(90.0));
    let mut book = Book {
        cash: 0.5,
        shares: 0.0,
    };

    trader(&broker).step(&mut book).await.unwrap();

    assert!(broker.orders().is_empty());
    assert_eq!(book.cash, 0.5);
}

#[tokio::test(start_paused = true)]
async fn test_short_history_is_insufficient_data() {
    let broker = ScriptedBroker::new().with_history("ETH", flat_bars(10, 100.0, 1.0));
    let mut book = Book {
        cash: 50.0,
        shares: 0.0,
    };

    let err = trader(&broker).step(&mut book).await.unwrap_err();
    assert!(matches!(err, spreadbot::TradeError::InsufficientData(_)));
}

#[tokio::test(start_paused = true)]
async fn test_sell_survives_a_lost_status_poll() {
    let broker = ScriptedBroker::new()
        .with_history("ETH", closes_ending_at(110.0))
        .with_positions(vec![Holding {
            security: Security::from("ETH"),
            quantity: 1.0,
            quantity_held_for_sell: 0.0,
        }])
        .with_submits(vec![accepted("s1"), accepted("s2")])
        .with_statuses(vec![filled(110.0, 1.0)])
        .with_status_outage(1..2);
    let mut book = Book {
        cash: 0.0,
        shares: 1.0,
    };

    trader(&broker).step(&mut book).await.unwrap();

    assert_eq!(broker.orders().len(), 1);
    assert_eq!(broker.status_calls(), 2);
    assert_eq!(book.shares, 0.0);
    assert!((book.cash - 110.0).abs() < 1e-9);
}
