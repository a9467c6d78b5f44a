use proptest::prelude::*;
use tokio::sync::mpsc::UnboundedReceiver;

use venue_session::contracts::ContractStore;
use venue_session::domain::{ContractReference, Direction, Event, Exchange, Product, Status};
use venue_session::positions::PositionAggregator;
use venue_session::reconcile::{Outcome, ReconciliationEngine};
use venue_session::venue::{codes, InvestorPositionField, OrderField, TradeField};
use venue_session::EventSink;

fn contract(exchange: Exchange, size: f64) -> ContractReference {
    ContractReference {
        symbol: "rb2405".into(),
        exchange,
        name: "rb".into(),
        product: Product::Futures,
        size,
        pricetick: 1.0,
        option: None,
    }
}

fn engine() -> (ReconciliationEngine, UnboundedReceiver<Event>) {
    let store = ContractStore::new();
    store.upsert(contract(Exchange::Shfe, 10.0));
    store.mark_initialized();
    let (sink, rx) = EventSink::channel("CTP");
    (ReconciliationEngine::new(store, sink), rx)
}

fn push(status: char) -> OrderField {
    OrderField {
        instrument_id: "rb2405".into(),
        exchange_id: "SHFE".into(),
        front_id: 1,
        session_id: 7,
        order_ref: "1".into(),
        order_sys_id: "S1".into(),
        order_price_type: codes::OPT_LIMIT_PRICE,
        time_condition: codes::TC_GFD,
        volume_condition: codes::VC_AV,
        direction: codes::D_BUY,
        comb_offset_flag: codes::OF_OPEN,
        limit_price: 3500.0,
        volume_total_original: 5,
        order_status: status,
        insert_date: "20240315".into(),
        insert_time: "09:30:00".into(),
        ..Default::default()
    }
}

// cumulative fill update for an order of `total` lots
fn fill(status: char, traded: i64, total: i64) -> OrderField {
    OrderField { volume_traded: traded, volume_total_original: total, ..push(status) }
}

fn trade(n: usize, volume: i64) -> TradeField {
    TradeField {
        instrument_id: "rb2405".into(),
        exchange_id: "SHFE".into(),
        order_sys_id: "S1".into(),
        trade_id: format!("T{n}"),
        direction: codes::D_BUY,
        offset_flag: codes::OF_OPEN,
        price: 3500.0,
        volume,
        trade_date: "20240315".into(),
        trade_time: "09:30:01".into(),
    }
}

// every order update must follow the trades its traded volume accounts for
fn assert_trades_precede_fills(events: &[Event], trades: usize, total: i64) -> Result<(), TestCaseError> {
    let mut covered = 0;
    let mut seen_trades = 0;
    let mut finals = 0;
    for event in events {
        match event {
            Event::Trade(t) => {
                covered += t.volume;
                seen_trades += 1;
            }
            Event::Order(o) => {
                prop_assert!(o.traded <= covered, "order traded {} ahead of trades {}", o.traded, covered);
                if o.status == Status::AllTraded {
                    finals += 1;
                }
            }
            _ => {}
        }
    }
    prop_assert_eq!(seen_trades, trades);
    prop_assert_eq!(covered, total);
    prop_assert_eq!(finals, 1);
    let last_order = events.iter().rev().find_map(|e| match e {
        Event::Order(o) => Some(o),
        _ => None,
    });
    prop_assert_eq!(last_order.map(|o| (o.status, o.traded)), Some((Status::AllTraded, total)));
    Ok(())
}

fn status_code() -> impl Strategy<Value = char> {
    prop::sample::select(vec![codes::OST_UNKNOWN, codes::OST_NO_TRADE_QUEUEING, codes::OST_CANCELED])
}

proptest! {
    // without fills, a push is emitted exactly when its status differs from the previous one
    #[test]
    fn only_status_changes_reach_consumers(statuses in prop::collection::vec(status_code(), 1..30)) {
        let (mut eng, mut rx) = engine();
        let mut expected = 0;
        let mut prev: Option<char> = None;
        for s in &statuses {
            let outcome = eng.on_order(&push(*s));
            if prev == Some(*s) {
                prop_assert_eq!(outcome, Outcome::Suppressed);
            } else {
                prop_assert_eq!(outcome, Outcome::Emitted);
                expected += 1;
            }
            prev = Some(*s);
        }
        let orders = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|e| matches!(e, Event::Order(_)))
            .count();
        prop_assert_eq!(orders, expected);
    }

    #[test]
    fn average_price_is_total_cost_over_notional(
        frags in prop::collection::vec((1i64..50, 1.0f64..10_000.0), 1..10),
        size in prop::sample::select(vec![1.0f64, 5.0, 10.0, 300.0]),
    ) {
        let c = contract(Exchange::Dce, size);
        let mut agg = PositionAggregator::new();
        for (position, cost) in &frags {
            let f = InvestorPositionField {
                instrument_id: "rb2405".into(),
                position: *position,
                today_position: *position,
                position_cost: *cost,
                ..Default::default()
            };
            agg.on_fragment(&f, Direction::Long, &c);
        }
        let batch = agg.finish_round();
        let volume: i64 = frags.iter().map(|(p, _)| p).sum();
        let cost: f64 = frags.iter().map(|(_, c)| c).sum();
        prop_assert_eq!(batch[0].volume, volume);
        let expected = cost / (volume as f64 * size);
        prop_assert!((batch[0].price - expected).abs() <= 1e-6 * expected.max(1.0));
    }

    // every round starts empty, so repeating a round reproduces the same snapshot
    #[test]
    fn repeated_rounds_are_identical(position in 0i64..100, today in 0i64..100, cost in 0.0f64..1e6) {
        let c = contract(Exchange::Shfe, 10.0);
        let f = InvestorPositionField {
            instrument_id: "rb2405".into(),
            position,
            today_position: today.min(position),
            yd_position: position - today.min(position),
            position_cost: cost,
            ..Default::default()
        };
        let mut agg = PositionAggregator::new();
        agg.on_fragment(&f, Direction::Short, &c);
        let first = agg.finish_round();
        agg.on_fragment(&f, Direction::Short, &c);
        let second = agg.finish_round();
        prop_assert_eq!(first, second);
    }

    // one final update arriving anywhere among the trades of the same fill
    #[test]
    fn final_update_never_overtakes_its_trades(
        (volumes, at) in prop::collection::vec(1i64..5, 1..6).prop_flat_map(|v| {
            let n = v.len();
            (Just(v), 0..=n)
        })
    ) {
        let total: i64 = volumes.iter().sum();
        let (mut eng, mut rx) = engine();
        eng.on_order(&fill(codes::OST_NO_TRADE_QUEUEING, 0, total));
        for (i, volume) in volumes.iter().enumerate() {
            if i == at {
                eng.on_order(&fill(codes::OST_ALL_TRADED, total, total));
            }
            eng.on_trade(&trade(i, *volume));
        }
        if at == volumes.len() {
            eng.on_order(&fill(codes::OST_ALL_TRADED, total, total));
        }
        let events: Vec<Event> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_trades_precede_fills(&events, volumes.len(), total)?;
        prop_assert!(!eng.is_held("S1"));
    }

    // cumulative updates and trades each arrive in order, interleaved arbitrarily
    #[test]
    fn interleaved_updates_never_overtake_their_trades(
        (volumes, markers) in prop::collection::vec(1i64..5, 1..6).prop_flat_map(|v| {
            let markers: Vec<bool> = v.iter().flat_map(|_| [true, false]).collect();
            (Just(v), Just(markers).prop_shuffle())
        })
    ) {
        let total: i64 = volumes.iter().sum();
        let (mut eng, mut rx) = engine();
        eng.on_order(&fill(codes::OST_NO_TRADE_QUEUEING, 0, total));
        let (mut next_trade, mut next_update, mut cumulative) = (0, 0, 0);
        for is_trade in markers {
            if is_trade {
                eng.on_trade(&trade(next_trade, volumes[next_trade]));
                next_trade += 1;
            } else {
                cumulative += volumes[next_update];
                next_update += 1;
                let status = if cumulative == total { codes::OST_ALL_TRADED } else { codes::OST_PART_TRADED_QUEUEING };
                eng.on_order(&fill(status, cumulative, total));
            }
        }
        let events: Vec<Event> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_trades_precede_fills(&events, volumes.len(), total)?;
        prop_assert!(!eng.is_held("S1"));
        prop_assert_eq!(eng.active_order("1_7_1"), None);
    }
}
