// ===============================
// src/main.rs
// ===============================
/*
 # jalankan demo dengan venue tiruan + recorder
 RECORD_FILE=logs/events.jsonl SYMBOLS=rb2405,cu2405 cargo run -- --orders 3 --ticks 5

 # cek metrik
 curl -s localhost:9898/metrics | grep '^order_events_total'
 curl -s localhost:9898/metrics | grep '^session_state'
*/
/*
=============================================================================
Project : venue_session — callback-driven futures venue session adapter
Module  : main.rs

Summary : Drives the venue handshake, reconciles order/trade pushes into an
          ordered deduplicated stream, aggregates position query rounds,
          exposes Prometheus metrics, and records JSONL events.
=============================================================================
*/
use clap::Parser;
use std::time::Instant;
use tokio::{
    select,
    sync::mpsc,
    time::{interval, MissedTickBehavior},
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use venue_session::{
    config,
    domain::{Direction, Event, Exchange, Offset, OrderRequest, OrderType, SubscribeRequest},
    gateway::Gateway,
    metrics,
    mock::{instrument, MockMdApi, MockTraderApi, MockVenue},
    recorder,
    sink::EventSink,
    venue::{codes, MdSpi, TraderSpi},
};

/// Demo run against an in-process venue.
#[derive(Parser, Debug)]
#[command(name = "venue_session")]
struct Cli {
    /// Orders to submit and fill through the mock venue
    #[arg(long, default_value_t = 3)]
    orders: usize,

    /// Depth snapshots to publish per subscribed symbol
    #[arg(long, default_value_t = 5)]
    ticks: usize,
}

#[tokio::main]
async fn main() {
    // ---- Logging ----
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut cfg = config::load();
    if cfg.symbols.is_empty() {
        cfg.symbols = vec!["rb2405".to_string()];
    }

    // ---- Metrics ----
    metrics::init();
    tokio::spawn(metrics::serve_metrics(cfg.metrics_port));

    info!(
        gateway = %cfg.gateway_name,
        td = %cfg.td_address,
        md = %cfg.md_address,
        symbols = ?cfg.symbols,
        throttle = ?cfg.throttle_mode,
        "startup config"
    );

    // ---- Event stream: log + optional recorder ----
    let (sink, mut events) = EventSink::channel(cfg.gateway_name.clone());
    let (rec_tx, rec_rx) = mpsc::unbounded_channel::<Event>();
    if let Some(path) = cfg.record_file.clone() {
        let gateway = cfg.gateway_name.clone();
        tokio::spawn(async move {
            if let Err(e) = recorder::run(rec_rx, gateway, path).await {
                error!(?e, "recorder stopped");
            }
        });
    } else {
        drop(rec_rx);
    }
    tokio::spawn(async move {
        while let Some(ev) = events.recv().await {
            match &ev {
                Event::Order(o) => info!(order_id = %o.order_id, status = o.status.as_str(), traded = o.traded, "order"),
                Event::Trade(t) => info!(trade_id = %t.trade_id, order_id = ?t.order_id, volume = t.volume, price = t.price, "trade"),
                Event::Tick(t) => info!(symbol = %t.symbol, last = t.last_price, "tick"),
                Event::Positions(batch) => info!(positions = batch.len(), "positions"),
                Event::Account(a) => info!(account = %a.account_id, balance = a.balance, "account"),
                Event::Contract(_) | Event::Log(_) => {}
            }
            let _ = rec_tx.send(ev);
        }
    });

    // ---- Gateway over the mock venue ----
    let mut gw = Gateway::new(MockTraderApi::new(), MockMdApi::new(), cfg.clone(), sink);
    gw.connect();

    let mut venue = MockVenue::new(
        1,
        1,
        cfg.symbols.iter().map(|s| instrument(s, Exchange::Shfe, 10.0, 1.0)).collect(),
    );
    {
        let (td, md) = gw.sessions_mut();
        venue.handshake_td(td);
        venue.answer_instruments(td);
        venue.handshake_md(md);
    }
    for symbol in &cfg.symbols {
        gw.subscribe(&SubscribeRequest { symbol: symbol.clone(), exchange: Exchange::Shfe });
    }

    // ---- Orders: accept -> trade -> all traded ----
    let symbol = cfg.symbols[0].clone();
    for i in 0..cli.orders {
        let req = OrderRequest {
            symbol: symbol.clone(),
            exchange: Exchange::Shfe,
            direction: if i % 2 == 0 { Direction::Long } else { Direction::Short },
            offset: Offset::Open,
            order_type: OrderType::Limit,
            price: 3500.0 + i as f64,
            volume: 1,
        };
        if let Err(e) = gw.send_order(&req) {
            warn!(%e, "order rejected locally");
            continue;
        }
        let (td, _) = gw.sessions_mut();
        let Some(input) = td.api().ledger().inserts.last().cloned() else { continue };
        let sys_id = format!("{:>12}", i + 1);
        let accepted = venue.order_update(&input, &sys_id, codes::OST_NO_TRADE_QUEUEING, 0);
        td.on_rtn_order(&accepted);
        let trade = venue.trade_for(&accepted, req.price, req.volume);
        td.on_rtn_trade(&trade);
        td.on_rtn_order(&venue.order_update(&input, &sys_id, codes::OST_ALL_TRADED, req.volume));
    }

    // ---- Market data ----
    for n in 0..cli.ticks {
        let (_, md) = gw.sessions_mut();
        for symbol in &cfg.symbols {
            md.on_rtn_depth_market_data(&venue.depth(symbol, 3500.0 + n as f64));
        }
    }

    // ---- Timer loop ----
    let mut timer = interval(cfg.timer_interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        select! {
            _ = timer.tick() => gw.on_timer(Instant::now()),
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }
    gw.close();
}
