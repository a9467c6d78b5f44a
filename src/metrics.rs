// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, GaugeVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use tracing::{error, info};

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Consumer event stream --------
pub static ORDER_EVENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("order_events_total", "order updates emitted (label: status)"),
        &["status"],
    )
    .unwrap()
});

pub static TRADE_EVENTS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("trade_events_total", "trade notifications emitted").unwrap());

pub static CONTRACT_EVENTS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("contract_events_total", "contracts announced").unwrap());

pub static TICK_EVENTS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("tick_events_total", "market data ticks emitted").unwrap());

pub static ERROR_NOTES: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("error_notes_total", "error notifications surfaced").unwrap());

// -------- Reconciliation --------
pub static DUPLICATES_SUPPRESSED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("order_duplicates_suppressed_total", "duplicate order pushes dropped").unwrap()
});

pub static ORDERS_HELD: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("order_updates_held_total", "fill updates held until their trade").unwrap()
});

pub static UNRESOLVED_TRADES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("trades_unresolved_total", "trades whose system id had no binding").unwrap()
});

pub static EVENTS_BUFFERED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("events_buffered_total", "events buffered before reference data (label: kind)"),
        &["kind"],
    )
    .unwrap()
});

pub static EVENTS_REPLAYED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("events_replayed_total", "buffered events replayed").unwrap()
});

// -------- Handshake --------
pub static THROTTLE_RETRIES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("query_throttle_retries_total", "query submissions retried after throttle").unwrap()
});

pub static SESSION_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("session_state", "handshake state ordinal (label: session)"),
        &["session"],
    )
    .unwrap()
});

pub static CONTRACTS_LOADED: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("contracts_loaded", "contracts in the reference store").unwrap());

// -------- Positions & account --------
pub static POSITION_VOLUME: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("position_volume", "volume per symbol & side"),
        &["symbol", "direction"],
    )
    .unwrap()
});

pub static ACCOUNT_BALANCE: Lazy<GaugeVec> = Lazy::new(|| {
    GaugeVec::new(Opts::new("account_balance", "balance per account"), &["account"]).unwrap()
});

pub fn init() {
    // Register all metrics to the custom registry
    for m in [
        REGISTRY.register(Box::new(ORDER_EVENTS.clone())),
        REGISTRY.register(Box::new(TRADE_EVENTS.clone())),
        REGISTRY.register(Box::new(CONTRACT_EVENTS.clone())),
        REGISTRY.register(Box::new(TICK_EVENTS.clone())),
        REGISTRY.register(Box::new(ERROR_NOTES.clone())),
        REGISTRY.register(Box::new(DUPLICATES_SUPPRESSED.clone())),
        REGISTRY.register(Box::new(ORDERS_HELD.clone())),
        REGISTRY.register(Box::new(UNRESOLVED_TRADES.clone())),
        REGISTRY.register(Box::new(EVENTS_BUFFERED.clone())),
        REGISTRY.register(Box::new(EVENTS_REPLAYED.clone())),
        REGISTRY.register(Box::new(THROTTLE_RETRIES.clone())),
        REGISTRY.register(Box::new(SESSION_STATE.clone())),
        REGISTRY.register(Box::new(CONTRACTS_LOADED.clone())),
        REGISTRY.register(Box::new(POSITION_VOLUME.clone())),
        REGISTRY.register(Box::new(ACCOUNT_BALANCE.clone())),
    ] {
        if let Err(e) = m {
            error!(?e, "metric registration failed");
        }
    }
}

// Encode all metrics in Prometheus text format
pub fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

// Serve one HTTP request (GET / or /metrics), no header parsing
fn handle_client(mut stream: TcpStream) {
    let mut _req_buf = [0u8; 1024];
    let _ = stream.read(&mut _req_buf);

    let body = encode_metrics();
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

// Metrics server lives on its own OS thread, away from the session contexts
pub async fn serve_metrics(port: u16) {
    thread::spawn(move || {
        let addr = format!("0.0.0.0:{port}");
        let listener = match TcpListener::bind(&addr) {
            Ok(l) => l,
            Err(e) => {
                error!(%addr, ?e, "metrics bind failed");
                return;
            }
        };
        info!(%addr, "metrics listening");

        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream),
                Err(e) => error!(?e, "metrics accept error"),
            }
        }
    });
}
