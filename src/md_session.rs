// ===============================
// src/md_session.rs
// ===============================
//
// Market-data session: login, subscription set kept across reconnects,
// depth snapshots converted into ticks.
//
use ahash::AHashSet as HashSet;
use chrono::Local;
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::contracts::ContractStore;
use crate::domain::{Exchange, SubscribeRequest, TickSnapshot};
use crate::handshake::{MdHandshake, MdState, Step};
use crate::sink::EventSink;
use crate::venue::{
    adjust_price, parse_venue_datetime, DepthMarketDataField, MdApi, MdSpi, ReqUserLogin, RspInfo,
    RspUserLogin,
};

pub struct MdSession<A: MdApi> {
    api: A,
    config: SessionConfig,
    sink: EventSink,
    contracts: ContractStore,
    handshake: MdHandshake,
    subscribed: HashSet<String>,
    connect_status: bool,
    reqid: i32,
    current_date: String,
}

fn local_date() -> String { Local::now().format("%Y%m%d").to_string() }

impl<A: MdApi> MdSession<A> {
    pub fn new(api: A, config: SessionConfig, contracts: ContractStore, sink: EventSink) -> Self {
        Self {
            api,
            config,
            sink,
            contracts,
            handshake: MdHandshake::new(),
            subscribed: HashSet::new(),
            connect_status: false,
            reqid: 0,
            current_date: local_date(),
        }
    }

    pub fn api(&self) -> &A { &self.api }
    pub fn api_mut(&mut self) -> &mut A { &mut self.api }
    pub fn state(&self) -> MdState { self.handshake.state() }
    pub fn is_subscribed(&self, symbol: &str) -> bool { self.subscribed.contains(symbol) }
    pub fn current_date(&self) -> &str { &self.current_date }

    pub fn connect(&mut self) {
        if self.connect_status {
            return;
        }
        self.handshake.on_connect_requested();
        let address = self.config.md_address.clone();
        self.api.connect(&address);
        self.connect_status = true;
    }

    /// Remembered even before login; sent right away when the session is ready.
    pub fn subscribe(&mut self, req: &SubscribeRequest) {
        if self.handshake.is_ready() {
            self.api.subscribe_market_data(std::slice::from_ref(&req.symbol));
        }
        self.subscribed.insert(req.symbol.clone());
    }

    /// Date used for ticks whose venue date is missing or unreliable.
    pub fn update_date(&mut self) {
        self.current_date = local_date();
    }

    /// Overrides the clock date (replays and tests).
    pub fn set_current_date(&mut self, date: impl Into<String>) {
        self.current_date = date.into();
    }

    pub fn close(&mut self) {
        if self.connect_status {
            self.sink.write_log("market data session closed");
        }
    }

    fn login(&mut self) {
        let req = ReqUserLogin {
            broker_id: self.config.broker_id.clone(),
            user_id: self.config.user_id.clone(),
            password: self.config.password.clone(),
        };
        self.reqid += 1;
        self.api.req_user_login(&req, self.reqid);
    }

    fn resubscribe(&mut self) {
        if self.subscribed.is_empty() {
            return;
        }
        let mut symbols: Vec<String> = self.subscribed.iter().cloned().collect();
        symbols.sort();
        info!(count = symbols.len(), "resubscribing market data");
        self.api.subscribe_market_data(&symbols);
    }

    fn tick_from(&self, data: &DepthMarketDataField) -> Option<TickSnapshot> {
        // filter non-trading hours snapshots
        if data.update_time.is_empty() {
            return None;
        }
        let contract = self.contracts.get(&data.instrument_id)?;

        // DCE stamps the trading day into ActionDay during night sessions
        let date = if contract.exchange == Exchange::Dce || data.action_day.is_empty() {
            self.current_date.as_str()
        } else {
            data.action_day.as_str()
        };
        let time = format!("{}.{:03}", data.update_time, data.update_millisec);

        let mut tick = TickSnapshot {
            symbol: data.instrument_id.clone(),
            exchange: contract.exchange,
            name: contract.name,
            datetime: parse_venue_datetime(date, &time),
            volume: data.volume,
            turnover: data.turnover,
            open_interest: data.open_interest,
            last_price: adjust_price(data.last_price),
            limit_up: data.upper_limit_price,
            limit_down: data.lower_limit_price,
            open_price: adjust_price(data.open_price),
            high_price: adjust_price(data.highest_price),
            low_price: adjust_price(data.lowest_price),
            pre_close: adjust_price(data.pre_close_price),
            bid_prices: [0.0; 5],
            bid_volumes: [0; 5],
            ask_prices: [0.0; 5],
            ask_volumes: [0; 5],
        };

        let depth = if data.bid_volumes[1] != 0 || data.ask_volumes[1] != 0 { 5 } else { 1 };
        for i in 0..depth {
            tick.bid_prices[i] = adjust_price(data.bid_prices[i]);
            tick.bid_volumes[i] = data.bid_volumes[i];
            tick.ask_prices[i] = adjust_price(data.ask_prices[i]);
            tick.ask_volumes[i] = data.ask_volumes[i];
        }
        Some(tick)
    }
}

impl<A: MdApi> MdSpi for MdSession<A> {
    fn on_front_connected(&mut self) {
        self.sink.write_log("market data front connected");
        if self.handshake.on_front_connected() == Step::Login {
            self.login();
        }
    }

    fn on_front_disconnected(&mut self, reason: i32) {
        self.handshake.on_disconnected();
        self.sink.write_log(format!("market data front disconnected, reason {reason}"));
    }

    fn on_rsp_user_login(&mut self, _rsp: &RspUserLogin, info: &RspInfo) {
        if self.handshake.on_login(info) {
            self.sink.write_log("market data login ok");
            self.resubscribe();
        } else {
            self.sink.write_error("market data login failed", info);
        }
    }

    fn on_rsp_error(&mut self, info: &RspInfo) {
        self.sink.write_error("market data error", info);
    }

    fn on_rsp_sub_market_data(&mut self, symbol: &str, info: &RspInfo) {
        if !info.is_ok() {
            self.sink.write_error(&format!("subscribe {symbol} failed"), info);
        }
    }

    fn on_rtn_depth_market_data(&mut self, data: &DepthMarketDataField) {
        match self.tick_from(data) {
            Some(tick) => self.sink.on_tick(tick),
            None => debug!(symbol = %data.instrument_id, "depth snapshot dropped"),
        }
    }
}
