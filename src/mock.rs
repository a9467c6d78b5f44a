// ===============================
// src/mock.rs
// ===============================
//
// In-process stand-ins for the venue fronts. The APIs record every request in
// a shared ledger; `MockVenue` plays the venue side by feeding callbacks back
// into a session. Used by the demo binary and the tests.
//
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::Exchange;
use crate::handshake::{MdState, TdState};
use crate::md_session::MdSession;
use crate::td_session::TdSession;
use crate::venue::{
    codes, DepthMarketDataField, InputOrderActionField, InputOrderField, InstrumentField, MdApi,
    MdSpi, OrderField, QryInvestorPosition, QryTradingAccount, ReqAuthenticate, ReqUserLogin,
    RspInfo, RspUserLogin, SettlementInfoConfirm, TradeField, TraderApi, TraderSpi,
};

#[derive(Debug, Default)]
pub struct TdLedger {
    pub connects: Vec<String>,
    pub authenticates: Vec<ReqAuthenticate>,
    pub logins: Vec<ReqUserLogin>,
    pub settlements: Vec<SettlementInfoConfirm>,
    pub instrument_queries: u32,
    pub position_queries: Vec<QryInvestorPosition>,
    pub account_queries: Vec<QryTradingAccount>,
    pub inserts: Vec<InputOrderField>,
    pub actions: Vec<InputOrderActionField>,
    pub request_ids: Vec<i32>,
    /// Codes returned by successive instrument queries; empty means admitted.
    pub instrument_codes: VecDeque<i32>,
    /// Code returned by order inserts.
    pub insert_code: i32,
}

#[derive(Debug, Clone, Default)]
pub struct MockTraderApi {
    ledger: Arc<Mutex<TdLedger>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl MockTraderApi {
    pub fn new() -> Self { Self::default() }

    /// Instrument query returns these codes in order before it is admitted.
    pub fn with_instrument_codes(codes: impl IntoIterator<Item = i32>) -> Self {
        let api = Self::default();
        api.ledger().instrument_codes = codes.into_iter().collect();
        api
    }

    pub fn ledger(&self) -> MutexGuard<'_, TdLedger> { lock(&self.ledger) }
}

impl TraderApi for MockTraderApi {
    fn connect(&mut self, address: &str) {
        self.ledger().connects.push(address.to_string());
    }

    fn req_authenticate(&mut self, req: &ReqAuthenticate, request_id: i32) -> i32 {
        let mut l = self.ledger();
        l.request_ids.push(request_id);
        l.authenticates.push(req.clone());
        0
    }

    fn req_user_login(&mut self, req: &ReqUserLogin, request_id: i32) -> i32 {
        let mut l = self.ledger();
        l.request_ids.push(request_id);
        l.logins.push(req.clone());
        0
    }

    fn req_settlement_info_confirm(&mut self, req: &SettlementInfoConfirm, request_id: i32) -> i32 {
        let mut l = self.ledger();
        l.request_ids.push(request_id);
        l.settlements.push(req.clone());
        0
    }

    fn req_qry_instrument(&mut self, request_id: i32) -> i32 {
        let mut l = self.ledger();
        l.request_ids.push(request_id);
        l.instrument_queries += 1;
        l.instrument_codes.pop_front().unwrap_or(0)
    }

    fn req_qry_investor_position(&mut self, req: &QryInvestorPosition, request_id: i32) -> i32 {
        let mut l = self.ledger();
        l.request_ids.push(request_id);
        l.position_queries.push(req.clone());
        0
    }

    fn req_qry_trading_account(&mut self, req: &QryTradingAccount, request_id: i32) -> i32 {
        let mut l = self.ledger();
        l.request_ids.push(request_id);
        l.account_queries.push(req.clone());
        0
    }

    fn req_order_insert(&mut self, req: &InputOrderField, request_id: i32) -> i32 {
        let mut l = self.ledger();
        l.request_ids.push(request_id);
        l.inserts.push(req.clone());
        l.insert_code
    }

    fn req_order_action(&mut self, req: &InputOrderActionField, request_id: i32) -> i32 {
        let mut l = self.ledger();
        l.request_ids.push(request_id);
        l.actions.push(req.clone());
        0
    }
}

#[derive(Debug, Default)]
pub struct MdLedger {
    pub connects: Vec<String>,
    pub logins: Vec<ReqUserLogin>,
    pub subscriptions: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct MockMdApi {
    ledger: Arc<Mutex<MdLedger>>,
}

impl MockMdApi {
    pub fn new() -> Self { Self::default() }

    pub fn ledger(&self) -> MutexGuard<'_, MdLedger> { lock(&self.ledger) }
}

impl MdApi for MockMdApi {
    fn connect(&mut self, address: &str) {
        self.ledger().connects.push(address.to_string());
    }

    fn req_user_login(&mut self, req: &ReqUserLogin, _request_id: i32) -> i32 {
        self.ledger().logins.push(req.clone());
        0
    }

    fn subscribe_market_data(&mut self, symbols: &[String]) -> i32 {
        self.ledger().subscriptions.push(symbols.to_vec());
        0
    }
}

// ---- Venue side ----

pub fn instrument(symbol: &str, exchange: Exchange, size: f64, pricetick: f64) -> InstrumentField {
    InstrumentField {
        instrument_id: symbol.to_string(),
        exchange_id: exchange.as_str().to_string(),
        instrument_name: symbol.to_string(),
        product_class: codes::PC_FUTURES,
        product_id: symbol.trim_end_matches(|c: char| c.is_ascii_digit()).to_string(),
        volume_multiple: size,
        price_tick: pricetick,
        ..Default::default()
    }
}

/// Plays one venue front: login identity plus the instrument table it serves.
#[derive(Debug, Clone)]
pub struct MockVenue {
    pub front_id: i32,
    pub session_id: i32,
    pub trading_day: String,
    pub instruments: Vec<InstrumentField>,
    next_trade_id: u64,
}

impl MockVenue {
    pub fn new(front_id: i32, session_id: i32, instruments: Vec<InstrumentField>) -> Self {
        Self {
            front_id,
            session_id,
            trading_day: "20240315".to_string(),
            instruments,
            next_trade_id: 0,
        }
    }

    fn login_rsp(&self) -> RspUserLogin {
        RspUserLogin {
            front_id: self.front_id,
            session_id: self.session_id,
            trading_day: self.trading_day.clone(),
        }
    }

    /// Answers the trading handshake up to the instrument query.
    pub fn handshake_td(&self, td: &mut TdSession<MockTraderApi>) {
        td.on_front_connected();
        if td.state() == TdState::Authenticating {
            td.on_rsp_authenticate(&RspInfo::ok());
        }
        if td.state() == TdState::LoggingIn {
            td.on_rsp_user_login(&self.login_rsp(), &RspInfo::ok());
        }
        if td.state() == TdState::SettlementConfirming {
            td.on_rsp_settlement_info_confirm(&RspInfo::ok());
        }
    }

    /// Streams the instrument table; the last row carries the completion flag.
    pub fn answer_instruments(&self, td: &mut TdSession<MockTraderApi>) {
        if self.instruments.is_empty() {
            td.on_rsp_qry_instrument(None, &RspInfo::ok(), true);
            return;
        }
        let last = self.instruments.len() - 1;
        for (i, inst) in self.instruments.iter().enumerate() {
            td.on_rsp_qry_instrument(Some(inst), &RspInfo::ok(), i == last);
        }
    }

    pub fn handshake_md(&self, md: &mut MdSession<MockMdApi>) {
        md.on_front_connected();
        if md.state() == MdState::LoggingIn {
            md.on_rsp_user_login(&self.login_rsp(), &RspInfo::ok());
        }
    }

    /// Order push for a submitted order; `sys_id` stays empty until the exchange accepts it.
    pub fn order_update(&self, input: &InputOrderField, sys_id: &str, status: char, traded: i64) -> OrderField {
        OrderField {
            instrument_id: input.instrument_id.clone(),
            exchange_id: input.exchange_id.clone(),
            front_id: self.front_id,
            session_id: self.session_id,
            order_ref: input.order_ref.clone(),
            order_sys_id: sys_id.to_string(),
            order_price_type: input.order_price_type,
            time_condition: input.time_condition,
            volume_condition: input.volume_condition,
            direction: input.direction,
            comb_offset_flag: input.comb_offset_flag,
            limit_price: input.limit_price,
            volume_total_original: input.volume_total_original,
            volume_traded: traded,
            order_status: status,
            insert_date: self.trading_day.clone(),
            insert_time: "09:30:00".to_string(),
        }
    }

    pub fn trade_for(&mut self, order: &OrderField, price: f64, volume: i64) -> TradeField {
        self.next_trade_id += 1;
        TradeField {
            instrument_id: order.instrument_id.clone(),
            exchange_id: order.exchange_id.clone(),
            order_sys_id: order.order_sys_id.clone(),
            trade_id: self.next_trade_id.to_string(),
            direction: order.direction,
            offset_flag: order.comb_offset_flag,
            price,
            volume,
            trade_date: self.trading_day.clone(),
            trade_time: "09:30:01".to_string(),
        }
    }

    pub fn depth(&self, symbol: &str, last_price: f64) -> DepthMarketDataField {
        DepthMarketDataField {
            instrument_id: symbol.to_string(),
            action_day: self.trading_day.clone(),
            update_time: "09:30:01".to_string(),
            update_millisec: 500,
            volume: 10,
            last_price,
            upper_limit_price: last_price * 1.1,
            lower_limit_price: last_price * 0.9,
            open_price: last_price,
            highest_price: last_price,
            lowest_price: last_price,
            pre_close_price: f64::MAX,
            bid_prices: [last_price - 1.0, f64::MAX, f64::MAX, f64::MAX, f64::MAX],
            bid_volumes: [3, 0, 0, 0, 0],
            ask_prices: [last_price + 1.0, f64::MAX, f64::MAX, f64::MAX, f64::MAX],
            ask_volumes: [4, 0, 0, 0, 0],
            ..Default::default()
        }
    }
}
