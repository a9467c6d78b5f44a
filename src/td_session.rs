// ===============================
// src/td_session.rs
// ===============================
//
// Trading session: owns the handshake, the reconciliation engine and the
// position aggregator, and answers every trading-front callback.
//
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::contracts::ContractStore;
use crate::domain::{CancelRequest, ContractReference, Exchange, OptionDetail, OrderRequest, Product};
use crate::error::{SessionError, SessionResult};
use crate::handshake::{Admission, QueryThrottle, Step, TdHandshake, TdState};
use crate::identity::OrderIdentity;
use crate::positions::{account_snapshot, PositionAggregator};
use crate::reconcile::{Outcome, ReconciliationEngine};
use crate::sink::EventSink;
use crate::venue::{
    codes, direction_to_venue, offset_to_venue, option_type_from_venue, order_type_to_venue,
    parse_venue_date, posi_direction_from_venue, product_from_venue, InputOrderActionField,
    InputOrderField, InstrumentField, InvestorPositionField, OrderField, QryInvestorPosition,
    QryTradingAccount, ReqAuthenticate, ReqUserLogin, RspInfo, RspUserLogin,
    SettlementInfoConfirm, TradeField, TraderApi, TraderSpi, TradingAccountField,
};

pub struct TdSession<A: TraderApi> {
    api: A,
    config: SessionConfig,
    sink: EventSink,
    contracts: ContractStore,
    handshake: TdHandshake,
    throttle: QueryThrottle,
    engine: ReconciliationEngine,
    positions: PositionAggregator,
    connect_status: bool,
    reqid: i32,
    order_ref: i32,
}

impl<A: TraderApi> TdSession<A> {
    pub fn new(api: A, config: SessionConfig, contracts: ContractStore, sink: EventSink) -> Self {
        Self {
            api,
            handshake: TdHandshake::new(config.auth_required()),
            throttle: QueryThrottle::new(config.throttle_mode, config.query_backoff),
            engine: ReconciliationEngine::new(contracts.clone(), sink.clone()),
            positions: PositionAggregator::new(),
            config,
            sink,
            contracts,
            connect_status: false,
            reqid: 0,
            order_ref: 0,
        }
    }

    pub fn api(&self) -> &A { &self.api }
    pub fn api_mut(&mut self) -> &mut A { &mut self.api }
    pub fn state(&self) -> TdState { self.handshake.state() }
    pub fn handshake(&self) -> &TdHandshake { &self.handshake }
    pub fn engine(&self) -> &ReconciliationEngine { &self.engine }
    pub fn throttle(&self) -> &QueryThrottle { &self.throttle }
    pub fn is_connected(&self) -> bool { self.connect_status }

    fn next_reqid(&mut self) -> i32 {
        self.reqid += 1;
        self.reqid
    }

    /// A second call on a live API re-issues authentication instead of re-creating it.
    pub fn connect(&mut self) {
        if !self.connect_status {
            self.handshake.on_connect_requested();
            let address = self.config.td_address.clone();
            self.api.connect(&address);
            self.connect_status = true;
        } else {
            let step = self.handshake.on_reauthenticate();
            self.perform(step);
        }
    }

    fn perform(&mut self, step: Step) {
        match step {
            Step::None => {}
            Step::Authenticate => self.authenticate(),
            Step::Login => self.login(),
            Step::ConfirmSettlement => self.confirm_settlement(),
            Step::QueryInstruments => self.query_instruments(Instant::now()),
            Step::ReplayPending => {
                let replayed = self.engine.replay_pending();
                info!(replayed, "td session ready");
            }
        }
    }

    fn authenticate(&mut self) {
        let req = ReqAuthenticate {
            broker_id: self.config.broker_id.clone(),
            user_id: self.config.user_id.clone(),
            auth_code: self.config.auth_code.clone(),
            app_id: self.config.app_id.clone(),
        };
        let reqid = self.next_reqid();
        self.api.req_authenticate(&req, reqid);
    }

    fn login(&mut self) {
        let req = ReqUserLogin {
            broker_id: self.config.broker_id.clone(),
            user_id: self.config.user_id.clone(),
            password: self.config.password.clone(),
        };
        let reqid = self.next_reqid();
        self.api.req_user_login(&req, reqid);
    }

    fn confirm_settlement(&mut self) {
        let req = SettlementInfoConfirm {
            broker_id: self.config.broker_id.clone(),
            investor_id: self.config.user_id.clone(),
        };
        let reqid = self.next_reqid();
        self.api.req_settlement_info_confirm(&req, reqid);
    }

    fn query_instruments(&mut self, now: Instant) {
        let api = &mut self.api;
        let reqid = &mut self.reqid;
        let admission = self.throttle.admit(now, || {
            *reqid += 1;
            api.req_qry_instrument(*reqid)
        });
        match admission {
            Admission::Accepted { attempts } => info!(attempts, "instrument query admitted"),
            Admission::Deferred { attempts, .. } => warn!(attempts, "instrument query throttled"),
        }
    }

    /// Drives a scheduled instrument-query retry once its deadline has passed.
    pub fn on_tick(&mut self, now: Instant) {
        if self.handshake.state() == TdState::QueryingInstruments && self.throttle.is_due(now) {
            self.query_instruments(now);
        }
    }

    pub fn send_order(&mut self, req: &OrderRequest) -> SessionResult<String> {
        let result = self.try_send_order(req);
        if let Err(err) = &result {
            self.sink.report(err);
        }
        result
    }

    fn try_send_order(&mut self, req: &OrderRequest) -> SessionResult<String> {
        let offset = offset_to_venue(req.offset).ok_or(SessionError::MissingOffset)?;
        let (price_type, time_condition, volume_condition) =
            order_type_to_venue(req.order_type).ok_or(SessionError::UnsupportedOrderType(req.order_type))?;
        let direction = direction_to_venue(req.direction).unwrap_or_default();

        self.order_ref += 1;
        let order_ref = self.order_ref.to_string();
        let input = InputOrderField {
            instrument_id: req.symbol.clone(),
            exchange_id: req.exchange.as_str().to_string(),
            order_ref: order_ref.clone(),
            investor_id: self.config.user_id.clone(),
            user_id: self.config.user_id.clone(),
            broker_id: self.config.broker_id.clone(),
            limit_price: req.price,
            volume_total_original: req.volume,
            order_price_type: price_type,
            direction,
            comb_offset_flag: offset,
            comb_hedge_flag: codes::HF_SPECULATION,
            contingent_condition: codes::CC_IMMEDIATELY,
            force_close_reason: codes::FCC_NOT_FORCE_CLOSE,
            is_auto_suspend: false,
            time_condition,
            volume_condition,
            min_volume: 1,
        };

        let reqid = self.next_reqid();
        let code = self.api.req_order_insert(&input, reqid);
        if code != 0 {
            return Err(SessionError::SubmissionFailed { code });
        }

        let order_id = self.engine.identities_mut().resolve_or_create(
            self.handshake.front_id(),
            self.handshake.session_id(),
            &order_ref,
        );
        self.engine.on_submitted(req.create_order_data(order_id.clone()));
        Ok(order_id)
    }

    pub fn cancel_order(&mut self, req: &CancelRequest) -> SessionResult<()> {
        let identity = match OrderIdentity::parse(&req.order_id) {
            Ok(identity) => identity,
            Err(err) => {
                self.sink.report(&err);
                return Err(err);
            }
        };
        let action = InputOrderActionField {
            instrument_id: req.symbol.clone(),
            exchange_id: req.exchange.as_str().to_string(),
            order_ref: identity.order_ref,
            front_id: identity.front_id,
            session_id: identity.session_id,
            action_flag: codes::AF_DELETE,
            broker_id: self.config.broker_id.clone(),
            investor_id: self.config.user_id.clone(),
        };
        let reqid = self.next_reqid();
        let code = self.api.req_order_action(&action, reqid);
        if code != 0 {
            let err = SessionError::SubmissionFailed { code };
            self.sink.report(&err);
            return Err(err);
        }
        Ok(())
    }

    pub fn query_account(&mut self) {
        let reqid = self.next_reqid();
        self.api.req_qry_trading_account(&QryTradingAccount { biz_type: codes::BZTP_FUTURE }, reqid);
    }

    /// Skipped until at least one contract is known.
    pub fn query_positions(&mut self) {
        if self.contracts.is_empty() {
            return;
        }
        let req = QryInvestorPosition {
            broker_id: self.config.broker_id.clone(),
            investor_id: self.config.user_id.clone(),
        };
        let reqid = self.next_reqid();
        self.api.req_qry_investor_position(&req, reqid);
    }

    pub fn close(&mut self) {
        if self.connect_status {
            self.sink.write_log("trading session closed");
        }
    }

    fn contract_from(&self, inst: &InstrumentField) -> Option<ContractReference> {
        let product = product_from_venue(inst.product_class)?;
        let exchange = Exchange::from_venue(&inst.exchange_id)?;
        let option = (product == Product::Option).then(|| {
            // CZCE option product ids end with the C/P letter
            let portfolio = if exchange == Exchange::Czce {
                let mut id = inst.product_id.clone();
                id.pop();
                id
            } else {
                inst.product_id.clone()
            };
            OptionDetail {
                portfolio,
                underlying: inst.underlying_instr_id.clone(),
                option_type: option_type_from_venue(inst.options_type),
                strike: inst.strike_price,
                index: inst.strike_price.to_string(),
                listed: parse_venue_date(&inst.open_date),
                expiry: parse_venue_date(&inst.expire_date),
            }
        });
        Some(ContractReference {
            symbol: inst.instrument_id.clone(),
            exchange,
            name: inst.instrument_name.clone(),
            product,
            size: inst.volume_multiple,
            pricetick: inst.price_tick,
            option,
        })
    }
}

impl<A: TraderApi> TraderSpi for TdSession<A> {
    fn on_front_connected(&mut self) {
        self.sink.write_log("trading front connected");
        let step = self.handshake.on_front_connected();
        self.perform(step);
    }

    fn on_front_disconnected(&mut self, reason: i32) {
        self.handshake.on_disconnected();
        self.throttle.clear();
        self.sink.write_log(format!("trading front disconnected, reason {reason}"));
    }

    fn on_rsp_authenticate(&mut self, info: &RspInfo) {
        let step = self.handshake.on_authenticate(info);
        if info.is_ok() {
            self.sink.write_log("trading authentication ok");
        } else {
            self.sink.write_error("trading authentication failed", info);
            if self.handshake.auth_failed() {
                self.sink.report(&SessionError::AuthPermanentlyRejected { code: info.error_id });
            }
        }
        self.perform(step);
    }

    fn on_rsp_user_login(&mut self, rsp: &RspUserLogin, info: &RspInfo) {
        let step = self.handshake.on_login(rsp, info);
        if info.is_ok() {
            self.sink.write_log("trading login ok");
        } else {
            self.sink.write_error("trading login failed", info);
        }
        self.perform(step);
    }

    fn on_rsp_settlement_info_confirm(&mut self, info: &RspInfo) {
        if info.is_ok() {
            self.sink.write_log("settlement confirmed");
        } else {
            self.sink.write_error("settlement confirmation failed", info);
        }
        let step = self.handshake.on_settlement_confirmed(info);
        self.perform(step);
    }

    fn on_rsp_order_insert(&mut self, input: &InputOrderField, info: &RspInfo) {
        let front_id = self.handshake.front_id();
        let session_id = self.handshake.session_id();
        self.engine.on_insert_rejected(input, front_id, session_id);
        self.sink.write_error("order insert rejected", info);
    }

    fn on_rsp_order_action(&mut self, _input: &InputOrderActionField, info: &RspInfo) {
        self.sink.write_error("order cancel rejected", info);
    }

    fn on_rsp_qry_instrument(&mut self, instrument: Option<&InstrumentField>, info: &RspInfo, is_last: bool) {
        if self.handshake.state() != TdState::QueryingInstruments {
            debug!(symbol = ?instrument.map(|i| &i.instrument_id), "instrument row outside query phase ignored");
            return;
        }
        if !info.is_ok() {
            self.sink.write_error("instrument query error", info);
        }
        if let Some(contract) = instrument.and_then(|inst| self.contract_from(inst)) {
            self.contracts.upsert(contract.clone());
            self.sink.on_contract(contract);
        }
        if is_last {
            self.contracts.mark_initialized();
            self.sink.write_log(format!("contract query complete, {} contracts", self.contracts.len()));
            let step = self.handshake.on_instruments_complete();
            self.perform(step);
        }
    }

    fn on_rsp_qry_investor_position(&mut self, position: Option<&InvestorPositionField>, _info: &RspInfo, is_last: bool) {
        if let Some(frag) = position {
            let contract = self.contracts.get(&frag.instrument_id);
            let direction = posi_direction_from_venue(frag.posi_direction);
            match (contract, direction) {
                (Some(contract), Some(direction)) => self.positions.on_fragment(frag, direction, &contract),
                (None, _) => debug!(symbol = %frag.instrument_id, "position fragment without contract skipped"),
                (_, None) => self.sink.report(&SessionError::UnknownDirection(frag.posi_direction)),
            }
        }
        if is_last {
            let batch = self.positions.finish_round();
            self.sink.on_positions(batch);
        }
    }

    fn on_rsp_qry_trading_account(&mut self, account: &TradingAccountField, _info: &RspInfo) {
        if let Some(snapshot) = account_snapshot(account) {
            self.sink.on_account(snapshot);
        }
    }

    fn on_rtn_order(&mut self, order: &OrderField) {
        if self.engine.on_order(order) == Outcome::Dropped {
            debug!(order_ref = %order.order_ref, "order push dropped");
        }
    }

    fn on_rtn_trade(&mut self, trade: &TradeField) {
        self.engine.on_trade(trade);
    }
}
