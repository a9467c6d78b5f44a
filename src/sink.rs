// ===============================
// src/sink.rs
// ===============================
//
// Consumer side of the session: every domain event and every human-readable
// notification goes through here, mirrored into tracing and metrics.
// The channel is unbounded so callbacks never block on a slow consumer.
//
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::{
    AccountSnapshot, ContractReference, Event, LogNote, OrderRecord, PositionSnapshot,
    TickSnapshot, TradeRecord,
};
use crate::error::SessionError;
use crate::metrics::{
    CONTRACT_EVENTS, ERROR_NOTES, ORDER_EVENTS, TICK_EVENTS, TRADE_EVENTS,
};
use crate::venue::RspInfo;

#[derive(Debug, Clone)]
pub struct EventSink {
    gateway: String,
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSink {
    pub fn new(gateway: impl Into<String>, tx: mpsc::UnboundedSender<Event>) -> Self {
        Self { gateway: gateway.into(), tx }
    }

    pub fn channel(gateway: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(gateway, tx), rx)
    }

    pub fn gateway(&self) -> &str { &self.gateway }

    fn emit(&self, ev: Event) {
        if self.tx.send(ev).is_err() {
            debug!(gateway = %self.gateway, "event consumer gone, dropping event");
        }
    }

    pub fn on_order(&self, order: OrderRecord) {
        ORDER_EVENTS.with_label_values(&[order.status.as_str()]).inc();
        debug!(order_id = %order.order_id, status = order.status.as_str(), traded = order.traded, "order");
        self.emit(Event::Order(order));
    }

    pub fn on_trade(&self, trade: TradeRecord) {
        TRADE_EVENTS.inc();
        debug!(trade_id = %trade.trade_id, order_id = ?trade.order_id, volume = trade.volume, "trade");
        self.emit(Event::Trade(trade));
    }

    pub fn on_contract(&self, contract: ContractReference) {
        CONTRACT_EVENTS.inc();
        self.emit(Event::Contract(contract));
    }

    pub fn on_positions(&self, batch: Vec<PositionSnapshot>) {
        self.emit(Event::Positions(batch));
    }

    pub fn on_account(&self, account: AccountSnapshot) {
        self.emit(Event::Account(account));
    }

    pub fn on_tick(&self, tick: TickSnapshot) {
        TICK_EVENTS.inc();
        self.emit(Event::Tick(tick));
    }

    pub fn write_log(&self, message: impl Into<String>) {
        let message = message.into();
        info!(gateway = %self.gateway, "{message}");
        self.emit(Event::Log(LogNote { code: None, message }));
    }

    /// Venue-side failure: carries the venue code and message text.
    pub fn write_error(&self, context: &str, info: &RspInfo) {
        ERROR_NOTES.inc();
        warn!(gateway = %self.gateway, code = info.error_id, msg = %info.error_msg, "{context}");
        self.emit(Event::Log(LogNote {
            code: Some(info.error_id),
            message: format!("{context}, code: {}, message: {}", info.error_id, info.error_msg),
        }));
    }

    /// Locally detected failure.
    pub fn report(&self, err: &SessionError) {
        ERROR_NOTES.inc();
        warn!(gateway = %self.gateway, %err, "session error");
        self.emit(Event::Log(LogNote { code: err.code(), message: err.to_string() }));
    }
}
