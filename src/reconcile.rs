// ===============================
// src/reconcile.rs
// ===============================
//
// Turns raw order/trade pushes into the consumer stream:
// - pushes for symbols without reference data are buffered, replayed later
// - duplicate order pushes (same traded volume and status) are suppressed
// - an order update caused by a fill waits for its trade, so consumers always
//   see [trade, order] for one fill regardless of arrival order
// - trades are never suppressed; an unbound system id is reported but the
//   trade still goes out
//
use ahash::AHashMap as HashMap;
use tracing::debug;

use crate::buffer::{EventBuffer, PendingEvent};
use crate::contracts::ContractStore;
use crate::domain::{ContractReference, Exchange, OrderRecord, OrderType, Status, TradeRecord};
use crate::error::{SessionError, SessionResult};
use crate::identity::{IdentityRegistry, OrderIdentity};
use crate::metrics::{DUPLICATES_SUPPRESSED, EVENTS_REPLAYED, ORDERS_HELD, UNRESOLVED_TRADES};
use crate::sink::EventSink;
use crate::venue::{
    direction_from_venue, offset_from_venue, order_type_from_venue, parse_venue_datetime,
    status_from_venue, InputOrderField, OrderField, TradeField,
};

/// What happened to one inbound push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Emitted,
    Held,
    Suppressed,
    Buffered,
    Dropped,
}

pub struct ReconciliationEngine {
    contracts: ContractStore,
    identities: IdentityRegistry,
    pending: EventBuffer,
    // last observed record per local order id, whether emitted, held or suppressed
    last_seen: HashMap<String, OrderRecord>,
    active: HashMap<String, OrderRecord>,
    // system id -> order update waiting for its trade
    awaiting_trade: HashMap<String, OrderRecord>,
    // system id -> volume already emitted through trades
    traded_by_sys: HashMap<String, i64>,
    sink: EventSink,
}

impl ReconciliationEngine {
    pub fn new(contracts: ContractStore, sink: EventSink) -> Self {
        Self {
            contracts,
            identities: IdentityRegistry::new(),
            pending: EventBuffer::new(),
            last_seen: HashMap::new(),
            active: HashMap::new(),
            awaiting_trade: HashMap::new(),
            traded_by_sys: HashMap::new(),
            sink,
        }
    }

    pub fn on_order(&mut self, field: &OrderField) -> Outcome {
        let Some(contract) = self.contracts.get(&field.instrument_id) else {
            self.pending.push(PendingEvent::Order(field.clone()));
            return Outcome::Buffered;
        };
        match self.apply_order(field, &contract) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.sink.report(&err);
                Outcome::Dropped
            }
        }
    }

    pub fn on_trade(&mut self, field: &TradeField) -> Outcome {
        let Some(contract) = self.contracts.get(&field.instrument_id) else {
            self.pending.push(PendingEvent::Trade(field.clone()));
            return Outcome::Buffered;
        };
        match self.apply_trade(field, &contract) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.sink.report(&err);
                Outcome::Dropped
            }
        }
    }

    /// Local record of an order the transport just accepted. Becomes the dedup
    /// baseline for the venue's first push of the same order.
    pub fn on_submitted(&mut self, order: OrderRecord) {
        self.active.insert(order.order_id.clone(), order.clone());
        self.last_seen.insert(order.order_id.clone(), order.clone());
        self.sink.on_order(order);
    }

    /// Venue refused an insert: the echo becomes a terminal `Rejected` record.
    /// No system id exists for such an order.
    pub fn on_insert_rejected(&mut self, input: &InputOrderField, front_id: i32, session_id: i32) -> Outcome {
        let order_id = self.identities.resolve_or_create(front_id, session_id, &input.order_ref);
        let exchange = self
            .contracts
            .get(&input.instrument_id)
            .map(|c| c.exchange)
            .or_else(|| Exchange::from_venue(&input.exchange_id));
        let Some(exchange) = exchange else {
            self.sink.report(&SessionError::UnknownContract(input.instrument_id.clone()));
            return Outcome::Dropped;
        };
        let Some(direction) = direction_from_venue(input.direction) else {
            self.sink.report(&SessionError::UnknownDirection(input.direction));
            return Outcome::Dropped;
        };

        let order = OrderRecord {
            symbol: input.instrument_id.clone(),
            exchange,
            order_id: order_id.clone(),
            order_type: order_type_from_venue((
                input.order_price_type,
                input.time_condition,
                input.volume_condition,
            ))
            .unwrap_or(OrderType::Limit),
            direction,
            offset: offset_from_venue(input.comb_offset_flag),
            price: input.limit_price,
            volume: input.volume_total_original,
            traded: 0,
            status: Status::Rejected,
            datetime: None,
        };
        self.active.remove(&order_id);
        self.last_seen.insert(order_id, order.clone());
        self.sink.on_order(order);
        Outcome::Emitted
    }

    /// Re-runs everything buffered so far, in arrival order. Pushes whose symbol
    /// is still unknown go back into the buffer.
    pub fn replay_pending(&mut self) -> usize {
        let pending = self.pending.drain();
        let replayed = pending.len();
        for ev in pending {
            match ev {
                PendingEvent::Order(field) => self.on_order(&field),
                PendingEvent::Trade(field) => self.on_trade(&field),
            };
        }
        EVENTS_REPLAYED.inc_by(replayed as u64);
        debug!(replayed, still_pending = self.pending.len(), "buffered events replayed");
        replayed
    }

    fn decode_order(field: &OrderField, contract: &ContractReference) -> SessionResult<OrderRecord> {
        let order_id =
            OrderIdentity::new(field.front_id, field.session_id, field.order_ref.clone()).local_order_id();
        let order_type = order_type_from_venue((
            field.order_price_type,
            field.time_condition,
            field.volume_condition,
        ))
        .ok_or_else(|| SessionError::UnsupportedVenueOrderType { order_id: order_id.clone() })?;
        let status = status_from_venue(field.order_status).ok_or_else(|| SessionError::UnknownStatus {
            order_id: order_id.clone(),
            status: field.order_status,
        })?;
        let direction =
            direction_from_venue(field.direction).ok_or(SessionError::UnknownDirection(field.direction))?;

        Ok(OrderRecord {
            symbol: field.instrument_id.clone(),
            exchange: contract.exchange,
            order_id,
            order_type,
            direction,
            offset: offset_from_venue(field.comb_offset_flag),
            price: field.limit_price,
            volume: field.volume_total_original,
            traded: field.volume_traded,
            status,
            datetime: parse_venue_datetime(&field.insert_date, &field.insert_time),
        })
    }

    fn apply_order(&mut self, field: &OrderField, contract: &ContractReference) -> SessionResult<Outcome> {
        let order = Self::decode_order(field, contract)?;
        let order_id = self.identities.resolve_or_create(field.front_id, field.session_id, &field.order_ref);
        let sys_id = field.order_sys_id.as_str();
        if !sys_id.is_empty() {
            self.identities.bind(sys_id, &order_id);
        }
        Ok(self.merge_order(sys_id, order))
    }

    fn merge_order(&mut self, sys_id: &str, order: OrderRecord) -> Outcome {
        if order.is_active() {
            self.active.insert(order.order_id.clone(), order.clone());
        } else {
            self.active.remove(&order.order_id);
        }

        let prior = self.last_seen.insert(order.order_id.clone(), order.clone());
        if let Some(prev) = &prior {
            if prev.traded == order.traded && prev.status == order.status {
                DUPLICATES_SUPPRESSED.inc();
                debug!(order_id = %order.order_id, "duplicate order push suppressed");
                return Outcome::Suppressed;
            }
        }

        if !sys_id.is_empty() {
            let traded_seen = self.traded_by_sys.get(sys_id).copied().unwrap_or(0);
            let grew = prior.as_ref().is_some_and(|prev| order.traded > prev.traded);
            // a newer update never overtakes one already waiting for its trade
            let waiting = self.awaiting_trade.contains_key(sys_id);
            if (grew || waiting) && traded_seen < order.traded {
                ORDERS_HELD.inc();
                debug!(order_id = %order.order_id, sys_id, traded = order.traded, traded_seen, "order update held for trade");
                self.awaiting_trade.insert(sys_id.to_string(), order);
                return Outcome::Held;
            }
            // covered by trades already emitted: the held one is superseded
            self.awaiting_trade.remove(sys_id);
        }

        self.emit_order(sys_id, order);
        Outcome::Emitted
    }

    fn emit_order(&mut self, sys_id: &str, order: OrderRecord) {
        let terminal = !order.is_active();
        self.sink.on_order(order);
        if terminal && !sys_id.is_empty() {
            self.retire(sys_id);
        }
    }

    fn apply_trade(&mut self, field: &TradeField, contract: &ContractReference) -> SessionResult<Outcome> {
        let direction =
            direction_from_venue(field.direction).ok_or(SessionError::UnknownDirection(field.direction))?;
        let sys_id = field.order_sys_id.as_str();
        let order_id = self.identities.lookup(sys_id).map(str::to_owned);
        let resolved = order_id.is_some();

        self.sink.on_trade(TradeRecord {
            symbol: field.instrument_id.clone(),
            exchange: contract.exchange,
            order_id,
            trade_id: field.trade_id.clone(),
            direction,
            offset: offset_from_venue(field.offset_flag),
            price: field.price,
            volume: field.volume,
            datetime: parse_venue_datetime(&field.trade_date, &field.trade_time),
        });

        if !resolved {
            UNRESOLVED_TRADES.inc();
            self.sink.report(&SessionError::UnresolvedReference { sys_id: sys_id.to_string() });
        }
        // released bindings only serve late trades; their volume is no longer tracked
        if sys_id.is_empty() || (resolved && !self.identities.is_live(sys_id)) {
            return Ok(Outcome::Emitted);
        }

        let traded_seen = self.traded_by_sys.entry(sys_id.to_string()).or_insert(0);
        *traded_seen += field.volume;
        let traded_seen = *traded_seen;
        if self.awaiting_trade.get(sys_id).is_some_and(|held| held.traded <= traded_seen) {
            if let Some(held) = self.awaiting_trade.remove(sys_id) {
                self.emit_order(sys_id, held);
            }
        }
        Ok(Outcome::Emitted)
    }

    // terminal order: no more trade correlation needed for this system id
    fn retire(&mut self, sys_id: &str) {
        self.identities.release(sys_id);
        self.traded_by_sys.remove(sys_id);
    }

    pub fn active_orders(&self) -> impl Iterator<Item = &OrderRecord> { self.active.values() }

    pub fn active_order(&self, order_id: &str) -> Option<&OrderRecord> { self.active.get(order_id) }

    pub fn is_held(&self, sys_id: &str) -> bool { self.awaiting_trade.contains_key(sys_id) }

    pub fn pending_len(&self) -> usize { self.pending.len() }

    /// Trade volume counted so far against a system id still open for correlation.
    pub fn traded_volume(&self, sys_id: &str) -> Option<i64> { self.traded_by_sys.get(sys_id).copied() }

    pub fn identities(&self) -> &IdentityRegistry { &self.identities }

    pub fn identities_mut(&mut self) -> &mut IdentityRegistry { &mut self.identities }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Direction, Event, Product};
    use crate::venue::codes;
    use tokio::sync::mpsc;

    fn store_with(symbol: &str) -> ContractStore {
        let store = ContractStore::new();
        store.upsert(ContractReference {
            symbol: symbol.into(),
            exchange: Exchange::Shfe,
            name: symbol.into(),
            product: Product::Futures,
            size: 10.0,
            pricetick: 1.0,
            option: None,
        });
        store.mark_initialized();
        store
    }

    fn engine(store: ContractStore) -> (ReconciliationEngine, mpsc::UnboundedReceiver<Event>) {
        let (sink, rx) = EventSink::channel("TEST");
        (ReconciliationEngine::new(store, sink), rx)
    }

    fn order(status: char, traded: i64) -> OrderField {
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
            volume_traded: traded,
            order_status: status,
            insert_date: "20240315".into(),
            insert_time: "09:30:00".into(),
        }
    }

    fn trade(id: &str, volume: i64) -> TradeField {
        TradeField {
            instrument_id: "rb2405".into(),
            exchange_id: "SHFE".into(),
            order_sys_id: "S1".into(),
            trade_id: id.into(),
            direction: codes::D_BUY,
            offset_flag: codes::OF_OPEN,
            price: 3500.0,
            volume,
            trade_date: "20240315".into(),
            trade_time: "09:30:01".into(),
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[test]
    fn repeated_identical_push_is_suppressed() {
        let (mut eng, mut rx) = engine(store_with("rb2405"));
        assert_eq!(eng.on_order(&order(codes::OST_NO_TRADE_QUEUEING, 0)), Outcome::Emitted);
        assert_eq!(eng.on_order(&order(codes::OST_NO_TRADE_QUEUEING, 0)), Outcome::Suppressed);
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn status_change_without_fill_is_emitted() {
        let (mut eng, mut rx) = engine(store_with("rb2405"));
        eng.on_order(&order(codes::OST_UNKNOWN, 0));
        assert_eq!(eng.on_order(&order(codes::OST_NO_TRADE_QUEUEING, 0)), Outcome::Emitted);
        assert_eq!(eng.on_order(&order(codes::OST_CANCELED, 0)), Outcome::Emitted);
        assert_eq!(drain(&mut rx).len(), 3);
        assert!(eng.active_order("1_7_1").is_none());
    }

    #[test]
    fn fill_update_waits_for_its_trade() {
        let (mut eng, mut rx) = engine(store_with("rb2405"));
        eng.on_order(&order(codes::OST_NO_TRADE_QUEUEING, 0));
        drain(&mut rx);

        assert_eq!(eng.on_order(&order(codes::OST_ALL_TRADED, 5)), Outcome::Held);
        assert!(drain(&mut rx).is_empty());
        assert!(eng.is_held("S1"));

        eng.on_trade(&trade("T1", 5));
        let events = drain(&mut rx);
        assert!(matches!(&events[0], Event::Trade(t) if t.order_id.as_deref() == Some("1_7_1")));
        assert!(matches!(&events[1], Event::Order(o) if o.status == Status::AllTraded));
        assert!(!eng.is_held("S1"));
        assert!(!eng.identities().is_live("S1"));
    }

    #[test]
    fn trade_first_then_fill_update_is_not_held() {
        let (mut eng, mut rx) = engine(store_with("rb2405"));
        eng.on_order(&order(codes::OST_NO_TRADE_QUEUEING, 0));
        drain(&mut rx);

        eng.on_trade(&trade("T1", 5));
        assert_eq!(eng.on_order(&order(codes::OST_ALL_TRADED, 5)), Outcome::Emitted);
        let events = drain(&mut rx);
        assert!(matches!(events[0], Event::Trade(_)));
        assert!(matches!(events[1], Event::Order(_)));
    }

    #[test]
    fn newer_update_replaces_held_one() {
        let (mut eng, mut rx) = engine(store_with("rb2405"));
        eng.on_order(&order(codes::OST_NO_TRADE_QUEUEING, 0));
        eng.on_order(&order(codes::OST_PART_TRADED_QUEUEING, 2));
        assert_eq!(eng.on_order(&order(codes::OST_CANCELED, 2)), Outcome::Held);
        drain(&mut rx);

        eng.on_trade(&trade("T1", 2));
        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], Event::Order(o) if o.status == Status::Cancelled && o.traded == 2));
    }

    #[test]
    fn unbound_trade_is_emitted_and_reported() {
        let (mut eng, mut rx) = engine(store_with("rb2405"));
        assert_eq!(eng.on_trade(&trade("T9", 1)), Outcome::Emitted);
        let events = drain(&mut rx);
        assert!(matches!(&events[0], Event::Trade(t) if t.order_id.is_none()));
        assert!(matches!(&events[1], Event::Log(n) if n.message.contains("S1")));
    }

    #[test]
    fn unsupported_order_type_is_dropped_and_engine_continues() {
        let (mut eng, mut rx) = engine(store_with("rb2405"));
        let mut odd = order(codes::OST_NO_TRADE_QUEUEING, 0);
        odd.time_condition = '9';
        assert_eq!(eng.on_order(&odd), Outcome::Dropped);
        assert!(matches!(drain(&mut rx).as_slice(), [Event::Log(_)]));

        assert_eq!(eng.on_order(&order(codes::OST_NO_TRADE_QUEUEING, 0)), Outcome::Emitted);
    }

    #[test]
    fn pushes_before_reference_data_are_buffered_then_replayed_once() {
        let store = ContractStore::new();
        let (mut eng, mut rx) = engine(store.clone());
        assert_eq!(eng.on_order(&order(codes::OST_NO_TRADE_QUEUEING, 0)), Outcome::Buffered);
        assert_eq!(eng.on_trade(&trade("T1", 1)), Outcome::Buffered);
        assert!(drain(&mut rx).is_empty());

        store.upsert(ContractReference {
            symbol: "rb2405".into(),
            exchange: Exchange::Shfe,
            name: "rb".into(),
            product: Product::Futures,
            size: 10.0,
            pricetick: 1.0,
            option: None,
        });
        store.mark_initialized();
        assert_eq!(eng.replay_pending(), 2);
        assert_eq!(eng.replay_pending(), 0);
        let events = drain(&mut rx);
        assert!(matches!(events[0], Event::Order(_)));
        assert!(matches!(&events[1], Event::Trade(t) if t.order_id.is_some()));
    }

    fn kinds(events: &[Event]) -> Vec<&'static str> {
        events
            .iter()
            .map(|e| match e {
                Event::Order(_) => "order",
                Event::Trade(_) => "trade",
                Event::Log(_) => "log",
                _ => "other",
            })
            .collect()
    }

    #[test]
    fn unbound_trade_still_releases_the_later_fill_update() {
        let (mut eng, mut rx) = engine(store_with("rb2405"));
        let mut first = order(codes::OST_UNKNOWN, 0);
        first.order_sys_id.clear();
        eng.on_order(&first);
        eng.on_trade(&trade("T1", 5));

        assert_eq!(eng.on_order(&order(codes::OST_ALL_TRADED, 5)), Outcome::Emitted);
        assert!(!eng.is_held("S1"));
        let events = drain(&mut rx);
        assert_eq!(kinds(&events), ["order", "trade", "log", "order"]);
        assert!(matches!(&events[3], Event::Order(o) if o.status == Status::AllTraded));
    }

    #[test]
    fn trade_buffered_ahead_of_its_binding_replays_in_causal_order() {
        let store = ContractStore::new();
        let (mut eng, mut rx) = engine(store.clone());
        let mut first = order(codes::OST_UNKNOWN, 0);
        first.order_sys_id.clear();
        eng.on_order(&first);
        eng.on_trade(&trade("T1", 5));
        eng.on_order(&order(codes::OST_ALL_TRADED, 5));
        assert_eq!(eng.pending_len(), 3);

        store.upsert(ContractReference {
            symbol: "rb2405".into(),
            exchange: Exchange::Shfe,
            name: "rb".into(),
            product: Product::Futures,
            size: 10.0,
            pricetick: 1.0,
            option: None,
        });
        store.mark_initialized();
        assert_eq!(eng.replay_pending(), 3);

        let events = drain(&mut rx);
        assert_eq!(kinds(&events), ["order", "trade", "log", "order"]);
        assert!(!eng.is_held("S1"));
        assert!(eng.active_order("1_7_1").is_none());
    }

    #[test]
    fn split_fill_waits_for_every_trade() {
        let (mut eng, mut rx) = engine(store_with("rb2405"));
        eng.on_order(&order(codes::OST_NO_TRADE_QUEUEING, 0));
        assert_eq!(eng.on_order(&order(codes::OST_ALL_TRADED, 5)), Outcome::Held);
        drain(&mut rx);

        eng.on_trade(&trade("T1", 2));
        assert_eq!(kinds(&drain(&mut rx)), ["trade"]);
        assert!(eng.is_held("S1"));
        assert_eq!(eng.traded_volume("S1"), Some(2));

        eng.on_trade(&trade("T2", 3));
        let events = drain(&mut rx);
        assert_eq!(kinds(&events), ["trade", "order"]);
        assert!(matches!(&events[1], Event::Order(o) if o.traded == 5));
        assert!(!eng.is_held("S1"));
    }

    #[test]
    fn submitted_record_is_the_baseline_for_the_first_push() {
        let (mut eng, mut rx) = engine(store_with("rb2405"));
        let req = crate::domain::OrderRequest {
            symbol: "rb2405".into(),
            exchange: Exchange::Shfe,
            direction: Direction::Long,
            offset: crate::domain::Offset::Open,
            order_type: OrderType::Limit,
            price: 3500.0,
            volume: 5,
        };
        eng.on_submitted(req.create_order_data("1_7_1".into()));
        assert!(eng.active_order("1_7_1").is_some());

        assert_eq!(eng.on_order(&order(codes::OST_UNKNOWN, 0)), Outcome::Suppressed);
        assert_eq!(eng.on_order(&order(codes::OST_NO_TRADE_QUEUEING, 0)), Outcome::Emitted);
        assert_eq!(kinds(&drain(&mut rx)), ["order", "order"]);
    }

    #[test]
    fn late_trade_after_completion_is_not_tracked() {
        let (mut eng, mut rx) = engine(store_with("rb2405"));
        eng.on_order(&order(codes::OST_NO_TRADE_QUEUEING, 0));
        eng.on_trade(&trade("T1", 5));
        eng.on_order(&order(codes::OST_ALL_TRADED, 5));
        assert_eq!(eng.traded_volume("S1"), None);
        drain(&mut rx);

        eng.on_trade(&trade("T2", 1));
        let events = drain(&mut rx);
        assert!(matches!(events.as_slice(), [Event::Trade(t)] if t.order_id.as_deref() == Some("1_7_1")));
        assert_eq!(eng.traded_volume("S1"), None);
    }

    #[test]
    fn insert_rejection_becomes_terminal_record() {
        let (mut eng, mut rx) = engine(store_with("rb2405"));
        let input = InputOrderField {
            instrument_id: "rb2405".into(),
            exchange_id: "SHFE".into(),
            order_ref: "4".into(),
            direction: codes::D_SELL,
            comb_offset_flag: codes::OF_CLOSE,
            order_price_type: codes::OPT_LIMIT_PRICE,
            time_condition: codes::TC_GFD,
            volume_condition: codes::VC_AV,
            limit_price: 3400.0,
            volume_total_original: 2,
            ..Default::default()
        };
        assert_eq!(eng.on_insert_rejected(&input, 1, 7), Outcome::Emitted);
        match drain(&mut rx).as_slice() {
            [Event::Order(o)] => {
                assert_eq!(o.order_id, "1_7_4");
                assert_eq!(o.status, Status::Rejected);
                assert_eq!(o.direction, Direction::Short);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
