// ===============================
// src/gateway.rs (trading + market-data facade)
// ===============================
use std::time::Instant;
use tracing::info;

use crate::config::SessionConfig;
use crate::contracts::ContractStore;
use crate::domain::{CancelRequest, OrderRequest, SubscribeRequest};
use crate::error::SessionResult;
use crate::md_session::MdSession;
use crate::sink::EventSink;
use crate::td_session::TdSession;
use crate::venue::{MdApi, TraderApi};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollQuery {
    Account,
    Position,
}

/// One venue connection pair sharing a contract store and an event sink.
pub struct Gateway<T: TraderApi, M: MdApi> {
    td: TdSession<T>,
    md: MdSession<M>,
    contracts: ContractStore,
    sink: EventSink,
    query_every_n_ticks: u32,
    ticks: u32,
    next_query: PollQuery,
}

impl<T: TraderApi, M: MdApi> Gateway<T, M> {
    pub fn new(td_api: T, md_api: M, config: SessionConfig, sink: EventSink) -> Self {
        let contracts = ContractStore::new();
        Self {
            td: TdSession::new(td_api, config.clone(), contracts.clone(), sink.clone()),
            md: MdSession::new(md_api, config.clone(), contracts.clone(), sink.clone()),
            contracts,
            sink,
            query_every_n_ticks: config.query_every_n_ticks.max(1),
            ticks: 0,
            next_query: PollQuery::Account,
        }
    }

    pub fn contracts(&self) -> &ContractStore { &self.contracts }
    pub fn td(&self) -> &TdSession<T> { &self.td }
    pub fn md(&self) -> &MdSession<M> { &self.md }

    /// Both sessions, for the callback dispatch of the transport.
    pub fn sessions_mut(&mut self) -> (&mut TdSession<T>, &mut MdSession<M>) {
        (&mut self.td, &mut self.md)
    }

    pub fn connect(&mut self) {
        info!(gateway = self.sink.gateway(), "connecting");
        self.td.connect();
        self.md.connect();
    }

    pub fn subscribe(&mut self, req: &SubscribeRequest) { self.md.subscribe(req); }

    pub fn send_order(&mut self, req: &OrderRequest) -> SessionResult<String> { self.td.send_order(req) }

    pub fn cancel_order(&mut self, req: &CancelRequest) -> SessionResult<()> { self.td.cancel_order(req) }

    pub fn query_account(&mut self) { self.td.query_account(); }

    pub fn query_position(&mut self) { self.td.query_positions(); }

    /// Periodic driver: alternates account and position polling every N ticks,
    /// refreshes the tick date and fires due instrument-query retries.
    pub fn on_timer(&mut self, now: Instant) {
        self.td.on_tick(now);
        self.md.update_date();

        self.ticks += 1;
        if self.ticks < self.query_every_n_ticks {
            return;
        }
        self.ticks = 0;
        match self.next_query {
            PollQuery::Account => {
                self.td.query_account();
                self.next_query = PollQuery::Position;
            }
            PollQuery::Position => {
                self.td.query_positions();
                self.next_query = PollQuery::Account;
            }
        }
    }

    pub fn close(&mut self) {
        self.td.close();
        self.md.close();
    }
}
