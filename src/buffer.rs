// ===============================
// src/buffer.rs
// ===============================
use std::collections::VecDeque;

use crate::metrics::EVENTS_BUFFERED;
use crate::venue::{OrderField, TradeField};

/// Order/trade push held back until its contract is known.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingEvent {
    Order(OrderField),
    Trade(TradeField),
}

impl PendingEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            PendingEvent::Order(_) => "order",
            PendingEvent::Trade(_) => "trade",
        }
    }
}

/// Single queue across both kinds, so replay keeps the exact arrival order.
#[derive(Debug, Default)]
pub struct EventBuffer {
    queue: VecDeque<PendingEvent>,
}

impl EventBuffer {
    pub fn new() -> Self { Self::default() }

    pub fn push(&mut self, ev: PendingEvent) {
        EVENTS_BUFFERED.with_label_values(&[ev.kind()]).inc();
        self.queue.push_back(ev);
    }

    /// Hands out everything buffered so far and leaves the buffer empty.
    pub fn drain(&mut self) -> VecDeque<PendingEvent> { std::mem::take(&mut self.queue) }

    pub fn len(&self) -> usize { self.queue.len() }

    pub fn is_empty(&self) -> bool { self.queue.is_empty() }
}
