// ===============================
// src/identity.rs
// ===============================
use ahash::AHashMap as HashMap;
use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};

/// Venue-side key of a locally submitted order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderIdentity {
    pub front_id: i32,
    pub session_id: i32,
    pub order_ref: String,
}

impl OrderIdentity {
    pub fn new(front_id: i32, session_id: i32, order_ref: impl Into<String>) -> Self {
        Self { front_id, session_id, order_ref: order_ref.into() }
    }

    pub fn local_order_id(&self) -> String {
        format!("{}_{}_{}", self.front_id, self.session_id, self.order_ref)
    }

    /// Inverse of [`OrderIdentity::local_order_id`].
    pub fn parse(order_id: &str) -> SessionResult<Self> {
        let invalid = || SessionError::InvalidOrderId(order_id.to_string());
        let mut parts = order_id.splitn(3, '_');
        let front_id = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let session_id = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let order_ref = parts.next().filter(|r| !r.is_empty()).ok_or_else(invalid)?;
        Ok(Self::new(front_id, session_id, order_ref))
    }
}

/// systemId <-> local order id bookkeeping for one connection object.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    identities: HashMap<String, OrderIdentity>,
    live: HashMap<String, String>,
    // released bindings, kept for audit and late trades
    archived: HashMap<String, String>,
}

impl IdentityRegistry {
    pub fn new() -> Self { Self::default() }

    pub fn resolve_or_create(&mut self, front_id: i32, session_id: i32, order_ref: &str) -> String {
        let identity = OrderIdentity::new(front_id, session_id, order_ref);
        let order_id = identity.local_order_id();
        self.identities.entry(order_id.clone()).or_insert(identity);
        order_id
    }

    pub fn identity(&self, order_id: &str) -> Option<&OrderIdentity> { self.identities.get(order_id) }

    /// Returns `true` when the binding is new; rebinding a known system id is a no-op.
    pub fn bind(&mut self, sys_id: &str, order_id: &str) -> bool {
        if self.live.contains_key(sys_id) || self.archived.contains_key(sys_id) {
            return false;
        }
        self.live.insert(sys_id.to_string(), order_id.to_string());
        true
    }

    pub fn lookup(&self, sys_id: &str) -> Option<&str> {
        self.live
            .get(sys_id)
            .or_else(|| self.archived.get(sys_id))
            .map(String::as_str)
    }

    /// Drops the binding from trade correlation while keeping it for audit.
    pub fn release(&mut self, sys_id: &str) -> Option<String> {
        let order_id = self.live.remove(sys_id)?;
        self.archived.insert(sys_id.to_string(), order_id.clone());
        Some(order_id)
    }

    pub fn is_live(&self, sys_id: &str) -> bool { self.live.contains_key(sys_id) }

    pub fn live_len(&self) -> usize { self.live.len() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_order_id_is_stable_and_parses_back() {
        let mut reg = IdentityRegistry::new();
        let a = reg.resolve_or_create(3, 1201, "17");
        let b = reg.resolve_or_create(3, 1201, "17");
        assert_eq!(a, "3_1201_17");
        assert_eq!(a, b);
        assert_eq!(OrderIdentity::parse(&a).ok(), reg.identity(&a).cloned());
    }

    #[test]
    fn malformed_ids_do_not_parse() {
        for bad in ["", "3", "3_x_1", "3_1201_", "a_b_c"] {
            assert!(OrderIdentity::parse(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn bind_is_idempotent() {
        let mut reg = IdentityRegistry::new();
        assert!(reg.bind("  100", "1_1_1"));
        assert!(!reg.bind("  100", "1_1_2"));
        assert_eq!(reg.lookup("  100"), Some("1_1_1"));
        assert_eq!(reg.lookup("  101"), None);
    }

    #[test]
    fn released_binding_stays_resolvable_but_not_live() {
        let mut reg = IdentityRegistry::new();
        reg.bind("S1", "1_1_1");
        assert_eq!(reg.release("S1").as_deref(), Some("1_1_1"));
        assert!(!reg.is_live("S1"));
        assert_eq!(reg.live_len(), 0);
        assert_eq!(reg.lookup("S1"), Some("1_1_1"));
        assert!(!reg.bind("S1", "9_9_9"));
        assert_eq!(reg.release("S1"), None);
    }
}
