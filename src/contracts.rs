// ===============================
// src/contracts.rs
// ===============================
//
// Reference data store owned by one gateway instance. Written by the trading
// session during the instrument query, read by both sessions afterwards, so
// access goes through a RwLock even though writes and reads rarely overlap.
//
use ahash::AHashMap as HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::domain::ContractReference;
use crate::metrics::CONTRACTS_LOADED;

#[derive(Debug, Default)]
struct StoreInner {
    contracts: HashMap<String, ContractReference>,
    initialized: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ContractStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl ContractStore {
    pub fn new() -> Self { Self::default() }

    // A poisoned lock only means a reader panicked; the map itself is still whole.
    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn upsert(&self, contract: ContractReference) {
        let mut inner = self.write();
        inner.contracts.insert(contract.symbol.clone(), contract);
        CONTRACTS_LOADED.set(inner.contracts.len() as i64);
    }

    /// Absent until the instrument query finished, even for symbols already upserted.
    pub fn get(&self, symbol: &str) -> Option<ContractReference> {
        let inner = self.read();
        if !inner.initialized {
            return None;
        }
        inner.contracts.get(symbol).cloned()
    }

    pub fn mark_initialized(&self) { self.write().initialized = true; }

    pub fn is_initialized(&self) -> bool { self.read().initialized }

    pub fn len(&self) -> usize { self.read().contracts.len() }

    pub fn is_empty(&self) -> bool { self.read().contracts.is_empty() }
}
