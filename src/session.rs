//! Per-call context handed to every tool.
//!
//! A session is resolved from the current credential for each `tools/call`
//! and carries the store handle explicitly; nothing downstream reads the
//! credential or the store from shared state.

use std::sync::Arc;

use crate::store::RemoteObjectStore;

#[derive(Clone)]
pub struct Session {
    store: Arc<dyn RemoteObjectStore>,
    principal: String,
}

impl Session {
    pub fn new(store: Arc<dyn RemoteObjectStore>, principal: impl Into<String>) -> Self {
        Self {
            store,
            principal: principal.into(),
        }
    }

    pub fn store(&self) -> &dyn RemoteObjectStore {
        self.store.as_ref()
    }

    /// Who the calls are made as, for logs only.
    pub fn principal(&self) -> &str {
        &self.principal
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("principal", &self.principal).finish()
    }
}
