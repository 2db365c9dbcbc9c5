use interop_types::SentCcu;
use std::sync::{Arc, RwLock};

use crate::error::ConnectorError;
use crate::orchestrator::ConnectorStatus;
use crate::store::ConnectorStore;

/// Host-facing queries over the connector: the recorded CCU transactions
/// and a status snapshot. Obtained from [`crate::orchestrator::Connector::endpoint`].
#[derive(Clone)]
pub struct Endpoint {
    store: ConnectorStore,
    status: Arc<RwLock<ConnectorStatus>>,
}

impl Endpoint {
    #[must_use]
    pub fn new(store: ConnectorStore, status: Arc<RwLock<ConnectorStatus>>) -> Self {
        Endpoint { store, status }
    }

    /// Sent CCUs, newest nonce first.
    ///
    /// # Errors
    /// * store failure
    pub fn get_sent_ccus(&self) -> Result<Vec<SentCcu>, ConnectorError> {
        self.store.get_sent_ccus()
    }

    #[must_use]
    pub fn get_status(&self) -> ConnectorStatus {
        self.status.read().expect("status lock poisoned").clone()
    }
}
