//! Shared application state handed to every handler.

use std::sync::Arc;

use qtask_broker::Broker;
use qtask_coordinator::Coordinator;
use qtask_store::Store;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub store: Arc<dyn Store>,
    pub broker: Arc<dyn Broker>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, broker: Arc<dyn Broker>) -> Self {
        let coordinator = Arc::new(Coordinator::new(store.clone(), broker.clone()));
        Self { coordinator, store, broker }
    }
}
