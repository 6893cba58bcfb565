use std::sync::Arc;

use crate::cache::Invalidator;
use crate::infra::store::MemoryStore;
use crate::routes::Routes;

#[derive(Clone, Debug)]
pub struct ApiState {
    pub store: Arc<MemoryStore>,
    pub invalidator: Arc<Invalidator>,
    pub routes: Arc<Routes>,
}

impl ApiState {
    pub fn new(store: Arc<MemoryStore>, invalidator: Invalidator) -> Self {
        let routes = Arc::new(invalidator.current().datasets.routes().clone());
        Self {
            store,
            invalidator: Arc::new(invalidator),
            routes,
        }
    }
}
