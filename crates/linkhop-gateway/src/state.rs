use std::sync::Arc;

use linkhop_core::ShortCode;
use linkhop_registry::{DeletionQueue, IdentityResolver, Registry};

#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
    pub identity: IdentityResolver,
    pub deletions: DeletionQueue,
    base_url: Arc<str>,
}

impl AppState {
    pub fn new(
        registry: Registry,
        identity: IdentityResolver,
        deletions: DeletionQueue,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            identity,
            deletions,
            base_url: Arc::from(public_base_url.into()),
        }
    }

    pub fn short_url(&self, code: &ShortCode) -> String {
        code.to_url(&self.base_url)
    }
}
