use std::sync::Arc;

use crate::gateway::RemoteGateway;
use crate::identity::{IdentityWatcher, Subscription};
use crate::store::{MealPlanStore, StoreConfig};

/// A store wired to an identity source for the lifetime of a session.
///
/// Starting a session binds the store to the watcher, which immediately
/// reloads for the current identity. Ending it (or dropping it) stops
/// identity-driven reloads; in-flight writes still run to completion.
pub struct PlannerSession {
    store: Arc<MealPlanStore>,
    subscription: Subscription,
}

impl PlannerSession {
    #[must_use]
    pub fn start(
        gateway: Arc<dyn RemoteGateway>,
        watcher: &IdentityWatcher,
        config: StoreConfig,
    ) -> Self {
        let store = MealPlanStore::new(gateway, config);
        let subscription = store.bind(watcher);
        tracing::debug!(?config, "planner session started");
        Self {
            store,
            subscription,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<MealPlanStore> {
        &self.store
    }

    /// Wait for the first load (and any reload in progress) to finish.
    pub async fn ready(&self) -> &Arc<MealPlanStore> {
        self.store.wait_until_loaded().await;
        &self.store
    }

    pub fn end(self) {
        self.subscription.unsubscribe();
    }
}
