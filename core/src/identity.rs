use std::future::Future;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::models::Identity;

/// Publishes the current authenticated identity and notifies subscribers on
/// every transition.
pub struct IdentityWatcher {
    tx: watch::Sender<Option<Identity>>,
}

impl IdentityWatcher {
    #[must_use]
    pub fn new(initial: Option<Identity>) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    #[must_use]
    pub fn current(&self) -> Option<Identity> {
        self.tx.borrow().clone()
    }

    pub fn sign_in(&self, identity: Identity) {
        self.publish(Some(identity));
    }

    pub fn sign_out(&self) {
        self.publish(None);
    }

    /// Token refresh: same identity, but subscribers still fire.
    pub fn refresh(&self) {
        let current = self.current();
        self.publish(current);
    }

    fn publish(&self, identity: Option<Identity>) {
        tracing::debug!(
            user_id = identity.as_ref().map(|i| i.user_id.as_str()),
            "identity transition"
        );
        // send_replace notifies even when the value is unchanged and when
        // nobody is subscribed yet.
        self.tx.send_replace(identity);
    }

    /// Run `handler` now with the current identity, then after every
    /// transition until the returned subscription is dropped.
    ///
    /// The handler runs on a spawned task, one invocation at a time.
    /// Transitions published while it is running collapse into the latest.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn on_change<F, Fut>(&self, mut handler: F) -> Subscription
    where
        F: FnMut(Option<Identity>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut rx = self.tx.subscribe();
        let task = tokio::spawn(async move {
            loop {
                let identity = rx.borrow_and_update().clone();
                handler(identity).await;
                if rx.changed().await.is_err() {
                    break;
                }
            }
        });
        Subscription { task: Some(task) }
    }
}

impl Default for IdentityWatcher {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Handle for an `on_change` registration. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<Option<String>>>>;

    fn recording(watcher: &IdentityWatcher) -> (Subscription, Seen) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = watcher.on_change(move |identity| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(identity.map(|i| i.user_id));
            }
        });
        (sub, seen)
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_fires_immediately_with_current() {
        let watcher = IdentityWatcher::new(Some(Identity::new("u1")));
        let (_sub, seen) = recording(&watcher);
        settle().await;
        assert_eq!(*seen.lock().unwrap(), vec![Some("u1".to_string())]);
    }

    #[tokio::test]
    async fn test_fires_on_each_transition() {
        let watcher = IdentityWatcher::default();
        let (_sub, seen) = recording(&watcher);
        settle().await;
        watcher.sign_in(Identity::new("u1"));
        settle().await;
        watcher.refresh();
        settle().await;
        watcher.sign_out();
        settle().await;
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                None,
                Some("u1".to_string()),
                Some("u1".to_string()),
                None
            ]
        );
        assert_eq!(watcher.current(), None);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let watcher = IdentityWatcher::default();
        let (sub, seen) = recording(&watcher);
        settle().await;
        assert!(sub.is_active());
        sub.unsubscribe();
        watcher.sign_in(Identity::new("u1"));
        settle().await;
        assert_eq!(*seen.lock().unwrap(), vec![None]);
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let watcher = IdentityWatcher::default();
        let (sub, seen) = recording(&watcher);
        settle().await;
        drop(sub);
        watcher.sign_in(Identity::new("u2"));
        settle().await;
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
