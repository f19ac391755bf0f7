use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use anyhow::{Result, anyhow, bail};
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::assemble::assemble_entry;
use crate::gateway::RemoteGateway;
use crate::identity::{IdentityWatcher, Subscription};
use crate::models::{
    EntryMatch, Identity, MealEntry, NewCustomEntry, NewRecipeEntry, PlanRow, PlannedMeals, Recipe,
};

/// How `remove` identifies the persisted row to delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteMode {
    /// Match on user, date and recipe id / custom title. Deletes every
    /// duplicate on that date, and misses rows whose insert lands after the
    /// delete.
    ByMatch,
    /// Wait for the entry's own insert to be acknowledged, then delete that
    /// row by id.
    #[default]
    ByRowId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    pub delete_mode: DeleteMode,
    /// Undo the optimistic change when its remote write fails.
    pub rollback_on_failure: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            delete_mode: DeleteMode::ByRowId,
            rollback_on_failure: true,
        }
    }
}

impl StoreConfig {
    /// Composite-key deletes and no compensation on failure.
    #[must_use]
    pub fn legacy() -> Self {
        Self {
            delete_mode: DeleteMode::ByMatch,
            rollback_on_failure: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InsertState {
    InFlight,
    Stored(i64),
    Failed,
}

/// Where an entry lives remotely: a known row, or an insert still in flight.
#[derive(Debug, Clone)]
enum RowHandle {
    Stored(i64),
    Pending(watch::Receiver<InsertState>),
}

impl RowHandle {
    /// The row id once the insert settles; `None` if it never landed.
    async fn resolve(self) -> Option<i64> {
        match self {
            RowHandle::Stored(id) => Some(id),
            RowHandle::Pending(mut rx) => {
                let state = rx
                    .wait_for(|s| *s != InsertState::InFlight)
                    .await
                    .map_or(InsertState::Failed, |s| *s);
                match state {
                    InsertState::Stored(id) => Some(id),
                    InsertState::InFlight | InsertState::Failed => None,
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    local_id: u64,
    entry: MealEntry,
    row: RowHandle,
}

#[derive(Debug, Default)]
struct PlanState {
    identity: Option<Identity>,
    meals: BTreeMap<String, Vec<Slot>>,
    /// Bumped whenever a reload replaces `meals`; compensations recorded
    /// against an older generation are dropped.
    generation: u64,
    applied_reload: u64,
}

/// The remote half of a mutation. The local half has already been applied
/// by the time this is returned.
///
/// The write runs on its own task: dropping this handle does not cancel it.
/// Awaiting resolves to the write's outcome.
#[must_use = "the write proceeds regardless; await it to observe the outcome"]
pub struct PendingWrite {
    task: Option<JoinHandle<Result<()>>>,
}

impl PendingWrite {
    fn noop() -> Self {
        Self { task: None }
    }

    fn spawn<F>(write: F) -> Self
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            task: Some(tokio::spawn(write)),
        }
    }

    /// True when nothing was sent remotely (no active identity).
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.task.is_none()
    }
}

impl Future for PendingWrite {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.task.as_mut() {
            None => Poll::Ready(Ok(())),
            Some(task) => Pin::new(task).poll(cx).map(|joined| {
                joined
                    .map_err(|e| anyhow!("Remote write task failed: {e}"))
                    .and_then(|outcome| outcome)
            }),
        }
    }
}

/// Date-indexed, optimistically updated cache of one user's meal plan.
pub struct MealPlanStore {
    gateway: Arc<dyn RemoteGateway>,
    config: StoreConfig,
    state: Mutex<PlanState>,
    loading: watch::Sender<bool>,
    reloads_in_flight: AtomicUsize,
    reload_ticket: AtomicU64,
    next_local_id: AtomicU64,
    last_temp_id: AtomicI64,
}

impl MealPlanStore {
    #[must_use]
    pub fn new(gateway: Arc<dyn RemoteGateway>, config: StoreConfig) -> Arc<Self> {
        let (loading, _) = watch::channel(true);
        Arc::new(Self {
            gateway,
            config,
            state: Mutex::new(PlanState::default()),
            loading,
            reloads_in_flight: AtomicUsize::new(0),
            reload_ticket: AtomicU64::new(0),
            next_local_id: AtomicU64::new(1),
            last_temp_id: AtomicI64::new(0),
        })
    }

    #[must_use]
    pub fn config(&self) -> StoreConfig {
        self.config
    }

    fn lock(&self) -> MutexGuard<'_, PlanState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // --- Reads ---

    #[must_use]
    pub fn planned_meals(&self) -> PlannedMeals {
        self.lock()
            .meals
            .iter()
            .map(|(date, slots)| {
                (
                    date.clone(),
                    slots.iter().map(|s| s.entry.clone()).collect(),
                )
            })
            .collect()
    }

    #[must_use]
    pub fn meals_for(&self, date: &str) -> Vec<MealEntry> {
        self.lock()
            .meals
            .get(date)
            .map(|slots| slots.iter().map(|s| s.entry.clone()).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.lock().identity.clone()
    }

    // --- Loading flag ---

    #[must_use]
    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    #[must_use]
    pub fn observe_loading(&self) -> watch::Receiver<bool> {
        self.loading.subscribe()
    }

    pub async fn wait_until_loaded(&self) {
        let mut rx = self.loading.subscribe();
        // The sender lives as long as `self`, so this cannot observe a close.
        let _ = rx.wait_for(|loading| !*loading).await;
    }

    // --- Reload ---

    /// Replace the whole collection with what the remote holds for
    /// `identity`. With no identity the collection is cleared without a
    /// remote call. On failure the previous collection stays in place.
    pub async fn reload(&self, identity: Option<Identity>) -> Result<()> {
        let ticket = self.reload_ticket.fetch_add(1, Ordering::SeqCst) + 1;
        let _loading = LoadingGuard::begin(self);

        let Some(identity) = identity else {
            self.apply_reload(ticket, None, Some(BTreeMap::new()));
            return Ok(());
        };

        tracing::debug!(user_id = %identity.user_id, "reloading meal plan");
        match self.gateway.query_all_for_user(&identity.user_id).await {
            Ok(rows) => {
                let meals = self.group_rows(&rows);
                self.apply_reload(ticket, Some(identity), Some(meals));
                Ok(())
            }
            Err(err) => {
                tracing::error!(
                    user_id = %identity.user_id,
                    error = %format!("{err:#}"),
                    "failed to fetch meal plan"
                );
                self.apply_reload(ticket, Some(identity), None);
                Err(err.context("Failed to fetch meal plan"))
            }
        }
    }

    fn group_rows(&self, rows: &[PlanRow]) -> BTreeMap<String, Vec<Slot>> {
        let mut grouped: BTreeMap<String, Vec<Slot>> = BTreeMap::new();
        for row in rows {
            match assemble_entry(row) {
                Ok(entry) => grouped.entry(row.date.clone()).or_default().push(Slot {
                    local_id: self.next_local_id(),
                    entry,
                    row: RowHandle::Stored(row.id),
                }),
                Err(err) => tracing::warn!(
                    row_id = row.id,
                    date = %row.date,
                    error = %format!("{err:#}"),
                    "skipping malformed planner row"
                ),
            }
        }
        grouped
    }

    /// `meals: None` keeps the current collection (failed fetch).
    fn apply_reload(
        &self,
        ticket: u64,
        identity: Option<Identity>,
        meals: Option<BTreeMap<String, Vec<Slot>>>,
    ) {
        let mut state = self.lock();
        if ticket <= state.applied_reload {
            tracing::debug!(ticket, "discarding superseded reload");
            return;
        }
        state.applied_reload = ticket;
        state.identity = identity;
        if let Some(meals) = meals {
            state.meals = meals;
            state.generation += 1;
        }
    }

    /// Reload on every identity transition until the subscription is
    /// dropped. The subscription does not keep the store alive.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn bind(self: &Arc<Self>, watcher: &IdentityWatcher) -> Subscription {
        let store = Arc::downgrade(self);
        watcher.on_change(move |identity| {
            let store = store.clone();
            async move {
                if let Some(store) = store.upgrade() {
                    // Already logged inside reload.
                    let _ = store.reload(identity).await;
                }
            }
        })
    }

    // --- Mutations ---

    /// Append `recipe` to `date` now and persist it in the background.
    /// Does nothing without an active identity.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime, since the remote write is
    /// spawned onto the current one.
    pub fn add_recipe(self: &Arc<Self>, recipe: Recipe, date: &str) -> PendingWrite {
        let recipe_id = recipe.id;
        let (tx, rx) = watch::channel(InsertState::InFlight);
        let entry = MealEntry::from_recipe(recipe);
        let Some((user_id, local_id, generation)) =
            self.push_optimistic(date, entry, RowHandle::Pending(rx))
        else {
            return PendingWrite::noop();
        };

        let payload = NewRecipeEntry {
            user_id,
            recipe_id,
            date: date.to_string(),
        };
        let store = Arc::clone(self);
        PendingWrite::spawn(async move {
            let result = store.gateway.insert_recipe_entry(&payload).await;
            store.settle_insert(result, &tx, &payload.date, local_id, generation)
        })
    }

    /// Append a freeform entry to `date` now and persist it in the
    /// background. The entry's display id is a temporary, time-based value.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime, since the remote write is
    /// spawned onto the current one.
    pub fn add_custom(self: &Arc<Self>, title: &str, date: &str) -> PendingWrite {
        let (tx, rx) = watch::channel(InsertState::InFlight);
        let entry = MealEntry::custom(self.next_temp_id(), title);
        let Some((user_id, local_id, generation)) =
            self.push_optimistic(date, entry, RowHandle::Pending(rx))
        else {
            return PendingWrite::noop();
        };

        let payload = NewCustomEntry {
            user_id,
            custom_title: title.to_string(),
            date: date.to_string(),
        };
        let store = Arc::clone(self);
        PendingWrite::spawn(async move {
            let result = store.gateway.insert_custom_entry(&payload).await;
            store.settle_insert(result, &tx, &payload.date, local_id, generation)
        })
    }

    /// Remove the entry at `index` on `date` now and delete it remotely in
    /// the background. The index is read against the current collection, so
    /// callers must not hold one across an await.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime, since the remote write is
    /// spawned onto the current one.
    pub fn remove(self: &Arc<Self>, date: &str, index: usize) -> Result<PendingWrite> {
        let (user_id, slot, generation) = {
            let mut state = self.lock();
            let Some(user_id) = state.identity.as_ref().map(|i| i.user_id.clone()) else {
                tracing::debug!(date, index, "no identity; skipping remove");
                return Ok(PendingWrite::noop());
            };
            let generation = state.generation;
            let Some(slots) = state.meals.get_mut(date) else {
                bail!("No meals planned on {date}");
            };
            if index >= slots.len() {
                bail!(
                    "No meal at index {index} on {date} ({} planned)",
                    slots.len()
                );
            }
            (user_id, slots.remove(index), generation)
        };

        let store = Arc::clone(self);
        let date = date.to_string();
        Ok(PendingWrite::spawn(async move {
            let result = store.delete_remote(&user_id, &date, &slot).await;
            if let Err(err) = &result {
                tracing::error!(
                    user_id = %user_id,
                    date = %date,
                    error = %format!("{err:#}"),
                    "failed to remove meal from planner"
                );
                if store.config.rollback_on_failure {
                    store.restore(&date, index, slot, generation);
                }
            }
            result
        }))
    }

    fn push_optimistic(
        &self,
        date: &str,
        entry: MealEntry,
        row: RowHandle,
    ) -> Option<(String, u64, u64)> {
        let mut state = self.lock();
        let Some(user_id) = state.identity.as_ref().map(|i| i.user_id.clone()) else {
            tracing::debug!(date, "no identity; skipping add");
            return None;
        };
        let local_id = self.next_local_id();
        let generation = state.generation;
        state.meals.entry(date.to_string()).or_default().push(Slot {
            local_id,
            entry,
            row,
        });
        Some((user_id, local_id, generation))
    }

    fn settle_insert(
        &self,
        result: Result<i64>,
        tx: &watch::Sender<InsertState>,
        date: &str,
        local_id: u64,
        generation: u64,
    ) -> Result<()> {
        match result {
            Ok(row_id) => {
                tx.send_replace(InsertState::Stored(row_id));
                tracing::debug!(date, row_id, "meal saved to planner");
                Ok(())
            }
            Err(err) => {
                tx.send_replace(InsertState::Failed);
                tracing::error!(
                    date,
                    error = %format!("{err:#}"),
                    "failed to save meal to planner"
                );
                if self.config.rollback_on_failure {
                    self.drop_optimistic(date, local_id, generation);
                }
                Err(err)
            }
        }
    }

    async fn delete_remote(&self, user_id: &str, date: &str, slot: &Slot) -> Result<()> {
        match self.config.delete_mode {
            DeleteMode::ByMatch => {
                let criteria = EntryMatch::for_entry(user_id, date, &slot.entry);
                let removed = self.gateway.delete_by_match(&criteria).await?;
                if removed != 1 {
                    tracing::debug!(date, removed, "composite-key delete did not match exactly one row");
                }
            }
            DeleteMode::ByRowId => match slot.row.clone().resolve().await {
                Some(row_id) => {
                    if !self.gateway.delete_by_id(user_id, row_id).await? {
                        tracing::debug!(date, row_id, "planner row already gone");
                    }
                }
                None => tracing::debug!(date, "insert never landed; nothing to delete"),
            },
        }
        Ok(())
    }

    fn drop_optimistic(&self, date: &str, local_id: u64, generation: u64) {
        let mut state = self.lock();
        if state.generation != generation {
            return;
        }
        if let Some(slots) = state.meals.get_mut(date) {
            slots.retain(|s| s.local_id != local_id);
        }
    }

    fn restore(&self, date: &str, index: usize, slot: Slot, generation: u64) {
        let mut state = self.lock();
        if state.generation != generation {
            return;
        }
        let slots = state.meals.entry(date.to_string()).or_default();
        let at = index.min(slots.len());
        slots.insert(at, slot);
    }

    fn next_local_id(&self) -> u64 {
        self.next_local_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Current epoch millis, bumped past the last id handed out so two adds
    /// in the same millisecond stay distinct.
    fn next_temp_id(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let prev = self
            .last_temp_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |prev| {
                Some(now.max(prev + 1))
            })
            .unwrap_or_else(|prev| prev);
        now.max(prev + 1)
    }
}

struct LoadingGuard<'a> {
    store: &'a MealPlanStore,
}

impl<'a> LoadingGuard<'a> {
    fn begin(store: &'a MealPlanStore) -> Self {
        store.reloads_in_flight.fetch_add(1, Ordering::SeqCst);
        store.loading.send_replace(true);
        Self { store }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.store.reloads_in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.store.loading.send_replace(false);
        }
    }
}
