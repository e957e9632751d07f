//! The review engine facade.
//!
//! Local mutations are applied optimistically: state transitions and
//! schedule updates are visible to the caller immediately, and the matching
//! remote mutation is queued for the next `sync_pending` job. Sync failures
//! never roll local state back; the caller resubmits later. Cache entries
//! for an item are only touched after the remote store confirms the write.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, info};

use crate::cache::{keys, TieredCache};
use crate::config::EngineConfig;
use crate::mastery;
use crate::model::{MasteryState, ReviewItem, ReviewOutcome};
use crate::ranking;
use crate::remote::{RemoteError, RemoteStore};
use crate::schedule;
use crate::sync::{BatchJob, BatchSyncCoordinator, Mutation, MutationOp, MutationStatus};

pub struct ReviewEngine {
    items: RwLock<HashMap<String, ReviewItem>>,
    pending: Arc<Mutex<Vec<Mutation>>>,
    cache: Arc<TieredCache>,
    remote: Arc<dyn RemoteStore>,
    coordinator: BatchSyncCoordinator,
    config: EngineConfig,
}

impl ReviewEngine {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        cache: Arc<TieredCache>,
        config: EngineConfig,
    ) -> Self {
        let coordinator = BatchSyncCoordinator::new(
            Arc::clone(&remote),
            config.sync_concurrency,
            config.sync_timeout,
        )
        .with_dispatch_spacing(config.dispatch_spacing);

        Self {
            items: RwLock::new(HashMap::new()),
            pending: Arc::new(Mutex::new(Vec::new())),
            cache,
            remote,
            coordinator,
            config,
        }
    }

    /// Records an answer outcome. A wrong answer creates the item on first
    /// miss or transitions an existing one; a correct answer alone changes
    /// nothing (only review outcomes advance mastery). Returns the current
    /// item, or `None` when a correct answer hits an untracked key.
    pub fn report_answer(
        &self,
        item_key: &str,
        was_correct: bool,
        metadata: Option<Value>,
    ) -> Option<ReviewItem> {
        let now = Utc::now();
        let mut items = self.items.write();

        if was_correct {
            return items.get(item_key).cloned();
        }

        let (item, op) = match items.get_mut(item_key) {
            Some(item) => {
                let exhausted = schedule::is_exhausted(item);
                mastery::on_wrong_answer(item, now);
                if exhausted && self.config.restart_schedule_on_relapse {
                    debug!("restarting exhausted schedule for {item_key}");
                    schedule::restart_schedule(item, now, &self.config.review_offsets_min);
                }
                (item.clone(), MutationOp::Update)
            }
            None => {
                let mut item = ReviewItem::new(item_key, now);
                item.due_timestamps =
                    schedule::generate_due_timestamps(now, &self.config.review_offsets_min);
                items.insert(item_key.to_string(), item.clone());
                (item, MutationOp::Insert)
            }
        };
        drop(items);

        self.queue_item_mutation(&item, op, metadata);
        Some(item)
    }

    /// Records a completed review: advances mastery and consumes the
    /// earliest outstanding due timestamp.
    pub fn report_review_outcome(
        &self,
        item_key: &str,
        outcome: ReviewOutcome,
    ) -> Option<ReviewItem> {
        let now = Utc::now();
        let mut items = self.items.write();
        let item = items.get_mut(item_key)?;

        let due = schedule::next_due(item);
        mastery::on_review_outcome(item, outcome, now);
        if let Some(timestamp) = due {
            schedule::mark_reviewed(item, timestamp);
        }
        let snapshot = item.clone();
        drop(items);

        self.queue_item_mutation(&snapshot, MutationOp::Update, None);
        Some(snapshot)
    }

    /// The ranked review queue, highest priority score first.
    pub fn next_review_queue(&self, limit: usize) -> Vec<ReviewItem> {
        let now = Utc::now();
        let mut queue: Vec<ReviewItem> = self.items.read().values().cloned().collect();
        ranking::rank(&mut queue, now, &self.config.rank_weights);
        queue.truncate(limit);
        queue
    }

    /// Items with an outstanding due timestamp at or before `now`, earliest
    /// due first.
    pub fn due_now(&self, now: DateTime<Utc>) -> Vec<ReviewItem> {
        let items = self.items.read();
        let mut due: Vec<(DateTime<Utc>, ReviewItem)> = items
            .values()
            .filter_map(|item| {
                schedule::next_due(item)
                    .filter(|ts| *ts <= now)
                    .map(|ts| (ts, item.clone()))
            })
            .collect();
        due.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
        due.into_iter().map(|(_, item)| item).collect()
    }

    /// Confidence estimate for a tracked item.
    pub fn mastery_rate(&self, item_key: &str) -> Option<f64> {
        self.items.read().get(item_key).map(ranking::mastery_rate)
    }

    /// Marks or unmarks an item as user-flagged, queueing the change for
    /// sync like any other local mutation.
    pub fn set_flagged(&self, item_key: &str, flagged: bool) -> Option<ReviewItem> {
        let mut items = self.items.write();
        let item = items.get_mut(item_key)?;
        item.flagged = flagged;
        let snapshot = item.clone();
        drop(items);

        self.queue_item_mutation(&snapshot, MutationOp::Update, None);
        Some(snapshot)
    }

    /// Explicit deletion requested by the caller.
    pub fn remove_item(&self, item_key: &str) -> bool {
        let removed = self.items.write().remove(item_key).is_some();
        if removed {
            self.queue_mutation(Mutation::delete(item_key, &self.config.resource));
        }
        removed
    }

    /// Retention sweep: drops mastered items whose last review is older
    /// than the configured cutoff and queues their remote deletion.
    pub fn sweep_retired(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::days(self.config.retention_days);
        let retired: Vec<String> = {
            let items = self.items.read();
            items
                .values()
                .filter(|item| {
                    item.mastery_state == MasteryState::Mastered
                        && item.last_review_time.map(|t| t < cutoff).unwrap_or(false)
                })
                .map(|item| item.id.clone())
                .collect()
        };

        let mut items = self.items.write();
        for key in &retired {
            items.remove(key);
        }
        drop(items);

        for key in &retired {
            self.queue_mutation(Mutation::delete(key, &self.config.resource));
        }
        if !retired.is_empty() {
            info!("retention sweep retired {} mastered items", retired.len());
        }
        retired.len()
    }

    pub fn item(&self, item_key: &str) -> Option<ReviewItem> {
        self.items.read().get(item_key).cloned()
    }

    /// How many local changes have not yet been confirmed by the remote
    /// store ("N of M changes not yet synced" at the UI boundary).
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Drains the pending queue into a batch job. Cache entries for
    /// succeeded mutations are invalidated once the remote store confirms
    /// them; failed mutations leave the cache untouched and return to the
    /// pending queue so the next `sync_pending` resubmits them. A newer
    /// local change queued for the same key while the job was in flight
    /// wins over the returned mutation.
    pub fn sync_pending(&self) -> BatchJob {
        let batch = std::mem::take(&mut *self.pending.lock());
        let cache = Arc::clone(&self.cache);
        let resource = self.config.resource.clone();
        let pending = Arc::clone(&self.pending);

        self.coordinator.submit_with(batch, move |outcome| {
            for key in &outcome.succeeded_keys {
                cache.invalidate(&keys::record_key(&resource, key));
            }

            let mut pending = pending.lock();
            for mutation in &outcome.mutations {
                if mutation.status != MutationStatus::Failed {
                    continue;
                }
                if pending.iter().any(|queued| queued.key == mutation.key) {
                    continue;
                }
                let mut requeued = mutation.clone();
                requeued.status = MutationStatus::Pending;
                pending.push(requeued);
            }
        })
    }

    /// Cached remote read: the tiered cache first, the remote store on a
    /// miss, with the result written back under the query key.
    pub async fn fetch_records(
        &self,
        resource: &str,
        filter: &Value,
    ) -> Result<Vec<Value>, RemoteError> {
        let cache_key = keys::query_key(resource, filter);
        if let Some(cached) = self.cache.get(&cache_key) {
            if let Ok(records) = serde_json::from_value::<Vec<Value>>(cached) {
                return Ok(records);
            }
        }

        let records = self.remote.query(resource, filter).await?;
        self.cache
            .put(&cache_key, Value::Array(records.clone()), None);
        Ok(records)
    }

    /// Hydrates the local item map from the remote store. Items with
    /// pending local changes or already tracked locally are left alone;
    /// local optimistic state wins over remote reads.
    pub async fn load_from_remote(&self, filter: &Value) -> Result<usize, RemoteError> {
        let resource = self.config.resource.clone();
        let records = self.fetch_records(&resource, filter).await?;
        let dirty: Vec<String> = self
            .pending
            .lock()
            .iter()
            .map(|mutation| mutation.key.clone())
            .collect();

        let mut items = self.items.write();
        let mut loaded = 0;
        for record in records {
            let Ok(item) = serde_json::from_value::<ReviewItem>(record) else {
                continue;
            };
            if items.contains_key(&item.id) || dirty.contains(&item.id) {
                continue;
            }
            items.insert(item.id.clone(), item);
            loaded += 1;
        }
        debug!("hydrated {loaded} items from remote");
        Ok(loaded)
    }

    /// Periodic cache maintenance, expected to be driven by the external
    /// timer collaborator.
    pub fn sweep_cache(&self) -> usize {
        self.cache.sweep_expired()
    }

    fn queue_item_mutation(&self, item: &ReviewItem, op: MutationOp, metadata: Option<Value>) {
        let mut payload = match serde_json::to_value(item) {
            Ok(value) => value,
            Err(_) => return,
        };
        if let (Some(target), Some(meta)) = (payload.as_object_mut(), metadata) {
            target.insert("metadata".to_string(), meta);
        }

        let mutation = match op {
            MutationOp::Insert => Mutation::insert(&item.id, &self.config.resource, payload),
            MutationOp::Update => Mutation::update(&item.id, &self.config.resource, payload),
            MutationOp::Delete => Mutation::delete(&item.id, &self.config.resource),
        };
        self.queue_mutation(mutation);
    }

    // Later changes to the same key coalesce into the queued mutation so a
    // batch never races an insert against its own update.
    fn queue_mutation(&self, mutation: Mutation) {
        let mut pending = self.pending.lock();

        if mutation.op == MutationOp::Delete {
            let had_unsynced_insert = pending
                .iter()
                .any(|queued| queued.key == mutation.key && queued.op == MutationOp::Insert);
            pending.retain(|queued| queued.key != mutation.key);
            if had_unsynced_insert {
                // The remote store never saw this item; nothing to delete.
                return;
            }
            pending.push(mutation);
            return;
        }

        if let Some(queued) = pending
            .iter_mut()
            .find(|queued| queued.key == mutation.key && queued.op != MutationOp::Delete)
        {
            queued.payload = mutation.payload;
            return;
        }
        pending.push(mutation);
    }
}
