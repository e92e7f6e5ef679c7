// src/application/scheduler.rs
use crate::application::{NoteRepository, NoteStore};
use crate::domain::{DomainError, NoteField, NoteId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{debug, trace, warn};

type TimerKey = (NoteId, NoteField);

struct PendingWrite {
    generation: u64,
    value: String,
    handle: AbortHandle,
}

#[derive(Default)]
struct TimerTable {
    next_generation: u64,
    pending: HashMap<TimerKey, PendingWrite>,
}

impl TimerTable {
    /// Remove the entry for `key` only if it is still the given arming.
    fn claim(&mut self, key: TimerKey, generation: u64) -> bool {
        match self.pending.get(&key) {
            Some(p) if p.generation == generation => {
                self.pending.remove(&key);
                true
            }
            _ => false,
        }
    }

    fn take_note(&mut self, note_id: NoteId) -> Vec<(TimerKey, PendingWrite)> {
        let keys: Vec<TimerKey> = self
            .pending
            .keys()
            .filter(|(id, _)| *id == note_id)
            .copied()
            .collect();
        keys.into_iter()
            .filter_map(|k| self.pending.remove(&k).map(|p| (k, p)))
            .collect()
    }
}

/// Coalesces rapid field edits into one delayed write per (note, field).
///
/// Each edit cancels the pending timer for the same key and arms a new one
/// holding the latest value. The note id is bound when the timer is armed.
/// Title and content timers are independent of each other.
pub struct WriteBackScheduler<R: NoteRepository + 'static> {
    store: Arc<NoteStore<R>>,
    quiet_period: Duration,
    timers: Arc<Mutex<TimerTable>>,
}

impl<R: NoteRepository + 'static> WriteBackScheduler<R> {
    pub fn new(store: Arc<NoteStore<R>>, quiet_period: Duration) -> Self {
        Self {
            store,
            quiet_period,
            timers: Arc::new(Mutex::new(TimerTable::default())),
        }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    fn table(&self) -> MutexGuard<'_, TimerTable> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arm (or re-arm) the timer for `field` of `note_id` with `value`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self, note_id: NoteId, field: NoteField, value: impl Into<String>) {
        let value = value.into();
        let key = (note_id, field);
        let mut table = self.table();
        table.next_generation += 1;
        let generation = table.next_generation;

        if let Some(previous) = table.pending.remove(&key) {
            previous.handle.abort();
            trace!(note_id = %note_id, %field, "Superseded pending write");
        }

        let task = tokio::spawn(Self::fire_after_quiet_period(
            self.store.clone(),
            self.timers.clone(),
            key,
            generation,
            self.quiet_period,
            value.clone(),
        ));
        table.pending.insert(
            key,
            PendingWrite {
                generation,
                value,
                handle: task.abort_handle(),
            },
        );
    }

    async fn fire_after_quiet_period(
        store: Arc<NoteStore<R>>,
        timers: Arc<Mutex<TimerTable>>,
        key: TimerKey,
        generation: u64,
        quiet_period: Duration,
        value: String,
    ) {
        tokio::time::sleep(quiet_period).await;

        // once claimed nobody can abort this task, so the write below runs to completion
        let claimed = timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .claim(key, generation);
        if !claimed {
            return;
        }

        debug!(note_id = %key.0, field = %key.1, "Quiet period elapsed, writing back");
        if let Err(e) = write(&store, key, &value).await {
            warn!(note_id = %key.0, field = %key.1, error = %e, "Debounced write failed");
        }
    }

    /// Latest value waiting to be written for this key.
    pub fn pending(&self, note_id: NoteId, field: NoteField) -> Option<String> {
        self.table()
            .pending
            .get(&(note_id, field))
            .map(|p| p.value.clone())
    }

    pub fn pending_count(&self) -> usize {
        self.table().pending.len()
    }

    /// Drop pending writes for a note without sending them.
    pub fn cancel(&self, note_id: NoteId) -> usize {
        let dropped = self.table().take_note(note_id);
        for (_, pending) in &dropped {
            pending.handle.abort();
        }
        if !dropped.is_empty() {
            debug!(note_id = %note_id, count = dropped.len(), "Cancelled pending writes");
        }
        dropped.len()
    }

    /// Send pending writes for a note now instead of waiting for the timer.
    ///
    /// Every pending field is attempted; the first failure is returned.
    pub async fn flush(&self, note_id: NoteId) -> Result<usize, DomainError> {
        let due = self.table().take_note(note_id);
        let mut first_error = None;
        let mut written = 0;
        for (key, pending) in due {
            pending.handle.abort();
            match write(&self.store, key, &pending.value).await {
                Ok(()) => written += 1,
                Err(e) => {
                    warn!(note_id = %key.0, field = %key.1, error = %e, "Flush write failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        if written > 0 {
            debug!(note_id = %note_id, written, "Flushed pending writes");
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    pub fn cancel_all(&self) -> usize {
        let mut table = self.table();
        let count = table.pending.len();
        for (_, pending) in table.pending.drain() {
            pending.handle.abort();
        }
        count
    }
}

impl<R: NoteRepository + 'static> Drop for WriteBackScheduler<R> {
    fn drop(&mut self) {
        let cancelled = self.cancel_all();
        if cancelled > 0 {
            debug!(cancelled, "Scheduler dropped with pending writes");
        }
    }
}

async fn write<R: NoteRepository>(
    store: &NoteStore<R>,
    (note_id, field): TimerKey,
    value: &str,
) -> Result<(), DomainError> {
    match field {
        NoteField::Title => store.update_note_title(note_id, value).await,
        NoteField::Content => store.update_note_content(note_id, value).await,
    }
}
