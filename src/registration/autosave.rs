//! Debounced draft autosave
//!
//! Each mutation replaces the pending snapshot and restarts the quiet
//! period; only the latest snapshot is written. The timer is a tokio task
//! owned by [`Autosave`] and aborted on cancel, flush and drop.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::core::cache::PersistenceCache;
use crate::entities::ApplicationDraft;

/// What gets written on an autosave
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub draft: ApplicationDraft,
    pub step: usize,
    pub completed: BTreeSet<usize>,
}

#[derive(Debug, Default)]
struct Pending {
    snapshot: Option<Snapshot>,
    /// Bumped by every cancel; a timer from an older generation writes nothing
    generation: u64,
}

/// Owned debounce timer writing drafts to the session cache
#[derive(Debug)]
pub struct Autosave {
    cache: Arc<Mutex<PersistenceCache>>,
    delay: Duration,
    pending: Arc<Mutex<Pending>>,
    task: Option<JoinHandle<()>>,
    armed: bool,
}

impl Autosave {
    /// Create a disarmed autosave; nothing is scheduled until [`Autosave::arm`]
    pub fn new(cache: Arc<Mutex<PersistenceCache>>, delay: Duration) -> Self {
        Self {
            cache,
            delay,
            pending: Arc::new(Mutex::new(Pending::default())),
            task: None,
            armed: false,
        }
    }

    pub fn arm(&mut self) {
        self.armed = true;
    }

    /// Stop accepting snapshots and drop anything pending
    pub fn disarm(&mut self) {
        self.cancel();
        self.armed = false;
    }

    /// A snapshot is waiting for its quiet period to end
    pub fn is_pending(&self) -> bool {
        lock(&self.pending).snapshot.is_some()
    }

    /// Replace the pending snapshot and restart the timer
    pub fn schedule(&mut self, snapshot: Snapshot) {
        if !self.armed {
            return;
        }
        let generation = {
            let mut pending = lock(&self.pending);
            pending.snapshot = Some(snapshot);
            pending.generation
        };
        if let Some(task) = self.task.take() {
            task.abort();
        }

        let state = Arc::clone(&self.pending);
        let cache = Arc::clone(&self.cache);
        let delay = self.delay;
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut pending = lock(&state);
            if pending.generation != generation {
                return;
            }
            if let Some(snapshot) = pending.snapshot.take() {
                write(&cache, &snapshot);
            }
        }));
    }

    /// Write the pending snapshot now
    pub fn flush(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        let mut pending = lock(&self.pending);
        if let Some(snapshot) = pending.snapshot.take() {
            write(&self.cache, &snapshot);
        }
    }

    /// Drop the pending snapshot; a timer already past its sleep writes nothing
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        let mut pending = lock(&self.pending);
        pending.snapshot = None;
        pending.generation += 1;
    }
}

impl Drop for Autosave {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn write(cache: &Mutex<PersistenceCache>, snapshot: &Snapshot) {
    let mut cache = lock(cache);
    let saved = cache.save_draft(&snapshot.draft)
        && cache.save_step(snapshot.step)
        && cache.save_completed_steps(&snapshot.completed);
    if saved {
        tracing::debug!(step = snapshot.step, "draft autosaved");
    } else {
        tracing::warn!("autosave incomplete; the draft may not survive a restart");
    }
}
