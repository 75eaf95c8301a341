//! Time-windowed update coalescing
//!
//! Collects items keyed by a caller-supplied dedup key and flushes them as
//! one batch on whichever comes first: a debounce window elapsing with no
//! new adds, or a hard maximum delay since the first unflushed add. Within
//! a window only the last item per key survives (last-write-wins); order
//! inside a flushed batch is unspecified.

use crate::metrics::StreamMetrics;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

struct Inner<K, V> {
    pending: HashMap<K, V>,
    first_add: Option<Instant>,
    timer: Option<JoinHandle<()>>,
}

/// Generic coalescing buffer; must be used inside a tokio runtime
pub struct UpdateBatcher<K, V> {
    inner: Arc<Mutex<Inner<K, V>>>,
    out_tx: mpsc::UnboundedSender<Vec<V>>,
    metrics: Arc<StreamMetrics>,
    debounce: Duration,
    max_delay: Duration,
}

impl<K, V> Clone for UpdateBatcher<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            out_tx: self.out_tx.clone(),
            metrics: Arc::clone(&self.metrics),
            debounce: self.debounce,
            max_delay: self.max_delay,
        }
    }
}

impl<K, V> UpdateBatcher<K, V>
where
    K: Eq + Hash + Send + 'static,
    V: Send + 'static,
{
    /// Create a batcher and the receiving half of its flush channel
    ///
    /// Every delivered batch increments `batches_flushed` on `metrics`.
    pub fn new(
        debounce: Duration,
        max_delay: Duration,
        metrics: Arc<StreamMetrics>,
    ) -> (Self, mpsc::UnboundedReceiver<Vec<V>>) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let batcher = Self {
            inner: Arc::new(Mutex::new(Inner {
                pending: HashMap::new(),
                first_add: None,
                timer: None,
            })),
            out_tx,
            metrics,
            debounce,
            max_delay,
        };
        (batcher, out_rx)
    }

    /// Store an item under its dedup key and (re)schedule the flush timer
    ///
    /// Overwrites any pending entry for the same key.
    pub fn add(&self, key: K, item: V) {
        let mut guard = self.inner.lock();
        guard.pending.insert(key, item);
        let now = Instant::now();
        let first = *guard.first_add.get_or_insert(now);

        // Debounce, but never past the max-delay ceiling for this window
        let ceiling = (first + self.max_delay).saturating_duration_since(now);
        let delay = self.debounce.min(ceiling);

        if let Some(timer) = guard.timer.take() {
            timer.abort();
        }
        let inner = Arc::clone(&self.inner);
        let out_tx = self.out_tx.clone();
        let metrics = Arc::clone(&self.metrics);
        guard.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut guard = inner.lock();
            guard.timer = None;
            flush_locked(&mut guard, &out_tx, &metrics);
        }));
    }

    /// Flush pending items immediately
    ///
    /// Used during teardown so no update is silently dropped.
    pub fn flush_sync(&self) {
        let mut guard = self.inner.lock();
        if let Some(timer) = guard.timer.take() {
            timer.abort();
        }
        flush_locked(&mut guard, &self.out_tx, &self.metrics);
    }

    /// Discard pending items without delivering them
    pub fn clear(&self) {
        let mut guard = self.inner.lock();
        if let Some(timer) = guard.timer.take() {
            timer.abort();
        }
        guard.pending.clear();
        guard.first_add = None;
    }

    /// Number of items awaiting flush
    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }
}

fn flush_locked<K, V>(
    inner: &mut Inner<K, V>,
    out_tx: &mpsc::UnboundedSender<Vec<V>>,
    metrics: &StreamMetrics,
) {
    inner.first_add = None;
    if inner.pending.is_empty() {
        return;
    }
    let batch: Vec<V> = inner.pending.drain().map(|(_, v)| v).collect();
    metrics.batches_flushed.fetch_add(1, Ordering::Relaxed);
    // Receiver gone means the service is shutting down; nothing to do
    let _ = out_tx.send(batch);
}
