//! Single-flight fetch cache
//!
//! Several cities are served by the same product file (the NSW observation
//! summary covers both Sydney and Canberra). Within one run every distinct
//! source id is retrieved at most once: concurrent callers block on the same
//! slot and share its result, later callers get the memoized document.
//!
//! The cache lives for one run and is dropped with it. Failed retrievals are
//! memoized like successful ones: every caller asking for that id during the
//! run gets the same error. The cache never retries on its own; a caller that
//! wants a fresh attempt calls `invalidate` first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::ingest::source::BulletinSource;
use crate::logging::Component;
use crate::model::FetchError;

type Slot = Arc<OnceLock<Result<Arc<str>, FetchError>>>;

pub struct FetchCache<'a, S: BulletinSource + ?Sized> {
    source: &'a S,
    slots: Mutex<HashMap<String, Slot>>,
    retrievals: AtomicUsize,
}

impl<'a, S: BulletinSource + ?Sized> FetchCache<'a, S> {
    pub fn new(source: &'a S) -> Self {
        FetchCache {
            source,
            slots: Mutex::new(HashMap::new()),
            retrievals: AtomicUsize::new(0),
        }
    }

    /// Returns the document for `source_id`, retrieving it only if no
    /// retrieval for that id has completed or is in flight.
    pub fn fetch(&self, source_id: &str) -> Result<Arc<str>, FetchError> {
        let slot = self.slot(source_id);

        slot.get_or_init(|| {
            self.retrievals.fetch_add(1, Ordering::SeqCst);
            tracing::info!(component = %Component::Cache, source_id, "Retrieving bulletin");
            self.source.fetch(source_id).map(Arc::from)
        })
        .clone()
    }

    /// Forgets a memoized document or error so the next `fetch` retrieves it
    /// again.
    ///
    /// Used after a parse failure, since bulletins are occasionally caught
    /// half-written.
    pub fn invalidate(&self, source_id: &str) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.remove(source_id).is_some() {
            tracing::debug!(component = %Component::Cache, source_id, "Invalidated cached bulletin");
        }
    }

    /// Retrieves every distinct id in `source_ids` using at most `workers`
    /// threads. Failures are logged; the memoized error is what the per-city
    /// `fetch` then reports.
    pub fn prefetch<'i>(&self, source_ids: impl IntoIterator<Item = &'i str>, workers: usize) {
        let mut unique: Vec<&str> = source_ids.into_iter().collect();
        unique.sort_unstable();
        unique.dedup();
        if unique.is_empty() {
            return;
        }

        let workers = workers.clamp(1, unique.len());
        let next = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        let i = next.fetch_add(1, Ordering::Relaxed);
                        let Some(id) = unique.get(i) else { break };
                        if let Err(err) = self.fetch(id) {
                            tracing::warn!(
                                component = %Component::Cache,
                                source_id = *id,
                                "Prefetch failed: {}",
                                err
                            );
                        }
                    }
                });
            }
        });
    }

    /// Number of retrievals issued to the underlying source so far.
    pub fn retrievals(&self) -> usize {
        self.retrievals.load(Ordering::SeqCst)
    }

    fn slot(&self, source_id: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(source_id.to_string()).or_default().clone()
    }

}

// ============================================================================
// Tests
// ============================================================================
