use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::types::{DataSource, Dataset};

// ---------------------------------------------------------------------------
// DatasetStore
// ---------------------------------------------------------------------------

/// Holds the dataset the API reads from.
///
/// Readers take an `Arc<Dataset>` snapshot and never see a half-built table.
/// Writers first reserve a generation with `begin_refresh`, build off to the
/// side, then `publish`. A publish older than the newest one already
/// accepted is dropped, so the last refresh started wins.
pub struct DatasetStore {
    current: RwLock<Arc<Dataset>>,
    /// Highest generation handed out by `begin_refresh`.
    started: AtomicU64,
    /// Generation of the dataset in `current` (0 = initial empty dataset).
    published: AtomicU64,
}

impl DatasetStore {
    pub fn new(source: DataSource) -> Arc<Self> {
        Arc::new(Self {
            current: RwLock::new(Arc::new(Dataset::empty(source))),
            started: AtomicU64::new(0),
            published: AtomicU64::new(0),
        })
    }

    /// Cheap snapshot of the current dataset.
    pub fn snapshot(&self) -> Arc<Dataset> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Reserve the next generation number for a refresh about to start.
    pub fn begin_refresh(&self) -> u64 {
        self.started.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Install `dataset` unless a newer generation has already been published.
    /// Returns whether it was installed.
    pub fn publish(&self, generation: u64, dataset: Dataset) -> bool {
        let mut guard = match self.current.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if generation < self.published.load(Ordering::SeqCst) {
            return false;
        }
        *guard = Arc::new(dataset);
        self.published.store(generation, Ordering::SeqCst);
        true
    }

    pub fn published_generation(&self) -> u64 {
        self.published.load(Ordering::SeqCst)
    }

    /// True while the newest started refresh has not published yet.
    pub fn refresh_pending(&self) -> bool {
        self.started.load(Ordering::SeqCst) > self.published.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset_with(failed_series: usize) -> Dataset {
        Dataset {
            failed_series,
            ..Dataset::empty(DataSource::Synthetic)
        }
    }

    #[test]
    fn starts_empty() {
        let store = DatasetStore::new(DataSource::Live);
        let snap = store.snapshot();
        assert_eq!(snap.source, DataSource::Live);
        assert!(snap.protocols.is_empty());
        assert_eq!(store.published_generation(), 0);
        assert!(!store.refresh_pending());
    }

    #[test]
    fn publish_replaces_whole_dataset() {
        let store = DatasetStore::new(DataSource::Synthetic);
        let before = store.snapshot();
        let g = store.begin_refresh();
        assert!(store.refresh_pending());
        assert!(store.publish(g, dataset_with(3)));
        assert_eq!(store.snapshot().failed_series, 3);
        // old snapshot is untouched
        assert_eq!(before.failed_series, 0);
        assert!(!store.refresh_pending());
    }

    #[test]
    fn stale_generation_is_rejected() {
        let store = DatasetStore::new(DataSource::Synthetic);
        let older = store.begin_refresh();
        let newer = store.begin_refresh();
        assert!(store.publish(newer, dataset_with(2)));
        assert!(!store.publish(older, dataset_with(1)));
        assert_eq!(store.snapshot().failed_series, 2);
        assert_eq!(store.published_generation(), newer);
    }

    #[test]
    fn older_generation_may_land_before_newer() {
        let store = DatasetStore::new(DataSource::Synthetic);
        let older = store.begin_refresh();
        let newer = store.begin_refresh();
        assert!(store.publish(older, dataset_with(1)));
        assert!(store.refresh_pending());
        assert!(store.publish(newer, dataset_with(2)));
        assert_eq!(store.snapshot().failed_series, 2);
    }
}
