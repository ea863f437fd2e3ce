use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting admission gate for units of concurrent work
///
/// `admit` suspends the caller while `limit` units hold admissions; work is
/// delayed, never dropped. The gate also records how many units were active
/// at once so the bound can be observed.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    limit: usize,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

/// Proof of admission; the slot frees when this is dropped
#[derive(Debug)]
pub struct Admission {
    _permit: OwnedSemaphorePermit,
    active: Arc<AtomicUsize>,
}

impl Drop for Admission {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AdmissionGate {
    /// Creates a gate admitting at most `limit` units (at least one)
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Waits for a free slot
    ///
    /// # Returns
    ///
    /// * `Some(Admission)` - The caller may start one unit of work
    /// * `None` - The gate was closed
    pub async fn admit(&self) -> Option<Admission> {
        let permit = self.semaphore.clone().acquire_owned().await.ok()?;

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_active, Ordering::SeqCst);

        Some(Admission {
            _permit: permit,
            active: self.active.clone(),
        })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Units currently holding an admission
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of units ever active at once
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}
