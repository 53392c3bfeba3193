use benchview_core::{merge, resolved_events, EventLedger, JobStatus, MergeReport, TimelineEvent};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub ledger: EventLedger,
    pub events: Vec<TimelineEvent>,
    pub job_status: JobStatus,
    pub captured_at: Instant,
}

impl CacheEntry {
    fn build(ledger: EventLedger, job_status: JobStatus, captured_at: Instant) -> Self {
        let events = resolved_events(&ledger, &job_status);
        Self {
            ledger,
            events,
            job_status,
            captured_at,
        }
    }

    /// Terminal jobs never go stale.
    pub fn is_fresh_at(&self, ttl: Duration, now: Instant) -> bool {
        self.job_status.is_terminal() || now.saturating_duration_since(self.captured_at) <= ttl
    }
}

#[derive(Debug, Clone)]
pub struct TimelineCache {
    entries: Arc<RwLock<HashMap<String, Arc<CacheEntry>>>>,
    pins: Arc<Mutex<HashMap<String, usize>>>,
    ttl: Duration,
}

/// Keeps a job's entry out of pruning and eviction while a view is mounted on it.
#[derive(Debug)]
pub struct CachePin {
    pins: Arc<Mutex<HashMap<String, usize>>>,
    job_id: String,
}

impl Drop for CachePin {
    fn drop(&mut self) {
        let mut pins = self.pins.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = pins.get_mut(&self.job_id) {
            *count -= 1;
            if *count == 0 {
                pins.remove(&self.job_id);
            }
        }
    }
}

impl Default for TimelineCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl TimelineCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            pins: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<CacheEntry>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<CacheEntry>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn pins(&self) -> MutexGuard<'_, HashMap<String, usize>> {
        self.pins.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn pin(&self, job_id: &str) -> CachePin {
        *self.pins().entry(job_id.to_string()).or_insert(0) += 1;
        CachePin {
            pins: Arc::clone(&self.pins),
            job_id: job_id.to_string(),
        }
    }

    pub fn is_pinned(&self, job_id: &str) -> bool {
        self.pins().contains_key(job_id)
    }

    pub fn get(&self, job_id: &str) -> Option<Arc<CacheEntry>> {
        self.read().get(job_id).cloned()
    }

    pub fn get_fresh(&self, job_id: &str) -> Option<Arc<CacheEntry>> {
        self.get_fresh_at(job_id, Instant::now())
    }

    pub fn get_fresh_at(&self, job_id: &str, now: Instant) -> Option<Arc<CacheEntry>> {
        self.get(job_id)
            .filter(|entry| entry.is_fresh_at(self.ttl, now))
    }

    /// Merges against the stored ledger under the write lock and swaps in a new entry.
    pub fn merge_into<I>(
        &self,
        job_id: &str,
        batch: I,
        job_status: &JobStatus,
    ) -> (Arc<CacheEntry>, MergeReport)
    where
        I: IntoIterator<Item = TimelineEvent>,
    {
        let mut entries = self.write();
        let (ledger, report) = match entries.get(job_id) {
            Some(current) => merge(&current.ledger, batch),
            None => merge(&EventLedger::new(), batch),
        };
        let entry = Arc::new(CacheEntry::build(
            ledger,
            job_status.clone(),
            Instant::now(),
        ));
        entries.insert(job_id.to_string(), Arc::clone(&entry));
        (entry, report)
    }

    /// Re-applies the status override after a job status change; keeps the capture instant.
    pub fn restatus(&self, job_id: &str, job_status: &JobStatus) -> Option<Arc<CacheEntry>> {
        let mut entries = self.write();
        let current = entries.get(job_id)?;
        if current.job_status == *job_status {
            return Some(Arc::clone(current));
        }
        let entry = Arc::new(CacheEntry::build(
            current.ledger.clone(),
            job_status.clone(),
            current.captured_at,
        ));
        entries.insert(job_id.to_string(), Arc::clone(&entry));
        Some(entry)
    }

    pub fn evict_if_live(&self, job_id: &str) -> bool {
        let mut entries = self.write();
        if self.is_pinned(job_id) {
            return false;
        }
        match entries.get(job_id) {
            Some(entry) if !entry.job_status.is_terminal() => {
                entries.remove(job_id);
                true
            }
            _ => false,
        }
    }

    pub fn prune_expired(&self) -> usize {
        self.prune_expired_at(Instant::now())
    }

    /// Drops stale non-terminal entries; pinned jobs are kept whatever their age.
    pub fn prune_expired_at(&self, now: Instant) -> usize {
        let mut entries = self.write();
        let pins = self.pins();
        let before = entries.len();
        entries.retain(|job_id, entry| {
            pins.contains_key(job_id) || entry.is_fresh_at(self.ttl, now)
        });
        before - entries.len()
    }

    pub fn reset(&self) {
        self.write().clear();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
