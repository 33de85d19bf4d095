use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Board activity counters for monitoring
#[derive(Clone)]
pub struct Metrics {
    pub users_registered: Arc<AtomicUsize>,
    pub logins_succeeded: Arc<AtomicUsize>,
    pub logins_failed: Arc<AtomicUsize>,
    pub topics_created: Arc<AtomicUsize>,
    pub topics_updated: Arc<AtomicUsize>,
    pub topics_deleted: Arc<AtomicUsize>,
    pub files_uploaded: Arc<AtomicUsize>,
    pub bytes_uploaded: Arc<AtomicU64>,
    pub resets_requested: Arc<AtomicUsize>,
    pub resets_completed: Arc<AtomicUsize>,
    pub accounts_deleted: Arc<AtomicUsize>,
    pub start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            users_registered: Arc::new(AtomicUsize::new(0)),
            logins_succeeded: Arc::new(AtomicUsize::new(0)),
            logins_failed: Arc::new(AtomicUsize::new(0)),
            topics_created: Arc::new(AtomicUsize::new(0)),
            topics_updated: Arc::new(AtomicUsize::new(0)),
            topics_deleted: Arc::new(AtomicUsize::new(0)),
            files_uploaded: Arc::new(AtomicUsize::new(0)),
            bytes_uploaded: Arc::new(AtomicU64::new(0)),
            resets_requested: Arc::new(AtomicUsize::new(0)),
            resets_completed: Arc::new(AtomicUsize::new(0)),
            accounts_deleted: Arc::new(AtomicUsize::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn inc_users_registered(&self) {
        self.users_registered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_logins(&self, succeeded: bool) {
        if succeeded {
            self.logins_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.logins_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn inc_topics_created(&self) {
        self.topics_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_topics_updated(&self) {
        self.topics_updated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_topics_deleted(&self) {
        self.topics_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_upload(&self, bytes: u64) {
        self.files_uploaded.fetch_add(1, Ordering::Relaxed);
        self.bytes_uploaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn inc_resets_requested(&self) {
        self.resets_requested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_resets_completed(&self) {
        self.resets_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_accounts_deleted(&self) {
        self.accounts_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            users_registered: self.users_registered.load(Ordering::Relaxed),
            logins_succeeded: self.logins_succeeded.load(Ordering::Relaxed),
            logins_failed: self.logins_failed.load(Ordering::Relaxed),
            topics_created: self.topics_created.load(Ordering::Relaxed),
            topics_updated: self.topics_updated.load(Ordering::Relaxed),
            topics_deleted: self.topics_deleted.load(Ordering::Relaxed),
            files_uploaded: self.files_uploaded.load(Ordering::Relaxed),
            bytes_uploaded: self.bytes_uploaded.load(Ordering::Relaxed),
            resets_requested: self.resets_requested.load(Ordering::Relaxed),
            resets_completed: self.resets_completed.load(Ordering::Relaxed),
            accounts_deleted: self.accounts_deleted.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub users_registered: usize,
    pub logins_succeeded: usize,
    pub logins_failed: usize,
    pub topics_created: usize,
    pub topics_updated: usize,
    pub topics_deleted: usize,
    pub files_uploaded: usize,
    pub bytes_uploaded: u64,
    pub resets_requested: usize,
    pub resets_completed: usize,
    pub accounts_deleted: usize,
    pub uptime_seconds: u64,
}
