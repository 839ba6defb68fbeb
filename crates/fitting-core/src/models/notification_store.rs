use std::collections::VecDeque;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

/// A transient, user-visible message (shown once, then dismissed).
#[derive(Clone, Debug)]
pub struct Notification {
    pub created_at: SystemTime,
    pub level: NotificationLevel,
    pub message: String,
}

/// Bounded FIFO of notifications waiting to be shown.
///
/// Cloning hands out another handle to the same queue.
#[derive(Clone)]
pub struct NotificationStore {
    entries: Arc<Mutex<VecDeque<Notification>>>,
    max_entries: usize,
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new(50)
    }
}

impl NotificationStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::new())),
            max_entries,
        }
    }

    pub fn push(&self, level: NotificationLevel, message: impl Into<String>) {
        let mut entries = self.entries.lock();
        entries.push_back(Notification {
            created_at: SystemTime::now(),
            level,
            message: message.into(),
        });

        // FIFO eviction when exceeding max
        while entries.len() > self.max_entries {
            entries.pop_front();
        }
    }

    /// Take every pending notification, oldest first.
    pub fn drain(&self) -> Vec<Notification> {
        self.entries.lock().drain(..).collect()
    }

    pub fn error_count(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|n| n.level == NotificationLevel::Error)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
