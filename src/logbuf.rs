use std::collections::VecDeque;

use tokio::sync::Mutex;

use crate::types::{LogEntry, LogStatus};

/// Default bound of the log buffer.
pub const MAX_LOGS: usize = 1_000;

/// Bounded, insertion-ordered store of recent inbound events.
///
/// Appending past the bound evicts the oldest entries. Entries are never
/// rewritten, except for the forward status filled in by the worker that
/// handles the same event.
#[derive(Debug)]
pub struct LogBuffer {
    inner: Mutex<LogBufferInner>,
    max_logs: usize,
}

#[derive(Debug)]
struct LogBufferInner {
    entries: VecDeque<LogEntry>,
    next_id: u64,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(MAX_LOGS)
    }
}

impl LogBuffer {
    pub fn new(max_logs: usize) -> Self {
        Self {
            inner: Mutex::new(LogBufferInner {
                entries: VecDeque::new(),
                next_id: 1,
            }),
            max_logs,
        }
    }

    pub fn max_logs(&self) -> usize {
        self.max_logs
    }

    /// Append an entry, assigning it a fresh id. Returns that id.
    pub async fn append(&self, mut entry: LogEntry) -> u64 {
        let mut guard = self.inner.lock().await;
        let id = guard.next_id;
        guard.next_id += 1;
        entry.id = id;

        guard.entries.push_back(entry);
        while guard.entries.len() > self.max_logs {
            guard.entries.pop_front();
        }
        id
    }

    /// The last `min(count, max_logs, len)` entries, oldest first.
    pub async fn recent(&self, count: usize) -> Vec<LogEntry> {
        let guard = self.inner.lock().await;
        let len = guard.entries.len();
        let take = count.min(self.max_logs).min(len);
        guard.entries.iter().skip(len - take).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }

    /// Fill in the forward status of an entry.
    ///
    /// Returns `false` when the entry has already been evicted.
    pub async fn record_outcome(&self, id: u64, status: LogStatus, error: Option<String>) -> bool {
        let mut guard = self.inner.lock().await;
        // Ids are assigned under the lock, so the deque stays sorted by id.
        let Ok(index) = guard.entries.binary_search_by_key(&id, |entry| entry.id) else {
            return false;
        };
        let entry = &mut guard.entries[index];
        entry.status = Some(status);
        entry.error = error;
        true
    }
}
