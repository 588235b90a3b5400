//! Checkpoint scheduler (§4.3, §9 REDESIGN FLAGS).
//!
//! Re-expressed from the source material's one-sleeping-task-per-signal
//! coroutine pattern into a single priority queue keyed on `due_at`, bounding
//! task count to O(checkpoints due) rather than O(in_progress_signals × 6).

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::types::{CheckpointLabel, SignalId};

#[derive(Debug, Clone, PartialEq, Eq)]
struct DueEntry {
    due_at: DateTime<Utc>,
    signal_id: SignalId,
    label: CheckpointLabel,
}

impl Ord for DueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.due_at
            .cmp(&other.due_at)
            .then_with(|| self.signal_id.cmp(&other.signal_id))
            .then_with(|| self.label.cmp(&other.label))
    }
}

impl PartialOrd for DueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of armed checkpoints, ordered by `due_at`.
pub struct CheckpointScheduler {
    heap: Mutex<BinaryHeap<Reverse<DueEntry>>>,
}

impl CheckpointScheduler {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
        }
    }

    /// Arm a single checkpoint.
    pub fn arm(&self, signal_id: SignalId, label: CheckpointLabel, due_at: DateTime<Utc>) {
        self.heap.lock().push(Reverse(DueEntry { due_at, signal_id, label }));
    }

    /// Arm all six checkpoints for a newly registered signal (§4.3
    /// registration).
    pub fn arm_all(&self, signal_id: &SignalId, created_at: DateTime<Utc>) {
        for label in CheckpointLabel::ALL {
            let due_at = created_at + chrono::Duration::seconds(label.offset_secs());
            self.arm(signal_id.clone(), label, due_at);
        }
    }

    /// Pop and return every entry whose `due_at <= now` (§8: "a checkpoint
    /// due exactly at the current clock tick realizes on this tick").
    pub fn drain_due(&self, now: DateTime<Utc>) -> Vec<(SignalId, CheckpointLabel)> {
        let mut heap = self.heap.lock();
        let mut due = Vec::new();
        while let Some(Reverse(entry)) = heap.peek() {
            if entry.due_at <= now {
                let Reverse(entry) = heap.pop().unwrap();
                due.push((entry.signal_id, entry.label));
            } else {
                break;
            }
        }
        due
    }

    /// Re-arm a checkpoint for retry after a failed realization attempt
    /// (§4.3: retried on the next scheduler tick, up to the configured
    /// attempt cap).
    pub fn re_arm_for_retry(&self, signal_id: SignalId, label: CheckpointLabel, retry_at: DateTime<Utc>) {
        self.arm(signal_id, label, retry_at);
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }
}

impl Default for CheckpointScheduler {
    fn default() -> Self {
        Self::new()
    }
}
