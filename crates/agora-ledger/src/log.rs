use std::sync::Mutex;

use chrono::{DateTime, Utc};

use agora_types::TaskId;

use crate::event::{EventKind, EventRecord, MarketEvent};

#[derive(Debug, Default)]
struct LogState {
    entries: Vec<EventRecord>,
    /// Hash of the newest record ever appended. Survives drains so the
    /// chain stays unbroken across subscriber hand-offs.
    tip: Option<String>,
    drained: u64,
}

/// Append-only log of market events.
///
/// The core appends; an external subscriber drains. Appending never blocks
/// on a consumer being present.
#[derive(Debug, Default)]
pub struct EventLog {
    state: Mutex<LogState>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event, chaining it to the current tip. Returns a copy of
    /// the stored record.
    pub fn append(&self, event: MarketEvent, at: DateTime<Utc>) -> EventRecord {
        let mut state = self.state.lock().expect("event log lock poisoned");
        let record = EventRecord::new(event, at, state.tip.clone());
        state.tip = Some(record.hash.clone());
        state.entries.push(record.clone());
        record
    }

    /// Hand all accumulated records to a subscriber, leaving the log empty
    /// but the chain tip intact.
    pub fn drain(&self) -> Vec<EventRecord> {
        let mut state = self.state.lock().expect("event log lock poisoned");
        state.drained += state.entries.len() as u64;
        std::mem::take(&mut state.entries)
    }

    pub fn records(&self) -> Vec<EventRecord> {
        let state = self.state.lock().expect("event log lock poisoned");
        state.entries.clone()
    }

    pub fn query_by_task(&self, task_id: TaskId) -> Vec<EventRecord> {
        let state = self.state.lock().expect("event log lock poisoned");
        state
            .entries
            .iter()
            .filter(|r| r.event.task_id() == Some(task_id))
            .cloned()
            .collect()
    }

    pub fn query_by_kind(&self, kind: EventKind) -> Vec<EventRecord> {
        let state = self.state.lock().expect("event log lock poisoned");
        state
            .entries
            .iter()
            .filter(|r| r.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn latest_hash(&self) -> Option<String> {
        let state = self.state.lock().expect("event log lock poisoned");
        state.tip.clone()
    }

    pub fn len(&self) -> usize {
        let state = self.state.lock().expect("event log lock poisoned");
        state.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of records handed out over the log's lifetime.
    pub fn drained_count(&self) -> u64 {
        let state = self.state.lock().expect("event log lock poisoned");
        state.drained
    }

    /// Verify every retained record's own hash and the links between
    /// consecutive records.
    pub fn verify_integrity(&self) -> bool {
        let state = self.state.lock().expect("event log lock poisoned");
        for (i, record) in state.entries.iter().enumerate() {
            if !record.verify_hash() {
                return false;
            }
            if i > 0 && record.previous_hash.as_ref() != Some(&state.entries[i - 1].hash) {
                return false;
            }
        }
        true
    }
}
