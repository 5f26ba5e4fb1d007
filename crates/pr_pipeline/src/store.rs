//! Append-only event store seam and the in-memory implementation.
//!
//! Contract:
//! - `append` takes a batch over one or more streams, each with the version the
//!   caller decided against. Any mismatch rejects the whole batch; nothing is written.
//! - `load_all` returns events in append order.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::events::{Event, EventEnvelope};
use crate::StreamId;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("version conflict on {stream}: expected {expected}, found {actual}")]
    Conflict { stream: StreamId, expected: u64, actual: u64 },
    #[error("corrupt event log: {0}")]
    Corrupt(String),
}

/// Events for one stream, decided against `expected_version`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamAppend {
    pub stream: StreamId,
    pub expected_version: u64,
    pub events: Vec<Event>,
}

pub trait EventStore {
    /// Atomically append every stream of the batch; returns the stored envelopes.
    fn append(&mut self, batch: Vec<StreamAppend>) -> Result<Vec<EventEnvelope>, StoreError>;
    fn load_all(&self) -> Result<Vec<EventEnvelope>, StoreError>;
    /// Number of events in `stream` (0 when unknown).
    fn version(&self, stream: &StreamId) -> u64;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InMemoryEventStore {
    log: Vec<EventEnvelope>,
    versions: BTreeMap<StreamId, u64>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a persisted log; sequences must be gap-free per stream.
    pub fn from_log(log: Vec<EventEnvelope>) -> Result<Self, StoreError> {
        let mut versions: BTreeMap<StreamId, u64> = BTreeMap::new();
        for env in &log {
            let v = versions.entry(env.stream.clone()).or_default();
            if env.sequence != *v + 1 {
                return Err(StoreError::Corrupt(format!(
                    "{} jumps from {} to {}",
                    env.stream, v, env.sequence
                )));
            }
            *v = env.sequence;
        }
        Ok(Self { log, versions })
    }

    pub fn log(&self) -> &[EventEnvelope] {
        &self.log
    }

    pub fn into_log(self) -> Vec<EventEnvelope> {
        self.log
    }
}

impl EventStore for InMemoryEventStore {
    fn append(&mut self, batch: Vec<StreamAppend>) -> Result<Vec<EventEnvelope>, StoreError> {
        // Check every stream before writing any.
        let mut planned: BTreeMap<StreamId, u64> = BTreeMap::new();
        for part in &batch {
            let actual = planned
                .get(&part.stream)
                .copied()
                .unwrap_or_else(|| self.version(&part.stream));
            if actual != part.expected_version {
                return Err(StoreError::Conflict {
                    stream: part.stream.clone(),
                    expected: part.expected_version,
                    actual,
                });
            }
            planned.insert(part.stream.clone(), actual + part.events.len() as u64);
        }

        let mut stored = Vec::new();
        for part in batch {
            let v = self.versions.entry(part.stream.clone()).or_default();
            for event in part.events {
                *v += 1;
                let env = EventEnvelope { stream: part.stream.clone(), sequence: *v, event };
                self.log.push(env.clone());
                stored.push(env);
            }
        }
        Ok(stored)
    }

    fn load_all(&self) -> Result<Vec<EventEnvelope>, StoreError> {
        Ok(self.log.clone())
    }

    fn version(&self, stream: &StreamId) -> u64 {
        self.versions.get(stream).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ElectionEvent;
    use crate::ElectionKey;
    use pr_core::variables::ResultPhase;

    fn stream(id: &str) -> StreamId {
        StreamId::Election(ElectionKey::new(id.parse().unwrap(), ResultPhase::Live))
    }

    fn finalized() -> Event {
        Event::Election(ElectionEvent::EndResultFinalized)
    }

    #[test]
    fn conflict_rejects_whole_batch() {
        let mut s = InMemoryEventStore::new();
        s.append(vec![StreamAppend { stream: stream("a"), expected_version: 0, events: vec![finalized()] }])
            .unwrap();
        let err = s
            .append(vec![
                StreamAppend { stream: stream("b"), expected_version: 0, events: vec![finalized()] },
                StreamAppend { stream: stream("a"), expected_version: 0, events: vec![finalized()] },
            ])
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { expected: 0, actual: 1, .. }));
        assert_eq!(s.version(&stream("b")), 0);
        assert_eq!(s.log().len(), 1);
    }

    #[test]
    fn sequences_are_per_stream() {
        let mut s = InMemoryEventStore::new();
        let out = s
            .append(vec![
                StreamAppend { stream: stream("a"), expected_version: 0, events: vec![finalized(), finalized()] },
                StreamAppend { stream: stream("b"), expected_version: 0, events: vec![finalized()] },
            ])
            .unwrap();
        let seqs: Vec<u64> = out.iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 1]);
        let rebuilt = InMemoryEventStore::from_log(s.into_log()).unwrap();
        assert_eq!(rebuilt.version(&stream("a")), 2);
    }

    #[test]
    fn gap_in_log_is_corrupt() {
        let env = EventEnvelope { stream: stream("a"), sequence: 2, event: finalized() };
        assert!(matches!(InMemoryEventStore::from_log(vec![env]), Err(StoreError::Corrupt(_))));
    }
}
