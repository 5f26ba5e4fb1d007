//! Read model rebuilt from the event log.
//!
//! Contract:
//! - `apply` is idempotent: an envelope at or below the stream's applied sequence is
//!   ignored, so redelivery and double replay leave the state unchanged.
//! - A sequence gap or an event on the wrong kind of stream is a corrupt log.

use std::collections::BTreeMap;

use crate::aggregate::ElectionEndResult;
use crate::events::{ElectionEvent, Event, EventEnvelope, UnionEvent};
use crate::store::{StoreError, StreamAppend};
use crate::union::UnionEndResult;
use crate::{ElectionKey, EndResultError, StreamId, UnionKey};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EndResultProjection {
    elections: BTreeMap<ElectionKey, ElectionEndResult>,
    unions: BTreeMap<UnionKey, UnionEndResult>,
    versions: BTreeMap<StreamId, u64>,
}

impl EndResultProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rebuild<'a>(events: impl IntoIterator<Item = &'a EventEnvelope>) -> Result<Self, StoreError> {
        let mut p = Self::new();
        for env in events {
            p.apply(env)?;
        }
        Ok(p)
    }

    /// Returns `false` when the envelope was already applied.
    pub fn apply(&mut self, env: &EventEnvelope) -> Result<bool, StoreError> {
        let applied = self.version(&env.stream);
        if env.sequence <= applied {
            return Ok(false);
        }
        if env.sequence != applied + 1 {
            return Err(StoreError::Corrupt(format!(
                "{} expects sequence {}, got {}",
                env.stream,
                applied + 1,
                env.sequence
            )));
        }

        match (&env.stream, &env.event) {
            (StreamId::Election(key), Event::Election(ElectionEvent::ElectionDefined { election })) => {
                self.elections
                    .insert(key.clone(), ElectionEndResult::defined(key.clone(), election.clone()));
            }
            (StreamId::Election(key), Event::Election(event)) => self
                .elections
                .get_mut(key)
                .ok_or_else(|| StoreError::Corrupt(format!("{} used before its definition", env.stream)))?
                .apply(event),
            (StreamId::Union(key), Event::Union(UnionEvent::UnionDefined { union })) => {
                self.unions.insert(key.clone(), UnionEndResult::defined(key.clone(), union.clone()));
            }
            (StreamId::Union(key), Event::Union(event)) => self
                .unions
                .get_mut(key)
                .ok_or_else(|| StoreError::Corrupt(format!("{} used before its definition", env.stream)))?
                .apply(event),
            _ => {
                return Err(StoreError::Corrupt(format!(
                    "{} cannot carry {}",
                    env.stream,
                    env.event.name()
                )))
            }
        }
        self.versions.insert(env.stream.clone(), env.sequence);
        Ok(true)
    }

    /// State after `batch` would be appended, without touching `self`.
    pub fn preview(&self, batch: &[StreamAppend]) -> Result<Self, StoreError> {
        let mut next = self.clone();
        for part in batch {
            for event in &part.events {
                let env = EventEnvelope {
                    stream: part.stream.clone(),
                    sequence: next.version(&part.stream) + 1,
                    event: event.clone(),
                };
                next.apply(&env)?;
            }
        }
        Ok(next)
    }

    pub fn version(&self, stream: &StreamId) -> u64 {
        self.versions.get(stream).copied().unwrap_or(0)
    }

    pub fn election(&self, key: &ElectionKey) -> Option<&ElectionEndResult> {
        self.elections.get(key)
    }

    pub fn require_election(&self, key: &ElectionKey) -> Result<&ElectionEndResult, EndResultError> {
        self.election(key).ok_or_else(|| EndResultError::NotFound(format!("election {key}")))
    }

    pub fn union(&self, key: &UnionKey) -> Option<&UnionEndResult> {
        self.unions.get(key)
    }

    pub fn require_union(&self, key: &UnionKey) -> Result<&UnionEndResult, EndResultError> {
        self.union(key).ok_or_else(|| EndResultError::NotFound(format!("union {key}")))
    }

    /// The union an election belongs to, in the same phase.
    pub fn union_of(&self, key: &ElectionKey) -> Option<&UnionEndResult> {
        let union_id = self.election(key)?.election.union_id.clone()?;
        self.union(&UnionKey::new(union_id, key.phase))
    }
}

/// Events of one command, grouped per stream with the versions they were decided on.
pub struct Batch<'p> {
    projection: &'p EndResultProjection,
    parts: Vec<StreamAppend>,
}

impl<'p> Batch<'p> {
    pub fn new(projection: &'p EndResultProjection) -> Self {
        Self { projection, parts: Vec::new() }
    }

    pub fn push(&mut self, stream: StreamId, event: Event) {
        if let Some(part) = self.parts.iter_mut().find(|p| p.stream == stream) {
            part.events.push(event);
            return;
        }
        let expected_version = self.projection.version(&stream);
        self.parts.push(StreamAppend { stream, expected_version, events: vec![event] });
    }

    pub fn election(&mut self, key: &ElectionKey, event: ElectionEvent) {
        self.push(StreamId::Election(key.clone()), Event::Election(event));
    }

    pub fn union(&mut self, key: &UnionKey, event: UnionEvent) {
        self.push(StreamId::Union(key.clone()), Event::Union(event));
    }

    pub fn into_parts(self) -> Vec<StreamAppend> {
        self.parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pr_core::entities::Election;
    use pr_core::variables::{MandateAlgorithm, QuorumRule, ResultPhase};

    fn key() -> ElectionKey {
        ElectionKey::new("e".parse().unwrap(), ResultPhase::Testing)
    }

    fn defined() -> EventEnvelope {
        EventEnvelope {
            stream: StreamId::Election(key()),
            sequence: 1,
            event: Event::Election(ElectionEvent::ElectionDefined {
                election: Election {
                    id: "e".parse().unwrap(),
                    description: String::new(),
                    number_of_mandates: 1,
                    mandate_algorithm: MandateAlgorithm::HagenbachBischoff,
                    quorum: QuorumRule::default(),
                    total_counting_circles: 1,
                    manual_end_result_required: false,
                    union_id: None,
                    lists: vec![],
                },
            }),
        }
    }

    #[test]
    fn redelivery_is_ignored() {
        let mut p = EndResultProjection::new();
        assert!(p.apply(&defined()).unwrap());
        let once = p.clone();
        assert!(!p.apply(&defined()).unwrap());
        assert_eq!(p, once);
    }

    #[test]
    fn gap_and_wrong_stream_are_corrupt() {
        let mut p = EndResultProjection::new();
        let mut gap = defined();
        gap.sequence = 2;
        assert!(matches!(p.apply(&gap), Err(StoreError::Corrupt(_))));

        let mut wrong = defined();
        wrong.stream = StreamId::Union(UnionKey::new("u".parse().unwrap(), ResultPhase::Testing));
        assert!(matches!(p.apply(&wrong), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn event_before_definition_is_corrupt() {
        let mut p = EndResultProjection::new();
        let env = EventEnvelope {
            stream: StreamId::Election(key()),
            sequence: 1,
            event: Event::Election(ElectionEvent::EndResultFinalized),
        };
        assert!(matches!(p.apply(&env), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn batch_groups_per_stream_with_versions() {
        let mut p = EndResultProjection::new();
        p.apply(&defined()).unwrap();
        let mut b = Batch::new(&p);
        b.election(&key(), ElectionEvent::EndResultFinalized);
        b.election(&key(), ElectionEvent::FinalizationReverted);
        let parts = b.into_parts();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].expected_version, 1);
        assert_eq!(parts[0].events.len(), 2);
        let next = p.preview(&parts).unwrap();
        assert!(!next.election(&key()).unwrap().finalized);
        assert_eq!(next.version(&StreamId::Election(key())), 3);
    }
}
