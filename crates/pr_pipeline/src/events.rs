//! Emitted facts. Events carry the computed state they establish so the projection
//! never re-runs an apportionment while replaying.

use serde::{Deserialize, Serialize};

use pr_algo::ranking::ListRanking;
use pr_core::entities::{CountingCircleSnapshot, Election, ElectionUnion};
use pr_core::ids::{CountingCircleId, ElectionId, ListId, UnionId};

use crate::aggregate::{DoubleProportionalState, ListEndResult, MandateDistribution};
use crate::StreamId;

/// Why a mandate distribution or a double proportional result went away.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RevertCause {
    Manual,
    UnionReverted { union_id: UnionId },
    CountingCircleReset { election_id: ElectionId, counting_circle_id: CountingCircleId },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElectionEvent {
    ElectionDefined { election: Election },
    CountingCircleAudited { snapshot: CountingCircleSnapshot },
    CountingCircleReset { counting_circle_id: CountingCircleId },
    MandateDistributionStarted { distribution: MandateDistribution },
    SuperApportionmentLotDecisionApplied {
        number: u32,
        double_proportional: DoubleProportionalState,
        lists: Vec<ListEndResult>,
    },
    SubApportionmentLotDecisionApplied {
        number: u32,
        double_proportional: DoubleProportionalState,
        lists: Vec<ListEndResult>,
    },
    ListLotDecisionApplied { list_id: ListId, ranking: ListRanking },
    ManualListEndResultEntered { list_id: ListId, ranking: ListRanking },
    EndResultFinalized,
    FinalizationReverted,
    /// Clears the distribution and, with it, the finalization.
    MandateDistributionReverted { cause: RevertCause },
    DoubleProportionalResultInvalidated { cause: RevertCause },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnionEvent {
    UnionDefined { union: ElectionUnion },
    MandateDistributionStarted { double_proportional: DoubleProportionalState },
    SuperApportionmentLotDecisionApplied { number: u32, double_proportional: DoubleProportionalState },
    SubApportionmentLotDecisionApplied { number: u32, double_proportional: DoubleProportionalState },
    MandateDistributionReverted { cause: RevertCause },
    DoubleProportionalResultInvalidated { cause: RevertCause },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stream_kind", content = "event", rename_all = "snake_case")]
pub enum Event {
    Election(ElectionEvent),
    Union(UnionEvent),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Election(e) => match e {
                ElectionEvent::ElectionDefined { .. } => "election_defined",
                ElectionEvent::CountingCircleAudited { .. } => "counting_circle_audited",
                ElectionEvent::CountingCircleReset { .. } => "counting_circle_reset",
                ElectionEvent::MandateDistributionStarted { .. } => "mandate_distribution_started",
                ElectionEvent::SuperApportionmentLotDecisionApplied { .. } => "super_apportionment_lot_decision_applied",
                ElectionEvent::SubApportionmentLotDecisionApplied { .. } => "sub_apportionment_lot_decision_applied",
                ElectionEvent::ListLotDecisionApplied { .. } => "list_lot_decision_applied",
                ElectionEvent::ManualListEndResultEntered { .. } => "manual_list_end_result_entered",
                ElectionEvent::EndResultFinalized => "end_result_finalized",
                ElectionEvent::FinalizationReverted => "finalization_reverted",
                ElectionEvent::MandateDistributionReverted { .. } => "mandate_distribution_reverted",
                ElectionEvent::DoubleProportionalResultInvalidated { .. } => "double_proportional_result_invalidated",
            },
            Event::Union(e) => match e {
                UnionEvent::UnionDefined { .. } => "union_defined",
                UnionEvent::MandateDistributionStarted { .. } => "union_mandate_distribution_started",
                UnionEvent::SuperApportionmentLotDecisionApplied { .. } => {
                    "union_super_apportionment_lot_decision_applied"
                }
                UnionEvent::SubApportionmentLotDecisionApplied { .. } => "union_sub_apportionment_lot_decision_applied",
                UnionEvent::MandateDistributionReverted { .. } => "union_mandate_distribution_reverted",
                UnionEvent::DoubleProportionalResultInvalidated { .. } => {
                    "union_double_proportional_result_invalidated"
                }
            },
        }
    }
}

/// An event as stored: per-stream sequence numbers start at 1.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub stream: StreamId,
    pub sequence: u64,
    pub event: Event,
}
