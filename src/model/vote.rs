use serde::{Deserialize, Serialize};

use super::{CandidateId, ElectionId};
use crate::ledger::Address;
use crate::voting_system::ErrorKind;

/// One ballot line from an already durable vote record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteSelection {
    pub election_id: ElectionId,
    pub candidate_id: CandidateId,
    pub voter: Address,
}

/// Selections for exactly one voter in exactly one election, in ballot order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteBatch {
    election_id: ElectionId,
    voter: Address,
    candidate_ids: Vec<CandidateId>,
}

impl VoteBatch {
    /// Group selections into a batch. Returns `None` if the selections are
    /// empty or span more than one voter or election.
    pub fn new(selections: &[VoteSelection]) -> Option<Self> {
        let first = selections.first()?;
        selections
            .iter()
            .all(|s| s.election_id == first.election_id && s.voter == first.voter)
            .then(|| Self {
                election_id: first.election_id,
                voter: first.voter,
                candidate_ids: selections.iter().map(|s| s.candidate_id).collect(),
            })
    }

    pub fn election_id(&self) -> ElectionId {
        self.election_id
    }

    pub fn voter(&self) -> Address {
        self.voter
    }

    pub fn candidate_ids(&self) -> &[CandidateId] {
        &self.candidate_ids
    }
}

/// What happened to a single selection on the ledger.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "kind")]
pub enum VoteSubmissionResult {
    Submitted,
    /// The ledger already holds this voter's vote; nothing was changed.
    SkippedAlreadyVoted,
    Failed(ErrorKind),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectionReport {
    pub candidate_id: CandidateId,
    pub result: VoteSubmissionResult,
}
