use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use super::{CandidateId, ElectionId};
use crate::ledger::Address;

/// The logical state of an election. Transitions only ever move forwards:
/// `Pending` to `Active` to `Ended`.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum ElectionStatus {
    Pending = 0,
    Active = 1,
    Ended = 2,
}

impl ElectionStatus {
    /// Derive the status from the two flags the election contract exposes.
    /// Returns `None` for an ended election that never started, which a
    /// correct contract cannot produce.
    pub fn from_flags(started: bool, ended: bool) -> Option<Self> {
        match (started, ended) {
            (false, false) => Some(Self::Pending),
            (true, false) => Some(Self::Active),
            (true, true) => Some(Self::Ended),
            (false, true) => None,
        }
    }
}

/// An election, as read back from its contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionRecord {
    pub id: ElectionId,
    /// The election's own contract.
    pub address: Address,
    pub name: String,
    pub description: String,
    pub cid: String,
    /// Unset until the election is scheduled with `startElection`.
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: ElectionStatus,
}

/// Details for creating an election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionSpec {
    pub name: String,
    pub description: String,
    pub cid: String,
}

/// Votes received by one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateTally {
    pub candidate_id: CandidateId,
    /// The party the votes were cast through.
    pub party: Address,
    pub vote_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionResults {
    pub election_id: ElectionId,
    pub tallies: Vec<CandidateTally>,
}

impl ElectionResults {
    pub fn total_votes(&self) -> u64 {
        self.tallies.iter().map(|tally| tally.vote_count).sum()
    }

    pub fn votes_for(&self, candidate_id: CandidateId) -> Option<u64> {
        self.tallies
            .iter()
            .find(|tally| tally.candidate_id == candidate_id)
            .map(|tally| tally.vote_count)
    }
}
