pub use candidate::{CandidateRecord, CandidateSpec};
pub use contracts::ContractAddressBundle;
pub use election::{CandidateTally, ElectionRecord, ElectionResults, ElectionSpec, ElectionStatus};
pub use party::{PartyRecord, PartySpec};
pub use vote::{SelectionReport, VoteBatch, VoteSelection, VoteSubmissionResult};

mod candidate;
mod contracts;
mod election;
mod party;
mod vote;

/// Election IDs are assigned by the voting system contract, starting at 1.
pub type ElectionId = u64;
/// Candidate IDs are assigned by the candidate registry, starting at 1.
pub type CandidateId = u64;
/// Party IDs are assigned by the party registry, starting at 1. Zero means "no party".
pub type PartyId = u64;
