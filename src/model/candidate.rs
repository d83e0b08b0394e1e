use serde::{Deserialize, Serialize};

use super::{CandidateId, PartyId};

/// A candidate as stored in the candidate registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub id: CandidateId,
    pub name: String,
    pub position: String,
    /// Content identifier of off-ledger metadata.
    pub cid: String,
    pub party_id: Option<PartyId>,
}

/// Details for registering or updating a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSpec {
    pub name: String,
    pub position: String,
    pub cid: String,
    #[serde(default)]
    pub party_id: Option<PartyId>,
}
