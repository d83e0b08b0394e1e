use std::sync::Arc;

use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::ledger::Address;
use crate::model::{
    CandidateId, CandidateRecord, ContractAddressBundle, ElectionId, ElectionRecord,
    ElectionResults, ElectionStatus, PartyId, PartyRecord,
};
use crate::voting_system::VotingSystem;

pub fn routes() -> Vec<Route> {
    routes![
        contracts,
        election,
        election_status,
        election_results,
        voter_has_voted,
        candidate,
        party,
    ]
}

#[get("/contracts")]
async fn contracts(voting_system: &State<Arc<VotingSystem>>) -> Json<ContractAddressBundle> {
    Json(*voting_system.contracts())
}

#[get("/elections/<election_id>")]
async fn election(
    election_id: ElectionId,
    voting_system: &State<Arc<VotingSystem>>,
) -> Result<Json<ElectionRecord>> {
    Ok(Json(voting_system.get_election(election_id).await?))
}

#[get("/elections/<election_id>/status")]
async fn election_status(
    election_id: ElectionId,
    voting_system: &State<Arc<VotingSystem>>,
) -> Result<Json<ElectionStatus>> {
    Ok(Json(voting_system.get_election_status(election_id).await?))
}

#[get("/elections/<election_id>/results")]
async fn election_results(
    election_id: ElectionId,
    voting_system: &State<Arc<VotingSystem>>,
) -> Result<Json<ElectionResults>> {
    Ok(Json(voting_system.get_election_results(election_id).await?))
}

#[get("/elections/<election_id>/voters/<voter>/voted")]
async fn voter_has_voted(
    election_id: ElectionId,
    voter: Address,
    voting_system: &State<Arc<VotingSystem>>,
) -> Result<Json<bool>> {
    Ok(Json(voting_system.has_voted(election_id, voter).await?))
}

#[get("/candidates/<candidate_id>")]
async fn candidate(
    candidate_id: CandidateId,
    voting_system: &State<Arc<VotingSystem>>,
) -> Result<Json<CandidateRecord>> {
    Ok(Json(voting_system.get_candidate(candidate_id).await?))
}

#[get("/parties/<party_id>")]
async fn party(
    party_id: PartyId,
    voting_system: &State<Arc<VotingSystem>>,
) -> Result<Json<PartyRecord>> {
    Ok(Json(voting_system.get_party(party_id).await?))
}
