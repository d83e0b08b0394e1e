use rocket::{
    http::Status,
    request::{FromRequest, Outcome},
    serde::json::Json,
    Request, Route, State,
};
use serde::Deserialize;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ledger::Address;
use crate::logging::RequestLog;
use crate::model::{CandidateId, ElectionId, VoteSelection};
use crate::relay::{SubmissionOutcome, VoteRelay};

pub fn routes() -> Vec<Route> {
    routes![relay_votes]
}

/// Header carrying the shared secret of the application allowed to relay votes.
pub const RELAY_TOKEN_HEADER: &str = "X-Relay-Token";

/// Proof that the request came from the application allowed to relay votes.
pub struct RelayToken;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RelayToken {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let config = match req.rocket().state::<Config>() {
            Some(config) => config,
            None => {
                return Outcome::Error((
                    Status::InternalServerError,
                    Error::Unauthorized("relay token not configured".to_string()),
                ))
            }
        };
        match req.headers().get_one(RELAY_TOKEN_HEADER) {
            Some(token) if token == config.relay_token() => Outcome::Success(RelayToken),
            Some(_) => Outcome::Error((
                Status::Unauthorized,
                Error::Unauthorized("wrong relay token".to_string()),
            )),
            None => Outcome::Error((
                Status::Unauthorized,
                Error::Unauthorized(format!("missing {RELAY_TOKEN_HEADER} header")),
            )),
        }
    }
}

/// One voter's recorded ballot in one election.
#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub voter: Address,
    pub candidate_ids: Vec<CandidateId>,
}

#[post("/elections/<election_id>/votes", data = "<votes>", format = "json")]
async fn relay_votes(
    _token: RelayToken,
    election_id: ElectionId,
    votes: Json<VoteRequest>,
    relay: &State<VoteRelay>,
    log: &RequestLog,
) -> Result<Json<SubmissionOutcome>> {
    let VoteRequest {
        voter,
        candidate_ids,
    } = votes.into_inner();
    log.relaying(voter, election_id, candidate_ids.len());
    let selections: Vec<VoteSelection> = candidate_ids
        .into_iter()
        .map(|candidate_id| VoteSelection {
            election_id,
            candidate_id,
            voter,
        })
        .collect();
    Ok(Json(relay.submit_selections(&selections).await?))
}
