use rocket::{http::Status, response::Responder, serde::json::Json};
use serde::Serialize;
use thiserror::Error;

use crate::logging::RequestLog;
use crate::relay::{ErrorCode, SubmissionError};
use crate::voting_system::{ErrorKind, VotingSystemError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    VotingSystem(#[from] VotingSystemError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

/// The JSON body of an error response.
#[derive(Serialize)]
struct ErrorBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<ErrorCode>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    committed: Option<Vec<u64>>,
}

fn kind_status(kind: ErrorKind) -> Status {
    match kind {
        ErrorKind::ElectionNotFound | ErrorKind::CandidateNotFound | ErrorKind::PartyNotFound => {
            Status::NotFound
        }
        ErrorKind::InvalidAddress => Status::BadRequest,
        ErrorKind::Unauthorized | ErrorKind::VoterNotVerified => Status::Forbidden,
        ErrorKind::ElectionNotActive
        | ErrorKind::ElectionAlreadyEnded
        | ErrorKind::AlreadyVoted
        | ErrorKind::InvalidElectionState => Status::Conflict,
        ErrorKind::TransactionTimeout => Status::GatewayTimeout,
        ErrorKind::TransactionFailed | ErrorKind::ContractCallFailed | ErrorKind::Unknown => {
            Status::BadGateway
        }
    }
}

fn code_status(code: ErrorCode) -> Status {
    match code {
        ErrorCode::ElectionNotFound | ErrorCode::CandidateNotFound | ErrorCode::PartyNotFound => {
            Status::NotFound
        }
        ErrorCode::InvalidVoteBatch => Status::BadRequest,
        ErrorCode::VoterNotVerified => Status::Forbidden,
        ErrorCode::ElectionNotStarted
        | ErrorCode::ElectionAlreadyEnded
        | ErrorCode::ElectionNotActive
        | ErrorCode::VoterAlreadyVoted => Status::Conflict,
        ErrorCode::BlockchainVoteTimeout => Status::GatewayTimeout,
        ErrorCode::ElectionStatusCheckFailed
        | ErrorCode::BlockchainVoteSubmissionFailed
        | ErrorCode::Unexpected => Status::BadGateway,
    }
}

impl Error {
    pub fn status(&self) -> Status {
        match self {
            Self::VotingSystem(e) => kind_status(e.kind()),
            Self::Submission(e) => code_status(e.code),
            Self::BadRequest(_) => Status::BadRequest,
            Self::Unauthorized(_) => Status::Unauthorized,
        }
    }

    /// The error kind or relay code, as logged against the request.
    pub fn label(&self) -> String {
        match self {
            Self::VotingSystem(e) => e.kind().to_string(),
            Self::Submission(e) => e.code.to_string(),
            Self::BadRequest(_) => "bad request".to_string(),
            Self::Unauthorized(_) => "unauthorized".to_string(),
        }
    }

    fn into_body(self) -> ErrorBody {
        let message = self.to_string();
        let (kind, code, committed) = match self {
            Self::VotingSystem(e) => (Some(e.kind()), None, None),
            Self::Submission(e) => (None, Some(e.code), Some(e.committed)),
            Self::BadRequest(_) | Self::Unauthorized(_) => (None, None, None),
        };
        ErrorBody {
            kind,
            code,
            message,
            committed,
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let status = self.status();
        debug!("{self}");
        RequestLog::of(req).failed(self.label());
        (status, Json(self.into_body())).respond_to(req)
    }
}
