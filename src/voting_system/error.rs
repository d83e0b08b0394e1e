use std::fmt::{Display, Formatter};

use serde::Serialize;
use thiserror::Error;

use crate::ledger::{primitives::to_hex, Function, LedgerError, ParamType};

/// Every way a voting system operation can fail.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    InvalidAddress,
    Unauthorized,
    TransactionFailed,
    ContractCallFailed,
    VoterNotVerified,
    ElectionNotFound,
    CandidateNotFound,
    PartyNotFound,
    ElectionNotActive,
    ElectionAlreadyEnded,
    AlreadyVoted,
    InvalidElectionState,
    /// The transaction was broadcast but not confirmed in time; it may still land.
    TransactionTimeout,
    Unknown,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {detail}")]
pub struct VotingSystemError {
    kind: ErrorKind,
    detail: String,
}

impl VotingSystemError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }
}

pub type Result<T> = std::result::Result<T, VotingSystemError>;

/// Custom errors declared by the voting contracts, identified on the wire by
/// the selector of their (argument-less) signature.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ContractError {
    NotAdmin,
    InvalidAddress,
    VoterAlreadyInRegistry,
    EmptyName,
    InvalidCandidateId,
    InvalidPartyId,
    InvalidElectionId,
    AlreadyVoted,
    ElectionAlreadyStarted,
    ElectionNotEnded,
    ElectionNotStarted,
    EndTimeBeforeStartTime,
    ErrorElectionEnded,
    InvalidCandidate,
    InvalidPartyAddress,
    NotWithinElectionPeriod,
    PartyNotParticipating,
    StartTimeNotInFuture,
    VoterAlreadyRegisteredForElection,
    VoterNotInRegistry,
    VoterNotRegisteredForElection,
}

impl ContractError {
    pub const ALL: [ContractError; 21] = [
        Self::NotAdmin,
        Self::InvalidAddress,
        Self::VoterAlreadyInRegistry,
        Self::EmptyName,
        Self::InvalidCandidateId,
        Self::InvalidPartyId,
        Self::InvalidElectionId,
        Self::AlreadyVoted,
        Self::ElectionAlreadyStarted,
        Self::ElectionNotEnded,
        Self::ElectionNotStarted,
        Self::EndTimeBeforeStartTime,
        Self::ErrorElectionEnded,
        Self::InvalidCandidate,
        Self::InvalidPartyAddress,
        Self::NotWithinElectionPeriod,
        Self::PartyNotParticipating,
        Self::StartTimeNotInFuture,
        Self::VoterAlreadyRegisteredForElection,
        Self::VoterNotInRegistry,
        Self::VoterNotRegisteredForElection,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::NotAdmin => "NotAdmin",
            Self::InvalidAddress => "InvalidAddress",
            Self::VoterAlreadyInRegistry => "VoterAlreadyInRegistry",
            Self::EmptyName => "EmptyName",
            Self::InvalidCandidateId => "InvalidCandidateId",
            Self::InvalidPartyId => "InvalidPartyId",
            Self::InvalidElectionId => "InvalidElectionId",
            Self::AlreadyVoted => "AlreadyVoted",
            Self::ElectionAlreadyStarted => "ElectionAlreadyStarted",
            Self::ElectionNotEnded => "ElectionNotEnded",
            Self::ElectionNotStarted => "ElectionNotStarted",
            Self::EndTimeBeforeStartTime => "EndTimeBeforeStartTime",
            Self::ErrorElectionEnded => "ErrorElectionEnded",
            Self::InvalidCandidate => "InvalidCandidate",
            Self::InvalidPartyAddress => "InvalidPartyAddress",
            Self::NotWithinElectionPeriod => "NotWithinElectionPeriod",
            Self::PartyNotParticipating => "PartyNotParticipating",
            Self::StartTimeNotInFuture => "StartTimeNotInFuture",
            Self::VoterAlreadyRegisteredForElection => "VoterAlreadyRegisteredForElection",
            Self::VoterNotInRegistry => "VoterNotInRegistry",
            Self::VoterNotRegisteredForElection => "VoterNotRegisteredForElection",
        }
    }

    pub fn selector(self) -> [u8; 4] {
        Function::new(self.name(), &[], &[]).selector()
    }

    /// Revert data a contract emits for this error.
    pub fn encode(self) -> Vec<u8> {
        self.selector().to_vec()
    }

    /// The error kind this revert means unless an operation says otherwise.
    pub fn default_kind(self) -> ErrorKind {
        match self {
            Self::NotAdmin => ErrorKind::Unauthorized,
            Self::InvalidAddress | Self::InvalidPartyAddress => ErrorKind::InvalidAddress,
            Self::InvalidCandidateId | Self::InvalidCandidate => ErrorKind::CandidateNotFound,
            Self::InvalidPartyId | Self::PartyNotParticipating => ErrorKind::PartyNotFound,
            Self::InvalidElectionId => ErrorKind::ElectionNotFound,
            Self::AlreadyVoted => ErrorKind::AlreadyVoted,
            Self::ElectionAlreadyStarted
            | Self::ElectionNotEnded
            | Self::EndTimeBeforeStartTime
            | Self::StartTimeNotInFuture => ErrorKind::InvalidElectionState,
            Self::ElectionNotStarted | Self::NotWithinElectionPeriod => {
                ErrorKind::ElectionNotActive
            }
            Self::ErrorElectionEnded => ErrorKind::ElectionAlreadyEnded,
            Self::VoterNotInRegistry | Self::VoterNotRegisteredForElection => {
                ErrorKind::VoterNotVerified
            }
            Self::VoterAlreadyInRegistry
            | Self::VoterAlreadyRegisteredForElection
            | Self::EmptyName => ErrorKind::TransactionFailed,
        }
    }
}

/// `Error(string)`, the revert emitted by `require` with a message.
const REVERT_REASON: Function = Function::new("Error", &[ParamType::String], &[]);

/// Decoded revert data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revert {
    Custom(ContractError),
    Reason(String),
    Unrecognized(Vec<u8>),
}

impl Revert {
    pub fn decode(data: &[u8]) -> Self {
        if data.len() == 4 {
            if let Some(error) = ContractError::ALL
                .into_iter()
                .find(|error| error.selector() == data)
            {
                return Revert::Custom(error);
            }
        }
        match REVERT_REASON.decode_input(data) {
            Ok(mut tokens) => match tokens.pop().map(|token| token.into_string()) {
                Some(Ok(reason)) => Revert::Reason(reason),
                _ => Revert::Unrecognized(data.to_vec()),
            },
            Err(_) => Revert::Unrecognized(data.to_vec()),
        }
    }

    /// Classify the revert of `operation`. `overrides` take precedence over
    /// each custom error's default kind; reverts that carry no custom error
    /// fall back to `fallback`.
    pub fn classify(
        &self,
        operation: &str,
        overrides: &[(ContractError, ErrorKind)],
        fallback: ErrorKind,
    ) -> VotingSystemError {
        match self {
            Revert::Custom(error) => {
                let kind = overrides
                    .iter()
                    .find(|(candidate, _)| candidate == error)
                    .map(|(_, kind)| *kind)
                    .unwrap_or_else(|| error.default_kind());
                VotingSystemError::new(kind, format!("{operation} reverted with {}", error.name()))
            }
            Revert::Reason(reason) => {
                VotingSystemError::new(fallback, format!("{operation} reverted: {reason}"))
            }
            Revert::Unrecognized(data) => VotingSystemError::new(
                fallback,
                format!("{operation} reverted with unrecognized data {}", to_hex(data)),
            ),
        }
    }
}

/// Classify a failure of a read-only call.
pub(super) fn read_error(
    operation: &str,
    error: LedgerError,
    overrides: &[(ContractError, ErrorKind)],
) -> VotingSystemError {
    match error {
        LedgerError::Reverted { data } => {
            Revert::decode(&data).classify(operation, overrides, ErrorKind::ContractCallFailed)
        }
        LedgerError::Transport(e) => {
            VotingSystemError::new(ErrorKind::Unknown, format!("{operation}: {e}"))
        }
        other => {
            VotingSystemError::new(ErrorKind::ContractCallFailed, format!("{operation}: {other}"))
        }
    }
}

/// Classify a failure anywhere along the simulate, send, confirm path of a write.
pub(super) fn write_error(
    operation: &str,
    error: LedgerError,
    overrides: &[(ContractError, ErrorKind)],
) -> VotingSystemError {
    match error {
        LedgerError::Reverted { data } => {
            Revert::decode(&data).classify(operation, overrides, ErrorKind::TransactionFailed)
        }
        LedgerError::ConfirmationTimeout { hash, timeout } => VotingSystemError::new(
            ErrorKind::TransactionTimeout,
            format!("{operation}: transaction {hash} unconfirmed after {timeout:?}"),
        ),
        LedgerError::Transport(e) => {
            VotingSystemError::new(ErrorKind::Unknown, format!("{operation}: {e}"))
        }
        other => {
            VotingSystemError::new(ErrorKind::TransactionFailed, format!("{operation}: {other}"))
        }
    }
}
