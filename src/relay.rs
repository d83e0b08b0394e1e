//! Relays already recorded votes to the ledger on behalf of voters.

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::Address;
use crate::model::{
    CandidateId, ElectionId, ElectionStatus, SelectionReport, VoteBatch, VoteSelection,
    VoteSubmissionResult,
};
use crate::voting_system::{ErrorKind, VotingSystem, VotingSystemError};
use crate::wallet::Keyring;

/// What to do when a vote cannot be written to the ledger.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Abort the batch and report the failure.
    Strict,
    /// Record the failure against the selection and carry on.
    #[default]
    Relay,
}

impl Display for FailurePolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Relay => write!(f, "relay"),
        }
    }
}

/// Stable codes reported to the application that recorded the votes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    #[serde(rename = "ERR_ELECTION_NOT_FOUND")]
    ElectionNotFound,
    #[serde(rename = "ERR_ELECTION_NOT_STARTED")]
    ElectionNotStarted,
    #[serde(rename = "ERR_ELECTION_ALREADY_ENDED")]
    ElectionAlreadyEnded,
    #[serde(rename = "ERR_ELECTION_STATUS_CHECK_FAILED")]
    ElectionStatusCheckFailed,
    #[serde(rename = "ERR_ELECTION_NOT_ACTIVE")]
    ElectionNotActive,
    #[serde(rename = "ERR_CANDIDATE_NOT_FOUND")]
    CandidateNotFound,
    #[serde(rename = "ERR_PARTY_NOT_FOUND")]
    PartyNotFound,
    #[serde(rename = "ERR_VOTER_NOT_VERIFIED")]
    VoterNotVerified,
    #[serde(rename = "ERR_VOTER_ALREADY_VOTED")]
    VoterAlreadyVoted,
    #[serde(rename = "ERR_BLOCKCHAIN_VOTE_SUBMISSION_FAILED")]
    BlockchainVoteSubmissionFailed,
    #[serde(rename = "ERR_BLOCKCHAIN_VOTE_TIMEOUT")]
    BlockchainVoteTimeout,
    #[serde(rename = "ERR_INVALID_VOTE_BATCH")]
    InvalidVoteBatch,
    #[serde(rename = "ERR_UNEXPECTED")]
    Unexpected,
}

impl ErrorCode {
    /// The code for a failed ledger write.
    pub fn for_write(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::AlreadyVoted => Self::VoterAlreadyVoted,
            ErrorKind::ElectionNotActive => Self::ElectionNotActive,
            ErrorKind::ElectionAlreadyEnded => Self::ElectionAlreadyEnded,
            ErrorKind::ElectionNotFound => Self::ElectionNotFound,
            ErrorKind::CandidateNotFound => Self::CandidateNotFound,
            ErrorKind::PartyNotFound => Self::PartyNotFound,
            ErrorKind::VoterNotVerified => Self::VoterNotVerified,
            ErrorKind::TransactionTimeout => Self::BlockchainVoteTimeout,
            ErrorKind::Unknown => Self::Unexpected,
            ErrorKind::InvalidAddress
            | ErrorKind::Unauthorized
            | ErrorKind::TransactionFailed
            | ErrorKind::ContractCallFailed
            | ErrorKind::InvalidElectionState => Self::BlockchainVoteSubmissionFailed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ElectionNotFound => "ERR_ELECTION_NOT_FOUND",
            Self::ElectionNotStarted => "ERR_ELECTION_NOT_STARTED",
            Self::ElectionAlreadyEnded => "ERR_ELECTION_ALREADY_ENDED",
            Self::ElectionStatusCheckFailed => "ERR_ELECTION_STATUS_CHECK_FAILED",
            Self::ElectionNotActive => "ERR_ELECTION_NOT_ACTIVE",
            Self::CandidateNotFound => "ERR_CANDIDATE_NOT_FOUND",
            Self::PartyNotFound => "ERR_PARTY_NOT_FOUND",
            Self::VoterNotVerified => "ERR_VOTER_NOT_VERIFIED",
            Self::VoterAlreadyVoted => "ERR_VOTER_ALREADY_VOTED",
            Self::BlockchainVoteSubmissionFailed => "ERR_BLOCKCHAIN_VOTE_SUBMISSION_FAILED",
            Self::BlockchainVoteTimeout => "ERR_BLOCKCHAIN_VOTE_TIMEOUT",
            Self::InvalidVoteBatch => "ERR_INVALID_VOTE_BATCH",
            Self::Unexpected => "ERR_UNEXPECTED",
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A batch that was accepted, with what happened to each selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionOutcome {
    pub election_id: ElectionId,
    pub voter: Address,
    pub policy: FailurePolicy,
    pub selections: Vec<SelectionReport>,
    /// Describes failures that were relayed past instead of reported.
    pub message: Option<String>,
}

impl SubmissionOutcome {
    /// Whether every selection is now on the ledger.
    pub fn all_recorded(&self) -> bool {
        self.selections.iter().all(|report| {
            matches!(
                report.result,
                VoteSubmissionResult::Submitted | VoteSubmissionResult::SkippedAlreadyVoted
            )
        })
    }
}

/// A batch that was rejected. Selections in `committed` were already
/// written to the ledger and stay there.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{code}: {message}")]
pub struct SubmissionError {
    pub code: ErrorCode,
    pub message: String,
    pub committed: Vec<CandidateId>,
}

impl SubmissionError {
    fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            committed: Vec::new(),
        }
    }

    fn after(mut self, committed: &[SelectionReport]) -> Self {
        self.committed = committed
            .iter()
            .filter(|report| report.result == VoteSubmissionResult::Submitted)
            .map(|report| report.candidate_id)
            .collect();
        self
    }
}

/// Why a selection could not be relayed.
enum Rejection {
    /// The selection itself is invalid; reported under every policy.
    Invalid(SubmissionError),
    /// Something went wrong that says nothing about the selection.
    Unexpected(VotingSystemError),
}

/// Submits vote batches through the voting system, signing as each voter.
pub struct VoteRelay {
    voting_system: Arc<VotingSystem>,
    keyring: Keyring,
    policy: FailurePolicy,
}

impl VoteRelay {
    pub fn new(voting_system: Arc<VotingSystem>, keyring: Keyring, policy: FailurePolicy) -> Self {
        Self {
            voting_system,
            keyring,
            policy,
        }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn voters(&self) -> usize {
        self.keyring.len()
    }

    /// Group selections into a batch and submit it.
    pub async fn submit_selections(
        &self,
        selections: &[VoteSelection],
    ) -> Result<SubmissionOutcome, SubmissionError> {
        let batch = VoteBatch::new(selections).ok_or_else(|| {
            SubmissionError::new(
                ErrorCode::InvalidVoteBatch,
                "a batch needs at least one selection, all for one voter in one election",
            )
        })?;
        self.submit(&batch).await
    }

    /// Validate the election, then submit each selection in order.
    ///
    /// Dropping the future stops the batch before its next broadcast; a
    /// broadcast transaction cannot be recalled.
    pub async fn submit(&self, batch: &VoteBatch) -> Result<SubmissionOutcome, SubmissionError> {
        let election_id = batch.election_id();
        let voter = batch.voter();
        info!(
            "Relaying {} selection(s) from {voter} in election {election_id} ({} policy)",
            batch.candidate_ids().len(),
            self.policy
        );
        let mut outcome = SubmissionOutcome {
            election_id,
            voter,
            policy: self.policy,
            selections: Vec::new(),
            message: None,
        };

        // Get the election.
        match self.voting_system.get_election(election_id).await {
            Ok(election) => debug!("Election {election_id} is '{}'", election.name),
            Err(e) if e.kind() == ErrorKind::ElectionNotFound => {
                warn!("Rejected batch from {voter}: {e}");
                return Err(SubmissionError::new(ErrorCode::ElectionNotFound, e.detail()));
            }
            Err(e) => return self.unexpected(outcome, batch.candidate_ids(), e),
        }

        // Check that voting is open.
        let status = self
            .voting_system
            .get_election_status(election_id)
            .await
            .map_err(|e| {
                error!("Could not check the status of election {election_id}: {e}");
                SubmissionError::new(ErrorCode::ElectionStatusCheckFailed, e.to_string())
            })?;
        match status {
            ElectionStatus::Active => debug!("Election {election_id} is active"),
            ElectionStatus::Pending => {
                warn!("Rejected batch from {voter}: election {election_id} has not started");
                return Err(SubmissionError::new(
                    ErrorCode::ElectionNotStarted,
                    format!("election {election_id} has not started"),
                ));
            }
            ElectionStatus::Ended => {
                warn!("Rejected batch from {voter}: election {election_id} has ended");
                return Err(SubmissionError::new(
                    ErrorCode::ElectionAlreadyEnded,
                    format!("election {election_id} has ended"),
                ));
            }
        }

        // Votes are cast as the voter's own account.
        let wallet = self.keyring.get(&voter).ok_or_else(|| {
            warn!("Rejected batch from {voter}: no custodial account");
            SubmissionError::new(
                ErrorCode::VoterNotVerified,
                format!("no custodial account for {voter}"),
            )
        })?;
        let as_voter = self.voting_system.with_wallet(wallet);

        let mut relayed = Vec::new();
        for &candidate_id in batch.candidate_ids() {
            // Resolve the candidate's party.
            let party = match self.resolve_party(candidate_id).await {
                Ok(party) => party,
                Err(Rejection::Invalid(e)) => {
                    warn!("Rejected selection of candidate {candidate_id} by {voter}: {e}");
                    return Err(e.after(&outcome.selections));
                }
                Err(Rejection::Unexpected(e)) => match self.policy {
                    FailurePolicy::Strict => {
                        error!("Failed to resolve candidate {candidate_id}: {e}");
                        return Err(SubmissionError::new(ErrorCode::Unexpected, e.to_string())
                            .after(&outcome.selections));
                    }
                    FailurePolicy::Relay => {
                        error!("Failed to resolve candidate {candidate_id}, relaying past it: {e}");
                        relayed.push(format!("candidate {candidate_id}: {e}"));
                        outcome.selections.push(SelectionReport {
                            candidate_id,
                            result: VoteSubmissionResult::Failed(e.kind()),
                        });
                        continue;
                    }
                },
            };

            // Cast the vote.
            let result = match as_voter.cast_vote(election_id, party, candidate_id).await {
                Ok(()) => VoteSubmissionResult::Submitted,
                Err(e) => match self.policy {
                    FailurePolicy::Strict => {
                        error!("Vote for candidate {candidate_id} by {voter} failed: {e}");
                        return Err(SubmissionError::new(
                            ErrorCode::for_write(e.kind()),
                            e.to_string(),
                        )
                        .after(&outcome.selections));
                    }
                    FailurePolicy::Relay if e.kind() == ErrorKind::AlreadyVoted => {
                        info!("{voter} already voted in election {election_id}, skipping candidate {candidate_id}");
                        VoteSubmissionResult::SkippedAlreadyVoted
                    }
                    FailurePolicy::Relay => {
                        error!("Vote for candidate {candidate_id} by {voter} failed, relaying past it: {e}");
                        relayed.push(format!("candidate {candidate_id}: {e}"));
                        VoteSubmissionResult::Failed(e.kind())
                    }
                },
            };
            outcome.selections.push(SelectionReport {
                candidate_id,
                result,
            });
        }

        if !relayed.is_empty() {
            outcome.message = Some(format!("Relayed past failures: {}", relayed.join("; ")));
        }
        info!(
            "Relayed batch from {voter} in election {election_id} (all recorded: {})",
            outcome.all_recorded()
        );
        Ok(outcome)
    }

    /// The address of the candidate's party contract.
    async fn resolve_party(&self, candidate_id: CandidateId) -> Result<Address, Rejection> {
        let candidate = self
            .voting_system
            .get_candidate(candidate_id)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::CandidateNotFound => {
                    Rejection::Invalid(SubmissionError::new(ErrorCode::CandidateNotFound, e.detail()))
                }
                _ => Rejection::Unexpected(e),
            })?;
        let party_id = candidate.party_id.ok_or_else(|| {
            Rejection::Invalid(SubmissionError::new(
                ErrorCode::PartyNotFound,
                format!("candidate {candidate_id} belongs to no party"),
            ))
        })?;
        self.voting_system
            .party_address(party_id)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::PartyNotFound => {
                    Rejection::Invalid(SubmissionError::new(ErrorCode::PartyNotFound, e.detail()))
                }
                _ => Rejection::Unexpected(e),
            })
    }

    /// An unexpected failure before any vote was cast.
    fn unexpected(
        &self,
        mut outcome: SubmissionOutcome,
        candidate_ids: &[CandidateId],
        e: VotingSystemError,
    ) -> Result<SubmissionOutcome, SubmissionError> {
        match self.policy {
            FailurePolicy::Strict => {
                error!("Failed to relay batch from {}: {e}", outcome.voter);
                Err(SubmissionError::new(ErrorCode::Unexpected, e.to_string()))
            }
            FailurePolicy::Relay => {
                error!("Failed to relay batch from {}, relaying past it: {e}", outcome.voter);
                outcome.selections = candidate_ids
                    .iter()
                    .map(|&candidate_id| SelectionReport {
                        candidate_id,
                        result: VoteSubmissionResult::Failed(e.kind()),
                    })
                    .collect();
                outcome.message = Some(format!("Relayed past failure: {e}"));
                Ok(outcome)
            }
        }
    }
}
