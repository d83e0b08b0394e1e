//! Typed access to a deployed voting system. Every operation returns a
//! [`Result`] whose error is classified into an [`ErrorKind`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rocket::tokio::{sync::RwLock, try_join};

use crate::ledger::{AbiError, Address, Function, LedgerError, Token};
use crate::model::{
    CandidateId, CandidateRecord, CandidateSpec, CandidateTally, ContractAddressBundle,
    ElectionId, ElectionRecord, ElectionResults, ElectionSpec, ElectionStatus, PartyId,
    PartyRecord, PartySpec,
};
use crate::wallet::LedgerWallet;

pub mod contracts;
pub mod error;

use contracts::{
    candidate_registry, election, election_registry, party, party_registry, voter_registry,
};
pub use error::{ContractError, ErrorKind, Result, VotingSystemError};

/// The deployed voting system, operated by one wallet.
pub struct VotingSystem {
    wallet: Arc<LedgerWallet>,
    contracts: ContractAddressBundle,
    /// Election contract addresses never change once created.
    elections: Arc<RwLock<HashMap<ElectionId, Address>>>,
}

fn bad_output(operation: &str, e: impl std::fmt::Display) -> VotingSystemError {
    VotingSystemError::new(
        ErrorKind::ContractCallFailed,
        format!("{operation} returned unexpected data: {e}"),
    )
}

fn invalid_address(what: &str) -> VotingSystemError {
    VotingSystemError::new(ErrorKind::InvalidAddress, format!("{what} is the zero address"))
}

fn timestamp(operation: &str, seconds: u128) -> Result<Option<DateTime<Utc>>> {
    if seconds == 0 {
        return Ok(None);
    }
    i64::try_from(seconds)
        .ok()
        .and_then(|seconds| Utc.timestamp_opt(seconds, 0).single())
        .map(Some)
        .ok_or_else(|| bad_output(operation, format!("timestamp {seconds} out of range")))
}

fn seconds(time: DateTime<Utc>) -> Result<Token> {
    u128::try_from(time.timestamp())
        .map(Token::Uint)
        .map_err(|_| {
            VotingSystemError::new(
                ErrorKind::InvalidElectionState,
                format!("{time} is before the epoch"),
            )
        })
}

/// A single-valued output, decoded.
fn single(operation: &str, mut tokens: Vec<Token>) -> Result<Token> {
    tokens
        .pop()
        .filter(|_| tokens.is_empty())
        .ok_or_else(|| bad_output(operation, "wrong number of values"))
}

impl VotingSystem {
    pub fn new(wallet: Arc<LedgerWallet>, contracts: ContractAddressBundle) -> Self {
        Self {
            wallet,
            contracts,
            elections: Default::default(),
        }
    }

    /// The same voting system, operated by another account.
    pub fn with_wallet(&self, wallet: Arc<LedgerWallet>) -> Self {
        Self {
            wallet,
            contracts: self.contracts,
            elections: self.elections.clone(),
        }
    }

    pub fn contracts(&self) -> &ContractAddressBundle {
        &self.contracts
    }

    /// The account this facade signs with.
    pub fn signer(&self) -> Address {
        self.wallet.address()
    }

    /// Invoke a view function and decode its outputs.
    async fn read(
        &self,
        to: Address,
        function: &Function,
        args: &[Token],
        overrides: &[(ContractError, ErrorKind)],
    ) -> Result<Vec<Token>> {
        let operation = function.name;
        let data = function
            .encode_call(args)
            .map_err(|e| VotingSystemError::new(ErrorKind::Unknown, e.to_string()))?;
        let output = self
            .wallet
            .call(to, data)
            .await
            .map_err(|e| error::read_error(operation, e, overrides))?;
        function
            .decode_output(&output)
            .map_err(|e| bad_output(operation, e))
    }

    async fn read_one(&self, to: Address, function: &Function, args: &[Token]) -> Result<Token> {
        single(function.name, self.read(to, function, args, &[]).await?)
    }

    /// Simulate, sign, send and confirm a state-changing call. The outputs
    /// come from the simulation. The wallet's write turn is held until the
    /// receipt arrives, so no other write from this account can change the
    /// state between simulation and execution.
    async fn write(
        &self,
        to: Address,
        function: &Function,
        args: &[Token],
        overrides: &[(ContractError, ErrorKind)],
    ) -> Result<Vec<Token>> {
        let operation = function.name;
        let _turn = self.wallet.begin_write().await;
        let outputs = self.read(to, function, args, overrides).await.map_err(|e| {
            // A failed simulation means the transaction would fail.
            match e.kind() {
                ErrorKind::ContractCallFailed => {
                    VotingSystemError::new(ErrorKind::TransactionFailed, e.detail())
                }
                _ => e,
            }
        })?;
        let data = function
            .encode_call(args)
            .map_err(|e| VotingSystemError::new(ErrorKind::Unknown, e.to_string()))?;
        let hash = self
            .wallet
            .send(Some(to), data.clone())
            .await
            .map_err(|e| error::write_error(operation, e, overrides))?;
        let receipt = self
            .wallet
            .wait_for_receipt(hash)
            .await
            .map_err(|e| error::write_error(operation, e, overrides))?;
        if !receipt.succeeded {
            error!("{operation} transaction {hash} reverted on chain");
            // Another account changed the state first; replaying the call
            // against the preceding block recovers the reason.
            return Err(match self.wallet.replay(Some(to), data, &receipt).await {
                Err(e @ LedgerError::Reverted { .. }) => {
                    error::write_error(operation, e, overrides)
                }
                _ => VotingSystemError::new(
                    ErrorKind::TransactionFailed,
                    format!("{operation} transaction {hash} reverted"),
                ),
            });
        }
        debug!("{operation} confirmed in block {}", receipt.block_number);
        Ok(outputs)
    }

    // Voters

    pub async fn register_voter(&self, voter: Address) -> Result<()> {
        if voter.is_zero() {
            return Err(invalid_address("voter"));
        }
        self.write(
            self.contracts.voter_registry,
            &voter_registry::REGISTER_VOTER,
            &[Token::Address(voter)],
            &[],
        )
        .await?;
        info!("Registered voter {voter}");
        Ok(())
    }

    pub async fn is_voter_verified(&self, voter: Address) -> Result<bool> {
        if voter.is_zero() {
            return Err(invalid_address("voter"));
        }
        self.read_one(
            self.contracts.voter_registry,
            &voter_registry::IS_VOTER_REGISTERED,
            &[Token::Address(voter)],
        )
        .await?
        .into_bool()
        .map_err(|e| bad_output("isVoterRegistered", e))
    }

    // Candidates

    fn candidate_args(candidate: &CandidateSpec) -> [Token; 4] {
        [
            Token::String(candidate.name.clone()),
            Token::String(candidate.position.clone()),
            Token::String(candidate.cid.clone()),
            Token::Uint(candidate.party_id.unwrap_or(0).into()),
        ]
    }

    pub async fn register_candidate(&self, candidate: &CandidateSpec) -> Result<CandidateId> {
        let outputs = self
            .write(
                self.contracts.candidate_registry,
                &candidate_registry::REGISTER_CANDIDATE,
                &Self::candidate_args(candidate),
                &[(ContractError::InvalidPartyId, ErrorKind::PartyNotFound)],
            )
            .await?;
        let id = single("registerCandidate", outputs)?
            .into_u64()
            .map_err(|e| bad_output("registerCandidate", e))?;
        info!("Registered candidate {id} ({})", candidate.name);
        Ok(id)
    }

    pub async fn update_candidate(&self, id: CandidateId, candidate: &CandidateSpec) -> Result<()> {
        let mut args = vec![Token::Uint(id.into())];
        args.extend(Self::candidate_args(candidate));
        self.write(
            self.contracts.candidate_registry,
            &candidate_registry::UPDATE_CANDIDATE,
            &args,
            &[],
        )
        .await?;
        info!("Updated candidate {id}");
        Ok(())
    }

    pub async fn get_candidate(&self, id: CandidateId) -> Result<CandidateRecord> {
        let operation = "getCandidate";
        let outputs = self
            .read(
                self.contracts.candidate_registry,
                &candidate_registry::GET_CANDIDATE,
                &[Token::Uint(id.into())],
                &[],
            )
            .await?;
        let record = decode_candidate(outputs).map_err(|e| bad_output(operation, e))?;
        // Some registries return an empty record instead of reverting.
        if record.id != id {
            return Err(VotingSystemError::new(
                ErrorKind::CandidateNotFound,
                format!("no candidate {id}"),
            ));
        }
        Ok(record)
    }

    // Parties

    fn party_args(party: &PartySpec) -> [Token; 3] {
        [
            Token::String(party.name.clone()),
            Token::String(party.slogan.clone()),
            Token::String(party.cid.clone()),
        ]
    }

    pub async fn register_party(&self, party: &PartySpec) -> Result<PartyId> {
        let mut outputs = self
            .write(
                self.contracts.party_registry,
                &party_registry::CREATE_PARTY,
                &Self::party_args(party),
                &[],
            )
            .await?
            .into_iter();
        let (id, address) = match (outputs.next(), outputs.next()) {
            (Some(id), Some(address)) => (id.into_u64(), address.into_address()),
            _ => return Err(bad_output("createParty", "missing value")),
        };
        let id = id.map_err(|e| bad_output("createParty", e))?;
        let address = address.map_err(|e| bad_output("createParty", e))?;
        info!("Registered party {id} ({}) at {address}", party.name);
        Ok(id)
    }

    pub async fn update_party(&self, id: PartyId, party: &PartySpec) -> Result<()> {
        let mut args = vec![Token::Uint(id.into())];
        args.extend(Self::party_args(party));
        self.write(
            self.contracts.party_registry,
            &party_registry::UPDATE_PARTY,
            &args,
            &[],
        )
        .await?;
        info!("Updated party {id}");
        Ok(())
    }

    /// The address of a party's contract.
    pub async fn party_address(&self, id: PartyId) -> Result<Address> {
        let address = self
            .read_one(
                self.contracts.party_registry,
                &party_registry::GET_PARTY,
                &[Token::Uint(id.into())],
            )
            .await?
            .into_address()
            .map_err(|e| bad_output("getParty", e))?;
        if address.is_zero() {
            return Err(VotingSystemError::new(
                ErrorKind::PartyNotFound,
                format!("no party {id}"),
            ));
        }
        Ok(address)
    }

    pub async fn get_party(&self, id: PartyId) -> Result<PartyRecord> {
        let address = self.party_address(id).await?;
        let string = |function: &'static Function| async move {
            self.read_one(address, function, &[])
                .await?
                .into_string()
                .map_err(|e| bad_output(function.name, e))
        };
        let (name, slogan, cid) = try_join!(
            string(&party::NAME),
            string(&party::SLOGAN),
            string(&party::CID)
        )?;
        Ok(PartyRecord {
            id,
            name,
            slogan,
            cid,
            address,
        })
    }

    // Elections

    pub async fn create_election(&self, spec: &ElectionSpec) -> Result<ElectionId> {
        let mut outputs = self
            .write(
                self.contracts.election_registry(),
                &election_registry::CREATE_ELECTION,
                &[
                    Token::String(spec.name.clone()),
                    Token::String(spec.description.clone()),
                    Token::String(spec.cid.clone()),
                ],
                &[],
            )
            .await?
            .into_iter();
        let (id, address) = match (outputs.next(), outputs.next()) {
            (Some(id), Some(address)) => (id.into_u64(), address.into_address()),
            _ => return Err(bad_output("createElection", "missing value")),
        };
        let id = id.map_err(|e| bad_output("createElection", e))?;
        let address = address.map_err(|e| bad_output("createElection", e))?;
        info!("Created election {id} ({}) at {address}", spec.name);
        Ok(id)
    }

    pub async fn election_count(&self) -> Result<u64> {
        self.read_one(
            self.contracts.election_registry(),
            &election_registry::GET_ELECTION_COUNT,
            &[],
        )
        .await?
        .into_u64()
        .map_err(|e| bad_output("getElectionCount", e))
    }

    /// The address of an election's contract.
    pub async fn election_address(&self, id: ElectionId) -> Result<Address> {
        if let Some(address) = self.elections.read().await.get(&id) {
            return Ok(*address);
        }
        let address = self
            .read(
                self.contracts.election_registry(),
                &election_registry::GET_ELECTION,
                &[Token::Uint(id.into())],
                &[],
            )
            .await
            .and_then(|outputs| single("getElection", outputs))?
            .into_address()
            .map_err(|e| bad_output("getElection", e))?;
        if address.is_zero() {
            return Err(VotingSystemError::new(
                ErrorKind::ElectionNotFound,
                format!("no election {id}"),
            ));
        }
        self.elections.write().await.insert(id, address);
        Ok(address)
    }

    async fn flags(&self, address: Address) -> Result<(bool, bool)> {
        let flag = |function: &'static Function| async move {
            self.read_one(address, function, &[])
                .await?
                .into_bool()
                .map_err(|e| bad_output(function.name, e))
        };
        try_join!(flag(&election::ELECTION_STARTED), flag(&election::ELECTION_ENDED))
    }

    fn status_from(started: bool, ended: bool) -> Result<ElectionStatus> {
        ElectionStatus::from_flags(started, ended).ok_or_else(|| {
            VotingSystemError::new(
                ErrorKind::ContractCallFailed,
                "election reports ended without having started",
            )
        })
    }

    pub async fn get_election(&self, id: ElectionId) -> Result<ElectionRecord> {
        let address = self.election_address(id).await?;
        let string = |function: &'static Function| async move {
            self.read_one(address, function, &[])
                .await?
                .into_string()
                .map_err(|e| bad_output(function.name, e))
        };
        let time = |function: &'static Function| async move {
            let seconds = self
                .read_one(address, function, &[])
                .await?
                .into_uint()
                .map_err(|e| bad_output(function.name, e))?;
            timestamp(function.name, seconds)
        };
        let (name, description, cid, start_time, end_time, (started, ended)) = try_join!(
            string(&election::NAME),
            string(&election::DESCRIPTION),
            string(&election::CID),
            time(&election::START_TIME),
            time(&election::END_TIME),
            self.flags(address),
        )?;
        Ok(ElectionRecord {
            id,
            address,
            name,
            description,
            cid,
            start_time,
            end_time,
            status: Self::status_from(started, ended)?,
        })
    }

    pub async fn get_election_status(&self, id: ElectionId) -> Result<ElectionStatus> {
        let address = self.election_address(id).await?;
        let (started, ended) = self.flags(address).await?;
        Self::status_from(started, ended)
    }

    /// Timestamp of the latest block. Contracts judge election times by
    /// this clock, not the server's.
    pub async fn ledger_time(&self) -> Result<DateTime<Utc>> {
        let operation = "latest block";
        let seconds = self
            .wallet
            .block_time()
            .await
            .map_err(|e| error::read_error(operation, e, &[]))?;
        Ok(timestamp(operation, seconds.into())?.unwrap_or_default())
    }

    /// Schedule a pending election. Voting opens at `start` and closes at `end`.
    pub async fn start_election(
        &self,
        id: ElectionId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<()> {
        let invalid = |detail: String| VotingSystemError::new(ErrorKind::InvalidElectionState, detail);
        if start >= end {
            return Err(invalid(format!("start {start} is not before end {end}")));
        }
        let now = self.ledger_time().await?;
        if start <= now {
            return Err(invalid(format!(
                "start {start} is not after the latest block at {now}"
            )));
        }
        let address = self.election_address(id).await?;
        let (started, ended) = self.flags(address).await?;
        match Self::status_from(started, ended)? {
            ElectionStatus::Pending => {}
            status => return Err(invalid(format!("election {id} is {status:?}"))),
        }
        self.write(
            address,
            &election::START_ELECTION,
            &[seconds(start)?, seconds(end)?],
            &[
                (ContractError::ErrorElectionEnded, ErrorKind::InvalidElectionState),
                (ContractError::ElectionNotStarted, ErrorKind::InvalidElectionState),
            ],
        )
        .await?;
        info!("Scheduled election {id} from {start} to {end}");
        Ok(())
    }

    /// Close an active election early.
    pub async fn end_election(&self, id: ElectionId) -> Result<()> {
        let address = self.election_address(id).await?;
        let (started, ended) = self.flags(address).await?;
        match Self::status_from(started, ended)? {
            ElectionStatus::Active => {}
            status => {
                return Err(VotingSystemError::new(
                    ErrorKind::InvalidElectionState,
                    format!("election {id} is {status:?}"),
                ))
            }
        }
        self.write(
            address,
            &election::END_ELECTION,
            &[],
            &[
                (ContractError::ElectionNotStarted, ErrorKind::InvalidElectionState),
                (ContractError::ErrorElectionEnded, ErrorKind::InvalidElectionState),
            ],
        )
        .await?;
        info!("Ended election {id}");
        Ok(())
    }

    /// Cast this wallet's vote for a candidate, through the candidate's party.
    pub async fn cast_vote(
        &self,
        election_id: ElectionId,
        party: Address,
        candidate_id: CandidateId,
    ) -> Result<()> {
        if party.is_zero() {
            return Err(invalid_address("party"));
        }
        let address = self.election_address(election_id).await?;
        let (started, ended) = self.flags(address).await?;
        match Self::status_from(started, ended)? {
            ElectionStatus::Active => {}
            ElectionStatus::Pending => {
                return Err(VotingSystemError::new(
                    ErrorKind::ElectionNotActive,
                    format!("election {election_id} has not started"),
                ))
            }
            ElectionStatus::Ended => {
                return Err(VotingSystemError::new(
                    ErrorKind::ElectionAlreadyEnded,
                    format!("election {election_id} has ended"),
                ))
            }
        }
        self.write(
            address,
            &election::VOTE,
            &[Token::Address(party), Token::Uint(candidate_id.into())],
            &[(ContractError::InvalidPartyAddress, ErrorKind::PartyNotFound)],
        )
        .await?;
        info!(
            "{} voted for candidate {candidate_id} in election {election_id}",
            self.signer()
        );
        Ok(())
    }

    pub async fn has_voted(&self, election_id: ElectionId, voter: Address) -> Result<bool> {
        if voter.is_zero() {
            return Err(invalid_address("voter"));
        }
        let address = self.election_address(election_id).await?;
        self.read_one(address, &election::HAS_VOTED, &[Token::Address(voter)])
            .await?
            .into_bool()
            .map_err(|e| bad_output("hasVoted", e))
    }

    pub async fn get_election_results(&self, election_id: ElectionId) -> Result<ElectionResults> {
        let operation = "getElectionResults";
        let address = self.election_address(election_id).await?;
        let outputs = self
            .read(address, &election::GET_ELECTION_RESULTS, &[], &[])
            .await?;
        let tallies = flatten_results(outputs).map_err(|e| bad_output(operation, e))?;
        Ok(ElectionResults {
            election_id,
            tallies,
        })
    }
}

fn decode_candidate(outputs: Vec<Token>) -> std::result::Result<CandidateRecord, AbiError> {
    let [id, name, position, cid, party_id]: [Token; 5] = outputs
        .try_into()
        .map_err(|_| AbiError::Malformed("expected five candidate fields"))?;
    Ok(CandidateRecord {
        id: id.into_u64()?,
        name: name.into_string()?,
        position: position.into_string()?,
        cid: cid.into_string()?,
        party_id: Some(party_id.into_u64()?).filter(|id| *id != 0),
    })
}

/// Flatten `(parties, candidateIds[party], voteCounts[party])` into tallies.
fn flatten_results(outputs: Vec<Token>) -> std::result::Result<Vec<CandidateTally>, String> {
    let mut outputs = outputs.into_iter();
    let (parties, candidates, counts) = match (outputs.next(), outputs.next(), outputs.next()) {
        (Some(parties), Some(candidates), Some(counts)) => (parties, candidates, counts),
        _ => return Err("missing value".to_string()),
    };
    let parties = parties.into_array().map_err(|e| e.to_string())?;
    let candidates = candidates.into_array().map_err(|e| e.to_string())?;
    let counts = counts.into_array().map_err(|e| e.to_string())?;
    if parties.len() != candidates.len() || parties.len() != counts.len() {
        return Err("mismatched party arrays".to_string());
    }

    let mut tallies = Vec::new();
    for ((party, candidates), counts) in parties.into_iter().zip(candidates).zip(counts) {
        let party = party.into_address().map_err(|e| e.to_string())?;
        let candidates = candidates.into_array().map_err(|e| e.to_string())?;
        let counts = counts.into_array().map_err(|e| e.to_string())?;
        if candidates.len() != counts.len() {
            return Err(format!("mismatched candidate arrays for party {party}"));
        }
        for (candidate, count) in candidates.into_iter().zip(counts) {
            tallies.push(CandidateTally {
                candidate_id: candidate.into_u64().map_err(|e| e.to_string())?,
                party,
                vote_count: count.into_u64().map_err(|e| e.to_string())?,
            });
        }
    }
    Ok(tallies)
}
