//! An in-process ledger that executes the voting contracts natively.
//!
//! Calls are dispatched on the ABI selector, so everything above the
//! [`Ledger`] trait (encoding, signing, nonces, receipts and revert
//! classification) runs exactly as against a real node.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Duration, TimeZone, Utc};

use super::abi::{self, AbiError, Function, Token};
use super::primitives::{Address, TxHash};
use super::transaction::contract_address;
use super::{CallRequest, Ledger, LedgerError, Receipt, SignedTransaction};
use crate::deployer::{ContractArtifacts, ContractKind};
use crate::voting_system::contracts::{
    candidate_registry, election, election_registry, party, party_registry, voter_registry,
};
use crate::voting_system::error::ContractError;

pub const CHAIN_ID: u64 = 31337;
const GAS_PRICE: u128 = 1_000_000_000;
const GAS_ESTIMATE: u64 = 100_000;

/// Why execution stopped.
#[derive(Debug)]
enum Halt {
    Revert(ContractError),
    Invalid(String),
}

impl Halt {
    fn revert_data(&self) -> Vec<u8> {
        match self {
            Halt::Revert(error) => error.encode(),
            Halt::Invalid(_) => Vec::new(),
        }
    }
}

impl From<AbiError> for Halt {
    fn from(e: AbiError) -> Self {
        Halt::Invalid(e.to_string())
    }
}

type Exec<T> = Result<T, Halt>;

fn require(condition: bool, error: ContractError) -> Exec<()> {
    if condition {
        Ok(())
    } else {
        Err(Halt::Revert(error))
    }
}

fn output(function: &Function, values: &[Token]) -> Exec<Vec<u8>> {
    Ok(function.encode_output(values)?)
}

fn is_call(data: &[u8], function: &Function) -> bool {
    data.get(..4) == Some(&function.selector()[..])
}

/// Typed access to decoded call arguments.
struct Args(std::vec::IntoIter<Token>);

impl Args {
    fn of(function: &Function, data: &[u8]) -> Exec<Self> {
        Ok(Self(function.decode_input(data)?.into_iter()))
    }

    fn next(&mut self) -> Exec<Token> {
        self.0
            .next()
            .ok_or_else(|| Halt::Invalid("missing argument".to_string()))
    }

    fn address(&mut self) -> Exec<Address> {
        Ok(self.next()?.into_address()?)
    }

    fn id(&mut self) -> Exec<u64> {
        Ok(self.next()?.into_u64()?)
    }

    fn uint(&mut self) -> Exec<u128> {
        Ok(self.next()?.into_uint()?)
    }

    fn string(&mut self) -> Exec<String> {
        Ok(self.next()?.into_string()?)
    }
}

#[derive(Clone)]
struct VoterRegistry {
    admin: Address,
    voters: HashSet<Address>,
}

#[derive(Clone)]
struct CandidateEntry {
    name: String,
    position: String,
    cid: String,
    party_id: u64,
}

#[derive(Clone)]
struct CandidateRegistry {
    admin: Address,
    /// Candidate `n` lives at index `n - 1`.
    candidates: Vec<CandidateEntry>,
}

#[derive(Clone)]
struct PartyRegistry {
    admin: Address,
    /// Party `n` lives at index `n - 1`.
    parties: Vec<Address>,
}

#[derive(Clone)]
struct Party {
    name: String,
    slogan: String,
    cid: String,
}

#[derive(Clone)]
struct SystemContract {
    admin: Address,
    voter_registry: Address,
    candidate_registry: Address,
    party_registry: Address,
    /// Election `n` lives at index `n - 1`.
    elections: Vec<Address>,
}

#[derive(Clone)]
struct Election {
    admin: Address,
    name: String,
    description: String,
    cid: String,
    scheduled: bool,
    start_time: u64,
    end_time: u64,
    closed_early: bool,
    voter_registry: Address,
    candidate_registry: Address,
    party_registry: Address,
    voted: HashSet<Address>,
    tallies: BTreeMap<(Address, u64), u64>,
}

impl Election {
    fn started(&self, now: u64) -> bool {
        self.scheduled && now >= self.start_time
    }

    fn ended(&self, now: u64) -> bool {
        self.closed_early || (self.started(now) && now >= self.end_time)
    }
}

#[derive(Clone)]
enum Contract {
    VoterRegistry(VoterRegistry),
    CandidateRegistry(CandidateRegistry),
    PartyRegistry(PartyRegistry),
    Party(Party),
    VotingSystem(SystemContract),
    Election(Election),
}

#[derive(Clone, Default)]
struct Account {
    balance: u128,
    nonce: u64,
}

#[derive(Clone, Default)]
struct World {
    clock_offset: i64,
    block_number: u64,
    accounts: HashMap<Address, Account>,
    contracts: HashMap<Address, Contract>,
    receipts: HashMap<TxHash, Receipt>,
}

impl World {
    fn now(&self) -> u64 {
        (Utc::now().timestamp() + self.clock_offset).max(0) as u64
    }

    fn nonce(&self, account: &Address) -> u64 {
        self.accounts.get(account).map(|a| a.nonce).unwrap_or(0)
    }

    fn execute(
        &mut self,
        from: Address,
        to: Option<Address>,
        data: &[u8],
        nonce: u64,
    ) -> Exec<(Vec<u8>, Option<Address>)> {
        match to {
            None => self
                .deploy(from, nonce, data)
                .map(|address| (Vec::new(), Some(address))),
            Some(to) => {
                let mut contract = self
                    .contracts
                    .remove(&to)
                    .ok_or_else(|| Halt::Invalid(format!("no contract at {to}")))?;
                let result = self.dispatch(&mut contract, from, to, data);
                self.contracts.insert(to, contract);
                result.map(|out| (out, None))
            }
        }
    }

    fn deploy(&mut self, from: Address, nonce: u64, data: &[u8]) -> Exec<Address> {
        let (kind, args) = ContractKind::DEPLOY_ORDER
            .into_iter()
            .find_map(|kind| {
                data.strip_prefix(MemoryLedger::bytecode(kind).as_slice())
                    .map(|args| (kind, args))
            })
            .ok_or_else(|| Halt::Invalid("unknown bytecode".to_string()))?;
        let mut args = Args(abi::decode(kind.constructor(), args)?.into_iter());
        let contract = match kind {
            ContractKind::VoterRegistry => Contract::VoterRegistry(VoterRegistry {
                admin: from,
                voters: HashSet::new(),
            }),
            ContractKind::CandidateRegistry => Contract::CandidateRegistry(CandidateRegistry {
                admin: from,
                candidates: Vec::new(),
            }),
            ContractKind::PartyRegistry => Contract::PartyRegistry(PartyRegistry {
                admin: from,
                parties: Vec::new(),
            }),
            ContractKind::VotingSystem => Contract::VotingSystem(SystemContract {
                admin: from,
                voter_registry: args.address()?,
                candidate_registry: args.address()?,
                party_registry: args.address()?,
                elections: Vec::new(),
            }),
        };
        let address = contract_address(from, nonce);
        self.contracts.insert(address, contract);
        Ok(address)
    }

    fn dispatch(
        &mut self,
        contract: &mut Contract,
        from: Address,
        this: Address,
        data: &[u8],
    ) -> Exec<Vec<u8>> {
        match contract {
            Contract::VoterRegistry(registry) => registry.handle(from, data),
            Contract::CandidateRegistry(registry) => registry.handle(from, data),
            Contract::PartyRegistry(registry) => registry.handle(self, from, this, data),
            Contract::Party(party) => party.handle(data),
            Contract::VotingSystem(system) => system.handle(self, from, this, data),
            Contract::Election(election) => election.handle(self, from, data),
        }
    }

    fn is_registered_voter(&self, registry: Address, voter: &Address) -> bool {
        match self.contracts.get(&registry) {
            Some(Contract::VoterRegistry(registry)) => registry.voters.contains(voter),
            _ => false,
        }
    }

    fn party_addresses(&self, registry: Address) -> Vec<Address> {
        match self.contracts.get(&registry) {
            Some(Contract::PartyRegistry(registry)) => registry.parties.clone(),
            _ => Vec::new(),
        }
    }

    fn candidates(&self, registry: Address) -> Vec<CandidateEntry> {
        match self.contracts.get(&registry) {
            Some(Contract::CandidateRegistry(registry)) => registry.candidates.clone(),
            _ => Vec::new(),
        }
    }
}

impl VoterRegistry {
    fn handle(&mut self, from: Address, data: &[u8]) -> Exec<Vec<u8>> {
        if is_call(data, &voter_registry::REGISTER_VOTER) {
            let voter = Args::of(&voter_registry::REGISTER_VOTER, data)?.address()?;
            require(from == self.admin, ContractError::NotAdmin)?;
            require(!voter.is_zero(), ContractError::InvalidAddress)?;
            require(self.voters.insert(voter), ContractError::VoterAlreadyInRegistry)?;
            Ok(Vec::new())
        } else if is_call(data, &voter_registry::IS_VOTER_REGISTERED) {
            let voter = Args::of(&voter_registry::IS_VOTER_REGISTERED, data)?.address()?;
            output(
                &voter_registry::IS_VOTER_REGISTERED,
                &[Token::Bool(self.voters.contains(&voter))],
            )
        } else {
            Err(Halt::Invalid("unknown selector".to_string()))
        }
    }
}

impl CandidateRegistry {
    fn get(&self, id: u64) -> Exec<&CandidateEntry> {
        id.checked_sub(1)
            .and_then(|index| self.candidates.get(index as usize))
            .ok_or(Halt::Revert(ContractError::InvalidCandidateId))
    }

    fn handle(&mut self, from: Address, data: &[u8]) -> Exec<Vec<u8>> {
        if is_call(data, &candidate_registry::REGISTER_CANDIDATE) {
            let mut args = Args::of(&candidate_registry::REGISTER_CANDIDATE, data)?;
            require(from == self.admin, ContractError::NotAdmin)?;
            let entry = CandidateEntry {
                name: args.string()?,
                position: args.string()?,
                cid: args.string()?,
                party_id: args.id()?,
            };
            require(!entry.name.is_empty(), ContractError::EmptyName)?;
            self.candidates.push(entry);
            output(
                &candidate_registry::REGISTER_CANDIDATE,
                &[Token::Uint(self.candidates.len() as u128)],
            )
        } else if is_call(data, &candidate_registry::UPDATE_CANDIDATE) {
            let mut args = Args::of(&candidate_registry::UPDATE_CANDIDATE, data)?;
            require(from == self.admin, ContractError::NotAdmin)?;
            let id = args.id()?;
            self.get(id)?;
            let entry = CandidateEntry {
                name: args.string()?,
                position: args.string()?,
                cid: args.string()?,
                party_id: args.id()?,
            };
            require(!entry.name.is_empty(), ContractError::EmptyName)?;
            self.candidates[id as usize - 1] = entry;
            Ok(Vec::new())
        } else if is_call(data, &candidate_registry::GET_CANDIDATE) {
            let id = Args::of(&candidate_registry::GET_CANDIDATE, data)?.id()?;
            let entry = self.get(id)?;
            output(
                &candidate_registry::GET_CANDIDATE,
                &[
                    Token::Uint(id.into()),
                    Token::String(entry.name.clone()),
                    Token::String(entry.position.clone()),
                    Token::String(entry.cid.clone()),
                    Token::Uint(entry.party_id.into()),
                ],
            )
        } else {
            Err(Halt::Invalid("unknown selector".to_string()))
        }
    }
}

impl PartyRegistry {
    fn get(&self, id: u64) -> Exec<Address> {
        id.checked_sub(1)
            .and_then(|index| self.parties.get(index as usize))
            .copied()
            .ok_or(Halt::Revert(ContractError::InvalidPartyId))
    }

    fn handle(
        &mut self,
        world: &mut World,
        from: Address,
        this: Address,
        data: &[u8],
    ) -> Exec<Vec<u8>> {
        if is_call(data, &party_registry::CREATE_PARTY) {
            let mut args = Args::of(&party_registry::CREATE_PARTY, data)?;
            require(from == self.admin, ContractError::NotAdmin)?;
            let party = Party {
                name: args.string()?,
                slogan: args.string()?,
                cid: args.string()?,
            };
            require(!party.name.is_empty(), ContractError::EmptyName)?;
            let id = self.parties.len() as u64 + 1;
            let address = contract_address(this, id);
            world.contracts.insert(address, Contract::Party(party));
            self.parties.push(address);
            output(
                &party_registry::CREATE_PARTY,
                &[Token::Uint(id.into()), Token::Address(address)],
            )
        } else if is_call(data, &party_registry::UPDATE_PARTY) {
            let mut args = Args::of(&party_registry::UPDATE_PARTY, data)?;
            require(from == self.admin, ContractError::NotAdmin)?;
            let address = self.get(args.id()?)?;
            let updated = Party {
                name: args.string()?,
                slogan: args.string()?,
                cid: args.string()?,
            };
            require(!updated.name.is_empty(), ContractError::EmptyName)?;
            world.contracts.insert(address, Contract::Party(updated));
            Ok(Vec::new())
        } else if is_call(data, &party_registry::GET_PARTY) {
            let id = Args::of(&party_registry::GET_PARTY, data)?.id()?;
            output(&party_registry::GET_PARTY, &[Token::Address(self.get(id)?)])
        } else if is_call(data, &party_registry::GET_PARTY_COUNT) {
            output(
                &party_registry::GET_PARTY_COUNT,
                &[Token::Uint(self.parties.len() as u128)],
            )
        } else {
            Err(Halt::Invalid("unknown selector".to_string()))
        }
    }
}

impl Party {
    fn handle(&self, data: &[u8]) -> Exec<Vec<u8>> {
        let (function, value) = if is_call(data, &party::NAME) {
            (&party::NAME, &self.name)
        } else if is_call(data, &party::SLOGAN) {
            (&party::SLOGAN, &self.slogan)
        } else if is_call(data, &party::CID) {
            (&party::CID, &self.cid)
        } else {
            return Err(Halt::Invalid("unknown selector".to_string()));
        };
        output(function, &[Token::String(value.clone())])
    }
}

impl SystemContract {
    fn handle(
        &mut self,
        world: &mut World,
        from: Address,
        this: Address,
        data: &[u8],
    ) -> Exec<Vec<u8>> {
        if is_call(data, &election_registry::CREATE_ELECTION) {
            let mut args = Args::of(&election_registry::CREATE_ELECTION, data)?;
            require(from == self.admin, ContractError::NotAdmin)?;
            let election = Election {
                admin: from,
                name: args.string()?,
                description: args.string()?,
                cid: args.string()?,
                scheduled: false,
                start_time: 0,
                end_time: 0,
                closed_early: false,
                voter_registry: self.voter_registry,
                candidate_registry: self.candidate_registry,
                party_registry: self.party_registry,
                voted: HashSet::new(),
                tallies: BTreeMap::new(),
            };
            require(!election.name.is_empty(), ContractError::EmptyName)?;
            let id = self.elections.len() as u64 + 1;
            let address = contract_address(this, id);
            world.contracts.insert(address, Contract::Election(election));
            self.elections.push(address);
            output(
                &election_registry::CREATE_ELECTION,
                &[Token::Uint(id.into()), Token::Address(address)],
            )
        } else if is_call(data, &election_registry::GET_ELECTION) {
            let id = Args::of(&election_registry::GET_ELECTION, data)?.id()?;
            let address = id
                .checked_sub(1)
                .and_then(|index| self.elections.get(index as usize))
                .ok_or(Halt::Revert(ContractError::InvalidElectionId))?;
            output(&election_registry::GET_ELECTION, &[Token::Address(*address)])
        } else if is_call(data, &election_registry::GET_ELECTION_COUNT) {
            output(
                &election_registry::GET_ELECTION_COUNT,
                &[Token::Uint(self.elections.len() as u128)],
            )
        } else {
            Err(Halt::Invalid("unknown selector".to_string()))
        }
    }
}

impl Election {
    fn handle(&mut self, world: &World, from: Address, data: &[u8]) -> Exec<Vec<u8>> {
        let now = world.now();
        let string = |function: &Function, value: &str| {
            output(function, &[Token::String(value.to_string())])
        };
        if is_call(data, &election::NAME) {
            string(&election::NAME, &self.name)
        } else if is_call(data, &election::DESCRIPTION) {
            string(&election::DESCRIPTION, &self.description)
        } else if is_call(data, &election::CID) {
            string(&election::CID, &self.cid)
        } else if is_call(data, &election::START_TIME) {
            output(&election::START_TIME, &[Token::Uint(self.start_time.into())])
        } else if is_call(data, &election::END_TIME) {
            output(&election::END_TIME, &[Token::Uint(self.end_time.into())])
        } else if is_call(data, &election::ELECTION_STARTED) {
            output(&election::ELECTION_STARTED, &[Token::Bool(self.started(now))])
        } else if is_call(data, &election::ELECTION_ENDED) {
            output(&election::ELECTION_ENDED, &[Token::Bool(self.ended(now))])
        } else if is_call(data, &election::START_ELECTION) {
            let mut args = Args::of(&election::START_ELECTION, data)?;
            let (start, end) = (args.uint()?, args.uint()?);
            require(from == self.admin, ContractError::NotAdmin)?;
            require(!self.ended(now), ContractError::ErrorElectionEnded)?;
            require(!self.scheduled, ContractError::ElectionAlreadyStarted)?;
            require(end > start, ContractError::EndTimeBeforeStartTime)?;
            require(start > u128::from(now), ContractError::StartTimeNotInFuture)?;
            let timestamp = |value: u128| {
                u64::try_from(value).map_err(|_| Halt::Invalid("timestamp overflow".to_string()))
            };
            self.start_time = timestamp(start)?;
            self.end_time = timestamp(end)?;
            self.scheduled = true;
            Ok(Vec::new())
        } else if is_call(data, &election::END_ELECTION) {
            require(from == self.admin, ContractError::NotAdmin)?;
            require(self.started(now), ContractError::ElectionNotStarted)?;
            require(!self.ended(now), ContractError::ErrorElectionEnded)?;
            self.closed_early = true;
            Ok(Vec::new())
        } else if is_call(data, &election::VOTE) {
            let mut args = Args::of(&election::VOTE, data)?;
            let (party, candidate_id) = (args.address()?, args.id()?);
            require(self.started(now), ContractError::ElectionNotStarted)?;
            require(!self.ended(now), ContractError::ErrorElectionEnded)?;
            require(
                world.is_registered_voter(self.voter_registry, &from),
                ContractError::VoterNotInRegistry,
            )?;
            require(!self.voted.contains(&from), ContractError::AlreadyVoted)?;
            let parties = world.party_addresses(self.party_registry);
            require(parties.contains(&party), ContractError::InvalidPartyAddress)?;
            let candidate_party = candidate_id
                .checked_sub(1)
                .and_then(|index| {
                    world
                        .candidates(self.candidate_registry)
                        .get(index as usize)
                        .map(|c| c.party_id)
                })
                .and_then(|party_id| party_id.checked_sub(1))
                .and_then(|index| parties.get(index as usize).copied());
            require(candidate_party == Some(party), ContractError::InvalidCandidate)?;
            self.voted.insert(from);
            *self.tallies.entry((party, candidate_id)).or_default() += 1;
            Ok(Vec::new())
        } else if is_call(data, &election::HAS_VOTED) {
            let voter = Args::of(&election::HAS_VOTED, data)?.address()?;
            output(&election::HAS_VOTED, &[Token::Bool(self.voted.contains(&voter))])
        } else if is_call(data, &election::GET_ELECTION_RESULTS) {
            let parties = world.party_addresses(self.party_registry);
            let candidates = world.candidates(self.candidate_registry);
            let mut candidate_ids = Vec::new();
            let mut vote_counts = Vec::new();
            for (index, party) in parties.iter().enumerate() {
                let party_id = index as u64 + 1;
                let members: Vec<u64> = (1..=candidates.len() as u64)
                    .filter(|id| candidates[*id as usize - 1].party_id == party_id)
                    .collect();
                vote_counts.push(Token::Array(
                    members
                        .iter()
                        .map(|id| {
                            let count = self.tallies.get(&(*party, *id)).copied().unwrap_or(0);
                            Token::Uint(count.into())
                        })
                        .collect(),
                ));
                candidate_ids.push(Token::Array(
                    members.into_iter().map(|id| Token::Uint(id.into())).collect(),
                ));
            }
            output(
                &election::GET_ELECTION_RESULTS,
                &[
                    Token::Array(parties.into_iter().map(Token::Address).collect()),
                    Token::Array(candidate_ids),
                    Token::Array(vote_counts),
                ],
            )
        } else {
            Err(Halt::Invalid("unknown selector".to_string()))
        }
    }
}

#[derive(Default)]
struct Node {
    world: World,
    /// State as of the end of each earlier block.
    history: BTreeMap<u64, World>,
    paused: bool,
    rejecting: bool,
    pending: Vec<SignedTransaction>,
}

impl Node {
    fn expected_nonce(&self, account: &Address) -> u64 {
        let queued = self.pending.iter().filter(|tx| &tx.from == account).count();
        self.world.nonce(account) + queued as u64
    }

    fn mine(&mut self, tx: SignedTransaction) {
        self.history
            .insert(self.world.block_number, self.world.clone());
        let mut next = self.world.clone();
        let result = next.execute(tx.from, tx.request.to, &tx.request.data, tx.request.nonce);
        let contract_address = match result {
            Ok((_, created)) => {
                self.world = next;
                Some(created)
            }
            Err(halt) => {
                debug!("transaction {} reverted: {halt:?}", tx.hash);
                None
            }
        };
        let world = &mut self.world;
        world.block_number += 1;
        world.accounts.entry(tx.from).or_default().nonce += 1;
        world.receipts.insert(
            tx.hash,
            Receipt {
                transaction_hash: tx.hash,
                block_number: world.block_number,
                succeeded: contract_address.is_some(),
                contract_address: contract_address.flatten(),
            },
        );
    }
}

/// A simulated ledger node hosting the voting contracts.
#[derive(Default)]
pub struct MemoryLedger {
    node: Mutex<Node>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creation bytecode the simulator recognises for each contract.
    pub fn bytecode(kind: ContractKind) -> Vec<u8> {
        format!("memory:{}", kind.name()).into_bytes()
    }

    pub fn artifacts() -> ContractArtifacts {
        ContractArtifacts::from_fn(Self::bytecode)
    }

    pub fn fund(&self, account: Address, amount: u128) {
        let mut node = self.node.lock().unwrap();
        node.world.accounts.entry(account).or_default().balance += amount;
    }

    /// The ledger's clock, which contracts compare timestamps against.
    pub fn now(&self) -> DateTime<Utc> {
        let now = self.node.lock().unwrap().world.now();
        Utc.timestamp_opt(now as i64, 0).unwrap()
    }

    pub fn advance_time(&self, by: Duration) {
        self.node.lock().unwrap().world.clock_offset += by.num_seconds();
    }

    /// Accept transactions without mining them until [`Self::resume_mining`].
    pub fn pause_mining(&self) {
        self.node.lock().unwrap().paused = true;
    }

    pub fn resume_mining(&self) {
        let mut node = self.node.lock().unwrap();
        node.paused = false;
        for tx in std::mem::take(&mut node.pending) {
            node.mine(tx);
        }
    }

    /// Number of broadcast transactions waiting for [`Self::resume_mining`].
    pub fn pending_count(&self) -> usize {
        self.node.lock().unwrap().pending.len()
    }

    /// Make the node refuse every broadcast, as an unavailable node would.
    pub fn reject_transactions(&self, rejecting: bool) {
        self.node.lock().unwrap().rejecting = rejecting;
    }

    fn simulate(&self, request: &CallRequest) -> Result<Vec<u8>, LedgerError> {
        let node = self.node.lock().unwrap();
        let from = request.from.unwrap_or_default();
        let nonce = node.expected_nonce(&from);
        run(node.world.clone(), from, request, nonce)
    }
}

fn run(
    mut world: World,
    from: Address,
    request: &CallRequest,
    nonce: u64,
) -> Result<Vec<u8>, LedgerError> {
    world
        .execute(from, request.to, &request.data, nonce)
        .map(|(out, _)| out)
        .map_err(|halt| LedgerError::Reverted {
            data: halt.revert_data(),
        })
}

#[rocket::async_trait]
impl Ledger for MemoryLedger {
    async fn chain_id(&self) -> Result<u64, LedgerError> {
        Ok(CHAIN_ID)
    }

    async fn balance(&self, account: Address) -> Result<u128, LedgerError> {
        let node = self.node.lock().unwrap();
        Ok(node.world.accounts.get(&account).map(|a| a.balance).unwrap_or(0))
    }

    async fn nonce(&self, account: Address) -> Result<u64, LedgerError> {
        Ok(self.node.lock().unwrap().expected_nonce(&account))
    }

    async fn gas_price(&self) -> Result<u128, LedgerError> {
        Ok(GAS_PRICE)
    }

    async fn estimate_gas(&self, request: &CallRequest) -> Result<u64, LedgerError> {
        self.simulate(request).map(|_| GAS_ESTIMATE)
    }

    async fn call(&self, request: &CallRequest) -> Result<Vec<u8>, LedgerError> {
        self.simulate(request)
    }

    async fn call_at(&self, request: &CallRequest, block: u64) -> Result<Vec<u8>, LedgerError> {
        let node = self.node.lock().unwrap();
        let world = if block >= node.world.block_number {
            &node.world
        } else {
            node.history.get(&block).ok_or_else(|| LedgerError::Rpc {
                code: -32000,
                message: format!("unknown block {block}"),
            })?
        };
        let from = request.from.unwrap_or_default();
        let nonce = world.nonce(&from);
        run(world.clone(), from, request, nonce)
    }

    async fn block_time(&self) -> Result<u64, LedgerError> {
        Ok(self.node.lock().unwrap().world.now())
    }

    async fn send_transaction(
        &self,
        transaction: &SignedTransaction,
    ) -> Result<TxHash, LedgerError> {
        let mut node = self.node.lock().unwrap();
        let reject = |message: &str| {
            Err(LedgerError::Rpc {
                code: -32000,
                message: message.to_string(),
            })
        };
        if node.rejecting {
            return reject("node unavailable");
        }
        if transaction.request.chain_id != CHAIN_ID {
            return reject("invalid chain id");
        }
        let expected = node.expected_nonce(&transaction.from);
        if transaction.request.nonce < expected {
            return reject("nonce too low");
        }
        if transaction.request.nonce > expected {
            return reject("nonce too high");
        }
        let balance = node
            .world
            .accounts
            .get(&transaction.from)
            .map(|a| a.balance)
            .unwrap_or(0);
        if balance == 0 {
            return reject("insufficient funds for gas * price + value");
        }
        if node.paused {
            node.pending.push(transaction.clone());
        } else {
            node.mine(transaction.clone());
        }
        Ok(transaction.hash)
    }

    async fn receipt(&self, hash: TxHash) -> Result<Option<Receipt>, LedgerError> {
        Ok(self.node.lock().unwrap().world.receipts.get(&hash).cloned())
    }
}
