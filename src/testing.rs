//! Fixtures shared by the unit tests and the `#[ledger_test]` harness.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use k256::ecdsa::SigningKey;
use rocket::{local::asynchronous::Client, Build, Rocket};

use crate::config::ConfigFairing;
use crate::deployer::ContractDeployer;
use crate::ledger::{memory::MemoryLedger, primitives::to_hex, Address};
use crate::logging::LoggerFairing;
use crate::model::{CandidateId, CandidateSpec, ElectionId, ElectionSpec, PartyId, PartySpec};
use crate::relay::{FailurePolicy, VoteRelay};
use crate::voting_system::VotingSystem;
use crate::wallet::{Confirmation, Keyring, LedgerWallet};

pub type TestLedger = Arc<MemoryLedger>;
pub type System = Arc<VotingSystem>;

pub const RELAY_TOKEN: &str = "relay-token-for-tests";

const FUNDS: u128 = 1_000_000_000_000_000_000;

pub fn init_logging() {
    log4rs_test_utils::test_logging::init_logging_once_for(["chainvote_backend"], None, None);
}

/// Confirmation settings short enough for timeouts to be tested.
pub fn confirmation() -> Confirmation {
    Confirmation {
        timeout: Duration::from_millis(300),
        poll_interval: Duration::from_millis(5),
    }
}

pub fn random_key() -> String {
    to_hex(SigningKey::random(&mut rand::thread_rng()).to_bytes())
}

pub fn wallet_for(ledger: &TestLedger, key: &str) -> Arc<LedgerWallet> {
    let wallet = LedgerWallet::new(
        key,
        crate::ledger::memory::CHAIN_ID,
        ledger.clone(),
        ledger.clone(),
        confirmation(),
    )
    .unwrap();
    Arc::new(wallet)
}

/// A wallet for a fresh account with enough funds to pay for gas.
pub fn funded_wallet(ledger: &TestLedger) -> Arc<LedgerWallet> {
    let wallet = wallet_for(ledger, &random_key());
    ledger.fund(wallet.address(), FUNDS);
    wallet
}

/// Two wallets for one funded account. Each has its own write turn and
/// nonce tracking, as two server instances sharing a key would.
pub fn twin_wallets(ledger: &TestLedger) -> (Arc<LedgerWallet>, Arc<LedgerWallet>) {
    let key = random_key();
    let first = wallet_for(ledger, &key);
    ledger.fund(first.address(), FUNDS);
    (first, wallet_for(ledger, &key))
}

/// Wait until a paused ledger holds `count` unmined transactions.
pub async fn until_pending(ledger: &TestLedger, count: usize) {
    while ledger.pending_count() < count {
        rocket::tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

/// Resume mining once `count` transactions are queued.
pub async fn mine_when_pending(ledger: &TestLedger, count: usize) {
    until_pending(ledger, count).await;
    ledger.resume_mining();
}

/// Deploy a fresh voting system, administered by a new funded account.
pub async fn deploy(ledger: &TestLedger) -> System {
    let admin = funded_wallet(ledger);
    let contracts = ContractDeployer::new(admin.clone())
        .deploy_system(&MemoryLedger::artifacts())
        .await
        .unwrap();
    Arc::new(VotingSystem::new(admin, contracts))
}

/// IDs and accounts created by [`seed`].
pub struct Seeded {
    pub election_id: ElectionId,
    /// Registered parties with their contract addresses.
    pub parties: Vec<(PartyId, Address)>,
    /// Two candidates of the first party, then one of the second.
    pub candidates: Vec<CandidateId>,
    /// A candidate with no party, who cannot be voted for.
    pub independent: CandidateId,
    /// Funded, registered voter accounts.
    pub voters: Vec<Arc<LedgerWallet>>,
}

impl Seeded {
    pub fn voter(&self, index: usize) -> Address {
        self.voters[index].address()
    }

    pub fn keyring(&self) -> Keyring {
        let mut keyring = Keyring::default();
        for voter in &self.voters {
            keyring.insert(voter.clone());
        }
        keyring
    }
}

/// Register parties, candidates and voters and create one election. With
/// `running`, the election is also started and the ledger clock moved into
/// its voting period.
pub async fn seed(ledger: &TestLedger, system: &System, running: bool) -> Seeded {
    let mut parties = Vec::new();
    for name in ["Analytical Party", "Difference Party"] {
        let spec = PartySpec {
            name: name.to_string(),
            ..PartySpec::example()
        };
        let id = system.register_party(&spec).await.unwrap();
        parties.push((id, system.party_address(id).await.unwrap()));
    }

    let mut candidates = Vec::new();
    for party_id in [parties[0].0, parties[0].0, parties[1].0] {
        let id = system
            .register_candidate(&CandidateSpec::example(party_id))
            .await
            .unwrap();
        candidates.push(id);
    }
    let independent = system
        .register_candidate(&CandidateSpec::independent())
        .await
        .unwrap();

    let mut voters = Vec::new();
    for _ in 0..3 {
        let voter = funded_wallet(ledger);
        system.register_voter(voter.address()).await.unwrap();
        voters.push(voter);
    }

    let election_id = system
        .create_election(&ElectionSpec::example())
        .await
        .unwrap();
    if running {
        start(ledger, system, election_id).await;
    }

    Seeded {
        election_id,
        parties,
        candidates,
        independent,
        voters,
    }
}

/// Schedule an election to open a minute from now, then advance the ledger
/// clock into its voting period.
pub async fn start(ledger: &TestLedger, system: &System, election_id: ElectionId) {
    let start = ledger.now() + ChronoDuration::minutes(1);
    let end = start + ChronoDuration::hours(1);
    system.start_election(election_id, start, end).await.unwrap();
    ledger.advance_time(ChronoDuration::minutes(2));
}

/// Move the ledger clock past the end of any election started by [`start`].
pub fn finish(ledger: &TestLedger) {
    ledger.advance_time(ChronoDuration::hours(2));
}

/// A server over an already-connected voting system, relaying for the
/// given voters. Stands in for the ledger connection made at ignition.
pub fn rocket_for(system: &System, keyring: Keyring, policy: FailurePolicy) -> Rocket<Build> {
    let figment = rocket::Config::figment().merge(("relay_token", RELAY_TOKEN));
    rocket::custom(figment)
        .mount("/", crate::api::routes())
        .attach(ConfigFairing)
        .attach(LoggerFairing)
        .manage(system.clone())
        .manage(VoteRelay::new(system.clone(), keyring, policy))
}

pub async fn client_for(system: &System, keyring: Keyring, policy: FailurePolicy) -> Client {
    Client::tracked(rocket_for(system, keyring, policy))
        .await
        .unwrap()
}
