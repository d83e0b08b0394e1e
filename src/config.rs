use std::sync::Arc;
use std::time::Duration;

use rocket::{
    fairing::{Fairing, Info, Kind},
    figment::Figment,
    Build, Rocket,
};
use serde::Deserialize;
use thiserror::Error;

use crate::ledger::{rpc::RpcLedger, Ledger, LedgerError};
use crate::model::ContractAddressBundle;
use crate::relay::{FailurePolicy, VoteRelay};
use crate::voting_system::VotingSystem;
use crate::wallet::{Confirmation, Keyring, LedgerWallet, WalletError};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // secrets
    relay_token: String,
}

impl Config {
    /// Token the application must present to relay votes.
    pub fn relay_token(&self) -> &str {
        &self.relay_token
    }
}

/// A fairing that loads the application config and puts it in managed state.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

fn default_request_timeout() -> u64 {
    10
}

fn default_confirmation_timeout() -> u64 {
    120
}

fn default_poll_interval() -> u64 {
    1000
}

/// Configuration for the ledger connection, shared by the server and the
/// administration tool.
#[derive(Deserialize)]
pub struct LedgerConfig {
    // non-secrets
    ledger_rpc_url: String,
    #[serde(default = "default_request_timeout")]
    ledger_request_timeout: u64,
    #[serde(default = "default_confirmation_timeout")]
    ledger_confirmation_timeout: u64,
    #[serde(default = "default_poll_interval")]
    ledger_poll_interval: u64,
    #[serde(default)]
    ledger_failure_policy: FailurePolicy,
    contracts: Option<ContractAddressBundle>,
    // secrets
    ledger_private_key: String,
    #[serde(default)]
    voter_keys: Vec<String>,
}

#[derive(Debug, Error)]
pub enum LedgerSetupError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error("No deployed contracts configured; deploy them and set `contracts`")]
    MissingContracts,
}

impl LedgerConfig {
    /// Load the ledger config from a figment.
    pub fn from_figment(figment: &Figment) -> Result<Self, rocket::figment::Error> {
        figment.extract()
    }

    /// URL of the ledger node's JSON-RPC endpoint.
    pub fn rpc_url(&self) -> &str {
        &self.ledger_rpc_url
    }

    /// Timeout for each request to the ledger node, in seconds.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.ledger_request_timeout)
    }

    /// How long to wait for a transaction to be mined, in seconds.
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.ledger_confirmation_timeout)
    }

    /// How often to poll for a receipt, in milliseconds.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.ledger_poll_interval)
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.ledger_failure_policy
    }

    /// The deployed voting system, if it has been deployed.
    pub fn contracts(&self) -> Option<ContractAddressBundle> {
        self.contracts
    }

    pub fn confirmation(&self) -> Confirmation {
        Confirmation {
            timeout: self.confirmation_timeout(),
            poll_interval: self.poll_interval(),
        }
    }

    /// Connect to the ledger node as the configured signer.
    pub async fn connect(&self) -> Result<Arc<LedgerWallet>, LedgerSetupError> {
        let ledger: Arc<dyn Ledger> =
            Arc::new(RpcLedger::new(self.rpc_url(), self.request_timeout())?);
        let wallet = LedgerWallet::connect(
            &self.ledger_private_key,
            ledger.clone(),
            ledger,
            self.confirmation(),
        )
        .await?;
        Ok(Arc::new(wallet))
    }

    /// Custodial voter wallets sharing the signer's connection.
    pub fn keyring(&self, wallet: &LedgerWallet) -> Result<Keyring, WalletError> {
        Keyring::load(wallet, &self.voter_keys)
    }

    /// Connect to the ledger and construct the voting system and relay.
    pub async fn voting_system(&self) -> Result<(Arc<VotingSystem>, VoteRelay), LedgerSetupError> {
        let contracts = self.contracts.ok_or(LedgerSetupError::MissingContracts)?;
        let wallet = self.connect().await?;
        let keyring = self.keyring(&wallet)?;
        let voting_system = Arc::new(VotingSystem::new(wallet, contracts));
        let relay = VoteRelay::new(voting_system.clone(), keyring, self.failure_policy());
        Ok((voting_system, relay))
    }
}

/// A fairing that loads the ledger config, connects to the ledger node, and
/// places the voting system and vote relay into managed state.
pub struct LedgerFairing;

#[rocket::async_trait]
impl Fairing for LedgerFairing {
    fn info(&self) -> Info {
        Info {
            name: "Ledger",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match LedgerConfig::from_figment(rocket.figment()) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load ledger config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Loaded ledger config, connecting to {}...", config.rpc_url());
        // Construct the connection.
        let (voting_system, relay) = match config.voting_system().await {
            Ok(state) => state,
            Err(e) => {
                error!("Failed to connect to ledger: {e}");
                return Err(rocket);
            }
        };
        info!(
            "...ledger connection online, relaying for {} voter account(s)",
            relay.voters()
        );

        // Manage the state.
        rocket = rocket.manage(voting_system).manage(relay);
        Ok(rocket)
    }
}
