use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::ledger::{
    abi, primitives::from_hex, primitives::HexError, Address, LedgerError, ParamType, Token,
};
use crate::model::ContractAddressBundle;
use crate::voting_system::contracts::constructors;
use crate::wallet::LedgerWallet;

/// The contracts making up a voting system.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ContractKind {
    VoterRegistry,
    CandidateRegistry,
    PartyRegistry,
    VotingSystem,
}

impl ContractKind {
    /// Each contract only depends on contracts before it.
    pub const DEPLOY_ORDER: [ContractKind; 4] = [
        Self::VoterRegistry,
        Self::CandidateRegistry,
        Self::PartyRegistry,
        Self::VotingSystem,
    ];

    /// Contract name, as used for compiler artifacts.
    pub fn name(self) -> &'static str {
        match self {
            Self::VoterRegistry => "VoterRegistry",
            Self::CandidateRegistry => "CandidateRegistry",
            Self::PartyRegistry => "Party",
            Self::VotingSystem => "VotingSystem",
        }
    }

    pub fn constructor(self) -> &'static [ParamType] {
        match self {
            Self::VotingSystem => constructors::VOTING_SYSTEM,
            _ => constructors::REGISTRY,
        }
    }
}

impl Display for ContractKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Failed to read artifact {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse artifact {path}: {source}")]
    Json {
        path: PathBuf,
        source: rocket::serde::json::serde_json::Error,
    },
    #[error("Bad bytecode in artifact {path}: {source}")]
    Bytecode { path: PathBuf, source: HexError },
    #[error("Artifact {0} has no bytecode; is the contract abstract?")]
    Empty(PathBuf),
}

/// The `bytecode` field of a compiler artifact, in Foundry or Hardhat layout.
#[derive(Deserialize)]
#[serde(untagged)]
enum BytecodeField {
    Foundry { object: String },
    Hardhat(String),
}

#[derive(Deserialize)]
struct ArtifactFile {
    bytecode: BytecodeField,
}

/// Creation bytecode of every contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractArtifacts {
    voter_registry: Vec<u8>,
    candidate_registry: Vec<u8>,
    party_registry: Vec<u8>,
    voting_system: Vec<u8>,
}

impl ContractArtifacts {
    pub fn from_fn(mut bytecode: impl FnMut(ContractKind) -> Vec<u8>) -> Self {
        Self {
            voter_registry: bytecode(ContractKind::VoterRegistry),
            candidate_registry: bytecode(ContractKind::CandidateRegistry),
            party_registry: bytecode(ContractKind::PartyRegistry),
            voting_system: bytecode(ContractKind::VotingSystem),
        }
    }

    /// Load artifacts from a compiler output directory, accepting both
    /// `<dir>/<Name>.sol/<Name>.json` and `<dir>/<Name>.json`.
    pub fn load(dir: &Path) -> Result<Self, ArtifactError> {
        Ok(Self {
            voter_registry: load_artifact(dir, ContractKind::VoterRegistry)?,
            candidate_registry: load_artifact(dir, ContractKind::CandidateRegistry)?,
            party_registry: load_artifact(dir, ContractKind::PartyRegistry)?,
            voting_system: load_artifact(dir, ContractKind::VotingSystem)?,
        })
    }

    pub fn bytecode(&self, kind: ContractKind) -> &[u8] {
        match kind {
            ContractKind::VoterRegistry => &self.voter_registry,
            ContractKind::CandidateRegistry => &self.candidate_registry,
            ContractKind::PartyRegistry => &self.party_registry,
            ContractKind::VotingSystem => &self.voting_system,
        }
    }
}

fn load_artifact(dir: &Path, kind: ContractKind) -> Result<Vec<u8>, ArtifactError> {
    let name = kind.name();
    let nested = dir.join(format!("{name}.sol")).join(format!("{name}.json"));
    let path = if nested.exists() {
        nested
    } else {
        dir.join(format!("{name}.json"))
    };
    let text = std::fs::read_to_string(&path).map_err(|source| ArtifactError::Io {
        path: path.clone(),
        source,
    })?;
    let artifact: ArtifactFile =
        rocket::serde::json::from_str(&text).map_err(|source| ArtifactError::Json {
            path: path.clone(),
            source,
        })?;
    let hex = match artifact.bytecode {
        BytecodeField::Foundry { object } => object,
        BytecodeField::Hardhat(hex) => hex,
    };
    let bytecode = from_hex(&hex).map_err(|source| ArtifactError::Bytecode {
        path: path.clone(),
        source,
    })?;
    if bytecode.is_empty() {
        return Err(ArtifactError::Empty(path));
    }
    Ok(bytecode)
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("Deployer account {0} cannot pay for deployment")]
    InvalidDeployerAccount(Address),
    #[error("Deployment of {contract} failed: {reason}")]
    DeploymentFailed {
        contract: ContractKind,
        reason: String,
    },
    #[error("Unexpected failure deploying {contract}: {source}")]
    Unknown {
        contract: ContractKind,
        source: LedgerError,
    },
}

/// Deploys voting systems from a single wallet.
pub struct ContractDeployer {
    wallet: Arc<LedgerWallet>,
}

impl ContractDeployer {
    pub fn new(wallet: Arc<LedgerWallet>) -> Self {
        Self { wallet }
    }

    /// Deploy one contract and wait for it to be mined.
    pub async fn deploy_contract(
        &self,
        contract: ContractKind,
        bytecode: &[u8],
        args: &[Token],
    ) -> Result<Address, DeployError> {
        let unknown = |source| DeployError::Unknown { contract, source };
        let mut data = bytecode.to_vec();
        data.extend(abi::encode(args));

        info!("Deploying {contract} from {}", self.wallet.address());
        let _turn = self.wallet.begin_write().await;
        let hash = match self.wallet.send(None, data).await {
            Ok(hash) => hash,
            Err(LedgerError::Reverted { .. }) => {
                return Err(DeployError::DeploymentFailed {
                    contract,
                    reason: "constructor reverted".to_string(),
                })
            }
            Err(e) => return Err(unknown(e)),
        };
        let receipt = self.wallet.wait_for_receipt(hash).await.map_err(unknown)?;
        match receipt.contract_address {
            Some(address) if receipt.succeeded => {
                info!("Deployed {contract} at {address}");
                Ok(address)
            }
            _ => Err(DeployError::DeploymentFailed {
                contract,
                reason: format!("transaction {hash} created no contract"),
            }),
        }
    }

    /// Deploy a complete voting system. Stops at the first failure; contracts
    /// deployed before it are left orphaned on the ledger.
    pub async fn deploy_system(
        &self,
        artifacts: &ContractArtifacts,
    ) -> Result<ContractAddressBundle, DeployError> {
        self.check_account().await?;
        let mut pipeline = Pipeline {
            deployer: self,
            artifacts,
            deployed: Vec::new(),
        };

        let voter_registry = pipeline.stage(ContractKind::VoterRegistry, &[]).await?;
        let candidate_registry = pipeline.stage(ContractKind::CandidateRegistry, &[]).await?;
        let party_registry = pipeline.stage(ContractKind::PartyRegistry, &[]).await?;
        let voting_system = pipeline
            .stage(
                ContractKind::VotingSystem,
                &[
                    Token::Address(voter_registry),
                    Token::Address(candidate_registry),
                    Token::Address(party_registry),
                ],
            )
            .await?;

        Ok(ContractAddressBundle {
            voting_system,
            voter_registry,
            candidate_registry,
            party_registry,
        })
    }

    async fn check_account(&self) -> Result<(), DeployError> {
        let address = self.wallet.address();
        let balance = self
            .wallet
            .balance()
            .await
            .map_err(|source| DeployError::Unknown {
                contract: ContractKind::DEPLOY_ORDER[0],
                source,
            })?;
        if balance == 0 {
            error!("Deployer account {address} has no funds");
            return Err(DeployError::InvalidDeployerAccount(address));
        }
        Ok(())
    }
}

/// Tracks progress through [`ContractDeployer::deploy_system`].
struct Pipeline<'a> {
    deployer: &'a ContractDeployer,
    artifacts: &'a ContractArtifacts,
    deployed: Vec<(ContractKind, Address)>,
}

impl Pipeline<'_> {
    async fn stage(&mut self, contract: ContractKind, args: &[Token]) -> Result<Address, DeployError> {
        let result = self
            .deployer
            .deploy_contract(contract, self.artifacts.bytecode(contract), args)
            .await;
        match result {
            Ok(address) => {
                self.deployed.push((contract, address));
                Ok(address)
            }
            Err(e) => {
                error!("{e}");
                for (orphan, address) in &self.deployed {
                    warn!("{orphan} at {address} is orphaned by the failed deployment");
                }
                Err(e)
            }
        }
    }
}
