//! Everything needed to talk to the ledger: primitives, the contract ABI
//! codec, transaction signing, and the [`Ledger`] client abstraction.

use std::time::Duration;

use thiserror::Error;

pub mod abi;
#[cfg(test)]
pub mod memory;
pub mod primitives;
pub mod rpc;
pub mod transaction;

pub use abi::{AbiError, Function, ParamType, Token};
pub use primitives::{Address, TxHash};
pub use transaction::{SignedTransaction, TransactionRequest};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("ledger rejected the request ({code}): {message}")]
    Rpc { code: i64, message: String },
    #[error("execution reverted with {} bytes of revert data", .data.len())]
    Reverted { data: Vec<u8> },
    #[error("malformed ledger response: {0}")]
    Malformed(String),
    #[error(transparent)]
    Abi(#[from] AbiError),
    #[error("transaction {hash} was not confirmed within {timeout:?}")]
    ConfirmationTimeout { hash: TxHash, timeout: Duration },
    #[error("failed to sign transaction: {0}")]
    Signing(String),
}

/// A read-only invocation, as for `eth_call` and `eth_estimateGas`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Option<Address>,
    /// `None` simulates a contract deployment.
    pub to: Option<Address>,
    pub data: Vec<u8>,
}

/// The outcome of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: TxHash,
    pub block_number: u64,
    /// `false` if execution reverted.
    pub succeeded: bool,
    /// Set for successful contract deployments.
    pub contract_address: Option<Address>,
}

/// A connection to a ledger node.
#[rocket::async_trait]
pub trait Ledger: Send + Sync {
    async fn chain_id(&self) -> Result<u64, LedgerError>;

    async fn balance(&self, account: Address) -> Result<u128, LedgerError>;

    /// Number of transactions sent from the account, including pending ones.
    async fn nonce(&self, account: Address) -> Result<u64, LedgerError>;

    async fn gas_price(&self) -> Result<u128, LedgerError>;

    /// Fails with [`LedgerError::Reverted`] if the call would revert.
    async fn estimate_gas(&self, request: &CallRequest) -> Result<u64, LedgerError>;

    /// Execute a call against the latest state without creating a transaction.
    async fn call(&self, request: &CallRequest) -> Result<Vec<u8>, LedgerError>;

    /// Execute a call against the state as of the end of `block`.
    async fn call_at(&self, request: &CallRequest, block: u64) -> Result<Vec<u8>, LedgerError>;

    /// Timestamp of the latest block, in seconds since the Unix epoch.
    async fn block_time(&self) -> Result<u64, LedgerError>;

    async fn send_transaction(&self, transaction: &SignedTransaction)
        -> Result<TxHash, LedgerError>;

    /// `None` while the transaction is still pending.
    async fn receipt(&self, hash: TxHash) -> Result<Option<Receipt>, LedgerError>;
}
