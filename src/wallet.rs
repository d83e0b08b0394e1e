use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use k256::ecdsa::SigningKey;
use rocket::tokio::{
    sync::{Mutex, MutexGuard},
    time,
};
use thiserror::Error;

use crate::ledger::{
    primitives::from_hex, transaction::address_of, Address, CallRequest, Ledger, LedgerError,
    Receipt, TransactionRequest, TxHash,
};

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("No signing key configured")]
    MissingKey,
    #[error("Invalid signing key: {0}")]
    InvalidKey(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// How long to wait for transactions to be mined, and how often to check.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

/// Parse a hex-encoded secp256k1 secret key.
pub fn parse_key(text: &str) -> Result<SigningKey, WalletError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(WalletError::MissingKey);
    }
    let bytes = from_hex(text).map_err(|e| WalletError::InvalidKey(e.to_string()))?;
    if bytes.len() != 32 {
        return Err(WalletError::InvalidKey(format!(
            "expected 32 bytes, found {}",
            bytes.len()
        )));
    }
    SigningKey::from_slice(&bytes).map_err(|_| WalletError::InvalidKey("out of range".to_string()))
}

/// A single ledger account: its signing key, clients for reading and writing,
/// and the account's nonce sequence. Every write from the account must go
/// through the same wallet so that nonces are never reused.
///
/// A write that depends on the state it simulated against holds
/// [`Self::begin_write`] until its receipt arrives, so writes from one wallet
/// never interleave. Writes from other accounts still can; a transaction that
/// reverts on chain is explained by [`Self::replay`].
pub struct LedgerWallet {
    key: SigningKey,
    address: Address,
    chain_id: u64,
    reader: Arc<dyn Ledger>,
    writer: Arc<dyn Ledger>,
    confirmation: Confirmation,
    /// The next nonce to use, if known. The lock is held from nonce
    /// assignment until broadcast, which queues writers in FIFO order.
    next_nonce: Mutex<Option<u64>>,
    /// Held from simulation until confirmation of a write.
    writes: Mutex<()>,
}

impl LedgerWallet {
    pub fn new(
        private_key: &str,
        chain_id: u64,
        reader: Arc<dyn Ledger>,
        writer: Arc<dyn Ledger>,
        confirmation: Confirmation,
    ) -> Result<Self, WalletError> {
        let key = parse_key(private_key)?;
        Ok(Self {
            address: address_of(&key),
            key,
            chain_id,
            reader,
            writer,
            confirmation,
            next_nonce: Mutex::new(None),
            writes: Mutex::new(()),
        })
    }

    /// Construct a wallet, asking the ledger for its chain ID.
    pub async fn connect(
        private_key: &str,
        reader: Arc<dyn Ledger>,
        writer: Arc<dyn Ledger>,
        confirmation: Confirmation,
    ) -> Result<Self, WalletError> {
        // Reject a bad key before touching the network.
        parse_key(private_key)?;
        let chain_id = reader.chain_id().await?;
        Self::new(private_key, chain_id, reader, writer, confirmation)
    }

    /// A wallet for another account on the same ledger.
    pub fn sibling(&self, private_key: &str) -> Result<Self, WalletError> {
        Self::new(
            private_key,
            self.chain_id,
            self.reader.clone(),
            self.writer.clone(),
            self.confirmation,
        )
    }

    /// The signing account's address.
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub async fn balance(&self) -> Result<u128, LedgerError> {
        self.reader.balance(self.address).await
    }

    /// Timestamp of the latest block, in seconds since the Unix epoch.
    pub async fn block_time(&self) -> Result<u64, LedgerError> {
        self.reader.block_time().await
    }

    /// Execute a read-only call as this account.
    pub async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>, LedgerError> {
        self.reader
            .call(&CallRequest {
                from: Some(self.address),
                to: Some(to),
                data,
            })
            .await
    }

    /// Take the account's write turn. Writers queue in FIFO order; the turn
    /// ends when the guard is dropped.
    pub async fn begin_write(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().await
    }

    /// Re-execute a mined transaction's call against the state it ran
    /// against, to recover why it reverted.
    pub async fn replay(
        &self,
        to: Option<Address>,
        data: Vec<u8>,
        receipt: &Receipt,
    ) -> Result<Vec<u8>, LedgerError> {
        let request = CallRequest {
            from: Some(self.address),
            to,
            data,
        };
        self.reader
            .call_at(&request, receipt.block_number.saturating_sub(1))
            .await
    }

    /// Sign and broadcast a transaction; `to: None` deploys a contract.
    /// Fails with [`LedgerError::Reverted`] without broadcasting if the
    /// transaction would revert.
    pub async fn send(&self, to: Option<Address>, data: Vec<u8>) -> Result<TxHash, LedgerError> {
        let mut next_nonce = self.next_nonce.lock().await;
        let result = self.sign_and_send(&mut next_nonce, to, data).await;
        if result.is_err() {
            // The node's view of our nonce is authoritative after any failure.
            *next_nonce = None;
        }
        result
    }

    async fn sign_and_send(
        &self,
        next_nonce: &mut Option<u64>,
        to: Option<Address>,
        data: Vec<u8>,
    ) -> Result<TxHash, LedgerError> {
        let call = CallRequest {
            from: Some(self.address),
            to,
            data,
        };
        let gas = self.writer.estimate_gas(&call).await?;
        let gas_price = self.writer.gas_price().await?;
        let nonce = match *next_nonce {
            Some(nonce) => nonce,
            None => self.writer.nonce(self.address).await?,
        };
        let transaction = TransactionRequest {
            nonce,
            gas_price,
            gas_limit: gas.saturating_add(gas / 5),
            to: call.to,
            value: 0,
            data: call.data,
            chain_id: self.chain_id,
        }
        .sign(&self.key)?;
        let hash = self.writer.send_transaction(&transaction).await?;
        debug!("{} sent transaction {hash} with nonce {nonce}", self.address);
        *next_nonce = Some(nonce + 1);
        Ok(hash)
    }

    /// Wait until the transaction is mined, up to the configured timeout.
    pub async fn wait_for_receipt(&self, hash: TxHash) -> Result<Receipt, LedgerError> {
        let timeout = self.confirmation.timeout;
        match time::timeout(timeout, self.poll_receipt(hash)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Transaction {hash} not confirmed after {timeout:?}");
                Err(LedgerError::ConfirmationTimeout { hash, timeout })
            }
        }
    }

    async fn poll_receipt(&self, hash: TxHash) -> Result<Receipt, LedgerError> {
        loop {
            if let Some(receipt) = self.reader.receipt(hash).await? {
                return Ok(receipt);
            }
            time::sleep(self.confirmation.poll_interval).await;
        }
    }
}

/// Custodial voter accounts, looked up by address.
#[derive(Clone, Default)]
pub struct Keyring {
    wallets: HashMap<Address, Arc<LedgerWallet>>,
}

impl Keyring {
    /// Build wallets for every key, sharing the clients of `base`.
    pub fn load(base: &LedgerWallet, keys: &[String]) -> Result<Self, WalletError> {
        let mut keyring = Self::default();
        for key in keys {
            keyring.insert(Arc::new(base.sibling(key)?));
        }
        Ok(keyring)
    }

    pub fn insert(&mut self, wallet: Arc<LedgerWallet>) {
        self.wallets.insert(wallet.address(), wallet);
    }

    pub fn get(&self, account: &Address) -> Option<Arc<LedgerWallet>> {
        self.wallets.get(account).cloned()
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }
}
