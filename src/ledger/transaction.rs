use k256::ecdsa::SigningKey;

use super::primitives::{keccak256, Address, TxHash};
use super::LedgerError;

/// Recursive length prefix encoding of a byte string.
fn rlp_bytes(bytes: &[u8]) -> Vec<u8> {
    match bytes {
        [single] if *single < 0x80 => vec![*single],
        _ => {
            let mut out = rlp_length(bytes.len(), 0x80);
            out.extend_from_slice(bytes);
            out
        }
    }
}

/// Recursive length prefix encoding of a list of already-encoded items.
fn rlp_list(items: &[Vec<u8>]) -> Vec<u8> {
    let payload: Vec<u8> = items.concat();
    let mut out = rlp_length(payload.len(), 0xc0);
    out.extend(payload);
    out
}

fn rlp_length(len: usize, offset: u8) -> Vec<u8> {
    if len <= 55 {
        vec![offset + len as u8]
    } else {
        let len_bytes = trim_leading_zeros(&len.to_be_bytes()).to_vec();
        let mut out = vec![offset + 55 + len_bytes.len() as u8];
        out.extend(len_bytes);
        out
    }
}

fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[first..]
}

fn rlp_uint(value: u128) -> Vec<u8> {
    rlp_bytes(trim_leading_zeros(&value.to_be_bytes()))
}

/// The address a contract created by `sender` with the given nonce lands at.
pub fn contract_address(sender: Address, nonce: u64) -> Address {
    let encoded = rlp_list(&[rlp_bytes(sender.as_bytes()), rlp_uint(nonce.into())]);
    let hash = keccak256(encoded);
    let mut address = [0; 20];
    address.copy_from_slice(&hash[12..]);
    Address(address)
}

/// The account controlled by a signing key.
pub fn address_of(key: &SigningKey) -> Address {
    Address::from_public_key(key.verifying_key().to_encoded_point(false).as_bytes())
}

/// An unsigned legacy transaction with EIP-155 replay protection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    /// `None` deploys a contract.
    pub to: Option<Address>,
    pub value: u128,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

impl TransactionRequest {
    fn fields(&self) -> Vec<Vec<u8>> {
        vec![
            rlp_uint(self.nonce.into()),
            rlp_uint(self.gas_price),
            rlp_uint(self.gas_limit.into()),
            rlp_bytes(self.to.as_ref().map(Address::as_bytes).unwrap_or_default()),
            rlp_uint(self.value),
            rlp_bytes(&self.data),
        ]
    }

    /// The digest that gets signed.
    pub fn signing_hash(&self) -> [u8; 32] {
        let mut fields = self.fields();
        fields.extend([rlp_uint(self.chain_id.into()), rlp_uint(0), rlp_uint(0)]);
        keccak256(rlp_list(&fields))
    }

    pub fn sign(self, key: &SigningKey) -> Result<SignedTransaction, LedgerError> {
        let (signature, recovery_id) = key
            .sign_prehash_recoverable(&self.signing_hash())
            .map_err(|e| LedgerError::Signing(e.to_string()))?;
        let (r, s) = signature.split_bytes();
        let v = u128::from(recovery_id.to_byte()) + u128::from(self.chain_id) * 2 + 35;

        let mut fields = self.fields();
        fields.extend([
            rlp_uint(v),
            rlp_bytes(trim_leading_zeros(&r)),
            rlp_bytes(trim_leading_zeros(&s)),
        ]);
        let raw = rlp_list(&fields);

        Ok(SignedTransaction {
            hash: TxHash(keccak256(&raw)),
            raw,
            from: address_of(key),
            request: self,
        })
    }
}

/// A transaction ready for broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub hash: TxHash,
    /// RLP-encoded signed transaction, as accepted by `eth_sendRawTransaction`.
    pub raw: Vec<u8>,
    pub from: Address,
    pub request: TransactionRequest,
}
