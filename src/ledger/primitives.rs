use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

use data_encoding::HEXLOWER_PERMISSIVE;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use thiserror::Error;

/// Keccak-256 digest of the given bytes.
pub fn keccak256(data: impl AsRef<[u8]>) -> [u8; 32] {
    Keccak256::digest(data.as_ref()).into()
}

/// Encode bytes as `0x`-prefixed lowercase hex.
pub fn to_hex(data: impl AsRef<[u8]>) -> String {
    format!("0x{}", data_encoding::HEXLOWER.encode(data.as_ref()))
}

/// Decode hex with an optional `0x` prefix. An odd number of digits is
/// left-padded with a zero, as the JSON-RPC quantity format allows.
pub fn from_hex(text: &str) -> Result<Vec<u8>, HexError> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    let result = if digits.len() % 2 == 1 {
        HEXLOWER_PERMISSIVE.decode(format!("0{digits}").as_bytes())
    } else {
        HEXLOWER_PERMISSIVE.decode(digits.as_bytes())
    };
    result.map_err(|_| HexError::InvalidDigits(text.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HexError {
    #[error("`{0}` is not valid hex")]
    InvalidDigits(String),
    #[error("expected {expected} bytes, found {found}")]
    WrongLength { expected: usize, found: usize },
}

fn fixed<const N: usize>(text: &str) -> Result<[u8; N], HexError> {
    let bytes = from_hex(text)?;
    bytes.try_into().map_err(|bytes: Vec<u8>| HexError::WrongLength {
        expected: N,
        found: bytes.len(),
    })
}

/// A 20-byte ledger account, either externally owned or a contract.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0; 20]);

    pub fn is_zero(&self) -> bool {
        self == &Self::ZERO
    }

    /// The account owning an uncompressed SEC1 public key (`0x04 || x || y`).
    pub fn from_public_key(uncompressed: &[u8]) -> Self {
        let hash = keccak256(&uncompressed[1..]);
        let mut address = [0; 20];
        address.copy_from_slice(&hash[12..]);
        Self(address)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for Address {
    type Err = HexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        fixed(s).map(Self)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&to_hex(self.0))
    }
}

impl Debug for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Address({self})")
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

/// Hash identifying a broadcast transaction.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct TxHash(pub [u8; 32]);

impl FromStr for TxHash {
    type Err = HexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        fixed(s).map(Self)
    }
}

impl Display for TxHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&to_hex(self.0))
    }
}

impl Debug for TxHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "TxHash({self})")
    }
}

impl Serialize for TxHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}
