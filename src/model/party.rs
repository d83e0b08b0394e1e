use serde::{Deserialize, Serialize};

use super::PartyId;
use crate::ledger::Address;

/// A party, as registered in the party registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyRecord {
    pub id: PartyId,
    pub name: String,
    pub slogan: String,
    pub cid: String,
    /// The party's own contract; votes are cast against this address.
    pub address: Address,
}

/// Details for registering or updating a party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartySpec {
    pub name: String,
    pub slogan: String,
    pub cid: String,
}
