use serde::{Deserialize, Serialize};

use crate::ledger::Address;

/// Addresses of a deployed voting system. Produced once by the deployer,
/// then only ever read from configuration.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractAddressBundle {
    pub voting_system: Address,
    pub voter_registry: Address,
    pub candidate_registry: Address,
    pub party_registry: Address,
}

impl ContractAddressBundle {
    /// Where elections are created and looked up: the voting system
    /// contract, which also serves the election registry functions.
    pub fn election_registry(&self) -> Address {
        self.voting_system
    }

    pub fn addresses(&self) -> [Address; 4] {
        [
            self.voting_system,
            self.voter_registry,
            self.candidate_registry,
            self.party_registry,
        ]
    }
}
