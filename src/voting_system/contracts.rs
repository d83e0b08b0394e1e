//! Interface of the deployed voting contracts.

use crate::ledger::{Function, ParamType::*};

pub mod voter_registry {
    use super::*;

    pub const REGISTER_VOTER: Function = Function::new("registerVoter", &[Address], &[]);
    pub const IS_VOTER_REGISTERED: Function =
        Function::new("isVoterRegistered", &[Address], &[Bool]);
}

pub mod candidate_registry {
    use super::*;

    /// `(name, position, cid, partyId)`, returning the candidate id.
    pub const REGISTER_CANDIDATE: Function = Function::new(
        "registerCandidate",
        &[String, String, String, Uint],
        &[Uint],
    );
    pub const UPDATE_CANDIDATE: Function = Function::new(
        "updateCandidate",
        &[Uint, String, String, String, Uint],
        &[],
    );
    /// Returns `(id, name, position, cid, partyId)`.
    pub const GET_CANDIDATE: Function = Function::new(
        "getCandidate",
        &[Uint],
        &[Uint, String, String, String, Uint],
    );
}

pub mod party_registry {
    use super::*;

    /// `(name, slogan, cid)`, returning `(partyId, partyAddress)`.
    pub const CREATE_PARTY: Function =
        Function::new("createParty", &[String, String, String], &[Uint, Address]);
    pub const UPDATE_PARTY: Function =
        Function::new("updateParty", &[Uint, String, String, String], &[]);
    pub const GET_PARTY: Function = Function::new("getParty", &[Uint], &[Address]);
    pub const GET_PARTY_COUNT: Function = Function::new("getPartyCount", &[], &[Uint]);
}

pub mod party {
    use super::*;

    pub const NAME: Function = Function::new("name", &[], &[String]);
    pub const SLOGAN: Function = Function::new("slogan", &[], &[String]);
    pub const CID: Function = Function::new("cid", &[], &[String]);
}

/// Election registry functions. The four-contract deployment has no
/// separate registry: the voting system contract serves these, and wires
/// each election it creates to the deployment's registries.
pub mod election_registry {
    use super::*;

    /// `(name, description, cid)`, returning `(electionId, electionAddress)`.
    pub const CREATE_ELECTION: Function =
        Function::new("createElection", &[String, String, String], &[Uint, Address]);
    pub const GET_ELECTION: Function = Function::new("getElection", &[Uint], &[Address]);
    pub const GET_ELECTION_COUNT: Function = Function::new("getElectionCount", &[], &[Uint]);
}

/// One contract per election.
pub mod election {
    use super::*;

    pub const NAME: Function = Function::new("name", &[], &[String]);
    pub const DESCRIPTION: Function = Function::new("description", &[], &[String]);
    pub const CID: Function = Function::new("cid", &[], &[String]);
    pub const START_TIME: Function = Function::new("startTime", &[], &[Uint]);
    pub const END_TIME: Function = Function::new("endTime", &[], &[Uint]);
    pub const ELECTION_STARTED: Function = Function::new("electionStarted", &[], &[Bool]);
    pub const ELECTION_ENDED: Function = Function::new("electionEnded", &[], &[Bool]);
    pub const START_ELECTION: Function = Function::new("startElection", &[Uint, Uint], &[]);
    pub const END_ELECTION: Function = Function::new("endElection", &[], &[]);
    /// `(partyAddress, candidateId)`, voting as the sender.
    pub const VOTE: Function = Function::new("vote", &[Address, Uint], &[]);
    pub const HAS_VOTED: Function = Function::new("hasVoted", &[Address], &[Bool]);
    /// Returns `(parties, candidateIds[party], voteCounts[party])`.
    pub const GET_ELECTION_RESULTS: Function = Function::new(
        "getElectionResults",
        &[],
        &[
            Array(&Address),
            Array(&Array(&Uint)),
            Array(&Array(&Uint)),
        ],
    );
}

/// Constructor parameters of each deployable contract.
pub mod constructors {
    use super::*;

    pub const REGISTRY: &[crate::ledger::ParamType] = &[];
    /// `(voterRegistry, candidateRegistry, partyRegistry)`.
    pub const VOTING_SYSTEM: &[crate::ledger::ParamType] = &[Address, Address, Address];
}
