//! A CLI tool for deploying and administering a voting system.
//! It reads the same configuration as the server (`Rocket.toml` and
//! `ROCKET_*` environment variables) and signs with `ledger_private_key`.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use k256::ecdsa::SigningKey;
use log::{error, info};
use thiserror::Error;

use chainvote_backend::config::{LedgerConfig, LedgerSetupError};
use chainvote_backend::deployer::{ArtifactError, ContractArtifacts, ContractDeployer, DeployError};
use chainvote_backend::ledger::{primitives::to_hex, transaction::address_of, Address};
use chainvote_backend::model::{CandidateSpec, ElectionSpec, PartySpec};
use chainvote_backend::voting_system::{VotingSystem, VotingSystemError};

const PROGRAM_NAME: &str = "chainvote-admin";

const ABOUT_TEXT: &str = "Deploy and administer a ledger voting system.

EXIT CODES:
     0: Success.
     1: Error.";

const GENERATE_KEY: &str = "generate-key";
const DEPLOY: &str = "deploy";
const REGISTER_VOTER: &str = "register-voter";
const REGISTER_PARTY: &str = "register-party";
const REGISTER_CANDIDATE: &str = "register-candidate";
const CREATE_ELECTION: &str = "create-election";
const START_ELECTION: &str = "start-election";
const END_ELECTION: &str = "end-election";
const STATUS: &str = "status";
const RESULTS: &str = "results";

const ARTIFACTS: &str = "artifacts";
const ADDRESS: &str = "address";
const ELECTION_ID: &str = "election-id";
const NAME: &str = "name";
const SLOGAN: &str = "slogan";
const POSITION: &str = "position";
const DESCRIPTION: &str = "description";
const CID: &str = "cid";
const PARTY: &str = "party";
const START: &str = "start";
const END: &str = "end";

fn parse_time(text: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(text)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}

fn election_id_arg() -> Arg {
    Arg::new(ELECTION_ID)
        .help("The election to act on")
        .value_parser(value_parser!(u64))
        .action(ArgAction::Set)
        .required(true)
}

fn text_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .help(help)
        .action(ArgAction::Set)
        .required(true)
}

/// Construct the CLI configuration.
fn cli() -> Command {
    // Make the build dirty when the toml changes.
    include_str!("../Cargo.toml");

    clap::command!(PROGRAM_NAME)
        .about(ABOUT_TEXT)
        .subcommand_required(true)
        .subcommand(Command::new(GENERATE_KEY).about("Print a new private key and its address"))
        .subcommand(
            Command::new(DEPLOY)
                .about("Deploy a new voting system and print its contract addresses")
                .arg(
                    Arg::new(ARTIFACTS)
                        .long(ARTIFACTS)
                        .help("Directory of compiled contract artifacts")
                        .value_parser(value_parser!(PathBuf))
                        .action(ArgAction::Set)
                        .required(true),
                ),
        )
        .subcommand(
            Command::new(REGISTER_VOTER)
                .about("Verify a voter account")
                .arg(
                    Arg::new(ADDRESS)
                        .help("The voter's account address")
                        .value_parser(value_parser!(Address))
                        .action(ArgAction::Set)
                        .required(true),
                ),
        )
        .subcommand(
            Command::new(REGISTER_PARTY)
                .about("Register a party")
                .arg(text_arg(NAME, "Party name"))
                .arg(text_arg(SLOGAN, "Party slogan"))
                .arg(text_arg(CID, "Content identifier of the party's metadata")),
        )
        .subcommand(
            Command::new(REGISTER_CANDIDATE)
                .about("Register a candidate")
                .arg(text_arg(NAME, "Candidate name"))
                .arg(text_arg(POSITION, "Position the candidate stands for"))
                .arg(text_arg(CID, "Content identifier of the candidate's metadata"))
                .arg(
                    Arg::new(PARTY)
                        .long(PARTY)
                        .help("The candidate's party; omit for an independent")
                        .value_parser(value_parser!(u64))
                        .action(ArgAction::Set),
                ),
        )
        .subcommand(
            Command::new(CREATE_ELECTION)
                .about("Create an election")
                .arg(text_arg(NAME, "Election name"))
                .arg(text_arg(DESCRIPTION, "Election description"))
                .arg(text_arg(CID, "Content identifier of the election's metadata")),
        )
        .subcommand(
            Command::new(START_ELECTION)
                .about("Schedule the voting period of a pending election")
                .arg(election_id_arg())
                .arg(
                    text_arg(START, "Start of voting (RFC 3339)")
                        .value_parser(parse_time),
                )
                .arg(text_arg(END, "End of voting (RFC 3339)").value_parser(parse_time)),
        )
        .subcommand(
            Command::new(END_ELECTION)
                .about("End an active election")
                .arg(election_id_arg()),
        )
        .subcommand(
            Command::new(STATUS)
                .about("Show an election")
                .arg(election_id_arg()),
        )
        .subcommand(
            Command::new(RESULTS)
                .about("Show an election's results")
                .arg(election_id_arg()),
        )
}

/// Errors that this program may produce.
#[derive(Debug, Error)]
enum Error {
    #[error("Invalid configuration: {0}")]
    Config(#[from] rocket::figment::Error),
    #[error(transparent)]
    Setup(#[from] LedgerSetupError),
    #[error(transparent)]
    Artifacts(#[from] ArtifactError),
    #[error(transparent)]
    Deploy(#[from] DeployError),
    #[error(transparent)]
    VotingSystem(#[from] VotingSystemError),
    #[error("Missing argument `{0}`")]
    MissingArgument(&'static str),
}

fn arg<'a, T: Clone + Send + Sync + 'static>(
    args: &'a ArgMatches,
    name: &'static str,
) -> Result<&'a T, Error> {
    args.get_one(name).ok_or(Error::MissingArgument(name))
}

fn text(args: &ArgMatches, name: &'static str) -> Result<String, Error> {
    arg::<String>(args, name).cloned()
}

async fn connect(config: &LedgerConfig) -> Result<VotingSystem, Error> {
    let contracts = config
        .contracts()
        .ok_or(LedgerSetupError::MissingContracts)?;
    let wallet = config.connect().await.map_err(Error::Setup)?;
    Ok(VotingSystem::new(wallet, contracts))
}

/// Print a fresh key, which needs no ledger connection.
fn generate_key() {
    let key = SigningKey::random(&mut rand::thread_rng());
    println!("private key: {}", to_hex(key.to_bytes()));
    println!("address:     {}", address_of(&key));
}

async fn execute(args: &ArgMatches) -> Result<(), Error> {
    let (command, args) = match args.subcommand() {
        Some((GENERATE_KEY, _)) => {
            generate_key();
            return Ok(());
        }
        Some(subcommand) => subcommand,
        None => return Err(Error::MissingArgument("command")),
    };

    let config = LedgerConfig::from_figment(&rocket::Config::figment())?;
    info!("Using ledger at {}", config.rpc_url());

    if command == DEPLOY {
        let artifacts = ContractArtifacts::load(arg::<PathBuf>(args, ARTIFACTS)?)?;
        let wallet = config.connect().await?;
        let contracts = ContractDeployer::new(wallet)
            .deploy_system(&artifacts)
            .await?;
        println!("[default.contracts]");
        println!("voting_system = \"{}\"", contracts.voting_system);
        println!("voter_registry = \"{}\"", contracts.voter_registry);
        println!("candidate_registry = \"{}\"", contracts.candidate_registry);
        println!("party_registry = \"{}\"", contracts.party_registry);
        return Ok(());
    }

    let voting_system = connect(&config).await?;
    match command {
        REGISTER_VOTER => {
            let voter = *arg::<Address>(args, ADDRESS)?;
            voting_system.register_voter(voter).await?;
            println!("Registered voter {voter}");
        }
        REGISTER_PARTY => {
            let party = PartySpec {
                name: text(args, NAME)?,
                slogan: text(args, SLOGAN)?,
                cid: text(args, CID)?,
            };
            let id = voting_system.register_party(&party).await?;
            let address = voting_system.party_address(id).await?;
            println!("Registered party {id} at {address}");
        }
        REGISTER_CANDIDATE => {
            let candidate = CandidateSpec {
                name: text(args, NAME)?,
                position: text(args, POSITION)?,
                cid: text(args, CID)?,
                party_id: args.get_one::<u64>(PARTY).copied(),
            };
            let id = voting_system.register_candidate(&candidate).await?;
            println!("Registered candidate {id}");
        }
        CREATE_ELECTION => {
            let election = ElectionSpec {
                name: text(args, NAME)?,
                description: text(args, DESCRIPTION)?,
                cid: text(args, CID)?,
            };
            let id = voting_system.create_election(&election).await?;
            println!("Created election {id}");
        }
        START_ELECTION => {
            let id = *arg::<u64>(args, ELECTION_ID)?;
            let start = *arg::<DateTime<Utc>>(args, START)?;
            let end = *arg::<DateTime<Utc>>(args, END)?;
            voting_system.start_election(id, start, end).await?;
            println!("Election {id} runs from {start} to {end}");
        }
        END_ELECTION => {
            let id = *arg::<u64>(args, ELECTION_ID)?;
            voting_system.end_election(id).await?;
            println!("Ended election {id}");
        }
        STATUS => {
            let election = voting_system
                .get_election(*arg::<u64>(args, ELECTION_ID)?)
                .await?;
            println!("{} ({}) at {}", election.name, election.id, election.address);
            println!("  {}", election.description);
            println!("  status: {:?}", election.status);
            if let (Some(start), Some(end)) = (election.start_time, election.end_time) {
                println!("  voting: {start} to {end}");
            }
        }
        RESULTS => {
            let results = voting_system
                .get_election_results(*arg::<u64>(args, ELECTION_ID)?)
                .await?;
            for tally in &results.tallies {
                println!(
                    "candidate {} ({}): {}",
                    tally.candidate_id, tally.party, tally.vote_count
                );
            }
            println!("total: {}", results.total_votes());
        }
        _ => return Err(Error::MissingArgument("command")),
    }
    Ok(())
}

/// Run the command, report any failure, and return the exit code.
async fn run(args: &ArgMatches) -> u8 {
    match execute(args).await {
        Ok(()) => 0,
        Err(e) => {
            error!("{e}");
            println!("Error: {e}");
            1
        }
    }
}

#[rocket::main]
async fn main() {
    // Logging is optional for the tool; carry on without it.
    if let Err(e) = log4rs::init_file("log4rs.yaml", log4rs_dynamic_filters::default_deserializers())
    {
        eprintln!("Logging disabled: {e}");
    }
    let args = cli().get_matches();
    let exit_code = run(&args).await;
    std::process::exit(exit_code.into())
}
