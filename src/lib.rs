#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate ledger_test;

use rocket::{Build, Rocket};

use crate::config::{ConfigFairing, LedgerFairing};
use crate::logging::LoggerFairing;

pub mod api;
pub mod config;
pub mod deployer;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod model;
pub mod relay;
pub mod voting_system;
pub mod wallet;

#[cfg(test)]
pub mod testing;

/// Build the server, connecting to the ledger configured in the figment
/// during ignition.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(ConfigFairing)
        .attach(LedgerFairing)
        .attach(LoggerFairing)
}
