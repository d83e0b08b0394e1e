use std::str::FromStr;

use rocket::{request::FromParam, Route};

use crate::ledger::{primitives::HexError, Address};

mod public;
mod voting;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(public::routes());
    routes.extend(voting::routes());
    routes
}

/// Allow addresses as dynamic path segments.
impl<'a> FromParam<'a> for Address {
    type Error = HexError;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        Address::from_str(param)
    }
}
