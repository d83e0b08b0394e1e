//! Request logging. Each request gets a [`RequestLog`] in its local cache.
//! Handlers note which batch they are relaying and error responders note how
//! the request failed, so the single response line says both.

use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use rocket::{
    fairing::{Fairing, Info, Kind},
    http::StatusClass,
    request::{FromRequest, Outcome},
    Data, Orbit, Request, Response, Rocket,
};

use crate::ledger::Address;
use crate::model::ElectionId;
use crate::relay::VoteRelay;
use crate::voting_system::VotingSystem;

/// What is known about one request, beyond its method and URI.
#[derive(Debug)]
pub struct RequestLog {
    id: u64,
    relaying: OnceLock<String>,
    failure: OnceLock<String>,
}

impl RequestLog {
    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(0);
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            relaying: OnceLock::new(),
            failure: OnceLock::new(),
        }
    }

    /// The log of the given request, created on first access.
    pub fn of<'r>(req: &'r Request<'_>) -> &'r Self {
        req.local_cache(Self::next)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Note the batch this request relays. Only the first note is kept.
    pub fn relaying(&self, voter: Address, election_id: ElectionId, selections: usize) {
        let _ = self
            .relaying
            .set(format!("{voter} in election {election_id}, {selections} selection(s)"));
    }

    /// Note how this request failed, e.g. an error kind or code.
    pub fn failed(&self, failure: impl Display) {
        let _ = self.failure.set(failure.to_string());
    }
}

impl Display for RequestLog {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(relaying) = self.relaying.get() {
            write!(f, " relaying {relaying}")?;
        }
        if let Some(failure) = self.failure.get() {
            write!(f, " failed with {failure}")?;
        }
        Ok(())
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for &'r RequestLog {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(RequestLog::of(req))
    }
}

/// Logs launch, every request and response, and shutdown.
#[derive(Debug, Copy, Clone)]
pub struct LoggerFairing;

#[rocket::async_trait]
impl Fairing for LoggerFairing {
    fn info(&self) -> Info {
        Info {
            name: "Logger",
            kind: Kind::Liftoff | Kind::Request | Kind::Response | Kind::Shutdown,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        let config = rocket.config();
        let protocol = if config.tls_enabled() { "https" } else { "http" };
        info!(
            "Server launched on {protocol}://{}:{}",
            config.address, config.port
        );
        if let Some(voting_system) = rocket.state::<Arc<VotingSystem>>() {
            info!(
                "Administering voting system {} as {}",
                voting_system.contracts().voting_system,
                voting_system.signer()
            );
        }
        if let Some(relay) = rocket.state::<VoteRelay>() {
            info!(
                "Relaying votes for {} custodial account(s) under the {} policy",
                relay.voters(),
                relay.policy()
            );
        }
    }

    async fn on_request(&self, req: &mut Request<'_>, _data: &mut Data<'_>) {
        let log = RequestLog::of(req);
        info!("->req{} {} {}", log.id(), req.method(), req.uri());
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        let log = RequestLog::of(req);
        let status = res.status();
        let route = match req.route() {
            Some(route) => match &route.name {
                Some(name) => format!("{name} ({})", route.uri),
                None => route.uri.to_string(),
            },
            None => "no route".to_string(),
        };
        let line = format!("<-rsp{} {status} {route}{log}", log.id());
        match status.class() {
            StatusClass::ServerError => error!("{line}"),
            StatusClass::ClientError => warn!("{line}"),
            _ => info!("{line}"),
        }
    }

    async fn on_shutdown(&self, _rocket: &Rocket<Orbit>) {
        warn!("Shutdown requested, finishing in-flight relays...");
    }
}
