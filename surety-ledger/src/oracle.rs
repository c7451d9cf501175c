//! Oracle registry and response quorum
//!
//! Each oracle holds three distinct indexes fixed at registration. A status
//! request draws one index; only oracles holding it may answer. Responses
//! accumulate per proposed status, one contribution per oracle per request,
//! and the first status whose supporters reach the quorum resolves both the
//! request and the flight.
//!
//! Responses arriving after resolution are rejected with
//! [`Error::AlreadyFinalized`]. A repeated response from the same oracle on
//! an open request is accepted as a no-op ([`ResponseOutcome::Duplicate`]).

use crate::{
    entropy::{draw_index_triple, IndexSource},
    events::EventKind,
    flight::FlightCatalog,
    insurance::InsurancePolicyStore,
    types::{AccountId, FlightKey, FlightStatusCode, Oracle, OracleRequest, RequestKey, RequestState},
    Error, Result,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result of a `submit_oracle_response` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseOutcome {
    /// Oracle had already answered this request; nothing changed
    Duplicate,
    /// Response recorded, quorum not reached
    Recorded {
        /// Supporters of the reported status so far
        supporters: u64,
    },
    /// Response recorded and quorum reached
    Resolved {
        /// Resolved status
        status: FlightStatusCode,
    },
}

impl ResponseOutcome {
    /// Short label for metrics
    pub fn label(&self) -> &'static str {
        match self {
            ResponseOutcome::Duplicate => "duplicate",
            ResponseOutcome::Recorded { .. } => "recorded",
            ResponseOutcome::Resolved { .. } => "resolved",
        }
    }
}

/// Registered oracles and their indexes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OracleRegistry {
    oracles: BTreeMap<AccountId, Oracle>,
    fees_collected: Decimal,
}

impl OracleRegistry {
    /// Oracle by account
    pub fn get(&self, account: &AccountId) -> Option<&Oracle> {
        self.oracles.get(account)
    }

    /// Number of registered oracles
    pub fn len(&self) -> usize {
        self.oracles.len()
    }

    /// Whether no oracle is registered
    pub fn is_empty(&self) -> bool {
        self.oracles.is_empty()
    }

    /// Sum of registration fees paid
    pub fn fees_collected(&self) -> Decimal {
        self.fees_collected
    }

    /// Register an oracle paying exactly `required_fee`
    pub fn register(
        &mut self,
        account: &AccountId,
        fee: Decimal,
        required_fee: Decimal,
        source: &mut dyn IndexSource,
        index_range: u8,
        events: &mut Vec<EventKind>,
    ) -> Result<[u8; 3]> {
        if fee != required_fee {
            return Err(Error::precondition(format!(
                "oracle registration fee must be exactly {}",
                required_fee
            )));
        }
        if self.oracles.contains_key(account) {
            return Err(Error::precondition(format!("oracle {} is already registered", account)));
        }

        let fees_collected = self.fees_collected.checked_add(fee).ok_or_else(|| {
            Error::precondition(format!("registration fee {} overflows collected fees", fee))
        })?;

        let indexes = draw_index_triple(source, index_range);
        self.fees_collected = fees_collected;
        self.oracles.insert(
            account.clone(),
            Oracle {
                account: account.clone(),
                indexes,
            },
        );

        events.push(EventKind::OracleRegistered {
            account: account.clone(),
            indexes,
        });

        tracing::info!(oracle = %account, ?indexes, "Oracle registered");
        Ok(indexes)
    }

    /// Indexes assigned to a registered oracle
    pub fn indexes(&self, account: &AccountId) -> Result<[u8; 3]> {
        self.oracles
            .get(account)
            .map(|oracle| oracle.indexes)
            .ok_or_else(|| Error::precondition(format!("{} is not a registered oracle", account)))
    }
}

/// Request/response matching and quorum resolution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OracleConsensusEngine {
    requests: BTreeMap<RequestKey, OracleRequest>,
}

impl OracleConsensusEngine {
    /// Request by key
    pub fn get(&self, key: &RequestKey) -> Option<&OracleRequest> {
        self.requests.get(key)
    }

    /// All requests concerning a flight
    pub fn for_flight<'a>(&'a self, flight: &'a FlightKey) -> impl Iterator<Item = &'a OracleRequest> {
        self.requests
            .values()
            .filter(move |request| request.key.flight == *flight)
    }

    /// Open (or re-announce) a status request for an unresolved flight
    pub fn request_status(
        &mut self,
        flights: &FlightCatalog,
        flight: &FlightKey,
        requester: &AccountId,
        source: &mut dyn IndexSource,
        index_range: u8,
        events: &mut Vec<EventKind>,
    ) -> Result<u8> {
        let record = flights
            .get(flight)
            .ok_or_else(|| Error::precondition(format!("flight {} is not registered", flight)))?;
        if let Some(status) = record.status {
            return Err(Error::finalized(format!(
                "flight {} already resolved with status {}",
                flight, status
            )));
        }

        let index = source.next_index(index_range);
        let key = RequestKey {
            index,
            flight: flight.clone(),
        };

        self.requests
            .entry(key.clone())
            .or_insert_with(|| OracleRequest::open(key, requester.clone()));

        events.push(EventKind::OracleRequest {
            index,
            flight: flight.designator.clone(),
            timestamp: flight.timestamp,
        });

        tracing::info!(flight = %flight, index, requester = %requester, "Flight status requested");
        Ok(index)
    }

    /// Accept one oracle response
    #[allow(clippy::too_many_arguments)]
    pub fn submit_response(
        &mut self,
        registry: &OracleRegistry,
        flights: &mut FlightCatalog,
        policies: &mut InsurancePolicyStore,
        oracle: &AccountId,
        index: u8,
        flight: &FlightKey,
        status_code: u8,
        quorum: usize,
        payout_multiplier: Decimal,
        events: &mut Vec<EventKind>,
    ) -> Result<ResponseOutcome> {
        let registered = registry
            .get(oracle)
            .ok_or_else(|| Error::precondition(format!("{} is not a registered oracle", oracle)))?;
        if !registered.has_index(index) {
            return Err(Error::precondition(format!(
                "index {} is not assigned to oracle {}",
                index, oracle
            )));
        }

        let status = FlightStatusCode::from_code(status_code)
            .ok_or_else(|| Error::precondition(format!("unknown flight status code {}", status_code)))?;

        if let Some(resolved) = flights.get(flight).and_then(|record| record.status) {
            return Err(Error::finalized(format!(
                "flight {} already resolved with status {}",
                flight, resolved
            )));
        }

        let key = RequestKey {
            index,
            flight: flight.clone(),
        };
        let request = self.requests.get_mut(&key).ok_or_else(|| {
            Error::precondition(format!("no status request for flight {} at index {}", flight, index))
        })?;
        if let RequestState::Resolved(resolved) = request.state {
            return Err(Error::finalized(format!(
                "request for flight {} at index {} already resolved with status {}",
                flight, index, resolved
            )));
        }

        if !request.responders.insert(oracle.clone()) {
            tracing::debug!(oracle = %oracle, flight = %flight, index, "Duplicate oracle response ignored");
            return Ok(ResponseOutcome::Duplicate);
        }

        let supporters = request.responses.entry(status).or_default();
        supporters.insert(oracle.clone());
        let supporters = supporters.len();

        events.push(EventKind::OracleReport {
            index,
            flight: flight.designator.clone(),
            timestamp: flight.timestamp,
            status,
        });

        if supporters < quorum {
            tracing::debug!(oracle = %oracle, flight = %flight, index, %status, supporters, "Oracle response recorded");
            return Ok(ResponseOutcome::Recorded {
                supporters: supporters as u64,
            });
        }

        // Quorum: close every open request for the flight, then resolve it
        for request in self.requests.values_mut() {
            if request.key.flight == *flight && request.is_open() {
                request.state = RequestState::Resolved(status);
            }
        }
        flights.resolve(flight, status)?;

        events.push(EventKind::FlightStatusInfo {
            flight: flight.designator.clone(),
            timestamp: flight.timestamp,
            status,
        });

        tracing::info!(flight = %flight, index, %status, "Flight status resolved by oracle quorum");

        if status.is_airline_fault() {
            policies.credit_payout(flight, payout_multiplier, events);
        }

        Ok(ResponseOutcome::Resolved { status })
    }
}
