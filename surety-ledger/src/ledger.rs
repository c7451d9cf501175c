//! Main ledger orchestration layer
//!
//! [`Ledger`] ties together storage, the actor and the payout seam into the
//! public API. Every mutating method names the calling account; the logic
//! component the call arrives through is fixed per `Ledger` value and can be
//! switched with [`Ledger::with_component`].
//!
//! # Example
//!
//! ```no_run
//! use surety_ledger::{AccountId, Config, Ledger};
//! use rust_decimal::Decimal;
//!
//! #[tokio::main]
//! async fn main() -> surety_ledger::Result<()> {
//!     let config = Config::default();
//!     let genesis = config.genesis.airline.clone();
//!     let ledger = Ledger::open(config).await?;
//!
//!     ledger.fund_airline(&genesis, Decimal::from(10)).await?;
//!     ledger
//!         .register_airline(&genesis, &AccountId::new("airline2"))
//!         .await?;
//!
//!     ledger.shutdown().await
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, LedgerHandle},
    airline::AirlineRegistration,
    deployment::Endpoint,
    entropy::{IndexSource, OsIndexSource},
    events::{ChainHead, LedgerEvent},
    metrics::Metrics,
    oracle::ResponseOutcome,
    state::{AdminCommand, Command, Operation, Outcome},
    storage::Storage,
    transfer::{InMemoryWallet, PayoutTransfer},
    types::{
        AccountId, Airline, AirlineStatus, Caller, ComponentId, Flight, FlightKey,
        FlightStatusCode, FundingRecord, InsurancePolicy, OracleRequest, PolicyId,
    },
    Config, Error, Result,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio_stream::wrappers::BroadcastStream;

/// Main ledger interface
#[derive(Clone)]
pub struct Ledger {
    /// Actor handle
    handle: LedgerHandle,

    /// Component every call from this value arrives through
    component: ComponentId,

    /// Metrics shared with the actor
    metrics: Metrics,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("component", &self.component)
            .finish_non_exhaustive()
    }
}

fn unexpected(outcome: Outcome) -> Error {
    Error::Other(format!("unexpected command outcome: {:?}", outcome))
}

impl Ledger {
    /// Open ledger with an in-memory wallet and OS entropy
    pub async fn open(config: Config) -> Result<Self> {
        Self::open_with(
            config,
            Arc::new(InMemoryWallet::new()),
            Box::new(OsIndexSource::new()),
        )
        .await
    }

    /// Open ledger with explicit payout and index sources
    pub async fn open_with(
        config: Config,
        transfer: Arc<dyn PayoutTransfer>,
        entropy: Box<dyn IndexSource>,
    ) -> Result<Self> {
        config.validate()?;

        let storage = Storage::open(&config)?;
        let metrics = Metrics::new().map_err(|e| Error::Other(e.to_string()))?;
        let handle = spawn_ledger_actor(&config, storage, transfer, entropy, metrics.clone())?;

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            data_dir = ?config.data_dir,
            "Ledger opened"
        );

        Ok(Self {
            handle,
            component: config.app_component,
            metrics,
        })
    }

    /// Same ledger, calls arriving through `component`
    pub fn with_component(&self, component: ComponentId) -> Self {
        Self {
            component,
            ..self.clone()
        }
    }

    /// Authorize `endpoint`'s application component and route calls through it
    ///
    /// Works on a fresh or an existing data directory; authorizing an
    /// already-authorized component appends nothing.
    pub async fn adopt_deployment(&self, owner: &AccountId, endpoint: &Endpoint) -> Result<Self> {
        let component = endpoint.app_component();
        self.authorize_component(owner, component.clone()).await?;
        Ok(self.with_component(component))
    }

    /// Component calls arrive through
    pub fn component(&self) -> &ComponentId {
        &self.component
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Execute a command as `account` with `value` attached
    pub async fn execute(
        &self,
        account: &AccountId,
        value: Decimal,
        command: impl Into<Command>,
    ) -> Result<Outcome> {
        let caller = Caller::new(account.clone(), self.component.clone());
        self.handle.execute(caller, value, command.into()).await
    }

    async fn execute_unit(&self, account: &AccountId, command: impl Into<Command>) -> Result<()> {
        match self.execute(account, Decimal::ZERO, command).await? {
            Outcome::Unit => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    // Owner commands

    /// Flip the operational switch (owner only)
    pub async fn set_operational_status(&self, account: &AccountId, operational: bool) -> Result<()> {
        self.execute_unit(account, AdminCommand::SetOperationalStatus { operational })
            .await
    }

    /// Authorize a logic component (owner only)
    pub async fn authorize_component(&self, account: &AccountId, component: ComponentId) -> Result<()> {
        self.execute_unit(account, AdminCommand::AuthorizeComponent { component })
            .await
    }

    /// Remove a logic component (owner only)
    pub async fn deauthorize_component(
        &self,
        account: &AccountId,
        component: ComponentId,
    ) -> Result<()> {
        self.execute_unit(account, AdminCommand::DeauthorizeComponent { component })
            .await
    }

    // Airlines

    /// Admit `candidate` directly or record `by`'s vote for it
    pub async fn register_airline(
        &self,
        by: &AccountId,
        candidate: &AccountId,
    ) -> Result<AirlineRegistration> {
        let command = Operation::RegisterAirline {
            candidate: candidate.clone(),
        };
        match self.execute(by, Decimal::ZERO, command).await? {
            Outcome::Airline(registration) => Ok(registration),
            other => Err(unexpected(other)),
        }
    }

    /// Deposit `amount` for `airline`
    pub async fn fund_airline(&self, airline: &AccountId, amount: Decimal) -> Result<FundingRecord> {
        match self.execute(airline, amount, Operation::FundAirline).await? {
            Outcome::Funding(record) => Ok(record),
            other => Err(unexpected(other)),
        }
    }

    // Flights and policies

    /// Register a flight operated by `airline`
    pub async fn register_flight(&self, airline: &AccountId, flight: FlightKey) -> Result<FlightKey> {
        match self
            .execute(airline, Decimal::ZERO, Operation::RegisterFlight { flight })
            .await?
        {
            Outcome::Flight(key) => Ok(key),
            other => Err(unexpected(other)),
        }
    }

    /// Buy a policy on `flight` paying `premium`
    pub async fn buy_insurance(
        &self,
        passenger: &AccountId,
        flight: &FlightKey,
        premium: Decimal,
    ) -> Result<PolicyId> {
        let command = Operation::BuyInsurance {
            flight: flight.clone(),
        };
        match self.execute(passenger, premium, command).await? {
            Outcome::Policy(id) => Ok(id),
            other => Err(unexpected(other)),
        }
    }

    /// Withdraw `passenger`'s credited payouts on `flight`
    pub async fn withdraw_payout(&self, passenger: &AccountId, flight: &FlightKey) -> Result<Decimal> {
        let command = Operation::WithdrawPayout {
            flight: flight.clone(),
        };
        match self.execute(passenger, Decimal::ZERO, command).await? {
            Outcome::Withdrawn(amount) => Ok(amount),
            other => Err(unexpected(other)),
        }
    }

    // Oracles

    /// Ask oracles for `flight`'s status; returns the drawn index
    pub async fn request_flight_status(&self, requester: &AccountId, flight: &FlightKey) -> Result<u8> {
        let command = Operation::RequestFlightStatus {
            flight: flight.clone(),
        };
        match self.execute(requester, Decimal::ZERO, command).await? {
            Outcome::StatusRequested(index) => Ok(index),
            other => Err(unexpected(other)),
        }
    }

    /// Register `oracle` paying `fee`; returns its indexes
    pub async fn register_oracle(&self, oracle: &AccountId, fee: Decimal) -> Result<[u8; 3]> {
        match self.execute(oracle, fee, Operation::RegisterOracle).await? {
            Outcome::OracleIndexes(indexes) => Ok(indexes),
            other => Err(unexpected(other)),
        }
    }

    /// Indexes assigned to `oracle`
    pub async fn oracle_indexes(&self, oracle: &AccountId) -> Result<[u8; 3]> {
        match self
            .execute(oracle, Decimal::ZERO, Operation::GetOracleIndexes)
            .await?
        {
            Outcome::OracleIndexes(indexes) => Ok(indexes),
            other => Err(unexpected(other)),
        }
    }

    /// Report `status_code` for `flight` on request `index`
    pub async fn submit_oracle_response(
        &self,
        oracle: &AccountId,
        index: u8,
        flight: &FlightKey,
        status_code: u8,
    ) -> Result<ResponseOutcome> {
        let command = Operation::SubmitOracleResponse {
            index,
            flight: flight.clone(),
            status_code,
        };
        match self.execute(oracle, Decimal::ZERO, command).await? {
            Outcome::Response(response) => Ok(response),
            other => Err(unexpected(other)),
        }
    }

    // Reads

    /// Whether the operational switch is on
    pub async fn is_operational(&self) -> Result<bool> {
        self.handle.inspect(|s| s.access().is_operational()).await
    }

    /// Number of Registered or Funded airlines
    pub async fn registered_airlines_count(&self) -> Result<usize> {
        self.handle.inspect(|s| s.airlines().registered_count()).await
    }

    /// Whether `airline` has reached the funding threshold
    pub async fn is_funded(&self, airline: &AccountId) -> Result<bool> {
        let airline = airline.clone();
        self.handle
            .inspect(move |s| s.funding().is_funded(&airline))
            .await
    }

    /// Airline record
    pub async fn airline(&self, account: &AccountId) -> Result<Option<Airline>> {
        let account = account.clone();
        self.handle
            .inspect(move |s| s.airlines().get(&account).cloned())
            .await
    }

    /// Airline lifecycle status (Unregistered when unknown)
    pub async fn airline_status(&self, account: &AccountId) -> Result<AirlineStatus> {
        let account = account.clone();
        self.handle
            .inspect(move |s| s.airlines().status(&account))
            .await
    }

    /// Flight record
    pub async fn flight(&self, key: &FlightKey) -> Result<Option<Flight>> {
        let key = key.clone();
        self.handle
            .inspect(move |s| s.flights().get(&key).cloned())
            .await
    }

    /// Resolved flight status; `None` while unresolved or unknown
    pub async fn flight_status(&self, key: &FlightKey) -> Result<Option<FlightStatusCode>> {
        Ok(self.flight(key).await?.and_then(|flight| flight.status))
    }

    /// `passenger`'s policies on `flight`
    pub async fn policies(
        &self,
        flight: &FlightKey,
        passenger: &AccountId,
    ) -> Result<Vec<InsurancePolicy>> {
        let flight = flight.clone();
        let passenger = passenger.clone();
        self.handle
            .inspect(move |s| {
                s.policies()
                    .for_passenger(&flight, &passenger)
                    .into_iter()
                    .cloned()
                    .collect()
            })
            .await
    }

    /// Oracle requests raised for `flight`
    pub async fn oracle_requests(&self, flight: &FlightKey) -> Result<Vec<OracleRequest>> {
        let flight = flight.clone();
        self.handle
            .inspect(move |s| {
                s.consensus()
                    .for_flight(&flight)
                    .into_iter()
                    .cloned()
                    .collect()
            })
            .await
    }

    /// Current pool balance
    pub async fn pool_balance(&self) -> Result<Decimal> {
        self.handle.inspect(|s| s.pool().balance()).await
    }

    /// Up to `limit` events starting at sequence `from`
    pub async fn events_since(&self, from: u64, limit: usize) -> Result<Vec<LedgerEvent>> {
        self.handle.events_since(from, limit).await
    }

    /// Stream of events committed from now on
    ///
    /// A subscriber that falls behind by more than the configured buffer
    /// receives a lag error and should catch up with [`Ledger::events_since`].
    pub fn subscribe(&self) -> BroadcastStream<LedgerEvent> {
        BroadcastStream::new(self.handle.subscribe())
    }

    /// Re-hash the stored log and check it ends at the ledger's head
    pub async fn verify_event_chain(&self) -> Result<ChainHead> {
        self.handle.verify_chain().await
    }

    /// Check that pool totals match the component records
    pub async fn check_conservation(&self) -> Result<()> {
        self.handle.inspect(|s| s.check_conservation()).await?
    }

    /// Stop the actor and close storage; every clone of this ledger stops with it
    pub async fn shutdown(&self) -> Result<()> {
        self.handle.shutdown().await
    }
}
