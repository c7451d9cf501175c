//! Ledger state and command dispatch
//!
//! [`SuretyState`] is the single persistent store every component operates
//! against. [`SuretyState::apply`] is its only mutation entry point: it runs
//! the operational and component gates, dispatches to the component, and
//! returns the emitted events plus the payout, if any, still to be transferred.
//!
//! `apply` may leave `self` partially modified when it returns `Err`; callers
//! run it on a staged copy and discard the copy on failure.

use crate::{
    access::AccessControl,
    airline::{AirlineRegistration, AirlineRegistry},
    config::{Config, PolicyConfig},
    entropy::IndexSource,
    events::EventKind,
    flight::FlightCatalog,
    funding::{FundingLedger, Pool},
    insurance::InsurancePolicyStore,
    oracle::{OracleConsensusEngine, OracleRegistry, ResponseOutcome},
    transfer::Payout,
    types::{AccountId, Caller, ComponentId, FlightKey, FundingRecord, PolicyId},
    Error, Result,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Owner-only command; bypasses the operational switch so a paused ledger can be resumed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AdminCommand {
    /// Flip the operational switch
    SetOperationalStatus {
        /// New position
        operational: bool,
    },
    /// Authorize a logic component
    AuthorizeComponent {
        /// Component
        component: ComponentId,
    },
    /// Remove a logic component
    DeauthorizeComponent {
        /// Component
        component: ComponentId,
    },
}

/// Gated operation: requires the switch on and an authorized component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Admit or vote for an airline
    RegisterAirline {
        /// Candidate airline
        candidate: AccountId,
    },
    /// Deposit the attached value for the calling airline
    FundAirline,
    /// Add a flight operated by the calling airline
    RegisterFlight {
        /// Flight key
        flight: FlightKey,
    },
    /// Buy a policy with the attached value as premium
    BuyInsurance {
        /// Flight key
        flight: FlightKey,
    },
    /// Ask oracles for a flight's status
    RequestFlightStatus {
        /// Flight key
        flight: FlightKey,
    },
    /// Register the caller as an oracle, paying the attached fee
    RegisterOracle,
    /// Fetch the caller's oracle indexes
    GetOracleIndexes,
    /// Report a flight status as an oracle
    SubmitOracleResponse {
        /// Request index
        index: u8,
        /// Flight key
        flight: FlightKey,
        /// Reported status code
        status_code: u8,
    },
    /// Withdraw the caller's credited payouts on a flight
    WithdrawPayout {
        /// Flight key
        flight: FlightKey,
    },
}

/// Mutating command submitted to the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Owner-only command
    Admin(AdminCommand),
    /// Gated operation
    Operation(Operation),
}

impl From<AdminCommand> for Command {
    fn from(command: AdminCommand) -> Self {
        Command::Admin(command)
    }
}

impl From<Operation> for Command {
    fn from(operation: Operation) -> Self {
        Command::Operation(operation)
    }
}

impl Command {
    /// Command name for logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            Command::Admin(AdminCommand::SetOperationalStatus { .. }) => "set_operational_status",
            Command::Admin(AdminCommand::AuthorizeComponent { .. }) => "authorize_component",
            Command::Admin(AdminCommand::DeauthorizeComponent { .. }) => "deauthorize_component",
            Command::Operation(Operation::RegisterAirline { .. }) => "register_airline",
            Command::Operation(Operation::FundAirline) => "fund_airline",
            Command::Operation(Operation::RegisterFlight { .. }) => "register_flight",
            Command::Operation(Operation::BuyInsurance { .. }) => "buy_insurance",
            Command::Operation(Operation::RequestFlightStatus { .. }) => "request_flight_status",
            Command::Operation(Operation::RegisterOracle) => "register_oracle",
            Command::Operation(Operation::GetOracleIndexes) => "get_oracle_indexes",
            Command::Operation(Operation::SubmitOracleResponse { .. }) => "submit_oracle_response",
            Command::Operation(Operation::WithdrawPayout { .. }) => "withdraw_payout",
        }
    }

    /// Whether the command accepts attached value
    pub fn is_payable(&self) -> bool {
        matches!(
            self,
            Command::Operation(
                Operation::FundAirline | Operation::BuyInsurance { .. } | Operation::RegisterOracle
            )
        )
    }
}

/// Command result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outcome {
    /// Nothing to report
    Unit,
    /// Airline admission result
    Airline(AirlineRegistration),
    /// Updated funding record
    Funding(FundingRecord),
    /// Newly registered flight
    Flight(FlightKey),
    /// Newly purchased policy
    Policy(PolicyId),
    /// Index drawn for a status request
    StatusRequested(u8),
    /// Caller's oracle indexes
    OracleIndexes([u8; 3]),
    /// Oracle response result
    Response(ResponseOutcome),
    /// Amount withdrawn
    Withdrawn(Decimal),
}

/// Effects of a successfully applied command
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    /// Command result
    pub outcome: Outcome,
    /// Events to append
    pub events: Vec<EventKind>,
    /// Value to transfer out once the effects are durably committed
    pub payout: Option<Payout>,
}

impl Applied {
    fn new(outcome: Outcome, events: Vec<EventKind>) -> Self {
        Self {
            outcome,
            events,
            payout: None,
        }
    }
}

/// Persistent ledger state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuretyState {
    access: AccessControl,
    airlines: AirlineRegistry,
    funding: FundingLedger,
    pool: Pool,
    flights: FlightCatalog,
    policies: InsurancePolicyStore,
    oracles: OracleRegistry,
    consensus: OracleConsensusEngine,
}

impl SuretyState {
    /// Initial state: operational, app component authorized, genesis airline registered
    pub fn genesis(config: &Config) -> (Self, Vec<EventKind>) {
        let mut events = Vec::new();
        let airlines = AirlineRegistry::with_genesis(
            config.genesis.airline.clone(),
            config.genesis.prefunded,
            &mut events,
        );
        let funding = if config.genesis.prefunded {
            FundingLedger::with_prefunded(config.genesis.airline.clone())
        } else {
            FundingLedger::default()
        };

        let state = Self {
            access: AccessControl::new(config.owner.clone(), config.app_component.clone()),
            airlines,
            funding,
            pool: Pool::default(),
            flights: FlightCatalog::default(),
            policies: InsurancePolicyStore::default(),
            oracles: OracleRegistry::default(),
            consensus: OracleConsensusEngine::default(),
        };

        (state, events)
    }

    /// Operational switch and component allow-list
    pub fn access(&self) -> &AccessControl {
        &self.access
    }

    /// Airline registry
    pub fn airlines(&self) -> &AirlineRegistry {
        &self.airlines
    }

    /// Funding records
    pub fn funding(&self) -> &FundingLedger {
        &self.funding
    }

    /// Shared pool
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Flight catalog
    pub fn flights(&self) -> &FlightCatalog {
        &self.flights
    }

    /// Policy store
    pub fn policies(&self) -> &InsurancePolicyStore {
        &self.policies
    }

    /// Oracle registry
    pub fn oracles(&self) -> &OracleRegistry {
        &self.oracles
    }

    /// Oracle request engine
    pub fn consensus(&self) -> &OracleConsensusEngine {
        &self.consensus
    }

    /// Apply one command on behalf of `caller` with `value` attached
    pub fn apply(
        &mut self,
        policy: &PolicyConfig,
        caller: &Caller,
        value: Decimal,
        command: Command,
        source: &mut dyn IndexSource,
    ) -> Result<Applied> {
        if let Command::Operation(_) = command {
            self.access.require_gate(caller)?;
        }
        if value < Decimal::ZERO {
            return Err(Error::precondition("attached value must not be negative"));
        }
        if !command.is_payable() && value != Decimal::ZERO {
            return Err(Error::precondition(format!(
                "{} does not accept attached value",
                command.name()
            )));
        }

        match command {
            Command::Admin(admin) => self.apply_admin(&caller.account, admin),
            Command::Operation(operation) => {
                self.apply_operation(policy, &caller.account, value, operation, source)
            }
        }
    }

    fn apply_admin(&mut self, account: &AccountId, command: AdminCommand) -> Result<Applied> {
        let mut events = Vec::new();

        match command {
            AdminCommand::SetOperationalStatus { operational } => {
                if self.access.set_operational(account, operational)? {
                    events.push(EventKind::OperationalStatusChanged { operational });
                }
            }
            AdminCommand::AuthorizeComponent { component } => {
                if self.access.authorize(account, component.clone())? {
                    events.push(EventKind::ComponentAuthorized { component });
                }
            }
            AdminCommand::DeauthorizeComponent { component } => {
                if self.access.deauthorize(account, &component)? {
                    events.push(EventKind::ComponentDeauthorized { component });
                }
            }
        }

        Ok(Applied::new(Outcome::Unit, events))
    }

    fn apply_operation(
        &mut self,
        policy: &PolicyConfig,
        account: &AccountId,
        value: Decimal,
        operation: Operation,
        source: &mut dyn IndexSource,
    ) -> Result<Applied> {
        let mut events = Vec::new();
        let mut payout = None;

        let outcome = match operation {
            Operation::RegisterAirline { candidate } => {
                let registration = self.airlines.register(
                    &candidate,
                    account,
                    policy.direct_registration_limit,
                    &mut events,
                )?;
                Outcome::Airline(registration)
            }

            Operation::FundAirline => {
                let record = self.funding.fund(
                    &mut self.airlines,
                    &mut self.pool,
                    account,
                    value,
                    policy.minimum_funding,
                    &mut events,
                )?;
                Outcome::Funding(record)
            }

            Operation::RegisterFlight { flight } => {
                self.airlines.require_funded(account)?;
                self.flights.register(flight.clone(), account, &mut events)?;
                Outcome::Flight(flight)
            }

            Operation::BuyInsurance { flight } => {
                self.flights.require_unresolved(&flight)?;
                let id = self.policies.buy(
                    &flight,
                    account,
                    value,
                    policy.premium_cap,
                    &mut self.pool,
                    &mut events,
                )?;
                Outcome::Policy(id)
            }

            Operation::RequestFlightStatus { flight } => {
                let index = self.consensus.request_status(
                    &self.flights,
                    &flight,
                    account,
                    source,
                    policy.oracle_index_range,
                    &mut events,
                )?;
                Outcome::StatusRequested(index)
            }

            Operation::RegisterOracle => {
                self.pool.deposit(value)?;
                let indexes = self.oracles.register(
                    account,
                    value,
                    policy.oracle_registration_fee,
                    source,
                    policy.oracle_index_range,
                    &mut events,
                )?;
                Outcome::OracleIndexes(indexes)
            }

            Operation::GetOracleIndexes => Outcome::OracleIndexes(self.oracles.indexes(account)?),

            Operation::SubmitOracleResponse {
                index,
                flight,
                status_code,
            } => {
                let response = self.consensus.submit_response(
                    &self.oracles,
                    &mut self.flights,
                    &mut self.policies,
                    account,
                    index,
                    &flight,
                    status_code,
                    policy.oracle_quorum,
                    policy.payout_multiplier,
                    &mut events,
                )?;
                Outcome::Response(response)
            }

            Operation::WithdrawPayout { flight } => {
                let amount = self
                    .policies
                    .withdraw(&flight, account, &mut self.pool, &mut events)?;
                payout = Some(Payout {
                    to: account.clone(),
                    amount,
                });
                Outcome::Withdrawn(amount)
            }
        };

        Ok(Applied {
            outcome,
            events,
            payout,
        })
    }

    /// Check that no value was created or lost
    ///
    /// Everything received (deposits, premiums, oracle fees) minus everything
    /// withdrawn must equal the pool balance.
    pub fn check_conservation(&self) -> Result<()> {
        let received = self.funding.total_deposited()
            + self.policies.total_premiums()
            + self.oracles.fees_collected();

        if received != self.pool.received() {
            return Err(Error::InvariantViolation(format!(
                "pool received {} but components account for {}",
                self.pool.received(),
                received
            )));
        }

        let withdrawn = self.policies.total_withdrawn();
        if withdrawn != self.pool.paid_out() {
            return Err(Error::InvariantViolation(format!(
                "pool paid out {} but policies account for {}",
                self.pool.paid_out(),
                withdrawn
            )));
        }

        if !self.pool.is_balanced() {
            return Err(Error::InvariantViolation("pool balance drifted from its totals".to_string()));
        }

        Ok(())
    }
}
