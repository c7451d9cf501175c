//! Surety Ledger
//!
//! Flight-delay insurance ledger. Airlines join by consensus and fund a
//! shared pool, passengers insure flights, and a quorum of independent
//! oracles resolves each flight's status. Late-by-airline flights credit
//! insured passengers 1.5x their premium, withdrawable once.
//!
//! # Architecture
//!
//! - **Single Writer**: One actor task applies every command in total order
//! - **Staged Commits**: Commands run on a copy of the state; failures leave nothing behind
//! - **Event Log**: Every transition is a SHA-256 chained event in RocksDB
//! - **Payout Seam**: Value leaves the pool only through [`PayoutTransfer`]
//!
//! # Invariants
//!
//! - Conservation: deposits + premiums + oracle fees - withdrawals == pool balance
//! - Each credited payout is withdrawn at most once
//! - A flight status, once resolved, never changes
//! - Append-only: events are never modified or deleted

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod access;
pub mod actor;
pub mod airline;
pub mod config;
pub mod deployment;
pub mod entropy;
pub mod error;
pub mod events;
pub mod flight;
pub mod funding;
pub mod insurance;
pub mod ledger;
pub mod metrics;
pub mod oracle;
pub mod state;
pub mod storage;
pub mod transfer;
pub mod types;

// Re-exports
pub use airline::AirlineRegistration;
pub use config::Config;
pub use deployment::{DeploymentConfig, Endpoint};
pub use entropy::{IndexSource, OsIndexSource, ScriptedIndexSource, SeededIndexSource};
pub use error::{Error, Result};
pub use events::{ChainHead, EventKind, LedgerEvent};
pub use ledger::Ledger;
pub use oracle::ResponseOutcome;
pub use state::{AdminCommand, Command, Operation, Outcome};
pub use transfer::{InMemoryWallet, Payout, PayoutTransfer};
pub use types::{
    AccountId, Airline, AirlineStatus, ComponentId, Flight, FlightKey, FlightStatusCode,
    FundingRecord, InsurancePolicy, PolicyId,
};
