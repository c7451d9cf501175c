//! Core types for the surety ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (Decimal for money)

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Participant identity (airline, passenger, oracle, owner)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create new account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a logic component allowed to drive ledger mutations
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentId(String);

impl ComponentId {
    /// Create new component ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who is calling, and through which component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// Originating account
    pub account: AccountId,
    /// Component the call was routed through
    pub component: ComponentId,
}

impl Caller {
    /// Create new caller
    pub fn new(account: AccountId, component: ComponentId) -> Self {
        Self { account, component }
    }
}

/// Flight identity: designator plus scheduled departure
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlightKey {
    /// Flight designator (e.g. "ND1309")
    pub designator: String,
    /// Scheduled departure (milliseconds since Unix epoch)
    pub timestamp: i64,
}

impl FlightKey {
    /// Create new flight key
    pub fn new(designator: impl Into<String>, timestamp: i64) -> Self {
        Self {
            designator: designator.into(),
            timestamp,
        }
    }
}

impl fmt::Display for FlightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.designator, self.timestamp)
    }
}

/// Flight status code reported by oracles
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FlightStatusCode {
    /// Status not known
    Unknown = 0,
    /// Departed on time
    OnTime = 10,
    /// Delayed, airline at fault
    LateAirline = 20,
    /// Delayed by weather
    LateWeather = 30,
    /// Delayed by a technical issue
    LateTechnical = 40,
    /// Delayed for other reasons
    LateOther = 50,
}

impl FlightStatusCode {
    /// Wire code
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Parse from wire code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(FlightStatusCode::Unknown),
            10 => Some(FlightStatusCode::OnTime),
            20 => Some(FlightStatusCode::LateAirline),
            30 => Some(FlightStatusCode::LateWeather),
            40 => Some(FlightStatusCode::LateTechnical),
            50 => Some(FlightStatusCode::LateOther),
            _ => None,
        }
    }

    /// Whether this status entitles insured passengers to a payout
    pub fn is_airline_fault(&self) -> bool {
        matches!(self, FlightStatusCode::LateAirline)
    }
}

impl fmt::Display for FlightStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Airline lifecycle status
///
/// Ordered so that `>=` comparisons express "at least this far along".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum AirlineStatus {
    /// Not known to the ledger
    Unregistered = 0,
    /// Collecting consensus votes
    PendingVotes = 1,
    /// Admitted, not yet funded
    Registered = 2,
    /// Admitted and funded (may participate)
    Funded = 3,
}

impl AirlineStatus {
    /// Registered or Funded
    pub fn is_registered(&self) -> bool {
        *self >= AirlineStatus::Registered
    }
}

/// Airline record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Airline {
    /// Airline account
    pub account: AccountId,
    /// Lifecycle status
    pub status: AirlineStatus,
    /// Accounts that have voted for admission (cleared on admission)
    pub voters: BTreeSet<AccountId>,
    /// Cumulative funding deposited
    pub funded_amount: Decimal,
}

impl Airline {
    /// Create an airline record with no history
    pub fn new(account: AccountId, status: AirlineStatus) -> Self {
        Self {
            account,
            status,
            voters: BTreeSet::new(),
            funded_amount: Decimal::ZERO,
        }
    }
}

/// Funding record for one airline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingRecord {
    /// Airline account
    pub airline: AccountId,
    /// Cumulative deposit (never decreases)
    pub deposited: Decimal,
    /// Sticky funded flag
    pub funded: bool,
}

/// Registered flight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flight {
    /// Operating airline
    pub airline: AccountId,
    /// Flight key
    pub key: FlightKey,
    /// Resolved status (None until an oracle quorum resolves it)
    pub status: Option<FlightStatusCode>,
}

impl Flight {
    /// Whether the flight status has been resolved
    pub fn is_resolved(&self) -> bool {
        self.status.is_some()
    }
}

/// Policy identifier (sequential)
pub type PolicyId = u64;

/// Passenger insurance policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsurancePolicy {
    /// Policy ID
    pub id: PolicyId,
    /// Insured passenger
    pub passenger: AccountId,
    /// Insured flight
    pub flight: FlightKey,
    /// Premium paid
    pub premium: Decimal,
    /// Payout credited on resolution (zero until credited)
    pub credited: Decimal,
    /// Payout already withdrawn
    pub withdrawn: bool,
}

impl InsurancePolicy {
    /// Credited but not yet withdrawn
    pub fn is_claimable(&self) -> bool {
        self.credited > Decimal::ZERO && !self.withdrawn
    }
}

/// Registered oracle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Oracle {
    /// Oracle account
    pub account: AccountId,
    /// Assigned indexes (distinct, fixed at registration)
    pub indexes: [u8; 3],
}

impl Oracle {
    /// Whether the oracle may answer requests carrying `index`
    pub fn has_index(&self, index: u8) -> bool {
        self.indexes.contains(&index)
    }
}

/// Oracle request key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    /// Index drawn for the request
    pub index: u8,
    /// Flight being asked about
    pub flight: FlightKey,
}

/// Oracle request lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestState {
    /// Accepting responses
    Open,
    /// Quorum reached (terminal)
    Resolved(FlightStatusCode),
}

/// Oracle request and its accumulated responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleRequest {
    /// Request key
    pub key: RequestKey,
    /// Account that asked for the status
    pub requester: AccountId,
    /// Responders grouped by proposed status
    pub responses: BTreeMap<FlightStatusCode, BTreeSet<AccountId>>,
    /// Every oracle that has contributed, regardless of status
    pub responders: BTreeSet<AccountId>,
    /// Lifecycle state
    pub state: RequestState,
}

impl OracleRequest {
    /// Open a new request
    pub fn open(key: RequestKey, requester: AccountId) -> Self {
        Self {
            key,
            requester,
            responses: BTreeMap::new(),
            responders: BTreeSet::new(),
            state: RequestState::Open,
        }
    }

    /// Whether the request still accepts responses
    pub fn is_open(&self) -> bool {
        matches!(self.state, RequestState::Open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_round_trip() {
        assert_eq!(FlightStatusCode::from_code(20), Some(FlightStatusCode::LateAirline));
        assert_eq!(FlightStatusCode::LateWeather.code(), 30);
        assert_eq!(FlightStatusCode::from_code(21), None);
        assert!(FlightStatusCode::LateAirline.is_airline_fault());
        assert!(!FlightStatusCode::LateTechnical.is_airline_fault());
    }

    #[test]
    fn test_airline_status_ordering() {
        assert!(AirlineStatus::Funded.is_registered());
        assert!(AirlineStatus::Registered.is_registered());
        assert!(!AirlineStatus::PendingVotes.is_registered());
        assert!(AirlineStatus::Funded > AirlineStatus::Registered);
    }

    #[test]
    fn test_policy_claimable() {
        let mut policy = InsurancePolicy {
            id: 0,
            passenger: AccountId::new("passenger-1"),
            flight: FlightKey::new("ND1309", 1_546_333_200_000),
            premium: Decimal::ONE,
            credited: Decimal::ZERO,
            withdrawn: false,
        };
        assert!(!policy.is_claimable());

        policy.credited = Decimal::new(15, 1);
        assert!(policy.is_claimable());

        policy.withdrawn = true;
        assert!(!policy.is_claimable());
    }
}
