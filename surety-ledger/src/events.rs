//! Append-only event log records
//!
//! Every committed command produces zero or more [`EventKind`]s. The actor
//! seals them into [`LedgerEvent`]s: a dense sequence number, a UUIDv7, a
//! timestamp and a SHA-256 link to the previous event. Off-ledger observers
//! (oracle nodes, clients) poll by sequence or subscribe to the broadcast.

use crate::{
    types::{AccountId, ComponentId, FlightStatusCode},
    Error, Result,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Hash preceding the first event
pub const GENESIS_HASH: [u8; 32] = [0u8; 32];

/// State transition payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    /// Operational switch flipped
    OperationalStatusChanged {
        /// New switch position
        operational: bool,
    },

    /// Logic component added to the allow-list
    ComponentAuthorized {
        /// Component
        component: ComponentId,
    },

    /// Logic component removed from the allow-list
    ComponentDeauthorized {
        /// Component
        component: ComponentId,
    },

    /// Airline admitted without votes
    AirlineDirectRegistration {
        /// Admitted airline
        account: AccountId,
    },

    /// Vote recorded for a candidate airline
    AirlineConsensusVoted {
        /// Candidate airline
        account: AccountId,
        /// Distinct votes so far
        votes_count: u64,
    },

    /// Airline admitted by consensus
    AirlineConsensusRegistration {
        /// Admitted airline
        account: AccountId,
    },

    /// Airline deposited funds
    AirlineFunded {
        /// Airline
        account: AccountId,
        /// Cumulative deposit
        deposit: Decimal,
    },

    /// Flight added to the catalog
    FlightRegistered {
        /// Operating airline
        airline: AccountId,
        /// Flight designator
        flight: String,
        /// Scheduled departure
        timestamp: i64,
    },

    /// Passenger bought a policy
    BuyInsurance {
        /// Passenger
        account: AccountId,
        /// Flight designator
        flight: String,
        /// Scheduled departure
        timestamp: i64,
        /// Premium paid
        amount: Decimal,
    },

    /// Oracle registered and received its indexes
    OracleRegistered {
        /// Oracle
        account: AccountId,
        /// Assigned indexes
        indexes: [u8; 3],
    },

    /// Status request for oracles holding `index`
    OracleRequest {
        /// Drawn index
        index: u8,
        /// Flight designator
        flight: String,
        /// Scheduled departure
        timestamp: i64,
    },

    /// Oracle response accepted
    OracleReport {
        /// Request index
        index: u8,
        /// Flight designator
        flight: String,
        /// Scheduled departure
        timestamp: i64,
        /// Reported status
        status: FlightStatusCode,
    },

    /// Flight status resolved by quorum
    FlightStatusInfo {
        /// Flight designator
        flight: String,
        /// Scheduled departure
        timestamp: i64,
        /// Resolved status
        status: FlightStatusCode,
    },

    /// Payout reserved for a passenger
    PayoutCredited {
        /// Passenger
        account: AccountId,
        /// Credited amount
        amount: Decimal,
    },

    /// Payout transferred to a passenger
    PayoutWithdrawn {
        /// Passenger
        account: AccountId,
        /// Transferred amount
        amount: Decimal,
    },

    /// Withdrawal undone after its transfer failed; the credit is claimable again
    PayoutReverted {
        /// Passenger
        account: AccountId,
        /// Amount returned to the pool
        amount: Decimal,
    },
}

impl EventKind {
    /// Event name as exposed to collaborators
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::OperationalStatusChanged { .. } => "OperationalStatusChanged",
            EventKind::ComponentAuthorized { .. } => "ComponentAuthorized",
            EventKind::ComponentDeauthorized { .. } => "ComponentDeauthorized",
            EventKind::AirlineDirectRegistration { .. } => "AirlineDirectRegistration",
            EventKind::AirlineConsensusVoted { .. } => "AirlineConsensusVoted",
            EventKind::AirlineConsensusRegistration { .. } => "AirlineConsensusRegistration",
            EventKind::AirlineFunded { .. } => "AirlineFunded",
            EventKind::FlightRegistered { .. } => "FlightRegistered",
            EventKind::BuyInsurance { .. } => "BuyInsurance",
            EventKind::OracleRegistered { .. } => "OracleRegistered",
            EventKind::OracleRequest { .. } => "OracleRequest",
            EventKind::OracleReport { .. } => "OracleReport",
            EventKind::FlightStatusInfo { .. } => "FlightStatusInfo",
            EventKind::PayoutCredited { .. } => "PayoutCredited",
            EventKind::PayoutWithdrawn { .. } => "PayoutWithdrawn",
            EventKind::PayoutReverted { .. } => "PayoutReverted",
        }
    }
}

/// Sealed event as stored in the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Position in the log (dense, starting at 0)
    pub sequence: u64,

    /// Unique event ID (UUIDv7 for time-ordering)
    pub event_id: Uuid,

    /// Commit time
    pub recorded_at: DateTime<Utc>,

    /// Payload
    pub kind: EventKind,

    /// Hash of the preceding event
    pub previous_hash: [u8; 32],

    /// Hash of this event
    pub hash: [u8; 32],
}

impl LedgerEvent {
    /// Compute the chained hash of this event's contents
    pub fn compute_hash(&self) -> Result<[u8; 32]> {
        let payload = bincode::serialize(&self.kind)?;

        let mut hasher = Sha256::new();
        hasher.update(self.sequence.to_be_bytes());
        hasher.update(self.event_id.as_bytes());
        hasher.update(
            self.recorded_at
                .timestamp_nanos_opt()
                .unwrap_or(0)
                .to_be_bytes(),
        );
        hasher.update(self.previous_hash);
        hasher.update(&payload);

        Ok(hasher.finalize().into())
    }
}

/// Head of the event chain: next sequence number and last hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    /// Sequence the next event receives
    pub next_sequence: u64,
    /// Hash of the last sealed event
    pub last_hash: [u8; 32],
}

impl Default for ChainHead {
    fn default() -> Self {
        Self {
            next_sequence: 0,
            last_hash: GENESIS_HASH,
        }
    }
}

impl ChainHead {
    /// Seal payloads into chained events, returning the advanced head
    ///
    /// `self` is left untouched so that a failed commit can discard the result.
    pub fn seal(&self, kinds: Vec<EventKind>) -> Result<(ChainHead, Vec<LedgerEvent>)> {
        let mut head = *self;
        let mut sealed = Vec::with_capacity(kinds.len());

        for kind in kinds {
            let mut event = LedgerEvent {
                sequence: head.next_sequence,
                event_id: Uuid::now_v7(),
                recorded_at: Utc::now(),
                kind,
                previous_hash: head.last_hash,
                hash: [0u8; 32],
            };
            event.hash = event.compute_hash()?;

            head.next_sequence += 1;
            head.last_hash = event.hash;
            sealed.push(event);
        }

        Ok((head, sealed))
    }
}

/// Verify that `events` form an unbroken chain starting at `start`
pub fn verify_chain(start: &ChainHead, events: &[LedgerEvent]) -> Result<ChainHead> {
    let mut head = *start;

    for event in events {
        if event.sequence != head.next_sequence {
            return Err(Error::InvariantViolation(format!(
                "event sequence gap: expected {}, found {}",
                head.next_sequence, event.sequence
            )));
        }
        if event.previous_hash != head.last_hash {
            return Err(Error::InvariantViolation(format!(
                "event {} does not link to its predecessor",
                event.sequence
            )));
        }
        if event.compute_hash()? != event.hash {
            return Err(Error::InvariantViolation(format!(
                "event {} hash mismatch",
                event.sequence
            )));
        }

        head.next_sequence += 1;
        head.last_hash = event.hash;
    }

    Ok(head)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funded(account: &str) -> EventKind {
        EventKind::AirlineFunded {
            account: AccountId::new(account),
            deposit: Decimal::from(10),
        }
    }

    #[test]
    fn test_seal_links_events() {
        let head = ChainHead::default();
        let (next, events) = head.seal(vec![funded("a"), funded("b")]).unwrap();

        assert_eq!(next.next_sequence, 2);
        assert_eq!(events[0].sequence, 0);
        assert_eq!(events[0].previous_hash, GENESIS_HASH);
        assert_eq!(events[1].previous_hash, events[0].hash);
        assert_eq!(next.last_hash, events[1].hash);

        // Sealing does not advance the original head
        assert_eq!(head.next_sequence, 0);
    }

    #[test]
    fn test_verify_chain_detects_tampering() {
        let (_, mut events) = ChainHead::default()
            .seal(vec![funded("a"), funded("b"), funded("c")])
            .unwrap();

        assert!(verify_chain(&ChainHead::default(), &events).is_ok());

        events[1].kind = funded("mallory");
        let result = verify_chain(&ChainHead::default(), &events);
        assert!(matches!(result, Err(Error::InvariantViolation(_))));
    }

    #[test]
    fn test_event_names() {
        assert_eq!(funded("a").name(), "AirlineFunded");
        let request = EventKind::OracleRequest {
            index: 3,
            flight: "ND1309".to_string(),
            timestamp: 0,
        };
        assert_eq!(request.name(), "OracleRequest");
    }
}
