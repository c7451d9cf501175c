//! Airline registry and admission consensus
//!
//! Admission has two modes, selected by how many airlines are already
//! registered:
//!
//! - **Direct**: below the direct-registration limit, any funded airline
//!   admits a candidate on its own.
//! - **Consensus**: from the limit onward, each funded airline casts one
//!   vote; the candidate is admitted once distinct votes reach
//!   ⌈registered / 2⌉.

use crate::{
    events::EventKind,
    types::{AccountId, Airline, AirlineStatus},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result of a `register_airline` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AirlineRegistration {
    /// Admitted without votes
    Direct,
    /// Vote recorded, threshold not yet reached
    Voted {
        /// Distinct votes so far
        votes: u64,
    },
    /// Vote recorded and threshold reached
    Consensus {
        /// Distinct votes at admission
        votes: u64,
    },
    /// Voter had already voted for this candidate; nothing changed
    DuplicateVote {
        /// Distinct votes so far
        votes: u64,
    },
}

/// Airline lifecycle state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AirlineRegistry {
    airlines: BTreeMap<AccountId, Airline>,
    registered_count: usize,
}

impl AirlineRegistry {
    /// Registry seeded with the genesis airline
    pub fn with_genesis(account: AccountId, prefunded: bool, events: &mut Vec<EventKind>) -> Self {
        let status = if prefunded {
            AirlineStatus::Funded
        } else {
            AirlineStatus::Registered
        };

        let mut registry = Self::default();
        registry
            .airlines
            .insert(account.clone(), Airline::new(account.clone(), status));
        registry.registered_count = 1;

        events.push(EventKind::AirlineDirectRegistration { account });
        registry
    }

    /// Airline record, if the ledger has seen this account
    pub fn get(&self, account: &AccountId) -> Option<&Airline> {
        self.airlines.get(account)
    }

    /// Current status (Unregistered for unknown accounts)
    pub fn status(&self, account: &AccountId) -> AirlineStatus {
        self.airlines
            .get(account)
            .map(|airline| airline.status)
            .unwrap_or(AirlineStatus::Unregistered)
    }

    /// Airlines that are Registered or Funded
    pub fn registered_count(&self) -> usize {
        self.registered_count
    }

    /// Votes needed for consensus admission at the current size
    pub fn consensus_threshold(&self) -> usize {
        self.registered_count.div_ceil(2)
    }

    /// Reject unless `account` is a funded airline
    pub fn require_funded(&self, account: &AccountId) -> Result<()> {
        if self.status(account) != AirlineStatus::Funded {
            return Err(Error::precondition(format!(
                "airline {} must be registered & funded",
                account
            )));
        }
        Ok(())
    }

    /// Admit or vote for `candidate` on behalf of `by`
    pub fn register(
        &mut self,
        candidate: &AccountId,
        by: &AccountId,
        direct_registration_limit: usize,
        events: &mut Vec<EventKind>,
    ) -> Result<AirlineRegistration> {
        self.require_funded(by)?;

        if self.status(candidate).is_registered() {
            return Err(Error::precondition(format!(
                "airline {} is already registered",
                candidate
            )));
        }

        if self.registered_count < direct_registration_limit {
            self.admit(candidate);
            events.push(EventKind::AirlineDirectRegistration {
                account: candidate.clone(),
            });

            tracing::info!(airline = %candidate, by = %by, "Airline registered directly");
            return Ok(AirlineRegistration::Direct);
        }

        let threshold = self.consensus_threshold();
        let entry = self
            .airlines
            .entry(candidate.clone())
            .or_insert_with(|| Airline::new(candidate.clone(), AirlineStatus::Unregistered));

        if !entry.voters.insert(by.clone()) {
            let votes = entry.voters.len() as u64;
            tracing::debug!(airline = %candidate, by = %by, votes, "Duplicate admission vote ignored");
            return Ok(AirlineRegistration::DuplicateVote { votes });
        }

        entry.status = AirlineStatus::PendingVotes;
        let votes = entry.voters.len() as u64;
        events.push(EventKind::AirlineConsensusVoted {
            account: candidate.clone(),
            votes_count: votes,
        });

        if entry.voters.len() < threshold {
            tracing::info!(airline = %candidate, by = %by, votes, threshold, "Admission vote recorded");
            return Ok(AirlineRegistration::Voted { votes });
        }

        self.admit(candidate);
        events.push(EventKind::AirlineConsensusRegistration {
            account: candidate.clone(),
        });

        tracing::info!(airline = %candidate, votes, "Airline registered by consensus");
        Ok(AirlineRegistration::Consensus { votes })
    }

    /// Promote a registered airline to Funded
    pub(crate) fn mark_funded(&mut self, account: &AccountId) {
        if let Some(airline) = self.airlines.get_mut(account) {
            if airline.status == AirlineStatus::Registered {
                airline.status = AirlineStatus::Funded;
            }
        }
    }

    /// Track the cumulative deposit on the airline record
    pub(crate) fn record_deposit(&mut self, account: &AccountId, deposited: rust_decimal::Decimal) {
        if let Some(airline) = self.airlines.get_mut(account) {
            airline.funded_amount = deposited;
        }
    }

    fn admit(&mut self, account: &AccountId) {
        let airline = self
            .airlines
            .entry(account.clone())
            .or_insert_with(|| Airline::new(account.clone(), AirlineStatus::Unregistered));

        airline.status = AirlineStatus::Registered;
        airline.voters.clear();
        self.registered_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(name: &str) -> AccountId {
        AccountId::new(name)
    }

    /// Genesis plus `n - 1` directly admitted airlines, all funded
    fn registry_with(n: usize) -> AirlineRegistry {
        let mut events = Vec::new();
        let mut registry = AirlineRegistry::with_genesis(account("airline1"), true, &mut events);

        for i in 2..=n {
            let candidate = account(&format!("airline{}", i));
            registry
                .register(&candidate, &account("airline1"), 4, &mut events)
                .unwrap();
            registry.mark_funded(&candidate);
        }
        registry
    }

    #[test]
    fn test_genesis() {
        let mut events = Vec::new();
        let registry = AirlineRegistry::with_genesis(account("airline1"), false, &mut events);

        assert_eq!(registry.registered_count(), 1);
        assert_eq!(registry.status(&account("airline1")), AirlineStatus::Registered);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_unfunded_caller_rejected() {
        let mut events = Vec::new();
        let mut registry = AirlineRegistry::with_genesis(account("airline1"), false, &mut events);

        let result = registry.register(&account("airline2"), &account("airline1"), 4, &mut events);
        assert!(matches!(result, Err(Error::PreconditionFailed(msg)) if msg.contains("funded")));
        assert_eq!(registry.registered_count(), 1);
    }

    #[test]
    fn test_direct_registration_until_limit() {
        let registry = registry_with(4);
        assert_eq!(registry.registered_count(), 4);
        assert_eq!(registry.status(&account("airline4")), AirlineStatus::Funded);
    }

    #[test]
    fn test_consensus_registration() {
        let mut registry = registry_with(4);
        let mut events = Vec::new();
        let candidate = account("airline5");

        let first = registry
            .register(&candidate, &account("airline1"), 4, &mut events)
            .unwrap();
        assert_eq!(first, AirlineRegistration::Voted { votes: 1 });
        assert_eq!(registry.status(&candidate), AirlineStatus::PendingVotes);
        assert_eq!(registry.registered_count(), 4);

        let duplicate = registry
            .register(&candidate, &account("airline1"), 4, &mut events)
            .unwrap();
        assert_eq!(duplicate, AirlineRegistration::DuplicateVote { votes: 1 });

        let second = registry
            .register(&candidate, &account("airline2"), 4, &mut events)
            .unwrap();
        assert_eq!(second, AirlineRegistration::Consensus { votes: 2 });
        assert_eq!(registry.registered_count(), 5);
        assert!(registry.get(&candidate).unwrap().voters.is_empty());

        let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
        assert_eq!(
            names,
            vec![
                "AirlineConsensusVoted",
                "AirlineConsensusVoted",
                "AirlineConsensusRegistration"
            ]
        );
    }

    #[test]
    fn test_already_registered_candidate_rejected() {
        let mut registry = registry_with(2);
        let mut events = Vec::new();

        let result = registry.register(&account("airline2"), &account("airline1"), 4, &mut events);
        assert!(matches!(result, Err(Error::PreconditionFailed(_))));
        assert!(events.is_empty());
    }

    #[test]
    fn test_threshold_rounds_up() {
        let registry = registry_with(4);
        assert_eq!(registry.consensus_threshold(), 2);

        let mut registry = registry_with(4);
        let mut events = Vec::new();
        for voter in ["airline1", "airline2"] {
            registry
                .register(&account("airline5"), &account(voter), 4, &mut events)
                .unwrap();
        }
        // Five registered: ⌈5/2⌉ = 3
        assert_eq!(registry.consensus_threshold(), 3);
    }
}
