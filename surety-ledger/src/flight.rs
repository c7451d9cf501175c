//! Flight catalog

use crate::{
    events::EventKind,
    types::{AccountId, Flight, FlightKey, FlightStatusCode},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Registered flights keyed by designator and departure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlightCatalog {
    flights: BTreeMap<FlightKey, Flight>,
}

impl FlightCatalog {
    /// Flight by key
    pub fn get(&self, key: &FlightKey) -> Option<&Flight> {
        self.flights.get(key)
    }

    /// Number of registered flights
    pub fn len(&self) -> usize {
        self.flights.len()
    }

    /// Whether no flight is registered
    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }

    /// Add an unresolved flight
    pub fn register(
        &mut self,
        key: FlightKey,
        airline: &AccountId,
        events: &mut Vec<EventKind>,
    ) -> Result<()> {
        if key.designator.trim().is_empty() {
            return Err(Error::precondition("flight designator must not be empty"));
        }
        if self.flights.contains_key(&key) {
            return Err(Error::precondition(format!("flight {} is already registered", key)));
        }

        events.push(EventKind::FlightRegistered {
            airline: airline.clone(),
            flight: key.designator.clone(),
            timestamp: key.timestamp,
        });

        tracing::info!(flight = %key, airline = %airline, "Flight registered");

        self.flights.insert(
            key.clone(),
            Flight {
                airline: airline.clone(),
                key,
                status: None,
            },
        );
        Ok(())
    }

    /// Flight that exists and has not been resolved
    pub fn require_unresolved(&self, key: &FlightKey) -> Result<&Flight> {
        let flight = self
            .flights
            .get(key)
            .ok_or_else(|| Error::precondition(format!("flight {} is not registered", key)))?;

        if flight.is_resolved() {
            return Err(Error::precondition(format!("flight {} is already resolved", key)));
        }
        Ok(flight)
    }

    /// Set the status of an unresolved flight; the first resolution wins
    pub fn resolve(&mut self, key: &FlightKey, status: FlightStatusCode) -> Result<()> {
        let flight = self
            .flights
            .get_mut(key)
            .ok_or_else(|| Error::precondition(format!("flight {} is not registered", key)))?;

        if let Some(existing) = flight.status {
            return Err(Error::finalized(format!(
                "flight {} already resolved with status {}",
                key, existing
            )));
        }

        flight.status = Some(status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_resolve() {
        let mut catalog = FlightCatalog::default();
        let key = FlightKey::new("ND1309", 1_546_333_200_000);
        let mut events = Vec::new();

        catalog.register(key.clone(), &AccountId::new("airline1"), &mut events).unwrap();
        assert!(catalog.require_unresolved(&key).is_ok());
        assert_eq!(events.len(), 1);

        catalog.resolve(&key, FlightStatusCode::LateAirline).unwrap();
        assert_eq!(catalog.get(&key).unwrap().status, Some(FlightStatusCode::LateAirline));

        // First resolution wins
        let again = catalog.resolve(&key, FlightStatusCode::OnTime);
        assert!(matches!(again, Err(Error::AlreadyFinalized(_))));
        assert_eq!(catalog.get(&key).unwrap().status, Some(FlightStatusCode::LateAirline));
        assert!(catalog.require_unresolved(&key).is_err());
    }

    #[test]
    fn test_duplicate_flight_rejected() {
        let mut catalog = FlightCatalog::default();
        let key = FlightKey::new("ND1309", 1);
        let mut events = Vec::new();

        catalog.register(key.clone(), &AccountId::new("a"), &mut events).unwrap();
        let result = catalog.register(key, &AccountId::new("b"), &mut events);
        assert!(matches!(result, Err(Error::PreconditionFailed(_))));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_same_designator_different_day() {
        let mut catalog = FlightCatalog::default();
        let mut events = Vec::new();

        catalog.register(FlightKey::new("ND1309", 1), &AccountId::new("a"), &mut events).unwrap();
        catalog.register(FlightKey::new("ND1309", 2), &AccountId::new("a"), &mut events).unwrap();
        assert_eq!(catalog.len(), 2);
    }
}
