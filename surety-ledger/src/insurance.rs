//! Passenger policies and payout accounting
//!
//! A policy moves through three bookkeeping stages: purchased (credited is
//! zero), credited (payout reserved after an airline-fault resolution) and
//! withdrawn. Crediting happens at most once per policy. Withdrawal flips the
//! flag and debits the pool here; the outbound transfer happens afterwards,
//! outside this module.

use crate::{
    events::EventKind,
    funding::Pool,
    types::{AccountId, FlightKey, InsurancePolicy, PolicyId},
    Error, Result,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Policy store indexed by flight
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsurancePolicyStore {
    policies: BTreeMap<PolicyId, InsurancePolicy>,
    by_flight: BTreeMap<FlightKey, Vec<PolicyId>>,
    next_id: PolicyId,
}

impl InsurancePolicyStore {
    /// Policy by ID
    pub fn get(&self, id: PolicyId) -> Option<&InsurancePolicy> {
        self.policies.get(&id)
    }

    /// All policies on a flight
    pub fn for_flight(&self, flight: &FlightKey) -> Vec<&InsurancePolicy> {
        self.by_flight
            .get(flight)
            .map(|ids| ids.iter().filter_map(|id| self.policies.get(id)).collect())
            .unwrap_or_default()
    }

    /// A passenger's policies on a flight
    pub fn for_passenger(&self, flight: &FlightKey, passenger: &AccountId) -> Vec<&InsurancePolicy> {
        self.for_flight(flight)
            .into_iter()
            .filter(|policy| policy.passenger == *passenger)
            .collect()
    }

    /// Sum of all premiums collected
    pub fn total_premiums(&self) -> Decimal {
        self.policies.values().map(|policy| policy.premium).sum()
    }

    /// Sum of all payouts already withdrawn
    pub fn total_withdrawn(&self) -> Decimal {
        self.policies
            .values()
            .filter(|policy| policy.withdrawn)
            .map(|policy| policy.credited)
            .sum()
    }

    /// Credited payouts not yet withdrawn
    pub fn outstanding_credit(&self) -> Decimal {
        self.policies
            .values()
            .filter(|policy| policy.is_claimable())
            .map(|policy| policy.credited)
            .sum()
    }

    /// Record a new policy; the caller has checked the flight is open
    pub fn buy(
        &mut self,
        flight: &FlightKey,
        passenger: &AccountId,
        premium: Decimal,
        premium_cap: Decimal,
        pool: &mut Pool,
        events: &mut Vec<EventKind>,
    ) -> Result<PolicyId> {
        if premium <= Decimal::ZERO || premium > premium_cap {
            return Err(Error::precondition(format!(
                "insurance premium must be greater than 0 and at most {}",
                premium_cap
            )));
        }

        pool.deposit(premium)?;

        let id = self.next_id;
        self.next_id += 1;

        self.policies.insert(
            id,
            InsurancePolicy {
                id,
                passenger: passenger.clone(),
                flight: flight.clone(),
                premium,
                credited: Decimal::ZERO,
                withdrawn: false,
            },
        );
        self.by_flight.entry(flight.clone()).or_default().push(id);

        events.push(EventKind::BuyInsurance {
            account: passenger.clone(),
            flight: flight.designator.clone(),
            timestamp: flight.timestamp,
            amount: premium,
        });

        tracing::info!(policy_id = id, flight = %flight, passenger = %passenger, premium = %premium, "Policy purchased");
        Ok(id)
    }

    /// Credit every uncredited policy on `flight` with `premium × multiplier`
    ///
    /// Returns the total newly credited. Calling it again credits nothing.
    pub fn credit_payout(
        &mut self,
        flight: &FlightKey,
        multiplier: Decimal,
        events: &mut Vec<EventKind>,
    ) -> Decimal {
        let Some(ids) = self.by_flight.get(flight) else {
            return Decimal::ZERO;
        };

        let mut total = Decimal::ZERO;
        for id in ids {
            let Some(policy) = self.policies.get_mut(id) else {
                continue;
            };
            if policy.credited > Decimal::ZERO {
                continue;
            }

            policy.credited = policy.premium * multiplier;
            total += policy.credited;

            events.push(EventKind::PayoutCredited {
                account: policy.passenger.clone(),
                amount: policy.credited,
            });
        }

        if total > Decimal::ZERO {
            tracing::info!(flight = %flight, total = %total, "Payouts credited");
        }
        total
    }

    /// Settle all of a passenger's claimable policies on `flight`
    ///
    /// Flags are flipped and the pool debited before the caller performs the
    /// transfer of the returned amount.
    pub fn withdraw(
        &mut self,
        flight: &FlightKey,
        passenger: &AccountId,
        pool: &mut Pool,
        events: &mut Vec<EventKind>,
    ) -> Result<Decimal> {
        let owned: Vec<PolicyId> = self
            .for_passenger(flight, passenger)
            .into_iter()
            .filter(|policy| policy.credited > Decimal::ZERO)
            .map(|policy| policy.id)
            .collect();

        if owned.is_empty() {
            return Err(Error::precondition(format!(
                "no credited policy for {} on flight {}",
                passenger, flight
            )));
        }

        let mut amount = Decimal::ZERO;
        for id in &owned {
            if let Some(policy) = self.policies.get_mut(id) {
                if !policy.withdrawn {
                    policy.withdrawn = true;
                    amount += policy.credited;
                }
            }
        }

        if amount == Decimal::ZERO {
            return Err(Error::finalized(format!(
                "payout for {} on flight {} already withdrawn",
                passenger, flight
            )));
        }

        pool.disburse(amount)?;

        events.push(EventKind::PayoutWithdrawn {
            account: passenger.clone(),
            amount,
        });

        tracing::info!(flight = %flight, passenger = %passenger, amount = %amount, "Payout withdrawn");
        Ok(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flight() -> FlightKey {
        FlightKey::new("ND1309", 1_546_333_200_000)
    }

    fn passenger() -> AccountId {
        AccountId::new("passenger1")
    }

    #[test]
    fn test_premium_bounds() {
        let mut store = InsurancePolicyStore::default();
        let mut pool = Pool::default();
        let mut events = Vec::new();

        let over = store.buy(&flight(), &passenger(), Decimal::from(2), Decimal::ONE, &mut pool, &mut events);
        assert!(matches!(over, Err(Error::PreconditionFailed(_))));

        let zero = store.buy(&flight(), &passenger(), Decimal::ZERO, Decimal::ONE, &mut pool, &mut events);
        assert!(zero.is_err());

        store.buy(&flight(), &passenger(), Decimal::ONE, Decimal::ONE, &mut pool, &mut events).unwrap();
        assert_eq!(pool.balance(), Decimal::ONE);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_credit_is_idempotent() {
        let mut store = InsurancePolicyStore::default();
        let mut pool = Pool::default();
        let mut events = Vec::new();

        store.buy(&flight(), &passenger(), Decimal::ONE, Decimal::ONE, &mut pool, &mut events).unwrap();
        store.buy(&flight(), &passenger(), Decimal::new(5, 1), Decimal::ONE, &mut pool, &mut events).unwrap();

        let multiplier = Decimal::new(15, 1);
        let first = store.credit_payout(&flight(), multiplier, &mut events);
        assert_eq!(first, Decimal::new(225, 2)); // 1.5 + 0.75

        let second = store.credit_payout(&flight(), multiplier, &mut events);
        assert_eq!(second, Decimal::ZERO);
        assert_eq!(store.outstanding_credit(), Decimal::new(225, 2));
    }

    #[test]
    fn test_withdraw_once() {
        let mut store = InsurancePolicyStore::default();
        let mut pool = Pool::default();
        let mut events = Vec::new();

        pool.deposit(Decimal::from(10)).unwrap();
        store.buy(&flight(), &passenger(), Decimal::ONE, Decimal::ONE, &mut pool, &mut events).unwrap();

        // Nothing credited yet
        let early = store.withdraw(&flight(), &passenger(), &mut pool, &mut events);
        assert!(matches!(early, Err(Error::PreconditionFailed(_))));

        store.credit_payout(&flight(), Decimal::new(15, 1), &mut events);

        let amount = store.withdraw(&flight(), &passenger(), &mut pool, &mut events).unwrap();
        assert_eq!(amount, Decimal::new(15, 1));
        assert_eq!(pool.balance(), Decimal::new(95, 1));

        let again = store.withdraw(&flight(), &passenger(), &mut pool, &mut events);
        assert!(matches!(again, Err(Error::AlreadyFinalized(_))));
        assert_eq!(store.total_withdrawn(), Decimal::new(15, 1));
    }

    #[test]
    fn test_withdraw_only_own_policies() {
        let mut store = InsurancePolicyStore::default();
        let mut pool = Pool::default();
        let mut events = Vec::new();

        store.buy(&flight(), &passenger(), Decimal::ONE, Decimal::ONE, &mut pool, &mut events).unwrap();
        store.credit_payout(&flight(), Decimal::new(15, 1), &mut events);

        let other = store.withdraw(&flight(), &AccountId::new("passenger2"), &mut pool, &mut events);
        assert!(matches!(other, Err(Error::PreconditionFailed(_))));
    }
}
