//! Airline funding and the shared pool
//!
//! All value entering the ledger (airline deposits, premiums, oracle fees)
//! lands in the [`Pool`]; the only value leaving it is a withdrawn payout.

use crate::{
    airline::AirlineRegistry,
    events::EventKind,
    types::{AccountId, FundingRecord},
    Error, Result,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Shared pool balance with running totals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    balance: Decimal,
    received: Decimal,
    paid_out: Decimal,
}

impl Pool {
    /// Current balance
    pub fn balance(&self) -> Decimal {
        self.balance
    }

    /// Total value ever received
    pub fn received(&self) -> Decimal {
        self.received
    }

    /// Total value ever paid out
    pub fn paid_out(&self) -> Decimal {
        self.paid_out
    }

    /// Accept value attached to a call
    pub fn deposit(&mut self, amount: Decimal) -> Result<()> {
        let (Some(balance), Some(received)) = (
            self.balance.checked_add(amount),
            self.received.checked_add(amount),
        ) else {
            return Err(Error::precondition(format!(
                "deposit of {} overflows the pool",
                amount
            )));
        };
        self.balance = balance;
        self.received = received;
        Ok(())
    }

    /// Reserve value for an outbound transfer
    pub fn disburse(&mut self, amount: Decimal) -> Result<()> {
        if amount > self.balance {
            return Err(Error::precondition(format!(
                "insufficient pool liquidity: need {}, have {}",
                amount, self.balance
            )));
        }
        self.balance -= amount;
        self.paid_out += amount;
        Ok(())
    }

    /// balance == received - paid_out
    pub fn is_balanced(&self) -> bool {
        self.balance == self.received - self.paid_out
    }
}

/// Per-airline funding records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundingLedger {
    records: BTreeMap<AccountId, FundingRecord>,
}

impl FundingLedger {
    /// Mark the genesis airline funded without a deposit
    pub fn with_prefunded(airline: AccountId) -> Self {
        let mut ledger = Self::default();
        ledger.records.insert(
            airline.clone(),
            FundingRecord {
                airline,
                deposited: Decimal::ZERO,
                funded: true,
            },
        );
        ledger
    }

    /// Whether the airline has ever reached the funding minimum
    pub fn is_funded(&self, airline: &AccountId) -> bool {
        self.records
            .get(airline)
            .map(|record| record.funded)
            .unwrap_or(false)
    }

    /// Funding record, if any
    pub fn record(&self, airline: &AccountId) -> Option<&FundingRecord> {
        self.records.get(airline)
    }

    /// Sum of all airline deposits
    pub fn total_deposited(&self) -> Decimal {
        self.records.values().map(|record| record.deposited).sum()
    }

    /// Accumulate a deposit for a registered airline
    pub fn fund(
        &mut self,
        airlines: &mut AirlineRegistry,
        pool: &mut Pool,
        airline: &AccountId,
        amount: Decimal,
        minimum_funding: Decimal,
        events: &mut Vec<EventKind>,
    ) -> Result<FundingRecord> {
        if !airlines.status(airline).is_registered() {
            return Err(Error::precondition(format!(
                "airline {} must be registered before funding",
                airline
            )));
        }
        if amount <= Decimal::ZERO {
            return Err(Error::precondition("funding amount must be positive"));
        }

        let deposited = self
            .records
            .get(airline)
            .map_or(Decimal::ZERO, |record| record.deposited)
            .checked_add(amount)
            .ok_or_else(|| {
                Error::precondition(format!("deposit of {} overflows {}'s funding", amount, airline))
            })?;
        pool.deposit(amount)?;

        let record = self
            .records
            .entry(airline.clone())
            .or_insert_with(|| FundingRecord {
                airline: airline.clone(),
                deposited: Decimal::ZERO,
                funded: false,
            });

        record.deposited = deposited;
        if record.deposited >= minimum_funding {
            record.funded = true;
        }
        let record = record.clone();

        airlines.record_deposit(airline, record.deposited);
        if record.funded {
            airlines.mark_funded(airline);
        }

        events.push(EventKind::AirlineFunded {
            account: airline.clone(),
            deposit: record.deposited,
        });

        tracing::info!(
            airline = %airline,
            amount = %amount,
            deposited = %record.deposited,
            funded = record.funded,
            "Airline funding received"
        );

        Ok(record)
    }
}
