//! Outbound value transfer
//!
//! The ledger calls [`PayoutTransfer::transfer`] only after a withdrawal's
//! bookkeeping (withdrawn flag, pool debit, event) has been committed. The
//! call runs inside the ledger actor, so anything the recipient triggers in
//! response queues behind the current command and observes the updated
//! state. An `Err` reverts the withdrawal with a compensating log entry.

use crate::{types::AccountId, Error, Result};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Value leaving the pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    /// Recipient
    pub to: AccountId,
    /// Amount
    pub amount: Decimal,
}

/// Moves value to an external recipient
pub trait PayoutTransfer: Send + Sync {
    /// Transfer `payout.amount` to `payout.to`
    fn transfer(&self, payout: &Payout) -> Result<()>;
}

/// In-process wallet crediting recipient balances
#[derive(Debug, Default)]
pub struct InMemoryWallet {
    balances: Mutex<HashMap<AccountId, Decimal>>,
    history: Mutex<Vec<Payout>>,
}

impl InMemoryWallet {
    /// Create empty wallet
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance received by `account`
    pub fn balance_of(&self, account: &AccountId) -> Decimal {
        self.balances
            .lock()
            .get(account)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Every transfer in order
    pub fn history(&self) -> Vec<Payout> {
        self.history.lock().clone()
    }
}

impl PayoutTransfer for InMemoryWallet {
    fn transfer(&self, payout: &Payout) -> Result<()> {
        if payout.amount <= Decimal::ZERO {
            return Err(Error::Transfer(format!(
                "refusing non-positive transfer to {}",
                payout.to
            )));
        }

        *self
            .balances
            .lock()
            .entry(payout.to.clone())
            .or_insert(Decimal::ZERO) += payout.amount;
        self.history.lock().push(payout.clone());

        tracing::debug!(to = %payout.to, amount = %payout.amount, "Payout transferred");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_accumulates() {
        let wallet = InMemoryWallet::new();
        let to = AccountId::new("passenger1");

        wallet
            .transfer(&Payout { to: to.clone(), amount: Decimal::new(15, 1) })
            .unwrap();
        wallet
            .transfer(&Payout { to: to.clone(), amount: Decimal::new(5, 1) })
            .unwrap();

        assert_eq!(wallet.balance_of(&to), Decimal::from(2));
        assert_eq!(wallet.history().len(), 2);
    }

    #[test]
    fn test_wallet_rejects_zero() {
        let wallet = InMemoryWallet::new();
        let result = wallet.transfer(&Payout {
            to: AccountId::new("p"),
            amount: Decimal::ZERO,
        });
        assert!(matches!(result, Err(Error::Transfer(_))));
    }
}
