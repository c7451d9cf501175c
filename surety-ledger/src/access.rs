//! Operational switch and component access control
//!
//! Two gates sit in front of every mutating command:
//!
//! 1. The operational switch: a global kill-switch only the owner may flip.
//! 2. The component allow-list: the business-logic component a call is
//!    routed through must have been authorized by the owner.

use crate::{
    types::{AccountId, Caller, ComponentId},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Owner, operational flag and authorized components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessControl {
    owner: AccountId,
    operational: bool,
    authorized: BTreeSet<ComponentId>,
}

impl AccessControl {
    /// Create access control with the ledger operational and `component` authorized
    pub fn new(owner: AccountId, component: ComponentId) -> Self {
        let mut authorized = BTreeSet::new();
        authorized.insert(component);

        Self {
            owner,
            operational: true,
            authorized,
        }
    }

    /// Contract owner
    pub fn owner(&self) -> &AccountId {
        &self.owner
    }

    /// Current switch position
    pub fn is_operational(&self) -> bool {
        self.operational
    }

    /// Whether `component` may drive mutations
    pub fn is_authorized(&self, component: &ComponentId) -> bool {
        self.authorized.contains(component)
    }

    /// Authorized components
    pub fn authorized_components(&self) -> impl Iterator<Item = &ComponentId> {
        self.authorized.iter()
    }

    /// Reject unless `account` is the owner
    pub fn require_owner(&self, account: &AccountId) -> Result<()> {
        if *account != self.owner {
            return Err(Error::AccessDenied(format!(
                "{} is not the contract owner",
                account
            )));
        }
        Ok(())
    }

    /// Gate applied to every ordinary mutating command
    pub fn require_gate(&self, caller: &Caller) -> Result<()> {
        if !self.operational {
            return Err(Error::NotOperational);
        }
        if !self.is_authorized(&caller.component) {
            return Err(Error::AccessDenied(format!(
                "component {} is not authorized",
                caller.component
            )));
        }
        Ok(())
    }

    /// Flip the switch; returns whether the value changed
    pub fn set_operational(&mut self, account: &AccountId, operational: bool) -> Result<bool> {
        self.require_owner(account)?;
        let changed = self.operational != operational;
        self.operational = operational;
        Ok(changed)
    }

    /// Authorize a component; returns whether it was newly added
    pub fn authorize(&mut self, account: &AccountId, component: ComponentId) -> Result<bool> {
        self.require_owner(account)?;
        Ok(self.authorized.insert(component))
    }

    /// Remove a component; returns whether it was present
    pub fn deauthorize(&mut self, account: &AccountId, component: &ComponentId) -> Result<bool> {
        self.require_owner(account)?;
        Ok(self.authorized.remove(component))
    }
}
