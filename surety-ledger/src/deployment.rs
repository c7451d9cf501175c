//! Deployment artifact shared with clients and oracle nodes
//!
//! A JSON object keyed by network name:
//!
//! ```json
//! { "localhost": { "url": "http://localhost:8545", "dataAddress": "...", "appAddress": "..." } }
//! ```

use crate::{types::ComponentId, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Where one network's ledger is reachable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Node URL
    pub url: String,
    /// Address of the data store
    pub data_address: String,
    /// Address of the application component
    pub app_address: String,
}

impl Endpoint {
    /// Application component as authorized on the ledger
    pub fn app_component(&self) -> ComponentId {
        ComponentId::new(self.app_address.clone())
    }
}

/// Network name → endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentConfig {
    networks: BTreeMap<String, Endpoint>,
}

impl DeploymentConfig {
    /// Parse from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("invalid deployment: {}", e)))
    }

    /// Read from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let deployment = Self::from_json(&json)?;
        tracing::debug!(
            path = ?path.as_ref(),
            networks = deployment.networks.len(),
            "Loaded deployment"
        );
        Ok(deployment)
    }

    /// Write as pretty-printed JSON
    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("cannot encode deployment: {}", e)))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Add or replace a network
    pub fn insert(&mut self, network: impl Into<String>, endpoint: Endpoint) {
        self.networks.insert(network.into(), endpoint);
    }

    /// Endpoint for `network`
    pub fn endpoint(&self, network: &str) -> Result<&Endpoint> {
        self.networks
            .get(network)
            .ok_or_else(|| Error::Config(format!("network {} not in deployment", network)))
    }

    /// Known network names
    pub fn networks(&self) -> impl Iterator<Item = &str> {
        self.networks.keys().map(String::as_str)
    }
}
