//! Configuration loading.
//!
//! A `ProvisionConfig` is read from TOML; every section has defaults so an
//! empty file (or no file) is a valid configuration for the in-memory
//! ledger.
//!
//! ```toml
//! [network]
//! name = "sepolia-fork"
//! endpoint = "file:state/ledger.json"
//!
//! [accounts.deployer]
//! key_env = "DEPLOYER_KEY"
//!
//! [accounts.owner]
//! address = "0x1111111111111111111111111111111111111111"
//!
//! [confirmation]
//! timeout_ms = 120000
//!
//! [run]
//! parallelism = 4
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::app::{RetryPolicy, SubmitterConfig};
use crate::domain::{Address, Manifest, Role};
use crate::impls::{KeyError, LocalSigner};
use crate::ports::{Accounts, Signer};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("unsupported endpoint {0:?}; expected memory: or file:<path>")]
    UnsupportedEndpoint(String),

    #[error("account {role}: environment variable {var} is not set")]
    MissingKey { role: Role, var: String },

    #[error("account {role}: {source}")]
    BadKey {
        role: Role,
        #[source]
        source: KeyError,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    pub network: NetworkConfig,
    pub accounts: BTreeMap<String, AccountConfig>,
    pub confirmation: ConfirmationConfig,
    pub retry: RetryConfig,
    pub run: RunConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub name: String,
    pub endpoint: String,
    pub read_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: "local".to_string(),
            endpoint: "memory:".to_string(),
            read_timeout_ms: 10_000,
        }
    }
}

/// A named account. `key` or `key_env` makes it a signer; `address` alone
/// only makes it referable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_env: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub max_poll_retries: u32,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 120_000,
            poll_interval_ms: 1_000,
            max_poll_retries: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub max_read_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            multiplier: 2.0,
            max_delay_ms: 10_000,
            max_read_retries: 3,
        }
    }
}

impl RetryConfig {
    fn policy(&self, max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.base_delay_ms),
            multiplier: self.multiplier,
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_retries,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub parallelism: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self { parallelism: 1 }
    }
}

/// Where the ledger lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Fresh in-memory ledger, discarded at exit.
    Memory,
    /// In-memory ledger persisted to a JSON snapshot.
    File(PathBuf),
}

impl ProvisionConfig {
    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "loading config");
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "network.name must not be empty".to_string(),
            ));
        }
        if self.network.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "network.read_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.confirmation.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "confirmation.timeout_ms must be > 0".to_string(),
            ));
        }
        if self.confirmation.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "confirmation.poll_interval_ms must be > 0".to_string(),
            ));
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "retry.multiplier must be >= 1.0".to_string(),
            ));
        }
        if self.run.parallelism == 0 {
            return Err(ConfigError::Invalid(
                "run.parallelism must be > 0".to_string(),
            ));
        }
        for (role, account) in &self.accounts {
            if role.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "account names must not be empty".to_string(),
                ));
            }
            if account.key.is_some() && account.key_env.is_some() {
                return Err(ConfigError::Invalid(format!(
                    "accounts.{role}: set either key or key_env, not both"
                )));
            }
        }
        self.endpoint()?;
        Ok(())
    }

    pub fn endpoint(&self) -> Result<Endpoint, ConfigError> {
        let endpoint = self.network.endpoint.trim();
        if endpoint == "memory:" {
            return Ok(Endpoint::Memory);
        }
        match endpoint.strip_prefix("file:") {
            Some(path) if !path.is_empty() => Ok(Endpoint::File(PathBuf::from(path))),
            _ => Err(ConfigError::UnsupportedEndpoint(endpoint.to_string())),
        }
    }

    /// Resolve named accounts into addresses and signers.
    ///
    /// With no accounts configured, `deployer` is a deterministic
    /// development key. `owner` falls back to `deployer` when not given.
    pub fn accounts(&self) -> Result<Accounts, ConfigError> {
        let mut accounts = Accounts::new();
        for (name, account) in &self.accounts {
            let role = Role::new(name.as_str());
            match load_signer(&role, account)? {
                Some(signer) => {
                    if let Some(address) = account.address {
                        if address != signer.address() {
                            return Err(ConfigError::Invalid(format!(
                                "accounts.{role}: address does not match the key"
                            )));
                        }
                    }
                    accounts.insert_signer(role, signer);
                }
                None => match account.address {
                    Some(address) => accounts = accounts.with_address(role, address),
                    None => {
                        return Err(ConfigError::Invalid(format!(
                            "accounts.{role}: needs an address, key or key_env"
                        )));
                    }
                },
            }
        }

        let deployer = Role::deployer();
        if self.accounts.is_empty() {
            accounts.insert_signer(deployer.clone(), Arc::new(LocalSigner::dev(&deployer)));
        }
        let owner = Role::owner();
        if accounts.address(&owner).is_none() {
            if let Some(signer) = accounts.signer(&deployer) {
                accounts.insert_signer(owner, signer);
            } else if let Some(address) = accounts.address(&deployer) {
                accounts = accounts.with_address(owner, address);
            }
        }
        Ok(accounts)
    }

    pub fn submitter_config(&self) -> SubmitterConfig {
        SubmitterConfig {
            confirmation_timeout: Duration::from_millis(self.confirmation.timeout_ms),
            poll_interval: Duration::from_millis(self.confirmation.poll_interval_ms),
            poll_retry: self.retry.policy(self.confirmation.max_poll_retries),
        }
    }

    pub fn read_retry_policy(&self) -> RetryPolicy {
        self.retry.policy(self.retry.max_read_retries)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.network.read_timeout_ms)
    }
}

fn load_signer(
    role: &Role,
    account: &AccountConfig,
) -> Result<Option<Arc<dyn Signer>>, ConfigError> {
    let key = match (&account.key, &account.key_env) {
        (Some(key), _) => key.clone(),
        (None, Some(var)) => std::env::var(var).map_err(|_| ConfigError::MissingKey {
            role: role.clone(),
            var: var.clone(),
        })?,
        (None, None) => return Ok(None),
    };
    let signer = LocalSigner::from_hex(&key).map_err(|source| ConfigError::BadKey {
        role: role.clone(),
        source,
    })?;
    Ok(Some(Arc::new(signer)))
}

/// Read a TOML task manifest (`[[tasks]]` tables).
pub fn load_manifest(path: &Path) -> Result<Manifest, ConfigError> {
    debug!(path = %path.display(), "loading manifest");
    let content = fs::read_to_string(path)?;
    Ok(Manifest::from_toml_str(&content)?)
}
