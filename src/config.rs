use std::env;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::Address;
use crate::reveal::DEFAULT_DURATION_DAYS;

pub const ENV_CONTRACT_ADDRESS: &str = "CARD_DUEL_CONTRACT_ADDRESS";
pub const ENV_AUTH_DURATION_DAYS: &str = "CARD_DUEL_AUTH_DURATION_DAYS";
pub const ENV_CHAIN_ID: &str = "CARD_DUEL_CHAIN_ID";
pub const ENV_RNG_SEED: &str = "CARD_DUEL_RNG_SEED";

/// Sepolia.
pub const DEFAULT_CHAIN_ID: u64 = 11_155_111;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Set the deployed CardGame address to start playing")]
    ContractNotConfigured,
    #[error("invalid {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Settings for a game session. Everything except the contract address has a
/// usable default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub contract_address: Option<Address>,
    pub chain_id: u64,
    pub authorization_days: u32,
    pub rng_seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            contract_address: None,
            chain_id: DEFAULT_CHAIN_ID,
            authorization_days: DEFAULT_DURATION_DAYS,
            rng_seed: None,
        }
    }
}

impl SessionConfig {
    pub fn with_contract(contract_address: Address) -> Self {
        Self {
            contract_address: Some(contract_address),
            ..Self::default()
        }
    }

    /// Read overrides from the process environment. Unset variables keep
    /// their defaults; the zero address counts as unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(raw) = read_var(ENV_CONTRACT_ADDRESS) {
            let address: Address = raw.parse().map_err(|err| ConfigError::Invalid {
                var: ENV_CONTRACT_ADDRESS,
                reason: format!("{err}"),
            })?;
            config.contract_address = (!address.is_zero()).then_some(address);
        }
        if let Some(raw) = read_var(ENV_AUTH_DURATION_DAYS) {
            config.authorization_days = parse_number(ENV_AUTH_DURATION_DAYS, &raw)?;
            if config.authorization_days == 0 {
                return Err(ConfigError::Invalid {
                    var: ENV_AUTH_DURATION_DAYS,
                    reason: "must be at least one day".into(),
                });
            }
        }
        if let Some(raw) = read_var(ENV_CHAIN_ID) {
            config.chain_id = parse_number(ENV_CHAIN_ID, &raw)?;
        }
        if let Some(raw) = read_var(ENV_RNG_SEED) {
            config.rng_seed = Some(parse_number(ENV_RNG_SEED, &raw)?);
        }
        Ok(config)
    }

    pub fn is_contract_configured(&self) -> bool {
        self.contract_address.is_some_and(|address| !address.is_zero())
    }

    pub fn require_contract(&self) -> Result<Address, ConfigError> {
        self.contract_address
            .filter(|address| !address.is_zero())
            .ok_or(ConfigError::ContractNotConfigured)
    }
}

fn read_var(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn parse_number<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|err: T::Err| ConfigError::Invalid {
        var,
        reason: err.to_string(),
    })
}
