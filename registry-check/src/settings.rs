//! Startup configuration: file locations and per-network endpoints.
//!
//! Everything is read from the process environment once (after `dotenv` has
//! had a chance to populate it) and validated before any remote call is made.

use std::{
    env, fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use ethers::types::{Address, U256};

use crate::error::{AppError, Result};

pub const DEFAULT_CONTRACTS_FILE: &str = "contracts.json";
pub const DEFAULT_ABI_DIR: &str = "../release/abis";
pub const DEFAULT_CONFIG_FILE: &str = "addressConfig.json";

/// Placeholder in an RPC URL that is replaced by `RPC_API_KEY`.
const API_KEY_PLACEHOLDER: &str = "{api_key}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    #[default]
    Homestead,
    Goerli,
}

impl Network {
    pub fn name(&self) -> &'static str {
        match self {
            Network::Homestead => "homestead",
            Network::Goerli => "goerli",
        }
    }

    /// EIP-155 chain ID the RPC endpoint must report.
    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Homestead => 1,
            Network::Goerli => 5,
        }
    }

    /// Fail if an endpoint reports a chain other than this network's.
    pub fn ensure_chain(&self, reported: U256) -> Result<()> {
        if reported == U256::from(self.chain_id()) {
            Ok(())
        } else {
            Err(AppError::ChainMismatch {
                network: self.name().to_string(),
                expected: self.chain_id(),
                actual: reported.to_string(),
            })
        }
    }

    fn env_prefix(&self) -> &'static str {
        match self {
            Network::Homestead => "MAINNET",
            Network::Goerli => "GOERLI",
        }
    }

    pub fn rpc_url_var(&self) -> String {
        format!("{}_RPC_URL", self.env_prefix())
    }

    pub fn address_provider_var(&self) -> String {
        format!("{}_ADDRESS_PROVIDER", self.env_prefix())
    }
}

impl FromStr for Network {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "homestead" | "mainnet" => Ok(Network::Homestead),
            "goerli" => Ok(Network::Goerli),
            _ => Err(AppError::UnknownNetwork(s.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolved endpoint and registry address for one network.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub network: Network,
    pub rpc_url: String,
    pub address_provider: Address,
}

impl NetworkConfig {
    pub fn from_env(network: Network) -> Result<Self> {
        Self::from_lookup(network, |key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source. Empty values count
    /// as unset.
    pub fn from_lookup<F>(network: Network, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let rpc_var = network.rpc_url_var();
        let mut rpc_url = get(&rpc_var).ok_or(AppError::MissingEnv(rpc_var))?;
        if rpc_url.contains(API_KEY_PLACEHOLDER) {
            let api_key =
                get("RPC_API_KEY").ok_or_else(|| AppError::MissingEnv("RPC_API_KEY".into()))?;
            rpc_url = rpc_url.replace(API_KEY_PLACEHOLDER, api_key.trim());
        }

        let provider_var = network.address_provider_var();
        let raw = get(&provider_var).ok_or(AppError::MissingEnv(provider_var))?;
        let address_provider = raw.trim().parse::<Address>().map_err(|e| {
            AppError::InvalidAddress(format!("{} for {}: {}", raw.trim(), network, e))
        })?;

        Ok(Self {
            network,
            rpc_url,
            address_provider,
        })
    }
}

/// Locations of the contract list, ABI directory and bootstrap config.
#[derive(Debug, Clone)]
pub struct Settings {
    pub contracts_file: PathBuf,
    pub abi_dir: PathBuf,
    pub config_file: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            contracts_file: PathBuf::from(DEFAULT_CONTRACTS_FILE),
            abi_dir: PathBuf::from(DEFAULT_ABI_DIR),
            config_file: PathBuf::from(DEFAULT_CONFIG_FILE),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(path) = get("CONTRACTS_FILE") {
            settings.contracts_file = PathBuf::from(path);
        }
        if let Some(path) = get("ABI_DIR") {
            settings.abi_dir = PathBuf::from(path);
        }
        if let Some(path) = get("ADDRESS_CONFIG_FILE") {
            settings.config_file = PathBuf::from(path);
        }
        settings
    }

    /// Snapshot metadata lives next to the config file.
    pub fn meta_file(&self) -> PathBuf {
        meta_path(&self.config_file)
    }
}

pub fn meta_path(config_file: &Path) -> PathBuf {
    let mut name = config_file
        .file_stem()
        .map(|stem| stem.to_os_string())
        .unwrap_or_default();
    name.push(".meta.json");
    config_file.with_file_name(name)
}
