use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::models::errors::{ConfigError, NetworkError};
use crate::utils::retry::RetryConfig;

pub const DEFAULT_PAGE_SIZE: usize = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub address: String,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "0.0.0.0".to_string(),
            port: 9100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub address: String,
    #[serde(default)]
    pub network: NetworkFamily,
    #[serde(default = "default_net")]
    pub net: String,
    pub api_key: String,
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_database_name")]
    pub database_name: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_net() -> String {
    "main".to_string()
}

fn default_database_name() -> String {
    "scan_db".to_string()
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        Address::from_str(&self.address).map_err(|e| ConfigError::InvalidAddress {
            address: self.address.clone(),
            reason: e.to_string(),
        })?;
        if self.page_size == 0 {
            return Err(ConfigError::ZeroPageSize);
        }
        let network = self.network()?;
        if self.api_url.is_none() && network.api_url().is_none() {
            return Err(NetworkError::UnknownEndpoint {
                network: network.to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub fn network(&self) -> Result<Network, NetworkError> {
        Network::new(self.network, &self.net)
    }

    pub fn database_path(&self) -> PathBuf {
        let dir = self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("address-indexer")
        });
        dir.join(format!("{}.db", self.database_name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkFamily {
    #[default]
    Ethereum,
    Bsc,
    Polygon,
}

impl NetworkFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkFamily::Ethereum => "ethereum",
            NetworkFamily::Bsc => "bsc",
            NetworkFamily::Polygon => "polygon",
        }
    }
}

impl FromStr for NetworkFamily {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ethereum" | "ether" | "eth" => Ok(Self::Ethereum),
            "bsc" | "bnb" => Ok(Self::Bsc),
            "polygon" | "matic" => Ok(Self::Polygon),
            _ => Err(NetworkError::UnsupportedFamily {
                name: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for NetworkFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Each (family, variant) pair is an independent data universe
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Network {
    family: NetworkFamily,
    variant: String,
}

impl Network {
    pub fn new(family: NetworkFamily, variant: &str) -> Result<Self, NetworkError> {
        // Variants end up in table names, so keep them to [a-z0-9]
        if variant.is_empty()
            || !variant
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(NetworkError::InvalidVariant {
                variant: variant.to_string(),
            });
        }
        Ok(Self {
            family,
            variant: variant.to_string(),
        })
    }

    pub fn main(family: NetworkFamily) -> Self {
        Self {
            family,
            variant: "main".to_string(),
        }
    }

    pub fn family(&self) -> NetworkFamily {
        self.family
    }

    pub fn variant(&self) -> &str {
        &self.variant
    }

    pub fn api_url(&self) -> Option<&'static str> {
        match (self.family, self.variant.as_str()) {
            (NetworkFamily::Ethereum, "main") => Some("https://api.etherscan.io/api"),
            (NetworkFamily::Ethereum, "goerli") => Some("https://api-goerli.etherscan.io/api"),
            (NetworkFamily::Ethereum, "sepolia") => Some("https://api-sepolia.etherscan.io/api"),
            (NetworkFamily::Bsc, "main") => Some("https://api.bscscan.com/api"),
            (NetworkFamily::Bsc, "test") => Some("https://api-testnet.bscscan.com/api"),
            (NetworkFamily::Polygon, "main") => Some("https://api.polygonscan.com/api"),
            (NetworkFamily::Polygon, "test") => Some("https://api-testnet.polygonscan.com/api"),
            _ => None,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.family, self.variant)
    }
}
