use config::{Config, ConfigError, Environment, File};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Configuration loading error: {0}")]
    ConfigLoad(#[from] ConfigError),
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

pub type Result<T> = std::result::Result<T, ConfigurationError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// General settings
    pub system: SystemSettings,

    /// JSON-RPC endpoints and log pagination
    pub rpc: RpcConfig,

    /// Backoff for failed RPC calls
    pub retry: RetryConfig,

    /// Marketplace proxy registry and the collections that implicitly approve it
    pub marketplace: MarketplaceConfig,

    /// Permit2 secondary approval protocol
    pub permit2: Permit2Config,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSettings {
    /// Chain used when none is given on the command line
    pub default_chain_id: u64,

    /// Emit logs as JSON lines instead of human-readable text
    pub json_logs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// JSON-RPC URL per chain id
    pub endpoints: HashMap<String, String>,

    /// First block worth scanning per chain id (defaults to 0)
    pub start_blocks: HashMap<String, u64>,

    /// Request timeout in seconds
    pub request_timeout_seconds: u64,

    /// Largest block window requested by a single eth_getLogs call
    pub max_block_range: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the initial attempt
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceConfig {
    /// Proxy registry contract per chain id
    pub proxy_registries: HashMap<String, String>,

    /// Collections that treat the account's proxy as an approved operator
    /// without emitting ApprovalForAll, per chain id
    pub implicit_approval_collections: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permit2Config {
    pub enabled: bool,

    /// Permit2 is deployed at the same address on every supported chain
    pub address: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            system: SystemSettings {
                default_chain_id: 1,
                json_logs: false,
            },
            rpc: RpcConfig {
                endpoints: HashMap::from([
                    ("1".to_string(), "https://ethereum-rpc.publicnode.com".to_string()),
                    ("8453".to_string(), "https://base-rpc.publicnode.com".to_string()),
                ]),
                start_blocks: HashMap::new(),
                request_timeout_seconds: 30,
                max_block_range: 100_000,
            },
            retry: RetryConfig {
                max_retries: 3,
                base_delay_ms: 300,
                max_delay_ms: 5_000,
            },
            marketplace: MarketplaceConfig {
                // Wyvern proxy registry used by OpenSea
                proxy_registries: HashMap::from([(
                    "1".to_string(),
                    "0xa5409ec958C83C3f309868babACA7c86DCB077c1".to_string(),
                )]),
                // Moonbirds
                implicit_approval_collections: HashMap::from([(
                    "1".to_string(),
                    vec!["0x23581767a106ae21c074b2276D25e5C3e136a68b".to_string()],
                )]),
            },
            permit2: Permit2Config {
                enabled: true,
                address: "0x000000000022D473030F116dDEE9F6B43aC78BA3".to_string(),
            },
        }
    }
}

fn address_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("address pattern is valid"))
}

/// Check that a string is a 0x-prefixed 20 byte hex address
pub fn is_valid_address(value: &str) -> bool {
    address_pattern().is_match(value.trim())
}

fn parse_chain_key(section: &str, key: &str) -> Result<u64> {
    key.parse::<u64>().map_err(|_| {
        ConfigurationError::InvalidValue(format!("{}: '{}' is not a chain id", section, key))
    })
}

/// Re-key a chain-id keyed table by numeric chain id
fn by_chain<T: Clone>(section: &str, table: &HashMap<String, T>) -> Result<HashMap<u64, T>> {
    table
        .iter()
        .map(|(key, value)| Ok((parse_chain_key(section, key)?, value.clone())))
        .collect()
}

fn validate_address(section: &str, value: &str) -> Result<()> {
    if !is_valid_address(value) {
        return Err(ConfigurationError::InvalidValue(format!(
            "{}: '{}' is not a valid address",
            section, value
        )));
    }
    Ok(())
}

impl RpcConfig {
    /// JSON-RPC URL per numeric chain id
    pub fn endpoints_by_chain(&self) -> Result<HashMap<u64, String>> {
        by_chain("rpc.endpoints", &self.endpoints)
    }

    /// First scanned block per numeric chain id; absent chains start at 0
    pub fn start_blocks_by_chain(&self) -> Result<HashMap<u64, u64>> {
        by_chain("rpc.start_blocks", &self.start_blocks)
    }

    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_seconds == 0 {
            return Err(ConfigurationError::InvalidValue(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if self.max_block_range == 0 {
            return Err(ConfigurationError::InvalidValue(
                "Max block range must be greater than 0".to_string(),
            ));
        }

        for url in self.endpoints_by_chain()?.values() {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigurationError::InvalidValue(format!(
                    "rpc.endpoints: '{}' is not an http(s) URL",
                    url
                )));
            }
        }

        self.start_blocks_by_chain()?;

        Ok(())
    }
}

impl MarketplaceConfig {
    /// Proxy registry address per numeric chain id
    pub fn registries_by_chain(&self) -> Result<HashMap<u64, String>> {
        by_chain("marketplace.proxy_registries", &self.proxy_registries)
    }

    /// Implicit-approval collections per numeric chain id
    pub fn collections_by_chain(&self) -> Result<HashMap<u64, Vec<String>>> {
        by_chain(
            "marketplace.implicit_approval_collections",
            &self.implicit_approval_collections,
        )
    }

    pub fn validate(&self) -> Result<()> {
        for registry in self.registries_by_chain()?.values() {
            validate_address("marketplace.proxy_registries", registry)?;
        }

        for collections in self.collections_by_chain()?.values() {
            for collection in collections {
                validate_address("marketplace.implicit_approval_collections", collection)?;
            }
        }

        Ok(())
    }
}

impl SystemConfig {
    /// Load configuration from `config.toml` and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config_builder = Config::builder()
            // Start with defaults
            .add_source(Config::try_from(&SystemConfig::default())?);

        if config_path.as_ref().exists() {
            info!(
                "Loading configuration from: {}",
                config_path.as_ref().display()
            );
            config_builder = config_builder.add_source(File::from(config_path.as_ref()));
        } else {
            debug!("Config file not found, using defaults and environment variables");
        }

        config_builder = config_builder.add_source(
            Environment::with_prefix("ALLOWANCE")
                .try_parsing(true)
                .separator("__")
                .list_separator(","),
        );

        let system_config: SystemConfig = config_builder.build()?.try_deserialize()?;
        system_config.validate()?;

        Ok(system_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.rpc.validate()?;
        self.marketplace.validate()?;

        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigurationError::InvalidValue(
                "retry.base_delay_ms cannot exceed retry.max_delay_ms".to_string(),
            ));
        }

        if self.permit2.enabled {
            validate_address("permit2.address", &self.permit2.address)?;
        }

        Ok(())
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SystemConfig::default();
        assert!(config.validate().is_ok());

        let endpoints = config.rpc.endpoints_by_chain().unwrap();
        assert_eq!(
            endpoints.get(&1).map(String::as_str),
            Some("https://ethereum-rpc.publicnode.com")
        );
        assert!(!endpoints.contains_key(&10));
        assert!(config.rpc.start_blocks_by_chain().unwrap().is_empty());

        let collections = config.marketplace.collections_by_chain().unwrap();
        assert_eq!(collections[&1].len(), 1);
        assert!(!collections.contains_key(&8453));
        assert!(config.marketplace.registries_by_chain().unwrap().contains_key(&1));
    }

    #[test]
    fn test_rejects_zero_block_range() {
        let mut config = SystemConfig::default();
        config.rpc.max_block_range = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_rejects_malformed_addresses() {
        let mut config = SystemConfig::default();
        config
            .marketplace
            .implicit_approval_collections
            .insert("1".to_string(), vec!["0x1234".to_string()]);
        assert!(config.validate().is_err());

        let mut config = SystemConfig::default();
        config.permit2.address = "not-an-address".to_string();
        assert!(config.validate().is_err());

        config.permit2.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_non_numeric_chain_keys() {
        let mut config = SystemConfig::default();
        config
            .rpc
            .endpoints
            .insert("mainnet".to_string(), "https://example.org".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = SystemConfig::load_from_path("does-not-exist.toml").unwrap();
        assert_eq!(config.system.default_chain_id, 1);
        assert!(config.permit2.enabled);
    }

    #[test]
    fn test_address_validation() {
        assert!(is_valid_address("0x000000000022D473030F116dDEE9F6B43aC78BA3"));
        assert!(!is_valid_address("000000000022D473030F116dDEE9F6B43aC78BA3"));
        assert!(!is_valid_address("0xZZ0000000022D473030F116dDEE9F6B43aC78BA3"));
    }
}
