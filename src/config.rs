//! Configuration management for the bridge claimer
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::chain::{DepositLeg, DepositRequest};
use crate::types::{NetworkId, PairClass, Topology};

use anyhow::{Context, Result};
use ethers::types::{Address, H256, U256};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub claimer: ClaimerConfig,
    #[serde(default)]
    pub sync_profiles: SyncProfiles,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
    pub networks: HashMap<String, NetworkConfig>,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub flows: Vec<FlowConfig>,
}

/// Timing budgets for discovery, submission and polling
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClaimerConfig {
    pub instance_id: String,
    pub discovery_attempts: u32,
    pub discovery_interval_ms: u64,
    pub poll_attempts: u32,
    pub poll_interval_ms: u64,
    pub submit_max_attempts: u32,
    pub submit_retry_delay_ms: u64,
    /// Overall per-flow budget; 0 derives it from the windows above
    pub flow_deadline_secs: u64,
    pub sync_mode: SyncMode,
    pub claim_mode: ClaimMode,
    pub claim_gas_limit: u64,
    pub health_check_interval_secs: u64,
}

impl Default for ClaimerConfig {
    fn default() -> Self {
        Self {
            instance_id: "claimer-1".to_string(),
            discovery_attempts: 6,
            discovery_interval_ms: 3_000,
            poll_attempts: 12,
            poll_interval_ms: 5_000,
            submit_max_attempts: 3,
            submit_retry_delay_ms: 10_000,
            flow_deadline_secs: 0,
            sync_mode: SyncMode::Fixed,
            claim_mode: ClaimMode::Direct,
            claim_gas_limit: 3_000_000,
            health_check_interval_secs: 30,
        }
    }
}

impl ClaimerConfig {
    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn submit_retry_delay(&self) -> Duration {
        Duration::from_millis(self.submit_retry_delay_ms)
    }

    /// Deadline budget for one flow: an explicit override, or the sum of the
    /// discovery window, the sync wait and each leg's submit and poll windows.
    pub fn flow_deadline(&self, sync_wait: Duration, legs: usize) -> Duration {
        if self.flow_deadline_secs > 0 {
            return Duration::from_secs(self.flow_deadline_secs);
        }

        let discovery = self.discovery_interval() * self.discovery_attempts;
        let submit = self.submit_retry_delay() * self.submit_max_attempts;
        let poll = self.poll_interval() * self.poll_attempts;
        // one extra interval per leg absorbs request latency
        let per_leg = submit + poll + self.poll_interval();

        discovery + sync_wait + per_leg * legs as u32
    }
}

/// How the sync waiter decides the destination has absorbed a deposit
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Sleep for the pair's fixed wait
    Fixed,
    /// Poll the chain client's readiness query until it answers or the flow
    /// deadline expires
    Poll,
}

/// Who sends the claim transaction
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClaimMode {
    /// Claim from the configured wallet
    Direct,
    /// Hand the claim to the destination's claim sponsor
    Sponsored,
}

/// Fixed sync waits in seconds for one pair class
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct SyncWaits {
    pub asset: u64,
    pub message: u64,
    pub asset_and_message: u64,
}

impl SyncWaits {
    pub fn for_topology(&self, topology: Topology) -> Duration {
        let secs = match topology {
            Topology::Asset => self.asset,
            Topology::Message => self.message,
            Topology::AssetAndMessage => self.asset_and_message,
        };
        Duration::from_secs(secs)
    }
}

/// Per-pair-class sync waits
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncProfiles {
    pub l1_to_l2: SyncWaits,
    pub l2_to_l1: SyncWaits,
    pub l2_to_l2: SyncWaits,
}

impl Default for SyncProfiles {
    fn default() -> Self {
        Self {
            l1_to_l2: SyncWaits {
                asset: 30,
                message: 20,
                asset_and_message: 30,
            },
            l2_to_l1: SyncWaits {
                asset: 30,
                message: 20,
                asset_and_message: 30,
            },
            // extra indexing hop between two rollups
            l2_to_l2: SyncWaits {
                asset: 45,
                message: 90,
                asset_and_message: 90,
            },
        }
    }
}

impl SyncProfiles {
    pub fn waits(&self, class: PairClass) -> &SyncWaits {
        match class {
            PairClass::L1ToL2 => &self.l1_to_l2,
            PairClass::L2ToL1 => &self.l2_to_l1,
            PairClass::L2ToL2 => &self.l2_to_l2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub network_id: NetworkId,
    pub chain_id: u64,
    pub name: String,
    pub rpc_urls: Vec<String>,
    pub indexer_url: String,
    pub bridge_address: String,
    #[serde(default)]
    pub bridge_extension_address: Option<String>,
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    pub private_key_env: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            private_key_env: "CLAIMER_PRIVATE_KEY".to_string(),
        }
    }
}

/// One flow the daemon runs at startup
#[derive(Debug, Clone, Deserialize)]
pub struct FlowConfig {
    pub source_network: NetworkId,
    pub destination_network: NetworkId,
    pub topology: Topology,
    /// Claim an existing bridge transaction
    #[serde(default)]
    pub bridge_tx_hash: Option<H256>,
    /// Or submit a new deposit first
    #[serde(default)]
    pub deposit: Option<DepositConfig>,
}

impl FlowConfig {
    /// Deposit this flow submits, if it submits one
    pub fn deposit_request(&self) -> Result<Option<DepositRequest>> {
        let Some(deposit) = &self.deposit else {
            return Ok(None);
        };

        let leg = match self.topology {
            Topology::Asset => DepositLeg::Asset {
                token: deposit.token,
                amount: deposit.amount,
                destination_address: deposit.destination_address,
            },
            Topology::Message => DepositLeg::Message {
                destination_address: deposit.destination_address,
                value: deposit.amount,
                metadata: deposit.calldata.clone().unwrap_or_default(),
            },
            Topology::AssetAndMessage => DepositLeg::AssetAndMessage {
                token: deposit.token,
                amount: deposit.amount,
                call_address: deposit
                    .call_address
                    .context("bridge-and-call deposit needs call_address")?,
                fallback_address: deposit
                    .fallback_address
                    .unwrap_or(deposit.destination_address),
                calldata: deposit
                    .calldata
                    .clone()
                    .filter(|c| !c.is_empty())
                    .context("bridge-and-call deposit needs calldata")?,
            },
        };

        Ok(Some(DepositRequest {
            source_network: self.source_network,
            destination_network: self.destination_network,
            leg,
        }))
    }
}

/// Deposit parameters for flows that bridge before claiming
#[derive(Debug, Clone, Deserialize)]
pub struct DepositConfig {
    #[serde(default)]
    pub token: Address,
    #[serde(default, deserialize_with = "de_decimal_u256")]
    pub amount: U256,
    pub destination_address: Address,
    #[serde(default)]
    pub call_address: Option<Address>,
    #[serde(default)]
    pub fallback_address: Option<Address>,
    #[serde(default)]
    pub calldata: Option<ethers::types::Bytes>,
}

fn de_decimal_u256<'de, D>(deserializer: D) -> std::result::Result<U256, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    U256::from_dec_str(&raw).map_err(serde::de::Error::custom)
}

impl Settings {
    /// Load settings from configuration files
    pub fn load() -> Result<Self> {
        let config_path = env::var("CLAIMER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from an explicit path
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        // Substitute environment variables
        let config_str = substitute_env_vars(&config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.enabled_networks().is_empty() {
            anyhow::bail!("At least one network must be enabled");
        }

        let mut seen = HashMap::new();
        for (name, network) in &self.networks {
            if !network.enabled {
                continue;
            }
            if network.rpc_urls.is_empty() {
                anyhow::bail!("Network {} has no RPC URLs configured", name);
            }
            if network.indexer_url.is_empty() {
                anyhow::bail!("Network {} has no indexer URL configured", name);
            }
            if let Some(other) = seen.insert(network.network_id, name) {
                anyhow::bail!(
                    "Networks {} and {} share network id {}",
                    other,
                    name,
                    network.network_id
                );
            }
            if network
                .bridge_extension_address
                .as_deref()
                .map_or(true, str::is_empty)
            {
                tracing::warn!("Network {} has no bridge extension - bridge-and-call deposits unavailable", name);
            }
        }

        if self.claimer.discovery_attempts == 0 || self.claimer.poll_attempts == 0 {
            anyhow::bail!("Discovery and poll attempt budgets must be non-zero");
        }
        if self.claimer.submit_max_attempts == 0 {
            anyhow::bail!("submit_max_attempts must be non-zero");
        }

        for (i, flow) in self.flows.iter().enumerate() {
            for network_id in [flow.source_network, flow.destination_network] {
                if self.get_network_by_id(network_id).is_none() {
                    anyhow::bail!("Flow {} references unknown network {}", i, network_id);
                }
            }
            if flow.source_network == flow.destination_network {
                anyhow::bail!("Flow {} bridges network {} to itself", i, flow.source_network);
            }
            match (&flow.bridge_tx_hash, &flow.deposit) {
                (Some(_), None) | (None, Some(_)) => {}
                _ => anyhow::bail!(
                    "Flow {} must set exactly one of bridge_tx_hash or deposit",
                    i
                ),
            }
            flow.deposit_request()
                .with_context(|| format!("Flow {} has an invalid deposit", i))?;
        }

        Ok(())
    }

    /// Get list of enabled networks
    pub fn enabled_networks(&self) -> Vec<(&String, &NetworkConfig)> {
        self.networks.iter().filter(|(_, n)| n.enabled).collect()
    }

    /// Get enabled network config by bridge network ID
    pub fn get_network_by_id(&self, network_id: NetworkId) -> Option<&NetworkConfig> {
        self.networks
            .values()
            .find(|n| n.enabled && n.network_id == network_id)
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    lazy_static::lazy_static! {
        static ref ENV_VAR: regex::Regex =
            regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid env var pattern");
    }

    let mut result = input.to_string();
    for cap in ENV_VAR.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
