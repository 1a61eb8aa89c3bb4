//! Network provider with multi-RPC support and automatic failover

use crate::config::NetworkConfig;
use crate::error::{ClaimerError, ClaimerResult};
use crate::types::NetworkId;

use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Signing client used for bridge and claim transactions
pub type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Multi-provider wrapper with automatic failover
pub struct NetworkProvider {
    /// Network configuration
    config: NetworkConfig,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
    /// Parsed bridge contract address
    bridge_address: Address,
    /// Parsed bridge extension address, if deployed
    bridge_extension_address: Option<Address>,
}

impl NetworkProvider {
    /// Create a new network provider
    pub fn new(config: NetworkConfig) -> ClaimerResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(100));
                    http_providers.push(provider);
                    debug!("Added HTTP provider for network {}: {}", config.network_id, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(ClaimerError::Rpc {
                network_id: config.network_id,
                message: "No valid RPC providers".to_string(),
            });
        }

        let bridge_address = parse_address(&config.bridge_address, "bridge")?;
        let bridge_extension_address = config
            .bridge_extension_address
            .as_deref()
            .filter(|a| !a.is_empty())
            .map(|a| parse_address(a, "bridge extension"))
            .transpose()?;

        Ok(Self {
            config,
            http_providers,
            current_provider: AtomicUsize::new(0),
            bridge_address,
            bridge_extension_address,
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!(
            "Network {} failover to provider {}",
            self.config.network_id, next
        );
    }

    /// Signing client on the active provider
    pub fn signer(&self, wallet: &LocalWallet) -> Arc<SignerClient> {
        let wallet = wallet.clone().with_chain_id(self.config.chain_id);
        Arc::new(SignerMiddleware::new(self.http().clone(), wallet))
    }

    /// Get current block number with failover
    pub async fn get_block_number(&self) -> ClaimerResult<u64> {
        for _ in 0..self.http_providers.len() {
            match self.http().get_block_number().await {
                Ok(block) => return Ok(block.as_u64()),
                Err(e) => {
                    warn!(
                        "Failed to get block number from network {}: {}",
                        self.config.network_id, e
                    );
                    self.failover();
                }
            }
        }

        Err(ClaimerError::Rpc {
            network_id: self.config.network_id,
            message: "All providers failed".to_string(),
        })
    }

    /// Health check
    pub async fn health_check(&self) -> bool {
        match self.get_block_number().await {
            Ok(_) => true,
            Err(e) => {
                error!(
                    "Health check failed for network {}: {}",
                    self.config.network_id, e
                );
                false
            }
        }
    }

    /// Bridge network ID
    pub fn network_id(&self) -> NetworkId {
        self.config.network_id
    }

    /// EVM chain ID
    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Bridge contract address
    pub fn bridge_address(&self) -> Address {
        self.bridge_address
    }

    /// Bridge extension address, required for bridge-and-call
    pub fn bridge_extension_address(&self) -> ClaimerResult<Address> {
        self.bridge_extension_address.ok_or_else(|| {
            ClaimerError::Config(format!(
                "Network {} has no bridge extension configured",
                self.config.network_id
            ))
        })
    }
}

fn parse_address(raw: &str, what: &str) -> ClaimerResult<Address> {
    raw.parse()
        .map_err(|e| ClaimerError::Config(format!("Invalid {} address {}: {}", what, raw, e)))
}
