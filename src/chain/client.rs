//! Chain client backed by the bridge indexers and JSON-RPC nodes

use super::contracts::{
    classify_claim_revert, BridgeContract, BridgeExtensionContract, Erc20Contract,
};
use super::indexer::{ClaimProof, IndexerClient, SponsorClaimBody};
use super::provider::{NetworkProvider, SignerClient};
use super::{ChainClient, ClaimRequest, ClaimTarget, DepositLeg, DepositRequest};
use crate::config::{Settings, WalletConfig};
use crate::error::{ClaimerError, ClaimerResult};
use crate::types::{Claim, Deposit, LeafType, NetworkId, SponsoredClaimStatus};

use async_trait::async_trait;
use ethers::abi::Detokenize;
use ethers::contract::{ContractCall, ContractError};
use ethers::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Production `ChainClient`
pub struct BridgeChainClient {
    providers: HashMap<NetworkId, NetworkProvider>,
    indexer: IndexerClient,
    wallet: LocalWallet,
    claim_gas_limit: U256,
}

impl BridgeChainClient {
    /// Connect to every enabled network in `settings`
    pub fn new(settings: &Settings, wallet: LocalWallet) -> ClaimerResult<Self> {
        let mut providers = HashMap::new();
        let mut endpoints = HashMap::new();

        for (_, network) in settings.enabled_networks() {
            let provider = NetworkProvider::new(network.clone())?;
            info!(
                "Configured network {} (id {}, chain {})",
                provider.name(),
                provider.network_id(),
                provider.chain_id()
            );
            endpoints.insert(provider.network_id(), network.indexer_url.clone());
            providers.insert(provider.network_id(), provider);
        }

        info!("Claimer wallet: {:?}", wallet.address());

        Ok(Self {
            providers,
            indexer: IndexerClient::new(endpoints)?,
            wallet,
            claim_gas_limit: U256::from(settings.claimer.claim_gas_limit),
        })
    }

    /// Load the signing key from the configured environment variable
    pub fn load_wallet(config: &WalletConfig) -> ClaimerResult<LocalWallet> {
        let key = std::env::var(&config.private_key_env).map_err(|_| {
            ClaimerError::Wallet(format!(
                "No wallet configured. Set {}",
                config.private_key_env
            ))
        })?;

        key.trim()
            .parse::<LocalWallet>()
            .map_err(|e| ClaimerError::Wallet(format!("Invalid private key: {}", e)))
    }

    fn provider(&self, network_id: NetworkId) -> ClaimerResult<&NetworkProvider> {
        self.providers
            .get(&network_id)
            .ok_or(ClaimerError::NetworkNotFound { network_id })
    }

    /// Resolve the deposit a claim request points at
    async fn resolve_deposit(&self, request: &ClaimRequest) -> ClaimerResult<Deposit> {
        let bridge_tx_hash = request.target.bridge_tx_hash();
        let mut legs = self
            .query_deposits(request.source_network, Some(bridge_tx_hash))
            .await?;
        legs.sort_by_key(|d| d.deposit_count);

        let found = match request.target {
            ClaimTarget::DepositCount { deposit_count, .. } => legs
                .into_iter()
                .find(|d| d.deposit_count == deposit_count),
            ClaimTarget::TxHash(_) => legs.into_iter().next(),
        };

        found.ok_or_else(|| ClaimerError::DepositNotFound {
            network_id: request.source_network,
            bridge_tx_hash: format!("{:?}", bridge_tx_hash),
        })
    }

    /// Resolve the deposit and fetch the exit roots proving it
    async fn prepare_claim(&self, request: &ClaimRequest) -> ClaimerResult<(Deposit, ClaimProof)> {
        let deposit = self.resolve_deposit(request).await?;
        let source = request.source_network;

        let leaf_index = self
            .indexer
            .get_l1_info_tree_index(source, deposit.deposit_count)
            .await
            .map_err(|e| ClaimerError::ExitRootNotReady {
                network_id: request.destination_network,
                message: e.to_string(),
            })?;
        let proof = self
            .indexer
            .get_claim_proof(source, leaf_index, deposit.deposit_count)
            .await?;

        debug!(
            "Deposit {} from network {} proven against leaf index {}",
            deposit.deposit_count, source, leaf_index
        );
        Ok((deposit, proof))
    }

    /// Approve `spender` for `amount` of `token` when the allowance is short
    async fn ensure_allowance(
        &self,
        client: Arc<SignerClient>,
        network_id: NetworkId,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> ClaimerResult<()> {
        if token.is_zero() {
            return Ok(());
        }

        let erc20 = Erc20Contract::new(token, client);
        let allowance = erc20
            .allowance(self.wallet.address(), spender)
            .call()
            .await
            .map_err(|e| ClaimerError::Contract(describe(&e)))?;

        if allowance >= amount {
            return Ok(());
        }

        debug!(
            "Approving {} of {:?} for {:?} on network {}",
            amount, token, spender, network_id
        );
        send_and_confirm(erc20.approve(spender, amount), network_id).await?;
        Ok(())
    }
}

#[async_trait]
impl ChainClient for BridgeChainClient {
    async fn submit_deposit(&self, request: &DepositRequest) -> ClaimerResult<H256> {
        let network_id = request.source_network;
        let provider = self.provider(network_id)?;
        let client = provider.signer(&self.wallet);
        let bridge = BridgeContract::new(provider.bridge_address(), client.clone());

        let tx_hash = match &request.leg {
            DepositLeg::Asset {
                token,
                amount,
                destination_address,
            } => {
                self.ensure_allowance(
                    client.clone(),
                    network_id,
                    *token,
                    provider.bridge_address(),
                    *amount,
                )
                .await?;

                let mut call = bridge.bridge_asset(
                    request.destination_network,
                    *destination_address,
                    *amount,
                    *token,
                    true,
                    Bytes::new(),
                );
                if token.is_zero() {
                    call = call.value(*amount);
                }
                send_and_confirm(call, network_id).await?
            }
            DepositLeg::Message {
                destination_address,
                value,
                metadata,
            } => {
                let call = bridge
                    .bridge_message(
                        request.destination_network,
                        *destination_address,
                        true,
                        metadata.clone(),
                    )
                    .value(*value);
                send_and_confirm(call, network_id).await?
            }
            DepositLeg::AssetAndMessage {
                token,
                amount,
                call_address,
                fallback_address,
                calldata,
            } => {
                let extension_address = provider.bridge_extension_address()?;
                self.ensure_allowance(
                    client.clone(),
                    network_id,
                    *token,
                    extension_address,
                    *amount,
                )
                .await?;

                let extension = BridgeExtensionContract::new(extension_address, client);
                let mut call = extension.bridge_and_call(
                    *token,
                    *amount,
                    request.destination_network,
                    *call_address,
                    *fallback_address,
                    calldata.clone(),
                    true,
                );
                if token.is_zero() {
                    call = call.value(*amount);
                }
                send_and_confirm(call, network_id).await?
            }
        };

        info!(
            "Deposit {:?} submitted on network {} towards {}",
            tx_hash, network_id, request.destination_network
        );
        Ok(tx_hash)
    }

    async fn query_deposits(
        &self,
        network_id: NetworkId,
        tx_hash: Option<H256>,
    ) -> ClaimerResult<Vec<Deposit>> {
        let deposits = self.indexer.get_deposits(network_id).await?;
        Ok(match tx_hash {
            Some(hash) => deposits
                .into_iter()
                .filter(|d| d.bridge_tx_hash == hash)
                .collect(),
            None => deposits,
        })
    }

    async fn submit_claim(&self, request: &ClaimRequest) -> ClaimerResult<H256> {
        let (deposit, proof) = self.prepare_claim(request).await?;
        let source = request.source_network;
        let destination = request.destination_network;

        let provider = self.provider(destination)?;
        let bridge = BridgeContract::new(provider.bridge_address(), provider.signer(&self.wallet));
        let global_index = deposit.global_index();

        let call = match deposit.leaf_type {
            LeafType::Asset => bridge.claim_asset(
                global_index,
                proof.mainnet_exit_root.0,
                proof.rollup_exit_root.0,
                deposit.origin_network,
                deposit.origin_address,
                deposit.destination_network,
                deposit.destination_address,
                deposit.amount,
                deposit.metadata.clone(),
            ),
            LeafType::Message => bridge.claim_message(
                global_index,
                proof.mainnet_exit_root.0,
                proof.rollup_exit_root.0,
                deposit.origin_network,
                deposit.origin_address,
                deposit.destination_network,
                deposit.destination_address,
                deposit.amount,
                deposit.metadata.clone(),
            ),
        }
        .gas(self.claim_gas_limit);

        // Explicit gas skips estimation, so simulate first to surface the revert reason
        call.call()
            .await
            .map_err(|e| classify_claim_revert(&describe(&e), destination, source, deposit.deposit_count))?;

        send_and_confirm(call, destination)
            .await
            .map_err(|e| match e {
                ClaimerError::Transaction(message) => {
                    classify_claim_revert(&message, destination, source, deposit.deposit_count)
                }
                other => other,
            })
    }

    async fn query_claims(&self, network_id: NetworkId) -> ClaimerResult<Vec<Claim>> {
        self.indexer.get_claims(network_id).await
    }

    async fn sponsor_claim(&self, request: &ClaimRequest) -> ClaimerResult<U256> {
        let (deposit, proof) = self.prepare_claim(request).await?;
        let body = SponsorClaimBody::new(&deposit, &proof)?;

        self.indexer
            .post_sponsor_claim(request.destination_network, &body)
            .await?;

        info!(
            "Deposit {} from network {} handed to the claim sponsor on {}",
            deposit.deposit_count, request.source_network, request.destination_network
        );
        Ok(deposit.global_index())
    }

    async fn sponsored_claim_status(
        &self,
        network_id: NetworkId,
        global_index: U256,
    ) -> ClaimerResult<SponsoredClaimStatus> {
        self.indexer
            .get_sponsored_claim_status(network_id, global_index)
            .await
    }

    async fn deposit_ready(
        &self,
        _destination_network: NetworkId,
        deposit: &Deposit,
    ) -> ClaimerResult<Option<bool>> {
        match self
            .indexer
            .get_l1_info_tree_index(deposit.source_network, deposit.deposit_count)
            .await
        {
            Ok(_) => Ok(Some(true)),
            Err(ClaimerError::Indexer { message, .. }) => {
                debug!(
                    "Deposit {} on network {} not yet in the L1 info tree: {}",
                    deposit.deposit_count, deposit.source_network, message
                );
                Ok(Some(false))
            }
            Err(e) => Err(e),
        }
    }

    async fn health_check(&self) -> Vec<(NetworkId, bool)> {
        let mut results = Vec::with_capacity(self.providers.len());
        for network_id in self.indexer.networks() {
            let rpc_ok = match self.providers.get(&network_id) {
                Some(provider) => provider.health_check().await,
                None => false,
            };
            let indexer_ok = self.indexer.health_check(network_id).await;
            if !indexer_ok {
                warn!("Indexer for network {} is unhealthy", network_id);
            }
            results.push((network_id, rpc_ok && indexer_ok));
        }
        results
    }
}

/// Send a contract call and wait for a successful receipt
async fn send_and_confirm<D>(
    call: ContractCall<SignerClient, D>,
    network_id: NetworkId,
) -> ClaimerResult<H256>
where
    D: Detokenize + Send + Sync,
{
    let pending = call
        .send()
        .await
        .map_err(|e| ClaimerError::Transaction(describe(&e)))?;
    let tx_hash = pending.tx_hash();

    let receipt = pending
        .await
        .map_err(|e| ClaimerError::Rpc {
            network_id,
            message: e.to_string(),
        })?
        .ok_or_else(|| {
            ClaimerError::Transaction(format!("{:?} dropped before inclusion", tx_hash))
        })?;

    if receipt.status == Some(U64::zero()) {
        return Err(ClaimerError::Transaction(format!(
            "{:?} reverted in block {:?}",
            tx_hash, receipt.block_number
        )));
    }

    Ok(tx_hash)
}

/// Error text including raw revert data, so selectors can be matched
fn describe(error: &ContractError<SignerClient>) -> String {
    match error.as_revert() {
        Some(data) => format!("{} (data: 0x{})", error, hex::encode(data)),
        None => error.to_string(),
    }
}
