//! Deposit discovery on the source network's index

use super::Deadline;
use crate::chain::ChainClient;
use crate::error::{ClaimerError, ClaimerResult};
use crate::metrics;
use crate::types::{Deposit, LegKind, NetworkId, Topology};

use ethers::types::H256;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Leg set of one bridge transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredLegs {
    pub asset: Option<Deposit>,
    pub message: Option<Deposit>,
}

impl DiscoveredLegs {
    /// Legs in claim order
    pub fn in_claim_order(&self) -> Vec<Deposit> {
        self.asset
            .iter()
            .chain(self.message.iter())
            .cloned()
            .collect()
    }

    pub fn get(&self, kind: LegKind) -> Option<&Deposit> {
        match kind {
            LegKind::Asset => self.asset.as_ref(),
            LegKind::Message => self.message.as_ref(),
        }
    }

    fn covers(&self, topology: Topology) -> bool {
        topology
            .expected_legs()
            .iter()
            .all(|kind| self.get(*kind).is_some())
    }
}

/// Pick the legs `topology` expects out of one index snapshot.
///
/// Returns `Ok(None)` while the expected set is incomplete. Two legs of the
/// same kind, or a message leg not after its asset leg, is an invalid pair.
pub fn select_legs(
    deposits: &[Deposit],
    bridge_tx_hash: H256,
    destination_network: NetworkId,
    topology: Topology,
) -> ClaimerResult<Option<DiscoveredLegs>> {
    let mut legs = DiscoveredLegs::default();

    for deposit in deposits.iter().filter(|d| d.bridge_tx_hash == bridge_tx_hash) {
        let Some(kind) = deposit.leg_kind() else {
            warn!(
                "Ignoring unclassifiable leaf {} of {:?} (leaf type {:?}, amount {}, {} calldata bytes)",
                deposit.deposit_count,
                bridge_tx_hash,
                deposit.leaf_type,
                deposit.amount,
                deposit.calldata.len()
            );
            continue;
        };

        if !topology.expects(kind) {
            warn!(
                "Ignoring unexpected {} leg {} of {:?} for a {} flow",
                kind, deposit.deposit_count, bridge_tx_hash, topology
            );
            continue;
        }

        if deposit.destination_network != destination_network {
            warn!(
                "Ignoring {} leg {} of {:?} bound for network {}",
                kind, deposit.deposit_count, bridge_tx_hash, deposit.destination_network
            );
            continue;
        }

        let slot = match kind {
            LegKind::Asset => &mut legs.asset,
            LegKind::Message => &mut legs.message,
        };
        if let Some(existing) = slot {
            return Err(ClaimerError::InvalidDepositPair {
                bridge_tx_hash: format!("{:?}", bridge_tx_hash),
                reason: format!(
                    "two {} legs (deposit counts {} and {})",
                    kind, existing.deposit_count, deposit.deposit_count
                ),
            });
        }
        *slot = Some(deposit.clone());
    }

    if let (Some(asset), Some(message)) = (&legs.asset, &legs.message) {
        if asset.deposit_count >= message.deposit_count {
            return Err(ClaimerError::InvalidDepositPair {
                bridge_tx_hash: format!("{:?}", bridge_tx_hash),
                reason: format!(
                    "asset leg {} does not precede message leg {}",
                    asset.deposit_count, message.deposit_count
                ),
            });
        }
    }

    Ok(legs.covers(topology).then_some(legs))
}

/// Polls the source deposit index until a bridge transaction's legs appear
pub struct DepositDiscovery {
    client: Arc<dyn ChainClient>,
    attempts: u32,
    interval: Duration,
}

impl DepositDiscovery {
    pub fn new(client: Arc<dyn ChainClient>, attempts: u32, interval: Duration) -> Self {
        Self {
            client,
            attempts,
            interval,
        }
    }

    /// Discover the legs `topology` expects for `bridge_tx_hash`
    pub async fn discover(
        &self,
        bridge_tx_hash: H256,
        source_network: NetworkId,
        destination_network: NetworkId,
        topology: Topology,
        deadline: &Deadline,
    ) -> ClaimerResult<DiscoveredLegs> {
        for attempt in 1..=self.attempts {
            deadline.check("deposit discovery")?;

            match self
                .client
                .query_deposits(source_network, Some(bridge_tx_hash))
                .await
            {
                Ok(deposits) => {
                    debug!(
                        "Discovery attempt {}/{} for {:?}: {} leaves",
                        attempt,
                        self.attempts,
                        bridge_tx_hash,
                        deposits.len()
                    );
                    if let Some(legs) =
                        select_legs(&deposits, bridge_tx_hash, destination_network, topology)?
                    {
                        for deposit in legs.in_claim_order() {
                            if let Some(kind) = deposit.leg_kind() {
                                info!(
                                    "Discovered {} leg of {:?}: deposit count {} on network {}",
                                    kind, bridge_tx_hash, deposit.deposit_count, source_network
                                );
                                metrics::record_deposit_discovered(source_network, kind);
                            }
                        }
                        return Ok(legs);
                    }
                }
                Err(e) => {
                    warn!(
                        "Deposit query on network {} failed (attempt {}/{}): {}",
                        source_network, attempt, self.attempts, e
                    );
                }
            }

            if attempt < self.attempts {
                deadline.sleep(self.interval, "deposit discovery").await?;
            }
        }

        metrics::record_discovery_failure(source_network);
        Err(ClaimerError::DepositNotFound {
            network_id: source_network,
            bridge_tx_hash: format!("{:?}", bridge_tx_hash),
        })
    }
}
