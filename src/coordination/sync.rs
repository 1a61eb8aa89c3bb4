//! Waits until the destination network can have absorbed a deposit

use super::Deadline;
use crate::chain::ChainClient;
use crate::config::{SyncMode, SyncProfiles};
use crate::error::ClaimerResult;
use crate::types::{Deposit, NetworkId, PairClass, Topology};

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub struct SyncWaiter {
    client: Arc<dyn ChainClient>,
    profiles: SyncProfiles,
    mode: SyncMode,
    poll_interval: Duration,
}

impl SyncWaiter {
    pub fn new(
        client: Arc<dyn ChainClient>,
        profiles: SyncProfiles,
        mode: SyncMode,
        poll_interval: Duration,
    ) -> Self {
        Self {
            client,
            profiles,
            mode,
            poll_interval,
        }
    }

    /// Fixed wait for a network pair and leg set
    pub fn fixed_wait(
        &self,
        source_network: NetworkId,
        destination_network: NetworkId,
        topology: Topology,
    ) -> Duration {
        self.profiles
            .waits(PairClass::of(source_network, destination_network))
            .for_topology(topology)
    }

    /// Block until `deposits` are claimable on the destination, returning the
    /// time spent waiting
    pub async fn wait(
        &self,
        deposits: &[Deposit],
        destination_network: NetworkId,
        topology: Topology,
        deadline: &Deadline,
    ) -> ClaimerResult<Duration> {
        let Some(source_network) = deposits.first().map(|d| d.source_network) else {
            return Ok(Duration::ZERO);
        };
        let bound = self.fixed_wait(source_network, destination_network, topology);
        let start = Instant::now();

        match self.mode {
            SyncMode::Fixed => {
                info!(
                    "Waiting {}s for network {} to sync {} deposit from network {}",
                    bound.as_secs(),
                    destination_network,
                    topology,
                    source_network
                );
                deadline.sleep(bound, "destination sync").await?;
            }
            SyncMode::Poll => {
                self.poll_until_ready(deposits, destination_network, bound, deadline)
                    .await?;
            }
        }

        Ok(start.elapsed())
    }

    /// Poll readiness until every deposit is claimable.
    ///
    /// The fixed wait only bounds the fallback for clients without a readiness
    /// signal. Past it, polling continues until the flow deadline, so no
    /// claim is submitted without the signal.
    async fn poll_until_ready(
        &self,
        deposits: &[Deposit],
        destination_network: NetworkId,
        bound: Duration,
        deadline: &Deadline,
    ) -> ClaimerResult<()> {
        let start = Instant::now();
        let mut overdue = false;

        loop {
            match self.all_ready(deposits, destination_network).await {
                Some(true) => {
                    debug!(
                        "Destination {} ready after {:?}",
                        destination_network,
                        start.elapsed()
                    );
                    return Ok(());
                }
                Some(false) => {}
                None => {
                    debug!("Chain client has no readiness signal, using fixed wait");
                    let rest = bound.saturating_sub(start.elapsed());
                    return deadline.sleep(rest, "destination sync").await;
                }
            }

            if !overdue && start.elapsed() >= bound {
                overdue = true;
                warn!(
                    "Destination {} not ready after {}s, polling until the flow deadline",
                    destination_network,
                    bound.as_secs()
                );
            }
            deadline
                .sleep(self.poll_interval, "destination readiness")
                .await?;
        }
    }

    /// `None` when the client cannot answer; query errors count as not ready
    async fn all_ready(&self, deposits: &[Deposit], destination_network: NetworkId) -> Option<bool> {
        for deposit in deposits {
            match self.client.deposit_ready(destination_network, deposit).await {
                Ok(Some(true)) => continue,
                Ok(Some(false)) => return Some(false),
                Ok(None) => return None,
                Err(e) => {
                    warn!(
                        "Readiness query for deposit {} failed: {}",
                        deposit.deposit_count, e
                    );
                    return Some(false);
                }
            }
        }
        Some(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainClient;
    use crate::error::ClaimerError;
    use crate::types::LeafType;
    use ethers::types::{Address, Bytes, H256, U256};

    fn deposit(source_network: NetworkId) -> Deposit {
        Deposit {
            source_network,
            destination_network: 1,
            deposit_count: 1,
            leaf_type: LeafType::Asset,
            origin_network: source_network,
            amount: U256::from(50),
            calldata: Bytes::new(),
            bridge_tx_hash: H256::repeat_byte(1),
            block_num: 1,
            origin_address: Address::zero(),
            destination_address: Address::zero(),
            metadata: Bytes::new(),
        }
    }

    fn waiter(mock: MockChainClient, mode: SyncMode) -> SyncWaiter {
        SyncWaiter::new(
            Arc::new(mock),
            SyncProfiles::default(),
            mode,
            Duration::from_secs(3),
        )
    }

    #[test]
    fn fixed_waits_follow_pair_class() {
        let waiter = waiter(MockChainClient::new(), SyncMode::Fixed);
        assert_eq!(waiter.fixed_wait(0, 1, Topology::Asset), Duration::from_secs(30));
        assert_eq!(waiter.fixed_wait(1, 0, Topology::Message), Duration::from_secs(20));
        assert_eq!(waiter.fixed_wait(1, 2, Topology::Asset), Duration::from_secs(45));
        assert_eq!(
            waiter.fixed_wait(2, 1, Topology::AssetAndMessage),
            Duration::from_secs(90)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_mode_sleeps_the_full_wait() {
        let waiter = waiter(MockChainClient::new(), SyncMode::Fixed);
        let deadline = Deadline::after(Duration::from_secs(600));

        let waited = waiter
            .wait(&[deposit(1)], 2, Topology::Message, &deadline)
            .await
            .unwrap();
        assert_eq!(waited, Duration::from_secs(90));
    }

    #[tokio::test(start_paused = true)]
    async fn poll_mode_returns_once_ready() {
        let mut mock = MockChainClient::new();
        let mut calls = 0;
        mock.expect_deposit_ready().returning(move |_, _| {
            calls += 1;
            Ok(Some(calls >= 3))
        });
        let waiter = waiter(mock, SyncMode::Poll);
        let deadline = Deadline::after(Duration::from_secs(600));

        let waited = waiter
            .wait(&[deposit(0)], 1, Topology::Asset, &deadline)
            .await
            .unwrap();
        assert_eq!(waited, Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn poll_mode_falls_back_to_fixed_wait() {
        let mut mock = MockChainClient::new();
        mock.expect_deposit_ready().returning(|_, _| Ok(None));
        let waiter = waiter(mock, SyncMode::Poll);
        let deadline = Deadline::after(Duration::from_secs(600));

        let waited = waiter
            .wait(&[deposit(0)], 1, Topology::Asset, &deadline)
            .await
            .unwrap();
        assert_eq!(waited, Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn poll_mode_never_proceeds_without_readiness() {
        let mut mock = MockChainClient::new();
        mock.expect_deposit_ready().returning(|_, _| Ok(Some(false)));
        let waiter = waiter(mock, SyncMode::Poll);
        let deadline = Deadline::after(Duration::from_secs(100));
        let start = Instant::now();

        let err = waiter
            .wait(&[deposit(0)], 1, Topology::Asset, &deadline)
            .await
            .unwrap_err();

        assert!(matches!(err, ClaimerError::Timeout { .. }));
        // kept polling past the 30s fixed wait, up to the deadline
        assert_eq!(start.elapsed(), Duration::from_secs(100));
    }

    #[tokio::test(start_paused = true)]
    async fn poll_mode_accepts_readiness_after_the_fixed_wait() {
        let mut mock = MockChainClient::new();
        let mut calls = 0;
        mock.expect_deposit_ready().returning(move |_, _| {
            calls += 1;
            Ok(Some(calls > 15))
        });
        let waiter = waiter(mock, SyncMode::Poll);
        let deadline = Deadline::after(Duration::from_secs(600));

        let waited = waiter
            .wait(&[deposit(0)], 1, Topology::Asset, &deadline)
            .await
            .unwrap();
        assert_eq!(waited, Duration::from_secs(45));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_respects_flow_deadline() {
        let waiter = waiter(MockChainClient::new(), SyncMode::Fixed);
        let deadline = Deadline::after(Duration::from_secs(10));

        let err = waiter
            .wait(&[deposit(0)], 1, Topology::Asset, &deadline)
            .await
            .unwrap_err();
        assert!(matches!(err, ClaimerError::Timeout { .. }));
    }
}
