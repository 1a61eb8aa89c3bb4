//! Bridge contract bindings and revert classification

use crate::error::ClaimerError;
use crate::types::NetworkId;

use ethers::prelude::abigen;

abigen!(
    BridgeContract,
    r#"[
        function bridgeAsset(uint32 destinationNetwork, address destinationAddress, uint256 amount, address token, bool forceUpdateGlobalExitRoot, bytes permitData) external payable
        function bridgeMessage(uint32 destinationNetwork, address destinationAddress, bool forceUpdateGlobalExitRoot, bytes metadata) external payable
        function claimAsset(uint256 globalIndex, bytes32 mainnetExitRoot, bytes32 rollupExitRoot, uint32 originNetwork, address originTokenAddress, uint32 destinationNetwork, address destinationAddress, uint256 amount, bytes metadata) external
        function claimMessage(uint256 globalIndex, bytes32 mainnetExitRoot, bytes32 rollupExitRoot, uint32 originNetwork, address originAddress, uint32 destinationNetwork, address destinationAddress, uint256 amount, bytes metadata) external
        function isClaimed(uint32 leafIndex, uint32 sourceBridgeNetwork) external view returns (bool)
    ]"#,
);

abigen!(
    BridgeExtensionContract,
    r#"[
        function bridgeAndCall(address token, uint256 amount, uint32 destinationNetwork, address callAddress, address fallbackAddress, bytes callData, bool forceUpdateGlobalExitRoot) external payable
    ]"#,
);

abigen!(
    Erc20Contract,
    r#"[
        function approve(address spender, uint256 amount) external returns (bool)
        function allowance(address owner, address spender) external view returns (uint256)
    ]"#,
);

/// Selector of `AlreadyClaimed()`
const ALREADY_CLAIMED_SELECTOR: &str = "0x646cf558";
/// Selector of `GlobalExitRootInvalid()`
const EXIT_ROOT_INVALID_SELECTOR: &str = "0x002f6fad";

/// Map a failed claim call to the claimer's error taxonomy.
///
/// Nodes surface custom errors either by name or as raw revert data, so both
/// forms are matched.
pub fn classify_claim_revert(
    message: &str,
    destination_network: NetworkId,
    source_network: NetworkId,
    deposit_count: u32,
) -> ClaimerError {
    let lowered = message.to_ascii_lowercase();

    if message.contains("AlreadyClaimed") || lowered.contains(ALREADY_CLAIMED_SELECTOR) {
        ClaimerError::AlreadyClaimed {
            source_network,
            deposit_count,
        }
    } else if message.contains("GlobalExitRootInvalid")
        || lowered.contains(EXIT_ROOT_INVALID_SELECTOR)
    {
        ClaimerError::ExitRootNotReady {
            network_id: destination_network,
            message: message.to_string(),
        }
    } else {
        ClaimerError::Contract(message.to_string())
    }
}
