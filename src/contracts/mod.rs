//! Contract ABI definitions
//!
//! Uses alloy's sol! macro to generate call types for the bridge variants,
//! the Safe multisig and ERC-20. Calls are encoded here and carried over
//! [`crate::chain::ChainClient`], so no provider-bound instances are needed.

#![allow(clippy::too_many_arguments)]

use alloy::sol;

sol! {
    /// lnv2 relay parameters (both default and opposite variants)
    struct LnV2TransferParameter {
        bytes32 previousTransferId;
        address provider;
        address sourceToken;
        address targetToken;
        uint112 amount;
        uint256 timestamp;
        address receiver;
    }

    /// lnv3 relay parameters
    struct Lnv3TransferParameter {
        uint256 remoteChainId;
        address provider;
        address sourceToken;
        address targetToken;
        uint112 sourceAmount;
        uint112 targetAmount;
        address receiver;
        uint256 nonce;
    }

    struct OppositeProviderConfig {
        uint112 margin;
        uint112 baseFee;
        uint16 liquidityFeeRate;
        bool pause;
    }

    struct DefaultProviderFee {
        uint112 baseFee;
        uint8 liquidityFeeRate;
    }

    /// lnv2 bridge, margin locked on the target chain
    interface LnDefaultBridge {
        /// Source side: lock created by the sender
        function lockInfos(bytes32 transferId) external view returns (
            uint112 amountWithFeeAndPenalty,
            uint32 timestamp,
            bool hasSlashed
        );

        /// Target side: fill record (timestamp is zero when unfilled)
        function fillTransfers(bytes32 transferId) external view returns (
            uint64 timestamp,
            bool slashed
        );

        /// Source side: provider fee configuration keyed by provider key
        function srcProviders(bytes32 providerKey) external view returns (
            DefaultProviderFee config,
            bytes32 lastTransferId
        );

        /// Source side: update the provider's fee
        function setProviderFee(
            uint256 remoteChainId,
            address sourceToken,
            address targetToken,
            uint112 baseFee,
            uint8 liquidityFeeRate
        ) external;

        /// Target side: deliver funds to the receiver
        function transferAndReleaseMargin(
            LnV2TransferParameter params,
            uint256 remoteChainId,
            bytes32 expectedTransferId
        ) external payable;
    }

    /// lnv2 bridge, margin locked on the source chain
    interface LnOppositeBridge {
        function lockInfos(bytes32 transferId) external view returns (
            uint112 amountWithFeeAndPenalty,
            uint32 timestamp,
            bool hasSlashed
        );

        /// Target side: non-zero once filled
        function fillTransfers(bytes32 transferId) external view returns (bytes32);

        function srcProviders(bytes32 providerKey) external view returns (
            OppositeProviderConfig config,
            bytes32 lastTransferId
        );

        function updateProviderFeeAndMargin(
            uint256 remoteChainId,
            address sourceToken,
            address targetToken,
            uint112 margin,
            uint112 baseFee,
            uint16 liquidityFeeRate
        ) external payable;

        function transferAndReleaseMargin(
            LnV2TransferParameter params,
            uint256 remoteChainId,
            bytes32 expectedTransferId
        ) external payable;
    }

    /// lnv3 bridge
    interface Lnv3Bridge {
        /// Source side: status 1 means locked (not withdrawn, not slashed)
        function lockInfos(bytes32 transferId) external view returns (
            uint32 timestamp,
            uint112 amountWithFeeAndPenalty,
            uint8 status
        );

        /// Target side: fill record (timestamp is zero when unfilled)
        function fillTransfers(bytes32 transferId) external view returns (
            uint64 timestamp,
            address provider
        );

        function srcProviders(bytes32 providerKey) external view returns (
            uint112 baseFee,
            uint16 liquidityFeeRate,
            uint112 transferLimit,
            bool pause
        );

        function registerLnProvider(
            uint256 remoteChainId,
            address sourceToken,
            address targetToken,
            uint112 baseFee,
            uint16 liquidityFeeRate,
            uint112 transferLimit
        ) external;

        function relay(
            Lnv3TransferParameter params,
            bytes32 expectedTransferId,
            bool relayBySelf
        ) external payable;
    }

    /// Safe multisig wallet
    interface Safe {
        function nonce() external view returns (uint256);

        function getThreshold() external view returns (uint256);

        function execTransaction(
            address to,
            uint256 value,
            bytes data,
            uint8 operation,
            uint256 safeTxGas,
            uint256 baseGas,
            uint256 gasPrice,
            address gasToken,
            address refundReceiver,
            bytes signatures
        ) external payable returns (bool success);
    }

    /// EIP-712 payload signed by Safe owners
    struct SafeTx {
        address to;
        uint256 value;
        bytes data;
        uint8 operation;
        uint256 safeTxGas;
        uint256 baseGas;
        uint256 gasPrice;
        address gasToken;
        address refundReceiver;
        uint256 nonce;
    }

    interface ERC20 {
        function decimals() external view returns (uint8);
    }
}

/// lnv3 lock status for an active (unwithdrawn, unslashed) lock
pub const LNV3_STATUS_LOCKED: u8 = 1;
