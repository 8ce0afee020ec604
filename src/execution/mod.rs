//! Execution path selection
//!
//! A route submits its relays one of three ways, fixed at construction:
//! directly from its signing key, as a multisig proposal only (signer), or
//! as a proposal that is executed here once enough owners approved
//! (executor). Every ledger submission goes through [`dry_run_then_submit`],
//! so the call data that was simulated is the call data that is sent.

use std::fmt;
use std::sync::Arc;

use alloy::primitives::{Address, Bytes, TxHash, B256, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use eyre::{Result, WrapErr};
use tracing::warn;

use crate::chain::{CallRequest, ChainClient};
use crate::contracts::Safe;
use crate::types::{GasQuote, SafeRole};

pub mod safe;

pub use safe::SafeProposer;

/// Result of a multisig proposal round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub safe_tx_hash: B256,
    /// Approvals reached the multisig threshold
    pub ready: bool,
    /// Owner signatures, ordered for on-chain verification
    pub signatures: Bytes,
}

/// External multisig proposal service
#[async_trait]
pub trait MultisigService: Send + Sync {
    /// Multisig wallet address (the relayer identity on chain)
    fn address(&self) -> Address;

    /// Propose `call` (or add our approval to an identical proposal)
    async fn propose(&self, call: &CallRequest) -> Result<Proposal>;
}

/// How a route's relays reach the ledger
#[derive(Clone)]
pub enum ExecutionPath {
    Direct,
    Signer { multisig: Arc<dyn MultisigService> },
    Executor { multisig: Arc<dyn MultisigService> },
}

/// What an execution attempt did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// A ledger transaction was sent; the hash must be tracked
    Submitted(TxHash),
    /// A proposal was made or approved; nothing was sent here
    Proposed { safe_tx_hash: B256, ready: bool },
    /// The simulated call reverted; nothing was sent
    DryRunFailed,
}

impl ExecutionPath {
    pub fn from_role(role: Option<SafeRole>, multisig: Option<Arc<dyn MultisigService>>) -> Self {
        match (role, multisig) {
            (Some(SafeRole::Signer), Some(multisig)) => ExecutionPath::Signer { multisig },
            (Some(SafeRole::Executor), Some(multisig)) => ExecutionPath::Executor { multisig },
            _ => ExecutionPath::Direct,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionPath::Direct => "direct",
            ExecutionPath::Signer { .. } => "signer",
            ExecutionPath::Executor { .. } => "executor",
        }
    }

    /// Address that acts as provider on chain
    pub fn relayer_address(&self, signer: Address) -> Address {
        match self {
            ExecutionPath::Direct => signer,
            ExecutionPath::Signer { multisig } | ExecutionPath::Executor { multisig } => {
                multisig.address()
            }
        }
    }

    /// Run the relay `call` on the destination chain
    pub async fn execute(
        &self,
        client: &dyn ChainClient,
        call: &CallRequest,
        gas: &GasQuote,
    ) -> Result<ExecutionOutcome> {
        match self {
            ExecutionPath::Direct => dry_run_then_submit(client, call, gas).await,
            ExecutionPath::Signer { multisig } => {
                let proposal = multisig.propose(call).await?;
                Ok(ExecutionOutcome::Proposed {
                    safe_tx_hash: proposal.safe_tx_hash,
                    ready: proposal.ready,
                })
            }
            ExecutionPath::Executor { multisig } => {
                let proposal = multisig.propose(call).await?;
                if !proposal.ready {
                    return Ok(ExecutionOutcome::Proposed {
                        safe_tx_hash: proposal.safe_tx_hash,
                        ready: false,
                    });
                }
                let exec = exec_transaction_call(multisig.address(), call, proposal.signatures);
                dry_run_then_submit(client, &exec, gas).await
            }
        }
    }
}

impl fmt::Debug for ExecutionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionPath::Direct => write!(f, "Direct"),
            ExecutionPath::Signer { multisig } => write!(f, "Signer({})", multisig.address()),
            ExecutionPath::Executor { multisig } => write!(f, "Executor({})", multisig.address()),
        }
    }
}

/// Simulate `call`, then submit the identical request
pub async fn dry_run_then_submit(
    client: &dyn ChainClient,
    call: &CallRequest,
    gas: &GasQuote,
) -> Result<ExecutionOutcome> {
    if let Err(e) = client.call(call).await {
        warn!(to = %call.to, error = %e, "Dry-run reverted, not submitting");
        return Ok(ExecutionOutcome::DryRunFailed);
    }
    let hash = client
        .send(call, gas)
        .await
        .wrap_err_with(|| format!("Failed to submit call to {}", call.to))?;
    Ok(ExecutionOutcome::Submitted(hash))
}

/// Fixed cost of `execTransaction` around the inner call (hashing, nonce, events)
pub const SAFE_EXEC_OVERHEAD_GAS: u64 = 60_000;

/// Per-signature cost of the owner checks
pub const SAFE_SIGNATURE_GAS: u64 = 10_000;

/// `execTransaction` on the Safe wrapping the relay call
///
/// A configured inner gas limit is raised by the Safe's own overhead; with
/// no limit the outer call is estimated by the client.
pub fn exec_transaction_call(safe: Address, call: &CallRequest, signatures: Bytes) -> CallRequest {
    let owners = (signatures.len() / 65) as u64;
    let gas_limit = call.gas_limit.map(|inner| {
        inner
            .saturating_add(SAFE_EXEC_OVERHEAD_GAS)
            .saturating_add(owners.saturating_mul(SAFE_SIGNATURE_GAS))
    });
    let data = Safe::execTransactionCall {
        to: call.to,
        value: call.value,
        data: call.data.clone(),
        operation: 0,
        safeTxGas: U256::ZERO,
        baseGas: U256::ZERO,
        gasPrice: U256::ZERO,
        gasToken: Address::ZERO,
        refundReceiver: Address::ZERO,
        signatures,
    }
    .abi_encode();
    CallRequest::new(safe, data).with_gas_limit(gas_limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TxStatus;
    use eyre::eyre;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingChain {
        revert: bool,
        calls: Mutex<Vec<CallRequest>>,
        sent: Mutex<Vec<CallRequest>>,
    }

    #[async_trait]
    impl ChainClient for RecordingChain {
        fn chain_id(&self) -> u64 {
            10
        }
        fn sender(&self) -> Address {
            Address::repeat_byte(0xee)
        }
        async fn gas_quote(&self, _legacy_only: bool) -> Result<GasQuote> {
            Ok(GasQuote::Legacy { gas_price: 1 })
        }
        async fn tx_status(&self, _hash: TxHash) -> Result<Option<TxStatus>> {
            Ok(None)
        }
        async fn call(&self, request: &CallRequest) -> Result<Bytes> {
            self.calls.lock().unwrap().push(request.clone());
            if self.revert {
                Err(eyre!("execution reverted"))
            } else {
                Ok(Bytes::new())
            }
        }
        async fn send(&self, request: &CallRequest, _gas: &GasQuote) -> Result<TxHash> {
            self.sent.lock().unwrap().push(request.clone());
            Ok(TxHash::repeat_byte(0x77))
        }
    }

    struct FixedMultisig {
        ready: bool,
    }

    #[async_trait]
    impl MultisigService for FixedMultisig {
        fn address(&self) -> Address {
            Address::repeat_byte(0x5a)
        }
        async fn propose(&self, _call: &CallRequest) -> Result<Proposal> {
            Ok(Proposal {
                safe_tx_hash: B256::repeat_byte(0x01),
                ready: self.ready,
                signatures: Bytes::from(vec![0xab; 65]),
            })
        }
    }

    fn relay() -> CallRequest {
        CallRequest::new(Address::repeat_byte(0x02), vec![1u8, 2, 3, 4]).with_value(U256::from(9))
    }

    const GAS: GasQuote = GasQuote::Legacy { gas_price: 1 };

    #[tokio::test]
    async fn test_direct_submits_identical_call_after_dry_run() {
        let chain = RecordingChain::default();
        let outcome = ExecutionPath::Direct.execute(&chain, &relay(), &GAS).await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::Submitted(TxHash::repeat_byte(0x77)));
        assert_eq!(chain.calls.lock().unwrap().as_slice(), &[relay()]);
        assert_eq!(chain.sent.lock().unwrap().as_slice(), &[relay()]);
    }

    #[tokio::test]
    async fn test_direct_reverting_dry_run_sends_nothing() {
        let chain = RecordingChain {
            revert: true,
            ..Default::default()
        };
        let outcome = ExecutionPath::Direct.execute(&chain, &relay(), &GAS).await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::DryRunFailed);
        assert!(chain.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_signer_only_proposes() {
        let chain = RecordingChain::default();
        let path = ExecutionPath::Signer {
            multisig: Arc::new(FixedMultisig { ready: true }),
        };
        let outcome = path.execute(&chain, &relay(), &GAS).await.unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Proposed { ready: true, .. }));
        assert!(chain.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_executor_waits_for_approvals() {
        let chain = RecordingChain::default();
        let path = ExecutionPath::Executor {
            multisig: Arc::new(FixedMultisig { ready: false }),
        };
        let outcome = path.execute(&chain, &relay(), &GAS).await.unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Proposed { ready: false, .. }));
        assert!(chain.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_executor_executes_when_ready() {
        let chain = RecordingChain::default();
        let path = ExecutionPath::Executor {
            multisig: Arc::new(FixedMultisig { ready: true }),
        };
        let outcome = path.execute(&chain, &relay(), &GAS).await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::Submitted(TxHash::repeat_byte(0x77)));

        let sent = chain.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, Address::repeat_byte(0x5a));
        assert_eq!(sent[0].value, U256::ZERO);
        assert_eq!(chain.calls.lock().unwrap()[0], sent[0]);

        let decoded = Safe::execTransactionCall::abi_decode(&sent[0].data, true).unwrap();
        assert_eq!(decoded.to, Address::repeat_byte(0x02));
        assert_eq!(decoded.value, U256::from(9));
        assert_eq!(decoded.signatures.len(), 65);
    }

    #[test]
    fn test_relayer_identity() {
        let signer = Address::repeat_byte(0x11);
        assert_eq!(ExecutionPath::Direct.relayer_address(signer), signer);
        let path = ExecutionPath::from_role(
            Some(SafeRole::Executor),
            Some(Arc::new(FixedMultisig { ready: false })),
        );
        assert_eq!(path.as_str(), "executor");
        assert_eq!(path.relayer_address(signer), Address::repeat_byte(0x5a));
        assert_eq!(ExecutionPath::from_role(Some(SafeRole::Signer), None).as_str(), "direct");
    }

    #[test]
    fn test_exec_transaction_gas_covers_safe_overhead() {
        let inner = relay().with_gas_limit(Some(300_000));
        let exec = exec_transaction_call(Address::repeat_byte(0x5a), &inner, Bytes::from(vec![0u8; 130]));
        assert_eq!(
            exec.gas_limit,
            Some(300_000 + SAFE_EXEC_OVERHEAD_GAS + 2 * SAFE_SIGNATURE_GAS)
        );

        let estimated = exec_transaction_call(Address::repeat_byte(0x5a), &relay(), Bytes::new());
        assert_eq!(estimated.gas_limit, None);
    }
}
