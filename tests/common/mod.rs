//! In-memory fakes of the ledger, indexer, store and multisig service

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use alloy::primitives::aliases::U112;
use alloy::primitives::{Address, Bytes, TxHash, B256, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use eyre::{eyre, Result};
use tokio::sync::Notify;

use lnbridge_relayer::bridge::{BridgeBinding, TransferContext};
use lnbridge_relayer::chain::{CallRequest, ChainClient, ChainEndpoint};
use lnbridge_relayer::contracts::{LnOppositeBridge, OppositeProviderConfig};
use lnbridge_relayer::execution::{ExecutionPath, MultisigService, Proposal};
use lnbridge_relayer::fee::{to_fixed18, FeeBand};
use lnbridge_relayer::indexer::{Heartbeat, Indexer, RelayQuery};
use lnbridge_relayer::relayer::{Cadence, RelayContext};
use lnbridge_relayer::route::{BridgeRoute, Economics, ProviderBinding, RouteSide};
use lnbridge_relayer::store::{PendingStore, StoreError};
use lnbridge_relayer::tracker::PendingTracker;
use lnbridge_relayer::types::{GasQuote, ProtocolVariant, RelayCandidate, TransferRecord, TxStatus};

pub const SOURCE_CHAIN: &str = "ethereum";
pub const TARGET_CHAIN: &str = "arbitrum";
pub const SOURCE_BRIDGE: Address = Address::repeat_byte(0x11);
pub const TARGET_BRIDGE: Address = Address::repeat_byte(0x22);
pub const PROVIDER: Address = Address::repeat_byte(0xaa);
pub const SAFE: Address = Address::repeat_byte(0x5a);
pub const REQUEST_TX: TxHash = TxHash::repeat_byte(0x0d);

pub fn eth(value: f64) -> U256 {
    to_fixed18(value).unwrap()
}

// ============================================================================
// Ledger
// ============================================================================

type CallKey = (Address, [u8; 4]);

/// Answers calls by (contract, selector); unknown calls succeed with no data
pub struct MockChain {
    chain_id: u64,
    sender: Address,
    gas_price: Mutex<u128>,
    responses: Mutex<HashMap<CallKey, Bytes>>,
    reverts: Mutex<HashSet<CallKey>>,
    statuses: Mutex<HashMap<TxHash, TxStatus>>,
    calls: Mutex<Vec<CallRequest>>,
    sent: Mutex<Vec<CallRequest>>,
    next_hash: AtomicU8,
}

impl MockChain {
    pub fn new(chain_id: u64, gas_price: u128) -> Arc<Self> {
        Arc::new(Self {
            chain_id,
            sender: PROVIDER,
            gas_price: Mutex::new(gas_price),
            responses: Mutex::new(HashMap::new()),
            reverts: Mutex::new(HashSet::new()),
            statuses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            next_hash: AtomicU8::new(0xa0),
        })
    }

    pub fn respond<C: SolCall>(&self, to: Address, data: Vec<u8>) {
        self.responses
            .lock()
            .unwrap()
            .insert((to, C::SELECTOR), Bytes::from(data));
    }

    pub fn revert<C: SolCall>(&self, to: Address) {
        self.reverts.lock().unwrap().insert((to, C::SELECTOR));
    }

    pub fn set_status(&self, hash: TxHash, status: TxStatus) {
        self.statuses.lock().unwrap().insert(hash, status);
    }

    pub fn set_gas_price(&self, gas_price: u128) {
        *self.gas_price.lock().unwrap() = gas_price;
    }

    pub fn sent(&self) -> Vec<CallRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<CallRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainClient for MockChain {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn sender(&self) -> Address {
        self.sender
    }

    async fn gas_quote(&self, _legacy_only: bool) -> Result<GasQuote> {
        Ok(GasQuote::Legacy {
            gas_price: *self.gas_price.lock().unwrap(),
        })
    }

    async fn tx_status(&self, hash: TxHash) -> Result<Option<TxStatus>> {
        Ok(self.statuses.lock().unwrap().get(&hash).copied())
    }

    async fn call(&self, request: &CallRequest) -> Result<Bytes> {
        self.calls.lock().unwrap().push(request.clone());
        let mut selector = [0u8; 4];
        if request.data.len() >= 4 {
            selector.copy_from_slice(&request.data[..4]);
        }
        let key = (request.to, selector);
        if self.reverts.lock().unwrap().contains(&key) {
            return Err(eyre!("execution reverted"));
        }
        Ok(self
            .responses
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_default())
    }

    async fn send(&self, request: &CallRequest, _gas: &GasQuote) -> Result<TxHash> {
        self.sent.lock().unwrap().push(request.clone());
        Ok(TxHash::repeat_byte(self.next_hash.fetch_add(1, Ordering::SeqCst)))
    }
}

// ============================================================================
// Store
// ============================================================================

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, TxHash>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn snapshot(&self) -> HashMap<String, TxHash> {
        self.entries.lock().unwrap().clone()
    }

    /// Make every write fail until reset
    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("store offline")));
        }
        Ok(())
    }
}

#[async_trait]
impl PendingStore for MemoryStore {
    async fn get(&self, chain: &str) -> Result<Option<TxHash>, StoreError> {
        Ok(self.entries.lock().unwrap().get(chain).copied())
    }

    async fn set(&self, chain: &str, hash: TxHash) -> Result<(), StoreError> {
        self.check_writable()?;
        self.entries.lock().unwrap().insert(chain.to_string(), hash);
        Ok(())
    }

    async fn delete(&self, chain: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        self.entries.lock().unwrap().remove(chain);
        Ok(())
    }
}

// ============================================================================
// Indexer
// ============================================================================

/// Holds `needs_relay` until released, to keep a tick in flight
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

#[derive(Default)]
pub struct MockIndexer {
    candidate: Mutex<Option<RelayCandidate>>,
    queries: Mutex<Vec<RelayQuery>>,
    heartbeats: Mutex<Vec<Heartbeat>>,
    gate: Option<Arc<Gate>>,
}

impl MockIndexer {
    pub fn with_candidate(candidate: RelayCandidate) -> Self {
        Self {
            candidate: Mutex::new(Some(candidate)),
            ..Default::default()
        }
    }

    pub fn gated(gate: Arc<Gate>) -> Self {
        Self {
            gate: Some(gate),
            ..Default::default()
        }
    }

    pub fn queries(&self) -> Vec<RelayQuery> {
        self.queries.lock().unwrap().clone()
    }

    pub fn heartbeats(&self) -> Vec<Heartbeat> {
        self.heartbeats.lock().unwrap().clone()
    }
}

#[async_trait]
impl Indexer for MockIndexer {
    async fn needs_relay(&self, query: &RelayQuery) -> Result<Option<RelayCandidate>> {
        self.queries.lock().unwrap().push(query.clone());
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        Ok(self.candidate.lock().unwrap().clone())
    }

    async fn heartbeat(&self, beat: &Heartbeat) -> Result<()> {
        self.heartbeats.lock().unwrap().push(beat.clone());
        Ok(())
    }
}

// ============================================================================
// Multisig
// ============================================================================

pub struct FixedMultisig {
    pub ready: bool,
    pub proposals: Mutex<Vec<CallRequest>>,
}

impl FixedMultisig {
    pub fn new(ready: bool) -> Arc<Self> {
        Arc::new(Self {
            ready,
            proposals: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl MultisigService for FixedMultisig {
    fn address(&self) -> Address {
        SAFE
    }

    async fn propose(&self, call: &CallRequest) -> Result<Proposal> {
        self.proposals.lock().unwrap().push(call.clone());
        Ok(Proposal {
            safe_tx_hash: B256::repeat_byte(0x5f),
            ready: self.ready,
            signatures: Bytes::from(vec![0x01; 65]),
        })
    }
}

// ============================================================================
// Route fixture
// ============================================================================

/// An opposite-variant ethereum -> arbitrum route over two mock chains
pub struct Fixture {
    pub source: Arc<MockChain>,
    pub target: Arc<MockChain>,
    pub source_chain: Arc<ChainEndpoint>,
    pub target_chain: Arc<ChainEndpoint>,
    pub store: Arc<MemoryStore>,
    pub reorg_threshold: u64,
    pub fee_limit: U256,
    pub band: FeeBand,
    /// Gas units a relay is priced at
    pub gas_units: u64,
}

impl Fixture {
    /// Gas price 10 gwei and 100k gas units: a relay costs 0.001 native
    pub fn new() -> Self {
        Self {
            source: MockChain::new(1, 10_000_000_000),
            target: MockChain::new(42161, 10_000_000_000),
            source_chain: Arc::new(ChainEndpoint::new(SOURCE_CHAIN, 1, "ETH")),
            target_chain: Arc::new(ChainEndpoint::new(TARGET_CHAIN, 42161, "ETH")),
            store: Arc::new(MemoryStore::default()),
            reorg_threshold: 3,
            fee_limit: eth(0.01),
            band: FeeBand {
                min_profit: eth(0.0005),
                max_profit: eth(0.002),
            },
            gas_units: 100_000,
        }
    }

    pub fn binding(&self) -> BridgeBinding {
        BridgeBinding::new(ProtocolVariant::Opposite, SOURCE_BRIDGE, TARGET_BRIDGE)
    }

    pub fn context(&self, provider: Address) -> TransferContext {
        TransferContext {
            source_chain_id: 1,
            target_chain_id: 42161,
            provider,
            source_token: Address::ZERO,
            target_token: Address::ZERO,
        }
    }

    pub fn route(&self, execution: ExecutionPath) -> BridgeRoute {
        let provider = execution.relayer_address(PROVIDER);
        BridgeRoute {
            label: format!("{}->{}[opposite]", SOURCE_CHAIN, TARGET_CHAIN),
            source: RouteSide {
                chain: self.source_chain.clone(),
                client: self.source.clone(),
            },
            target: RouteSide {
                chain: self.target_chain.clone(),
                client: self.target.clone(),
            },
            binding: self.binding(),
            execution,
            economics: Economics {
                band: self.band,
                fee_limit: self.fee_limit,
            },
            reorg_threshold: self.reorg_threshold,
            relay_gas_limit: Some(self.gas_units),
            cost_gas_units: 200_000,
            providers: vec![ProviderBinding::new(
                provider,
                Address::ZERO,
                Address::ZERO,
                eth(1.0),
            )],
        }
    }

    pub fn context_with(&self, indexer: Arc<MockIndexer>) -> RelayContext {
        RelayContext {
            indexer,
            store: self.store.clone(),
            tracker: PendingTracker::new(3, 180),
            cadence: Cadence::new(6, 30),
        }
    }

    /// A candidate whose claimed id matches its fields
    pub fn candidate(&self, provider: Address) -> RelayCandidate {
        let mut candidate = RelayCandidate {
            record: TransferRecord {
                id: String::new(),
                send_amount: "1000000000000000000".to_string(),
                recv_amount: "990000000000000000".to_string(),
                start_time: "1700000000".to_string(),
                message_nonce: "12".to_string(),
                recipient: Address::repeat_byte(0x0c),
                request_tx_hash: REQUEST_TX,
            },
            last_transfer_id: B256::repeat_byte(0x0e),
        };
        let id = self
            .binding()
            .transfer_id(&self.context(provider), &candidate)
            .unwrap();
        candidate.record.id = format!("lnv2-opposite-1-42161-{}", id);
        candidate
    }

    /// Ledger state of a healthy, unfilled, confirmed lock
    pub fn seed_ledger(&self, confirmations: u64, base_fee: U256) {
        self.target.respond::<LnOppositeBridge::fillTransfersCall>(
            TARGET_BRIDGE,
            LnOppositeBridge::fillTransfersCall::abi_encode_returns(&(B256::ZERO,)),
        );
        self.source.respond::<LnOppositeBridge::lockInfosCall>(
            SOURCE_BRIDGE,
            LnOppositeBridge::lockInfosCall::abi_encode_returns(&(
                U112::from(1_000_000u64),
                1_700_000_000u32,
                false,
            )),
        );
        self.source.set_status(REQUEST_TX, TxStatus::included(confirmations));
        self.set_provider_fee(base_fee);
    }

    pub fn set_provider_fee(&self, base_fee: U256) {
        let config = OppositeProviderConfig {
            margin: U112::from(5_000_000u64),
            baseFee: U112::from(base_fee),
            liquidityFeeRate: 30,
            pause: false,
        };
        self.source.respond::<LnOppositeBridge::srcProvidersCall>(
            SOURCE_BRIDGE,
            LnOppositeBridge::srcProvidersCall::abi_encode_returns(&(config, B256::ZERO)),
        );
    }
}
