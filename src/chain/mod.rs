//! On-chain voting registry client.
//!
//! Wraps exactly one (RPC endpoint, signing key, contract address) tuple
//! and performs read and write operations against the deployed
//! VotingRegistry contract.

use std::time::Duration;

use alloy::consensus::TxReceipt;
use alloy::network::EthereumWallet;
use alloy::primitives::{Address, B256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::domain::{Commitment, SubmissionResult, SubmissionStatus};
use crate::infra::{AnchorError, CommitmentRegistry, Result};

// Generate contract bindings. The ABI is fixed and must match the deployed
// registry bytecode.
sol! {
    #[sol(rpc)]
    interface IVotingRegistry {
        function storeCommitment(bytes32 c) external;

        function hasCommitment(bytes32 c) external view returns (bool);

        function getCommitmentBlock(bytes32 c) external view returns (uint256);

        function getCommitmentSender(bytes32 c) external view returns (address);

        event CommitmentStored(bytes32 indexed commitment, uint256 blockNumber, address indexed sender);
    }
}

/// Default RPC endpoint when `BLOCKCHAIN_RPC_URL` is unset.
pub const DEFAULT_RPC_URL: &str = "https://polygon-rpc.com";

/// Default gas limit for `storeCommitment`.
pub const DEFAULT_GAS_LIMIT: u64 = 100_000;

/// Default receipt wait.
pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(120);

/// Chain client configuration.
///
/// Loaded once at process start and passed into [`RegistryClient::connect`];
/// nothing in the chain layer reads the environment after that.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// RPC endpoint URL
    pub rpc_url: String,
    /// Signing key, 0x-prefixed hex
    pub private_key: String,
    /// Deployed VotingRegistry contract address
    pub registry_address: Address,
    /// Gas limit for storeCommitment transactions
    pub gas_limit: u64,
    /// How long to wait for a receipt when confirmation is requested
    pub confirm_timeout: Duration,
}

impl ChainConfig {
    pub fn new(rpc_url: String, private_key: &str, registry_address: Address) -> Self {
        Self {
            rpc_url,
            private_key: normalize_private_key(private_key),
            registry_address,
            gas_limit: DEFAULT_GAS_LIMIT,
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Returns `None` when the signing key or contract address is absent;
    /// the orchestrator decides whether that degrades to simulated mode.
    pub fn from_env() -> Option<Self> {
        let rpc_url =
            std::env::var("BLOCKCHAIN_RPC_URL").unwrap_or_else(|_| DEFAULT_RPC_URL.to_string());
        let private_key = std::env::var("BLOCKCHAIN_PRIVATE_KEY").ok()?;
        let registry_address: Address = std::env::var("VOTING_REGISTRY_ADDRESS")
            .ok()
            .and_then(|s| s.parse().ok())?;

        let gas_limit = std::env::var("CHAIN_GAS_LIMIT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_GAS_LIMIT);

        let confirm_timeout = std::env::var("CHAIN_CONFIRM_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CONFIRM_TIMEOUT);

        Some(Self {
            gas_limit,
            confirm_timeout,
            ..Self::new(rpc_url, &private_key, registry_address)
        })
    }

    /// Like [`from_env`](Self::from_env), but absent configuration is a hard
    /// error naming the missing variable. Used by operator tooling.
    pub fn require_env() -> Result<Self> {
        if std::env::var("BLOCKCHAIN_PRIVATE_KEY").is_err() {
            return Err(AnchorError::MissingConfiguration(
                "BLOCKCHAIN_PRIVATE_KEY is not set".to_string(),
            ));
        }
        if std::env::var("VOTING_REGISTRY_ADDRESS").is_err() {
            return Err(AnchorError::MissingConfiguration(
                "VOTING_REGISTRY_ADDRESS is not set".to_string(),
            ));
        }

        Self::from_env().ok_or_else(|| {
            AnchorError::MissingConfiguration(
                "VOTING_REGISTRY_ADDRESS is not a valid address".to_string(),
            )
        })
    }
}

fn normalize_private_key(key: &str) -> String {
    let key = key.trim();
    match key.strip_prefix("0x") {
        Some(stripped) => format!("0x{stripped}"),
        None => format!("0x{key}"),
    }
}

/// Account balance in wei and native display units.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Balance {
    pub wei: u128,
    pub native: f64,
}

/// Client for the deployed VotingRegistry contract.
///
/// Fee and nonce parameters are fetched fresh per submission by the
/// provider's fillers; nothing nonce-related is cached across calls.
pub struct RegistryClient {
    config: ChainConfig,
    signer: PrivateKeySigner,
    chain_id: u64,
    // Serializes storeCommitment submissions so two concurrent callers
    // cannot race the account nonce.
    submit_lock: Mutex<()>,
}

impl RegistryClient {
    /// Parse the signing key and probe the RPC endpoint.
    pub async fn connect(config: ChainConfig) -> Result<Self> {
        let signer: PrivateKeySigner = config
            .private_key
            .parse()
            .map_err(|e| AnchorError::MissingConfiguration(format!("invalid signing key: {e}")))?;

        let provider = ProviderBuilder::new().on_http(
            config
                .rpc_url
                .parse()
                .map_err(|e| AnchorError::Connection(format!("invalid RPC URL: {e}")))?,
        );

        let chain_id = provider.get_chain_id().await.map_err(|e| {
            AnchorError::Connection(format!("failed to reach RPC {}: {e}", config.rpc_url))
        })?;

        info!(
            rpc_url = %config.rpc_url,
            registry = %config.registry_address,
            account = %signer.address(),
            chain_id,
            "connected to voting registry"
        );

        Ok(Self {
            config,
            signer,
            chain_id,
            submit_lock: Mutex::new(()),
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn registry_address(&self) -> Address {
        self.config.registry_address
    }

    /// Current balance of the signing account. Pre-flight operational check
    /// only; not part of the vote path.
    pub async fn balance(&self) -> Result<Balance> {
        let provider = ProviderBuilder::new().on_http(
            self.config
                .rpc_url
                .parse()
                .map_err(|e| AnchorError::Connection(format!("invalid RPC URL: {e}")))?,
        );

        let raw = provider
            .get_balance(self.signer.address())
            .await
            .map_err(|e| AnchorError::Connection(format!("balance query failed: {e}")))?;

        let wei = u128::try_from(raw).unwrap_or(u128::MAX);

        Ok(Balance {
            wei,
            native: wei as f64 / 1e18,
        })
    }

    fn commitment_word(commitment: &Commitment) -> B256 {
        B256::from(*commitment.as_bytes())
    }
}

fn classify_send_error(e: alloy::contract::Error) -> AnchorError {
    let msg = e.to_string();
    if msg.contains("revert") {
        AnchorError::ChainRevert(msg)
    } else {
        AnchorError::Connection(format!("failed to send transaction: {msg}"))
    }
}

#[async_trait]
impl CommitmentRegistry for RegistryClient {
    async fn has_commitment(&self, commitment: &Commitment) -> Result<bool> {
        let provider = ProviderBuilder::new().on_http(
            self.config
                .rpc_url
                .parse()
                .map_err(|e| AnchorError::Connection(format!("invalid RPC URL: {e}")))?,
        );
        let contract = IVotingRegistry::new(self.config.registry_address, &provider);

        let out = contract
            .hasCommitment(Self::commitment_word(commitment))
            .call()
            .await
            .map_err(|e| AnchorError::Connection(format!("hasCommitment call failed: {e}")))?;

        Ok(out._0)
    }

    async fn commitment_block(&self, commitment: &Commitment) -> Result<Option<u64>> {
        let provider = ProviderBuilder::new().on_http(
            self.config
                .rpc_url
                .parse()
                .map_err(|e| AnchorError::Connection(format!("invalid RPC URL: {e}")))?,
        );
        let contract = IVotingRegistry::new(self.config.registry_address, &provider);

        let out = contract
            .getCommitmentBlock(Self::commitment_word(commitment))
            .call()
            .await
            .map_err(|e| {
                AnchorError::Connection(format!("getCommitmentBlock call failed: {e}"))
            })?;

        // The contract returns zero for unknown commitments.
        if out._0.is_zero() {
            return Ok(None);
        }

        let block = u64::try_from(out._0)
            .map_err(|_| AnchorError::Internal("block number overflows u64".to_string()))?;
        Ok(Some(block))
    }

    async fn commitment_sender(&self, commitment: &Commitment) -> Result<Option<Address>> {
        let provider = ProviderBuilder::new().on_http(
            self.config
                .rpc_url
                .parse()
                .map_err(|e| AnchorError::Connection(format!("invalid RPC URL: {e}")))?,
        );
        let contract = IVotingRegistry::new(self.config.registry_address, &provider);

        let out = contract
            .getCommitmentSender(Self::commitment_word(commitment))
            .call()
            .await
            .map_err(|e| {
                AnchorError::Connection(format!("getCommitmentSender call failed: {e}"))
            })?;

        if out._0 == Address::ZERO {
            Ok(None)
        } else {
            Ok(Some(out._0))
        }
    }

    async fn submit_commitment(
        &self,
        commitment: &Commitment,
        wait_for_receipt: bool,
        timeout: Duration,
    ) -> Result<SubmissionResult> {
        let _nonce_guard = self.submit_lock.lock().await;

        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(EthereumWallet::from(self.signer.clone()))
            .on_http(
                self.config
                    .rpc_url
                    .parse()
                    .map_err(|e| AnchorError::Connection(format!("invalid RPC URL: {e}")))?,
            );
        let contract = IVotingRegistry::new(self.config.registry_address, &provider);

        let pending = contract
            .storeCommitment(Self::commitment_word(commitment))
            .gas(self.config.gas_limit.into())
            .send()
            .await
            .map_err(classify_send_error)?;

        let tx_hash = pending.tx_hash().to_string();
        info!(commitment = %commitment, tx_hash = %tx_hash, "transaction sent");

        if !wait_for_receipt {
            return Ok(SubmissionResult {
                tx_hash,
                block_number: None,
                gas_used: None,
                status: SubmissionStatus::Sent,
            });
        }

        let receipt = match tokio::time::timeout(timeout, pending.get_receipt()).await {
            Err(_) => {
                // The transaction is already broadcast and cannot be
                // retracted; only the wait stops here.
                return Err(AnchorError::ConfirmationTimeout {
                    tx_hash,
                    timeout_secs: timeout.as_secs(),
                });
            }
            Ok(Err(e)) => {
                return Err(AnchorError::Connection(format!(
                    "failed to fetch receipt for {tx_hash}: {e}"
                )));
            }
            Ok(Ok(receipt)) => receipt,
        };

        let status = if receipt.status() {
            SubmissionStatus::Success
        } else {
            SubmissionStatus::Failed
        };

        if status == SubmissionStatus::Failed {
            // Best-effort log decoding for diagnostics; a receipt we cannot
            // decode is still a failed receipt.
            for log in receipt.inner.logs() {
                match log.log_decode::<IVotingRegistry::CommitmentStored>() {
                    Ok(decoded) => {
                        let event = decoded.inner.data;
                        warn!(
                            commitment = %event.commitment,
                            block_number = %event.blockNumber,
                            sender = %event.sender,
                            "CommitmentStored event on failed receipt"
                        );
                    }
                    Err(_) => {
                        warn!(tx_hash = %tx_hash, "undecodable log on failed receipt");
                    }
                }
            }
        }

        info!(
            tx_hash = %tx_hash,
            block_number = ?receipt.block_number,
            status = ?status,
            "receipt confirmed"
        );

        Ok(SubmissionResult {
            tx_hash: receipt.transaction_hash.to_string(),
            block_number: receipt.block_number,
            gas_used: Some(receipt.gas_used as u64),
            status,
        })
    }

    fn account_address(&self) -> Address {
        self.signer.address()
    }
}
