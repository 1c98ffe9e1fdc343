//! Offline wallet engine backed by a JSON snapshot of fee bounds and
//! funding sources. It can build drafts for review but holds no keys, so
//! signing and broadcasting always fail.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::{Builder, Uuid};

use sendflow_core::engine::TransactionOutput;
use sendflow_core::error::{EngineError, EngineErrorKind, TaxonomyCode};
use sendflow_core::{
    Arrrtoshi, BalanceSnapshot, FeeInfo, FundingSource, Network, PendingTransaction,
    SendFlowError, SignedTransaction, SpendScope, TransactionId, WalletEngine,
};

pub const MAX_SNAPSHOT_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSnapshot {
    #[serde(default)]
    pub network: Option<Network>,
    #[serde(default)]
    pub fee_info: FeeInfo,
    pub sources: Vec<FundingSource>,
    #[serde(default)]
    pub expiry_height: u32,
    /// Timestamp stamped on built drafts. Defaults to the current time.
    #[serde(default)]
    pub as_of: Option<DateTime<Utc>>,
}

impl WalletSnapshot {
    pub fn load(path: &Path, network: Network) -> Result<Self, SendFlowError> {
        let size = std::fs::metadata(path)?.len();
        if size > MAX_SNAPSHOT_BYTES {
            return Err(SendFlowError::taxonomy(
                TaxonomyCode::Cli2005,
                format!(
                    "wallet snapshot '{}' is {size} bytes, limit is {MAX_SNAPSHOT_BYTES}",
                    path.display()
                ),
            ));
        }

        let bytes = std::fs::read(path)?;
        let snapshot: Self = serde_json::from_slice(&bytes)?;
        if let Some(snapshot_network) = snapshot.network {
            if snapshot_network != network {
                return Err(SendFlowError::taxonomy(
                    TaxonomyCode::Cli2005,
                    format!(
                        "wallet snapshot is for {snapshot_network} but --network is {network}"
                    ),
                ));
            }
        }
        debug!(
            path = %path.display(),
            sources = snapshot.sources.len(),
            "wallet snapshot loaded"
        );
        Ok(snapshot)
    }
}

pub struct SnapshotEngine {
    snapshot: WalletSnapshot,
}

impl SnapshotEngine {
    pub fn new(snapshot: WalletSnapshot) -> Self {
        Self { snapshot }
    }

    /// Largest sources first until `required` is covered.
    fn select_inputs(
        &self,
        scope: &SpendScope,
        required: Arrrtoshi,
    ) -> Result<(Arrrtoshi, u32), EngineError> {
        let mut candidates: Vec<&FundingSource> = self
            .snapshot
            .sources
            .iter()
            .filter(|source| scope.includes(source) && !source.spendable.is_zero())
            .collect();
        candidates.sort_by(|a, b| {
            b.spendable
                .cmp(&a.spendable)
                .then(a.address_id.cmp(&b.address_id))
        });

        let mut selected = Arrrtoshi::ZERO;
        let mut count = 0_u32;
        for source in candidates {
            if selected >= required {
                break;
            }
            selected = selected.saturating_add(source.spendable);
            count += 1;
        }

        if selected < required {
            return Err(EngineError::new(
                EngineErrorKind::InsufficientFunds,
                format!(
                    "insufficient funds in scope {scope}: need {}, have {}",
                    required.as_u64(),
                    selected.as_u64()
                ),
            ));
        }
        Ok((selected, count))
    }
}

/// Same outputs, scope and fee always yield the same draft id.
fn draft_id(outputs: &[TransactionOutput], scope: &SpendScope, fee: Arrrtoshi) -> Uuid {
    let mut hasher = Sha256::new();
    hasher.update(format!("scope={scope}\nfee={}\n", fee.as_u64()));
    for output in outputs {
        let memo = output
            .memo
            .as_ref()
            .map(|memo| memo.to_base64())
            .unwrap_or_default();
        hasher.update(format!(
            "{}|{}|{memo}\n",
            output.address,
            output.amount.as_u64()
        ));
    }
    let digest = hasher.finalize();
    let mut bytes = [0_u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Builder::from_random_bytes(bytes).into_uuid()
}

#[async_trait]
impl WalletEngine for SnapshotEngine {
    async fn get_fee_info(&self) -> Result<FeeInfo, EngineError> {
        Ok(self.snapshot.fee_info)
    }

    async fn get_balances(&self, scope: &SpendScope) -> Result<BalanceSnapshot, EngineError> {
        Ok(scope.resolve(&self.snapshot.sources).balance)
    }

    async fn list_funding_sources(&self) -> Result<Vec<FundingSource>, EngineError> {
        Ok(self.snapshot.sources.clone())
    }

    async fn build_transaction(
        &self,
        outputs: &[TransactionOutput],
        scope: &SpendScope,
        fee: Arrrtoshi,
    ) -> Result<PendingTransaction, EngineError> {
        let total_amount = Arrrtoshi::checked_sum(outputs.iter().map(|output| output.amount))
            .map_err(|err| EngineError::unknown(err.to_string()))?;
        let required = total_amount
            .checked_add(fee)
            .map_err(|err| EngineError::unknown(err.to_string()))?;
        let (input_total, num_inputs) = self.select_inputs(scope, required)?;

        Ok(PendingTransaction {
            id: draft_id(outputs, scope, fee),
            outputs: outputs.to_vec(),
            fee,
            total_amount,
            change: input_total.saturating_sub(required),
            input_total,
            num_inputs,
            expiry_height: self.snapshot.expiry_height,
            created_at: self.snapshot.as_of.unwrap_or_else(Utc::now),
            request_fingerprint: None,
        })
    }

    async fn sign_transaction(
        &self,
        _pending: &PendingTransaction,
        _scope: &SpendScope,
    ) -> Result<SignedTransaction, EngineError> {
        Err(EngineError::unknown(
            "offline wallet snapshot holds no spending keys",
        ))
    }

    async fn broadcast_transaction(
        &self,
        _signed: &SignedTransaction,
    ) -> Result<TransactionId, EngineError> {
        Err(EngineError::network(
            "offline wallet snapshot has no network connection",
        ))
    }
}
