use std::fmt::{self, Display};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::amount::Arrrtoshi;
use crate::error::EngineError;
use crate::fee::FeeInfo;
use crate::memo::Memo;
use crate::scope::{BalanceSnapshot, FundingSource, SpendScope};

/// A validated output handed to the engine for building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub address: String,
    pub amount: Arrrtoshi,
    pub memo: Option<Memo>,
}

/// Draft returned by the engine's build step. Opaque beyond these fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub id: Uuid,
    pub outputs: Vec<TransactionOutput>,
    pub fee: Arrrtoshi,
    pub total_amount: Arrrtoshi,
    pub change: Arrrtoshi,
    pub input_total: Arrrtoshi,
    pub num_inputs: u32,
    pub expiry_height: u32,
    pub created_at: DateTime<Utc>,
    /// Fingerprint of the request this draft was built from. Engines leave
    /// it empty; the flow stamps it when it accepts the draft.
    #[serde(default)]
    pub request_fingerprint: Option<String>,
}

impl PendingTransaction {
    pub fn total_out(&self) -> Arrrtoshi {
        self.total_amount.saturating_add(self.fee)
    }

    /// Whether this draft was built from the request with `fingerprint`.
    pub fn matches_request(&self, fingerprint: &str) -> bool {
        self.request_fingerprint.as_deref() == Some(fingerprint)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub txid: TransactionId,
    pub raw: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub String);

impl Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The wallet engine that owns keys, notes and the network connection.
///
/// Every call is a request/response round trip; implementations must not
/// hold state that the flow relies on between calls.
#[async_trait]
pub trait WalletEngine: Send + Sync {
    async fn get_fee_info(&self) -> Result<FeeInfo, EngineError>;

    async fn get_balances(&self, scope: &SpendScope) -> Result<BalanceSnapshot, EngineError>;

    async fn list_funding_sources(&self) -> Result<Vec<FundingSource>, EngineError>;

    async fn build_transaction(
        &self,
        outputs: &[TransactionOutput],
        scope: &SpendScope,
        fee: Arrrtoshi,
    ) -> Result<PendingTransaction, EngineError>;

    async fn sign_transaction(
        &self,
        pending: &PendingTransaction,
        scope: &SpendScope,
    ) -> Result<SignedTransaction, EngineError>;

    async fn broadcast_transaction(
        &self,
        signed: &SignedTransaction,
    ) -> Result<TransactionId, EngineError>;
}
