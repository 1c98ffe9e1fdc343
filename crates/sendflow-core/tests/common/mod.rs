#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use sendflow_core::amount::Arrrtoshi;
use sendflow_core::engine::{
    PendingTransaction, SignedTransaction, TransactionId, TransactionOutput, WalletEngine,
};
use sendflow_core::error::EngineError;
use sendflow_core::fee::FeeInfo;
use sendflow_core::scope::{BalanceSnapshot, FundingSource, SpendScope};
use tokio::sync::Notify;
use uuid::Uuid;

pub const ADDR_A: &str =
    "zs15feryxhrdz9m6y09mr8wrerwzgj6f8ntxvhxyrdlm5aahn0t09nl4ujy8624fl6zy54klay937y";
pub const ADDR_B: &str =
    "zs1rnujckpak28lrdjg0eel92ue3gm36kcwf9tfwwqltsjqf6h5graeeeex7ervydu284rxqfxhpyd";
pub const ADDR_C: &str =
    "zs1cfskh788la77n9fx4s72pdhfpn9sh2kw4wv0ewvlkpp37svkukh9wxw7v4d7q7k98cv7tm49eae";

pub fn arrr(units: u64) -> Arrrtoshi {
    Arrrtoshi::new(units).expect("test amount within supply")
}

pub fn source(key_id: i64, address_id: i64, spendable: u64, pending: u64) -> FundingSource {
    FundingSource {
        key_id,
        address_id,
        address: format!("source-{address_id}"),
        spendable: arrr(spendable),
        pending: arrr(pending),
    }
}

/// Scripted wallet engine. Results can be swapped between calls and
/// builds or signs can be held open with a gate.
pub struct MockEngine {
    fee_info: Mutex<Result<FeeInfo, EngineError>>,
    sources: Mutex<Result<Vec<FundingSource>, EngineError>>,
    balance_error: Mutex<Option<EngineError>>,
    build_error: Mutex<Option<EngineError>>,
    sign_error: Mutex<Option<EngineError>>,
    broadcast_error: Mutex<Option<EngineError>>,
    build_gate: Mutex<Option<Arc<Notify>>>,
    sign_gate: Mutex<Option<Arc<Notify>>>,
    built: Mutex<Vec<(Vec<TransactionOutput>, SpendScope, Arrrtoshi)>>,
    signed_scopes: Mutex<Vec<SpendScope>>,
    build_calls: AtomicUsize,
    sign_calls: AtomicUsize,
    broadcast_calls: AtomicUsize,
}

impl MockEngine {
    pub fn new(sources: Vec<FundingSource>) -> Self {
        Self {
            fee_info: Mutex::new(Ok(FeeInfo::default())),
            sources: Mutex::new(Ok(sources)),
            balance_error: Mutex::new(None),
            build_error: Mutex::new(None),
            sign_error: Mutex::new(None),
            broadcast_error: Mutex::new(None),
            build_gate: Mutex::new(None),
            sign_gate: Mutex::new(None),
            built: Mutex::new(Vec::new()),
            signed_scopes: Mutex::new(Vec::new()),
            build_calls: AtomicUsize::new(0),
            sign_calls: AtomicUsize::new(0),
            broadcast_calls: AtomicUsize::new(0),
        }
    }

    /// One key with one address holding `spendable` and `pending` units.
    pub fn with_balance(spendable: u64, pending: u64) -> Self {
        Self::new(vec![source(1, 1, spendable, pending)])
    }

    pub fn set_fee_info(&self, info: Result<FeeInfo, EngineError>) {
        *self.fee_info.lock().unwrap() = info;
    }

    pub fn set_sources(&self, sources: Result<Vec<FundingSource>, EngineError>) {
        *self.sources.lock().unwrap() = sources;
    }

    pub fn fail_balances(&self, error: Option<EngineError>) {
        *self.balance_error.lock().unwrap() = error;
    }

    pub fn fail_build(&self, error: Option<EngineError>) {
        *self.build_error.lock().unwrap() = error;
    }

    pub fn fail_sign(&self, error: Option<EngineError>) {
        *self.sign_error.lock().unwrap() = error;
    }

    pub fn fail_broadcast(&self, error: Option<EngineError>) {
        *self.broadcast_error.lock().unwrap() = error;
    }

    pub fn gate_builds(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.build_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn gate_signs(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.sign_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn build_calls(&self) -> usize {
        self.build_calls.load(Ordering::SeqCst)
    }

    pub fn sign_calls(&self) -> usize {
        self.sign_calls.load(Ordering::SeqCst)
    }

    pub fn broadcast_calls(&self) -> usize {
        self.broadcast_calls.load(Ordering::SeqCst)
    }

    pub fn last_build(&self) -> Option<(Vec<TransactionOutput>, SpendScope, Arrrtoshi)> {
        self.built.lock().unwrap().last().cloned()
    }

    pub fn signed_scopes(&self) -> Vec<SpendScope> {
        self.signed_scopes.lock().unwrap().clone()
    }

    fn current_sources(&self) -> Vec<FundingSource> {
        self.sources.lock().unwrap().clone().unwrap_or_default()
    }
}

#[async_trait]
impl WalletEngine for MockEngine {
    async fn get_fee_info(&self) -> Result<FeeInfo, EngineError> {
        self.fee_info.lock().unwrap().clone()
    }

    async fn get_balances(&self, scope: &SpendScope) -> Result<BalanceSnapshot, EngineError> {
        if let Some(err) = self.balance_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(scope.resolve(&self.current_sources()).balance)
    }

    async fn list_funding_sources(&self) -> Result<Vec<FundingSource>, EngineError> {
        self.sources.lock().unwrap().clone()
    }

    async fn build_transaction(
        &self,
        outputs: &[TransactionOutput],
        scope: &SpendScope,
        fee: Arrrtoshi,
    ) -> Result<PendingTransaction, EngineError> {
        self.build_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.build_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(err) = self.build_error.lock().unwrap().clone() {
            return Err(err);
        }

        self.built
            .lock()
            .unwrap()
            .push((outputs.to_vec(), scope.clone(), fee));

        let total_amount = Arrrtoshi::checked_sum(outputs.iter().map(|output| output.amount))
            .map_err(|err| EngineError::unknown(err.to_string()))?;
        let resolved = scope.resolve(&self.current_sources());
        let input_total = resolved.balance.spendable;
        Ok(PendingTransaction {
            id: Uuid::new_v4(),
            outputs: outputs.to_vec(),
            fee,
            total_amount,
            change: input_total.saturating_sub(total_amount).saturating_sub(fee),
            input_total,
            num_inputs: 1,
            expiry_height: 2_500_040,
            created_at: Utc::now(),
            request_fingerprint: None,
        })
    }

    async fn sign_transaction(
        &self,
        pending: &PendingTransaction,
        scope: &SpendScope,
    ) -> Result<SignedTransaction, EngineError> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.sign_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(err) = self.sign_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.signed_scopes.lock().unwrap().push(scope.clone());
        Ok(SignedTransaction {
            txid: TransactionId(format!("tx-{}", pending.id.simple())),
            raw: pending.id.as_bytes().to_vec(),
        })
    }

    async fn broadcast_transaction(
        &self,
        signed: &SignedTransaction,
    ) -> Result<TransactionId, EngineError> {
        self.broadcast_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.broadcast_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(signed.txid.clone())
    }
}
