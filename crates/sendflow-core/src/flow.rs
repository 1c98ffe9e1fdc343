use std::collections::VecDeque;
use std::fmt::{self, Display};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::amount::Arrrtoshi;
use crate::composer::{ComposerSnapshot, PaymentComposer};
use crate::config::SendConfig;
use crate::engine::{PendingTransaction, TransactionId, WalletEngine};
use crate::error::{ErrorNotice, Result, SendFlowError, StateError, TaxonomyCode};
use crate::fee::FeePreset;
use crate::import::RecipientRow;
use crate::recipient::Recipient;
use crate::scope::{AddressId, FundingSource, ScopeError, SpendScope};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    #[default]
    Idle,
    Composing,
    Building,
    Reviewing,
    Signing,
    Broadcasting,
    Complete,
    Failed,
}

impl FlowState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Composing => "composing",
            Self::Building => "building",
            Self::Reviewing => "reviewing",
            Self::Signing => "signing",
            Self::Broadcasting => "broadcasting",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    /// An engine call is outstanding.
    pub const fn is_busy(self) -> bool {
        matches!(self, Self::Building | Self::Signing | Self::Broadcasting)
    }
}

impl Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const VALID_TRANSITIONS: &[(FlowState, FlowState)] = &[
    (FlowState::Idle, FlowState::Composing),
    (FlowState::Composing, FlowState::Idle),
    (FlowState::Composing, FlowState::Building),
    (FlowState::Building, FlowState::Reviewing),
    (FlowState::Building, FlowState::Composing),
    (FlowState::Reviewing, FlowState::Composing),
    (FlowState::Reviewing, FlowState::Signing),
    (FlowState::Signing, FlowState::Broadcasting),
    (FlowState::Signing, FlowState::Failed),
    (FlowState::Broadcasting, FlowState::Complete),
    (FlowState::Broadcasting, FlowState::Failed),
    (FlowState::Failed, FlowState::Composing),
    (FlowState::Complete, FlowState::Composing),
];

pub fn is_valid_transition(from: FlowState, to: FlowState) -> bool {
    VALID_TRANSITIONS.contains(&(from, to))
}

/// An edit to the composition, applied through the flow so that any held
/// draft is discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositionChange {
    AddRecipient(Recipient),
    RemoveRecipient(usize),
    SetAddress { index: usize, address: String },
    SetAmount { index: usize, text: String },
    SetMemo { index: usize, text: String },
    SetMemoBytes { index: usize, bytes: Option<Vec<u8>> },
    SetLabel { index: usize, label: Option<String> },
    ApplyMax(usize),
    SetFeePreset(FeePreset),
    SetCustomFee(Arrrtoshi),
    SetScope(SpendScope),
    ToggleAddress(AddressId),
    LoadRows(Vec<RecipientRow>),
    Clear,
}

/// Everything the presentation layer needs to render the flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowSnapshot {
    pub state: FlowState,
    pub composition: ComposerSnapshot,
    pub pending: Option<PendingTransaction>,
    pub txid: Option<TransactionId>,
    pub last_error: Option<ErrorNotice>,
}

/// The send-flow state machine over a wallet engine.
///
/// Owns the composer and the one built draft. Engine calls are awaited in
/// place, so holding `&mut self` across them is what keeps at most one
/// build, sign or broadcast outstanding.
pub struct SendFlow<E: WalletEngine + ?Sized> {
    engine: Arc<E>,
    composer: PaymentComposer,
    state: FlowState,
    held: Option<PendingTransaction>,
    txid: Option<TransactionId>,
    last_error: Option<ErrorNotice>,
    sources: Option<Vec<FundingSource>>,
    observer: Option<watch::Sender<FlowSnapshot>>,
}

impl<E: WalletEngine + ?Sized> SendFlow<E> {
    pub fn new(engine: Arc<E>, config: SendConfig) -> Self {
        Self {
            engine,
            composer: PaymentComposer::new(config),
            state: FlowState::Idle,
            held: None,
            txid: None,
            last_error: None,
            sources: None,
            observer: None,
        }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn composer(&self) -> &PaymentComposer {
        &self.composer
    }

    pub fn pending_transaction(&self) -> Option<&PendingTransaction> {
        self.held.as_ref()
    }

    pub fn txid(&self) -> Option<&TransactionId> {
        self.txid.as_ref()
    }

    pub fn last_error(&self) -> Option<&ErrorNotice> {
        self.last_error.as_ref()
    }

    pub fn engine(&self) -> Arc<E> {
        Arc::clone(&self.engine)
    }

    pub fn snapshot(&self) -> FlowSnapshot {
        FlowSnapshot {
            state: self.state,
            composition: self.composer.snapshot(),
            pending: self.pending_transaction().cloned(),
            txid: self.txid.clone(),
            last_error: self.last_error.clone(),
        }
    }

    /// Receive a snapshot after every change.
    pub fn subscribe(&mut self) -> watch::Receiver<FlowSnapshot> {
        match &self.observer {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = watch::channel(self.snapshot());
                self.observer = Some(sender);
                receiver
            }
        }
    }

    fn publish(&self) {
        if let Some(sender) = &self.observer {
            sender.send_replace(self.snapshot());
        }
    }

    fn guard(&self, action: &'static str, allowed: &[FlowState]) -> Result<()> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        let err = StateError::NotPermitted {
            action,
            stage: self.state.as_str(),
        };
        error!(%err, "send flow action rejected");
        Err(err.into())
    }

    fn transition(&mut self, to: FlowState) -> Result<()> {
        let from = self.state;
        if !is_valid_transition(from, to) {
            let err = StateError::InvalidTransition {
                from: from.as_str(),
                to: to.as_str(),
            };
            error!(%err, "send flow transition rejected");
            return Err(err.into());
        }
        info!(from = %from, to = %to, "send flow transition");
        self.state = to;
        self.publish();
        Ok(())
    }

    fn record(&mut self, err: &SendFlowError) {
        self.last_error = Some(ErrorNotice::from(err));
        self.publish();
    }

    fn discard_draft(&mut self, reason: &str) {
        if let Some(held) = self.held.take() {
            debug!(draft = %held.id, reason, "discarding built transaction");
        }
    }

    /// Enter composing with one empty row. From `Complete` this starts a new
    /// payment.
    pub fn start(&mut self) -> Result<()> {
        self.guard("start", &[FlowState::Idle, FlowState::Complete])?;
        if self.state == FlowState::Complete {
            self.composer.clear();
            self.discard_draft("new payment");
            self.txid = None;
        }
        self.last_error = None;
        if self.composer.is_empty() {
            self.composer.add_recipient(Recipient::default())?;
        }
        self.transition(FlowState::Composing)
    }

    /// Abandon the composition. Only possible while composing, since no
    /// engine call can be outstanding there.
    pub fn cancel(&mut self) -> Result<()> {
        self.guard("cancel", &[FlowState::Composing])?;
        self.composer.clear();
        self.last_error = None;
        self.transition(FlowState::Idle)
    }

    pub fn edit(&mut self) -> Result<()> {
        self.guard("edit", &[FlowState::Reviewing])?;
        self.discard_draft("edit requested");
        self.transition(FlowState::Composing)
    }

    pub fn retry(&mut self) -> Result<()> {
        self.guard("retry", &[FlowState::Failed])?;
        self.discard_draft("retry");
        self.last_error = None;
        self.transition(FlowState::Composing)
    }

    /// Apply an edit. Any held draft is discarded and a flow in review drops
    /// back to composing. A rejected edit leaves everything untouched.
    pub fn change(&mut self, change: CompositionChange) -> Result<()> {
        self.guard("change", &[FlowState::Composing, FlowState::Reviewing])?;

        if let Err(err) = self.apply_change(change) {
            self.record(&err);
            return Err(err);
        }

        self.discard_draft("composition changed");
        if self.state == FlowState::Reviewing {
            self.transition(FlowState::Composing)?;
        } else {
            self.publish();
        }
        Ok(())
    }

    fn apply_change(&mut self, change: CompositionChange) -> Result<()> {
        match change {
            CompositionChange::AddRecipient(recipient) => {
                self.composer.add_recipient(recipient)?;
            }
            CompositionChange::RemoveRecipient(index) => {
                self.composer.remove_recipient(index)?;
            }
            CompositionChange::SetAddress { index, address } => {
                self.composer.set_address(index, address)?;
            }
            CompositionChange::SetAmount { index, text } => {
                self.composer.set_amount_text(index, text)?;
            }
            CompositionChange::SetMemo { index, text } => {
                self.composer.set_memo_text(index, &text)?;
            }
            CompositionChange::SetMemoBytes { index, bytes } => {
                self.composer.set_memo_bytes(index, bytes)?;
            }
            CompositionChange::SetLabel { index, label } => {
                self.composer.set_label(index, label)?;
            }
            CompositionChange::ApplyMax(index) => {
                self.composer.apply_max(index)?;
            }
            CompositionChange::SetFeePreset(preset) => self.composer.set_fee_preset(preset),
            CompositionChange::SetCustomFee(fee) => self.composer.set_custom_fee(fee),
            CompositionChange::SetScope(scope) => self.select_scope(scope)?,
            CompositionChange::ToggleAddress(address_id) => {
                let next = self.composer.scope().toggle_address(address_id);
                self.select_scope(next)?;
            }
            CompositionChange::LoadRows(rows) => self.composer.load_rows(rows)?,
            CompositionChange::Clear => self.composer.clear(),
        }
        Ok(())
    }

    fn select_scope(&mut self, scope: SpendScope) -> Result<()> {
        if let SpendScope::ByAddresses(set) = &scope {
            if set.is_empty() {
                return Err(ScopeError::EmptySelection.into());
            }
        }
        match &self.sources {
            Some(sources) => {
                let resolved = scope.resolve(sources);
                if resolved.demoted {
                    warn!(requested = %scope, "selected funds are no longer available; using auto");
                }
                self.composer.set_scope(resolved.scope);
                self.composer.set_balance(resolved.balance);
            }
            None => self.composer.set_scope(scope),
        }
        Ok(())
    }

    /// Validate, then ask the engine to build. A build failure returns to
    /// composing with the error recorded; it never fails the flow.
    pub async fn review(&mut self) -> Result<()> {
        self.guard("review", &[FlowState::Composing])?;

        let request = match self.composer.validate_all() {
            Ok(request) => request,
            Err(errors) => {
                let err = SendFlowError::from(errors);
                self.record(&err);
                return Err(err);
            }
        };

        self.last_error = None;
        self.transition(FlowState::Building)?;

        let built = self
            .engine
            .build_transaction(&request.recipients, &request.scope, request.fee)
            .await;

        match built {
            Ok(mut tx) => {
                info!(
                    draft = %tx.id,
                    fee = tx.fee.as_u64(),
                    inputs = tx.num_inputs,
                    "transaction built"
                );
                tx.request_fingerprint = Some(request.fingerprint);
                self.held = Some(tx);
                self.transition(FlowState::Reviewing)
            }
            Err(engine_err) => {
                warn!(error = %engine_err, "transaction build failed");
                let err = SendFlowError::from(engine_err);
                self.last_error = Some(ErrorNotice::from(&err));
                self.transition(FlowState::Composing)?;
                Err(err)
            }
        }
    }

    /// Sign and broadcast the held draft. Runs to completion; an engine
    /// failure moves to `Failed` and keeps the draft for display.
    pub async fn confirm(&mut self) -> Result<TransactionId> {
        self.guard("confirm", &[FlowState::Reviewing])?;

        let held = match &self.held {
            Some(held) => held.clone(),
            None => {
                let err = StateError::MissingTransaction;
                error!(%err, "confirm without a built transaction");
                return Err(err.into());
            }
        };
        if !held.matches_request(&self.composer.request_fingerprint()) {
            let err = StateError::StaleTransaction;
            error!(%err, draft = %held.id, "refusing to sign a stale transaction");
            return Err(err.into());
        }

        let scope = self.composer.scope().clone();
        self.transition(FlowState::Signing)?;
        let signed = match self.engine.sign_transaction(&held, &scope).await {
            Ok(signed) => signed,
            Err(engine_err) => return Err(self.fail(engine_err.into())),
        };

        self.transition(FlowState::Broadcasting)?;
        let txid = match self.engine.broadcast_transaction(&signed).await {
            Ok(txid) => txid,
            Err(engine_err) => return Err(self.fail(engine_err.into())),
        };

        info!(txid = %txid, "transaction broadcast");
        self.txid = Some(txid.clone());
        self.transition(FlowState::Complete)?;
        Ok(txid)
    }

    fn fail(&mut self, err: SendFlowError) -> SendFlowError {
        warn!(error = %err, state = %self.state, "send failed");
        self.last_error = Some(ErrorNotice::from(&err));
        if let Err(transition_err) = self.transition(FlowState::Failed) {
            return transition_err;
        }
        err
    }

    /// Pull fee bounds from the engine. On failure the last known bounds stay
    /// in use. Returns whether the refresh succeeded.
    pub async fn refresh_fee_info(&mut self) -> bool {
        match self.engine.get_fee_info().await {
            Ok(info) => {
                debug!(
                    min = info.min_fee.as_u64(),
                    default = info.default_fee.as_u64(),
                    max = info.max_fee.as_u64(),
                    "fee info refreshed"
                );
                self.composer.set_fee_info(info);
                self.invalidate_if_stale("fee info changed");
                self.publish();
                true
            }
            Err(err) => {
                warn!(error = %err, "fee info refresh failed; keeping last values");
                false
            }
        }
    }

    /// Pull funding sources and balances. A scope that points at vanished
    /// funds is demoted to auto. On failure the last balances stay in use.
    pub async fn refresh_balances(&mut self) -> bool {
        let sources = match self.engine.list_funding_sources().await {
            Ok(sources) => sources,
            Err(err) => {
                warn!(error = %err, "funding source refresh failed; keeping last values");
                return false;
            }
        };

        let resolved = self.composer.scope().resolve(&sources);
        if resolved.demoted {
            warn!(
                previous = %self.composer.scope(),
                "selected funds vanished; scope reset to auto"
            );
            self.composer.set_scope(resolved.scope.clone());
        }
        self.sources = Some(sources);

        let balance = match self.engine.get_balances(&resolved.scope).await {
            Ok(balance) => balance,
            Err(err) => {
                warn!(error = %err, "balance refresh failed; using funding source totals");
                resolved.balance
            }
        };
        self.composer.set_balance(balance);
        self.invalidate_if_stale("balances changed");
        self.publish();
        true
    }

    /// Drop a draft under review that no longer matches the composition or
    /// no longer fits the balance.
    fn invalidate_if_stale(&mut self, reason: &str) {
        if self.state != FlowState::Reviewing {
            return;
        }
        let stale = match &self.held {
            Some(held) => {
                !held.matches_request(&self.composer.request_fingerprint())
                    || self.composer.validate_all().is_err()
            }
            None => true,
        };
        if stale {
            self.discard_draft(reason);
            if let Err(err) = self.transition(FlowState::Composing) {
                error!(%err, "failed to leave review after invalidation");
            }
        }
    }
}

/// Requests accepted by the flow driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowCommand {
    Start,
    Cancel,
    Change(CompositionChange),
    Review,
    Edit,
    Confirm,
    Retry,
    RefreshFeeInfo,
    RefreshBalances,
}

/// Handle to a flow running on its own task.
///
/// Commands are processed one at a time. While a build is in flight a
/// second review is dropped and other commands wait until it resolves;
/// while signing or broadcasting every command is dropped.
pub struct SendFlowHandle {
    commands: mpsc::Sender<FlowCommand>,
    snapshots: watch::Receiver<FlowSnapshot>,
    task: JoinHandle<()>,
}

const COMMAND_BUFFER: usize = 64;

impl SendFlowHandle {
    pub fn spawn<E>(mut flow: SendFlow<E>) -> Self
    where
        E: WalletEngine + ?Sized + 'static,
    {
        let snapshots = flow.subscribe();
        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
        let task = tokio::spawn(drive(flow, receiver));
        Self {
            commands,
            snapshots,
            task,
        }
    }

    pub async fn send(&self, command: FlowCommand) -> Result<()> {
        self.commands.send(command).await.map_err(|_| {
            SendFlowError::taxonomy(TaxonomyCode::State5001, "send flow driver has stopped")
        })
    }

    pub fn snapshot(&self) -> FlowSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FlowSnapshot> {
        self.snapshots.clone()
    }

    /// Wait until a published snapshot satisfies `predicate`.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<FlowSnapshot>
    where
        F: FnMut(&FlowSnapshot) -> bool,
    {
        let mut receiver = self.snapshots.clone();
        let snapshot = receiver
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .map_err(|_| {
                SendFlowError::taxonomy(TaxonomyCode::State5001, "send flow driver has stopped")
            })?;
        Ok(snapshot.clone())
    }

    /// Stop accepting commands and wait for the driver to finish the one in
    /// progress.
    pub async fn shutdown(self) {
        drop(self.commands);
        if let Err(err) = self.task.await {
            error!(%err, "send flow driver panicked");
        }
    }
}

async fn drive<E>(mut flow: SendFlow<E>, mut commands: mpsc::Receiver<FlowCommand>)
where
    E: WalletEngine + ?Sized,
{
    let mut deferred: VecDeque<FlowCommand> = VecDeque::new();

    loop {
        let command = match deferred.pop_front() {
            Some(command) => command,
            None => match commands.recv().await {
                Some(command) => command,
                None => break,
            },
        };

        let outcome = match command {
            FlowCommand::Review => {
                let review = flow.review();
                tokio::pin!(review);
                loop {
                    tokio::select! {
                        result = &mut review => break result,
                        Some(next) = commands.recv() => match next {
                            FlowCommand::Review => debug!("review already in flight; ignoring"),
                            FlowCommand::Confirm => {
                                warn!("confirm arrived before review finished; ignoring")
                            }
                            other => deferred.push_back(other),
                        },
                    }
                }
            }
            FlowCommand::Confirm => {
                let confirm = flow.confirm();
                tokio::pin!(confirm);
                loop {
                    tokio::select! {
                        result = &mut confirm => break result.map(|_| ()),
                        Some(next) = commands.recv() => {
                            warn!(command = ?next, "send in progress; input dropped");
                        }
                    }
                }
            }
            FlowCommand::Start => flow.start(),
            FlowCommand::Cancel => flow.cancel(),
            FlowCommand::Change(change) => flow.change(change),
            FlowCommand::Edit => flow.edit(),
            FlowCommand::Retry => flow.retry(),
            FlowCommand::RefreshFeeInfo => {
                flow.refresh_fee_info().await;
                Ok(())
            }
            FlowCommand::RefreshBalances => {
                flow.refresh_balances().await;
                Ok(())
            }
        };

        if let Err(err) = outcome {
            debug!(%err, "send flow command failed");
        }
    }

    debug!("send flow driver stopped");
}
