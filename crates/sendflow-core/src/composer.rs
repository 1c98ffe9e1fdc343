use std::collections::HashMap;
use std::fmt::{self, Display};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::address::Network;
use crate::amount::Arrrtoshi;
use crate::config::SendConfig;
use crate::engine::TransactionOutput;
use crate::error::{
    Field, InsufficientFunds, Result, SendFlowError, TaxonomyCode, ValidationError,
};
use crate::fee::{FeeInfo, FeePolicy, FeePreset, FeeSelection};
use crate::import::RecipientRow;
use crate::memo::{Memo, MAX_MEMO_BYTES};
use crate::recipient::{validate_recipient, Recipient};
use crate::scope::{BalanceSnapshot, SpendScope};

/// Non-blocking observations about the composition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompositionWarning {
    DuplicateAddress { first: usize, duplicate: usize },
    MemoNearLimit { index: usize, bytes: usize },
    CustomFeeAdjusted { requested: Arrrtoshi, applied: Arrrtoshi },
}

impl CompositionWarning {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::DuplicateAddress { .. } => "W001",
            Self::MemoNearLimit { .. } => "W002",
            Self::CustomFeeAdjusted { .. } => "W003",
        }
    }
}

impl Display for CompositionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateAddress { first, duplicate } => write!(
                f,
                "recipient {} pays the same address as recipient {}",
                duplicate + 1,
                first + 1
            ),
            Self::MemoNearLimit { index, bytes } => write!(
                f,
                "memo for recipient {} uses {bytes} of {MAX_MEMO_BYTES} bytes",
                index + 1
            ),
            Self::CustomFeeAdjusted { requested, applied } => write!(
                f,
                "custom fee {} ARRR is outside the allowed range; using {} ARRR",
                requested.to_fixed_string(),
                applied.to_fixed_string()
            ),
        }
    }
}

/// One field-level problem. `index` is `None` for list-level issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub index: Option<usize>,
    pub error: ValidationError,
}

impl FieldIssue {
    pub fn field(&self) -> Field {
        self.error.field()
    }
}

impl Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(
                f,
                "recipient {} {}: {}",
                index + 1,
                self.field().as_str(),
                self.error
            ),
            None => write!(f, "{}", self.error),
        }
    }
}

/// Everything that currently stops the payment from being sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorSet {
    pub fields: Vec<FieldIssue>,
    pub funds: Option<InsufficientFunds>,
}

impl ErrorSet {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.funds.is_none()
    }

    pub fn errors_for(&self, index: usize) -> impl Iterator<Item = &ValidationError> {
        self.fields
            .iter()
            .filter(move |issue| issue.index == Some(index))
            .map(|issue| &issue.error)
    }

    pub fn taxonomy(&self) -> TaxonomyCode {
        self.fields
            .first()
            .map(|issue| issue.error.taxonomy())
            .or_else(|| self.funds.map(|funds| funds.taxonomy()))
            .unwrap_or(TaxonomyCode::Validation1013)
    }

    pub fn summary(&self) -> String {
        let mut lines: Vec<String> = self.fields.iter().map(ToString::to_string).collect();
        if let Some(funds) = &self.funds {
            lines.push(funds.to_string());
        }
        lines.join("; ")
    }
}

impl Display for ErrorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

impl std::error::Error for ErrorSet {}

/// A fully validated payment, ready for the engine's build step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentRequest {
    pub network: Network,
    pub recipients: Vec<TransactionOutput>,
    pub fee: Arrrtoshi,
    pub scope: SpendScope,
    pub total_out: Arrrtoshi,
    pub fingerprint: String,
}

/// Read-only view of one row for presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipientView {
    pub index: usize,
    pub address: String,
    pub amount: String,
    pub label: Option<String>,
    pub memo: Option<String>,
    pub memo_bytes: usize,
    pub memo_remaining: usize,
    pub error: Option<FieldErrorView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldErrorView {
    pub field: Field,
    pub code: u16,
    pub message: String,
}

impl From<&ValidationError> for FieldErrorView {
    fn from(value: &ValidationError) -> Self {
        Self {
            field: value.field(),
            code: value.code(),
            message: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComposerSnapshot {
    pub network: Network,
    pub recipients: Vec<RecipientView>,
    pub max_recipients: usize,
    pub fee: FeeSelection,
    pub scope: SpendScope,
    pub balance: BalanceSnapshot,
    pub amount_total: Arrrtoshi,
    pub total_out: Arrrtoshi,
    pub insufficient_funds: Option<String>,
    pub warnings: Vec<CompositionWarning>,
}

/// Single source of truth for whether the payment can be sent.
///
/// Every mutator ends in `recompute`, so the derived fields are always
/// consistent with the inputs.
#[derive(Debug, Clone)]
pub struct PaymentComposer {
    config: SendConfig,
    policy: FeePolicy,
    recipients: Vec<Recipient>,
    preset: FeePreset,
    custom_fee: Option<Arrrtoshi>,
    scope: SpendScope,
    balance: BalanceSnapshot,

    fee: FeeSelection,
    amount_total: Arrrtoshi,
    total_out: Arrrtoshi,
    total_overflow: bool,
    funds: Option<InsufficientFunds>,
    warnings: Vec<CompositionWarning>,
}

impl PaymentComposer {
    pub fn new(config: SendConfig) -> Self {
        let policy = config.fee_policy(config.fallback_fee_info);
        let fee = FeeSelection::compute(&policy, FeePreset::default(), None, 0);
        let mut composer = Self {
            config,
            policy,
            recipients: Vec::new(),
            preset: FeePreset::default(),
            custom_fee: None,
            scope: SpendScope::Auto,
            balance: BalanceSnapshot::default(),
            fee,
            amount_total: Arrrtoshi::ZERO,
            total_out: Arrrtoshi::ZERO,
            total_overflow: false,
            funds: None,
            warnings: Vec::new(),
        };
        composer.recompute();
        composer
    }

    pub fn recompute(&mut self) {
        let network = self.config.network;
        for recipient in &mut self.recipients {
            recipient.error = validate_recipient(recipient, network);
        }

        let count = self.recipients.len();
        self.fee = FeeSelection::compute(&self.policy, self.preset, self.custom_fee, count);

        let valid_amounts: Vec<Arrrtoshi> = self
            .recipients
            .iter()
            .filter(|recipient| recipient.is_valid())
            .filter_map(Recipient::parsed_amount)
            .collect();
        // Totals above the supply cap stay displayable as MAX but never validate.
        let exact = Arrrtoshi::checked_sum(valid_amounts.iter().copied())
            .and_then(|amount_total| {
                let total_out = amount_total.checked_add(self.fee.selected_fee)?;
                Ok((amount_total, total_out))
            });
        (self.amount_total, self.total_out, self.total_overflow) = match exact {
            Ok((amount_total, total_out)) => (amount_total, total_out, false),
            Err(_) => {
                let amount_total = valid_amounts
                    .iter()
                    .fold(Arrrtoshi::ZERO, |acc, amount| acc.saturating_add(*amount));
                (amount_total, Arrrtoshi::MAX, true)
            }
        };

        self.funds = if !valid_amounts.is_empty() && self.total_out > self.balance.spendable {
            Some(InsufficientFunds {
                required: self.total_out,
                spendable: self.balance.spendable,
                pending: self.balance.pending,
            })
        } else {
            None
        };

        self.warnings = self.collect_warnings();

        debug!(
            recipients = count,
            invalid = self.recipients.iter().filter(|r| !r.is_valid()).count(),
            fee = self.fee.selected_fee.as_u64(),
            total_out = self.total_out.as_u64(),
            spendable = self.balance.spendable.as_u64(),
            "recomputed composition"
        );
    }

    fn collect_warnings(&self) -> Vec<CompositionWarning> {
        let mut warnings = Vec::new();

        let mut seen: HashMap<&str, usize> = HashMap::new();
        for (index, recipient) in self.recipients.iter().enumerate() {
            let address = recipient.address.trim();
            if address.is_empty() || !recipient.is_valid() {
                continue;
            }
            match seen.get(address) {
                Some(&first) => warnings.push(CompositionWarning::DuplicateAddress {
                    first,
                    duplicate: index,
                }),
                None => {
                    seen.insert(address, index);
                }
            }
        }

        for (index, recipient) in self.recipients.iter().enumerate() {
            if let Some(memo) = &recipient.memo {
                let bytes = memo.byte_len();
                if bytes >= self.config.memo_warning_bytes && bytes <= MAX_MEMO_BYTES {
                    warnings.push(CompositionWarning::MemoNearLimit { index, bytes });
                }
            }
        }

        if self.fee.custom_adjusted() {
            if let Some(requested) = self.fee.custom_fee {
                warnings.push(CompositionWarning::CustomFeeAdjusted {
                    requested,
                    applied: self.fee.selected_fee,
                });
            }
        }

        warnings
    }

    fn row_mut(&mut self, index: usize) -> Result<&mut Recipient> {
        let len = self.recipients.len();
        self.recipients
            .get_mut(index)
            .ok_or(SendFlowError::RecipientIndex { index, len })
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.recipients.len() {
            Ok(())
        } else {
            Err(SendFlowError::RecipientIndex {
                index,
                len: self.recipients.len(),
            })
        }
    }

    /// Append a row. Fails with `CapacityExceeded`, leaving the list as it
    /// was, once `max_recipients` rows exist.
    pub fn add_recipient(&mut self, recipient: Recipient) -> Result<usize> {
        if self.recipients.len() >= self.config.max_recipients {
            return Err(ValidationError::CapacityExceeded {
                max: self.config.max_recipients,
            }
            .into());
        }
        self.recipients.push(recipient);
        self.recompute();
        Ok(self.recipients.len() - 1)
    }

    pub fn remove_recipient(&mut self, index: usize) -> Result<Recipient> {
        self.check_index(index)?;
        let removed = self.recipients.remove(index);
        self.recompute();
        Ok(removed)
    }

    pub fn set_address(&mut self, index: usize, address: impl Into<String>) -> Result<()> {
        self.row_mut(index)?.address = address.into();
        self.recompute();
        Ok(())
    }

    pub fn set_amount_text(&mut self, index: usize, text: impl Into<String>) -> Result<()> {
        self.row_mut(index)?.amount_text = text.into();
        self.recompute();
        Ok(())
    }

    /// An empty string clears the memo.
    pub fn set_memo_text(&mut self, index: usize, text: &str) -> Result<()> {
        self.row_mut(index)?.memo = (!text.is_empty()).then(|| Memo::from_text(text));
        self.recompute();
        Ok(())
    }

    pub fn set_memo_bytes(&mut self, index: usize, bytes: Option<Vec<u8>>) -> Result<()> {
        self.row_mut(index)?.memo = bytes.map(Memo::from_bytes);
        self.recompute();
        Ok(())
    }

    pub fn set_label(&mut self, index: usize, label: Option<String>) -> Result<()> {
        self.row_mut(index)?.label = label.filter(|value| !value.trim().is_empty());
        self.recompute();
        Ok(())
    }

    pub fn set_fee_preset(&mut self, preset: FeePreset) {
        self.preset = preset;
        self.recompute();
    }

    /// Select the Custom preset with `fee`. Out-of-range values are kept as
    /// entered and clamped on every recompute.
    pub fn set_custom_fee(&mut self, fee: Arrrtoshi) {
        self.preset = FeePreset::Custom;
        self.custom_fee = Some(fee);
        self.recompute();
    }

    pub fn set_fee_info(&mut self, info: FeeInfo) {
        self.policy = self.config.fee_policy(info);
        self.recompute();
    }

    pub fn set_scope(&mut self, scope: SpendScope) {
        self.scope = scope;
        self.recompute();
    }

    pub fn set_balance(&mut self, balance: BalanceSnapshot) {
        self.balance = balance;
        self.recompute();
    }

    /// Replace all rows with imported ones. Rejected as a whole when the
    /// import is larger than the recipient ceiling.
    pub fn load_rows(&mut self, rows: Vec<RecipientRow>) -> Result<()> {
        if rows.len() > self.config.max_recipients {
            return Err(ValidationError::CapacityExceeded {
                max: self.config.max_recipients,
            }
            .into());
        }
        self.recipients = rows.into_iter().map(RecipientRow::into_recipient).collect();
        self.recompute();
        Ok(())
    }

    /// Drop every row and any custom fee. Scope and balances are kept.
    pub fn clear(&mut self) {
        self.recipients.clear();
        self.preset = FeePreset::default();
        self.custom_fee = None;
        self.recompute();
    }

    /// Largest amount row `index` could carry without breaching the
    /// spendable balance, given the fee and every other row's amount.
    pub fn max_affordable_for(&self, index: usize) -> Result<Arrrtoshi> {
        self.check_index(index)?;
        let others = self
            .recipients
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .filter_map(|(_, recipient)| recipient.parsed_amount())
            .fold(Arrrtoshi::ZERO, |acc, amount| acc.saturating_add(amount));
        Ok(self
            .balance
            .spendable
            .saturating_sub(self.fee.selected_fee)
            .saturating_sub(others))
    }

    /// Write `max_affordable_for(index)` into the row.
    pub fn apply_max(&mut self, index: usize) -> Result<Arrrtoshi> {
        let max = self.max_affordable_for(index)?;
        self.row_mut(index)?.set_amount(max);
        self.recompute();
        Ok(max)
    }

    pub fn validate_all(&self) -> std::result::Result<PaymentRequest, ErrorSet> {
        let mut errors = ErrorSet::default();
        if self.recipients.is_empty() {
            errors.fields.push(FieldIssue {
                index: None,
                error: ValidationError::NoRecipients,
            });
        }
        for (index, recipient) in self.recipients.iter().enumerate() {
            if let Some(error) = &recipient.error {
                errors.fields.push(FieldIssue {
                    index: Some(index),
                    error: error.clone(),
                });
            }
        }
        if self.total_overflow {
            errors.fields.push(FieldIssue {
                index: None,
                error: ValidationError::TotalTooLarge,
            });
        }
        errors.funds = self.funds;

        if !errors.is_empty() {
            return Err(errors);
        }

        let outputs = self.outputs();
        Ok(PaymentRequest {
            network: self.config.network,
            fingerprint: fingerprint_of(
                self.config.network,
                &outputs,
                self.fee.selected_fee,
                &self.scope,
            ),
            recipients: outputs,
            fee: self.fee.selected_fee,
            scope: self.scope.clone(),
            total_out: self.total_out,
        })
    }

    fn outputs(&self) -> Vec<TransactionOutput> {
        self.recipients
            .iter()
            .map(|recipient| TransactionOutput {
                address: recipient.address.trim().to_string(),
                amount: recipient.parsed_amount().unwrap_or(Arrrtoshi::ZERO),
                memo: recipient.memo.clone(),
            })
            .collect()
    }

    /// Fingerprint of the composition as it stands, valid or not.
    pub fn request_fingerprint(&self) -> String {
        fingerprint_of(
            self.config.network,
            &self.outputs(),
            self.fee.selected_fee,
            &self.scope,
        )
    }

    pub fn snapshot(&self) -> ComposerSnapshot {
        ComposerSnapshot {
            network: self.config.network,
            recipients: self
                .recipients
                .iter()
                .enumerate()
                .map(|(index, recipient)| RecipientView {
                    index,
                    address: recipient.address.clone(),
                    amount: recipient.amount_text.clone(),
                    label: recipient.label.clone(),
                    memo: recipient
                        .memo
                        .as_ref()
                        .and_then(|memo| memo.as_text().map(str::to_owned)),
                    memo_bytes: recipient.memo.as_ref().map_or(0, Memo::byte_len),
                    memo_remaining: recipient
                        .memo
                        .as_ref()
                        .map_or(MAX_MEMO_BYTES, Memo::remaining_bytes),
                    error: recipient.error.as_ref().map(FieldErrorView::from),
                })
                .collect(),
            max_recipients: self.config.max_recipients,
            fee: self.fee,
            scope: self.scope.clone(),
            balance: self.balance,
            amount_total: self.amount_total,
            total_out: self.total_out,
            insufficient_funds: self.funds.map(|funds| funds.to_string()),
            warnings: self.warnings.clone(),
        }
    }

    pub fn config(&self) -> &SendConfig {
        &self.config
    }

    pub fn network(&self) -> Network {
        self.config.network
    }

    pub fn recipients(&self) -> &[Recipient] {
        &self.recipients
    }

    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    pub fn fee(&self) -> &FeeSelection {
        &self.fee
    }

    pub fn scope(&self) -> &SpendScope {
        &self.scope
    }

    pub fn balance(&self) -> BalanceSnapshot {
        self.balance
    }

    pub fn amount_total(&self) -> Arrrtoshi {
        self.amount_total
    }

    pub fn total_out(&self) -> Arrrtoshi {
        self.total_out
    }

    pub fn insufficient_funds(&self) -> Option<&InsufficientFunds> {
        self.funds.as_ref()
    }

    pub fn warnings(&self) -> &[CompositionWarning] {
        &self.warnings
    }
}

/// SHA-256 over a canonical line-per-field rendering, base64 encoded.
pub fn fingerprint_of(
    network: Network,
    outputs: &[TransactionOutput],
    fee: Arrrtoshi,
    scope: &SpendScope,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("network={network}\n"));
    hasher.update(format!("scope={scope}\n"));
    hasher.update(format!("fee={}\n", fee.as_u64()));
    for output in outputs {
        let memo = output.memo.as_ref().map(Memo::to_base64).unwrap_or_default();
        hasher.update(format!(
            "output={}|{}|{}\n",
            output.address,
            output.amount.as_u64(),
            memo
        ));
    }
    STANDARD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::amount::ARRRTOSHI_MAX;
    use crate::error::AmountError;

    const ADDR_A: &str =
        "zs15feryxhrdz9m6y09mr8wrerwzgj6f8ntxvhxyrdlm5aahn0t09nl4ujy8624fl6zy54klay937y";
    const ADDR_B: &str =
        "zs1rnujckpak28lrdjg0eel92ue3gm36kcwf9tfwwqltsjqf6h5graeeeex7ervydu284rxqfxhpyd";
    const ADDR_C: &str =
        "zs1cfskh788la77n9fx4s72pdhfpn9sh2kw4wv0ewvlkpp37svkukh9wxw7v4d7q7k98cv7tm49eae";

    fn arrr(value: u64) -> Arrrtoshi {
        Arrrtoshi::new(value).unwrap()
    }

    fn balance(spendable: u64, pending: u64) -> BalanceSnapshot {
        BalanceSnapshot {
            spendable: arrr(spendable),
            pending: arrr(pending),
        }
    }

    fn composer_with(spendable: u64, pending: u64) -> PaymentComposer {
        let mut composer = PaymentComposer::new(SendConfig::default());
        composer.set_balance(balance(spendable, pending));
        composer
    }

    #[test]
    fn single_recipient_within_balance_validates() {
        let mut composer = composer_with(200_000_000, 0);
        composer
            .add_recipient(Recipient::new(ADDR_A, "1.00000000"))
            .unwrap();

        let request = composer.validate_all().unwrap();
        assert_eq!(request.fee, arrr(10_000));
        assert_eq!(request.total_out.to_fixed_string(), "1.00010000");
        assert_eq!(request.recipients.len(), 1);
        assert_eq!(request.fingerprint, composer.request_fingerprint());
    }

    #[test]
    fn pending_funds_change_the_insufficiency_message() {
        let mut composer = composer_with(40_000_000, 20_000_000);
        composer.add_recipient(Recipient::new(ADDR_A, "0.3")).unwrap();
        composer.add_recipient(Recipient::new(ADDR_B, "0.2")).unwrap();

        let errors = composer.validate_all().unwrap_err();
        assert!(errors.fields.is_empty());
        let funds = errors.funds.unwrap();
        assert!(funds.funds_pending());
        assert!(funds.to_string().contains("pending confirmation"));
        assert_eq!(funds.required, arrr(50_020_000));
    }

    #[test]
    fn plain_insufficiency_without_pending() {
        let mut composer = composer_with(10_000_000, 0);
        composer.add_recipient(Recipient::new(ADDR_A, "1")).unwrap();
        let funds = composer.validate_all().unwrap_err().funds.unwrap();
        assert!(!funds.funds_pending());
        assert_eq!(funds.shortfall(), arrr(90_010_000));
    }

    #[test]
    fn empty_amount_reports_field_error_only() {
        let mut composer = composer_with(0, 0);
        composer.add_recipient(Recipient::new(ADDR_A, "")).unwrap();

        let errors = composer.validate_all().unwrap_err();
        assert_eq!(errors.fields.len(), 1);
        assert_eq!(errors.fields[0].error.to_string(), "Amount is required");
        assert!(errors.funds.is_none());
    }

    #[test]
    fn capacity_is_enforced_without_changing_the_list() {
        let mut composer = composer_with(0, 0);
        for _ in 0..50 {
            composer.add_recipient(Recipient::new(ADDR_A, "1")).unwrap();
        }
        let err = composer
            .add_recipient(Recipient::new(ADDR_B, "1"))
            .unwrap_err();
        assert!(matches!(
            err,
            SendFlowError::Validation(ValidationError::CapacityExceeded { max: 50 })
        ));
        assert_eq!(composer.len(), 50);
        assert!(composer
            .recipients()
            .iter()
            .all(|recipient| recipient.address == ADDR_A));
    }

    #[test]
    fn custom_fee_below_minimum_is_clamped() {
        let mut composer = composer_with(500_000_000, 0);
        composer.add_recipient(Recipient::new(ADDR_A, "1")).unwrap();
        composer.add_recipient(Recipient::new(ADDR_B, "1")).unwrap();
        composer.set_custom_fee(arrr(1_000));

        let min = composer.fee().min_fee;
        assert_eq!(min, arrr(20_000));
        let request = composer.validate_all().unwrap();
        assert_eq!(request.fee, min);
        assert!(composer
            .warnings()
            .iter()
            .any(|w| matches!(w, CompositionWarning::CustomFeeAdjusted { .. })));
    }

    #[test]
    fn custom_fee_follows_recipient_count() {
        let mut composer = composer_with(500_000_000, 0);
        composer.add_recipient(Recipient::new(ADDR_A, "1")).unwrap();
        composer.set_custom_fee(arrr(25_000));
        assert_eq!(composer.fee().selected_fee, arrr(25_000));

        composer.add_recipient(Recipient::new(ADDR_B, "1")).unwrap();
        composer.add_recipient(Recipient::new(ADDR_C, "1")).unwrap();
        assert_eq!(composer.fee().selected_fee, arrr(30_000));

        composer.remove_recipient(2).unwrap();
        assert_eq!(composer.fee().selected_fee, arrr(25_000));
    }

    #[test]
    fn no_recipients_is_an_error() {
        let composer = composer_with(100, 0);
        let errors = composer.validate_all().unwrap_err();
        assert_eq!(errors.fields[0].error, ValidationError::NoRecipients);
        assert_eq!(errors.taxonomy(), TaxonomyCode::Validation1013);
    }

    #[test]
    fn invalid_rows_do_not_count_toward_balance() {
        let mut composer = composer_with(100_000_000, 0);
        composer.add_recipient(Recipient::new(ADDR_A, "0.5")).unwrap();
        composer.add_recipient(Recipient::new("bogus", "5")).unwrap();
        assert_eq!(composer.amount_total(), arrr(50_000_000));
        let errors = composer.validate_all().unwrap_err();
        assert!(errors.funds.is_none());
        assert_eq!(errors.fields.len(), 1);
        assert_eq!(errors.fields[0].index, Some(1));
    }

    #[test]
    fn max_affordable_depends_on_other_rows() {
        let mut composer = composer_with(100_000_000, 0);
        composer.add_recipient(Recipient::new(ADDR_A, "0.3")).unwrap();
        composer.add_recipient(Recipient::new(ADDR_B, "")).unwrap();

        assert_eq!(
            composer.max_affordable_for(1).unwrap(),
            arrr(100_000_000 - 20_000 - 30_000_000)
        );

        composer.set_amount_text(0, "0.5").unwrap();
        assert_eq!(
            composer.max_affordable_for(1).unwrap(),
            arrr(100_000_000 - 20_000 - 50_000_000)
        );

        let applied = composer.apply_max(1).unwrap();
        assert_eq!(composer.recipients()[1].parsed_amount(), Some(applied));
        assert!(composer.validate_all().is_ok());
    }

    #[test]
    fn max_affordable_floors_at_zero() {
        let mut composer = composer_with(5_000, 0);
        composer.add_recipient(Recipient::new(ADDR_A, "")).unwrap();
        assert_eq!(composer.max_affordable_for(0).unwrap(), Arrrtoshi::ZERO);
        assert!(matches!(
            composer.max_affordable_for(3),
            Err(SendFlowError::RecipientIndex { index: 3, len: 1 })
        ));
    }

    #[test]
    fn duplicate_and_memo_warnings() {
        let mut composer = composer_with(500_000_000, 0);
        composer.add_recipient(Recipient::new(ADDR_A, "1")).unwrap();
        composer.add_recipient(Recipient::new(ADDR_A, "2")).unwrap();
        composer.set_memo_text(1, &"m".repeat(450)).unwrap();

        let codes: Vec<&str> = composer.warnings().iter().map(|w| w.code()).collect();
        assert_eq!(codes, vec!["W001", "W002"]);
        assert!(composer.validate_all().is_ok());

        composer.set_memo_text(1, "").unwrap();
        assert!(composer.recipients()[1].memo.is_none());
    }

    #[test]
    fn fingerprint_tracks_composition_changes() {
        let mut composer = composer_with(500_000_000, 0);
        composer.add_recipient(Recipient::new(ADDR_A, "1")).unwrap();
        let before = composer.request_fingerprint();

        composer.set_balance(balance(600_000_000, 0));
        assert_eq!(composer.request_fingerprint(), before);

        composer.set_fee_preset(FeePreset::High);
        assert_ne!(composer.request_fingerprint(), before);
        composer.set_fee_preset(FeePreset::Standard);
        assert_eq!(composer.request_fingerprint(), before);

        composer.set_scope(SpendScope::ByKey(1));
        assert_ne!(composer.request_fingerprint(), before);
    }

    #[test]
    fn load_rows_respects_capacity() {
        let mut composer = PaymentComposer::new(SendConfig {
            max_recipients: 2,
            ..SendConfig::default()
        });
        let row = RecipientRow {
            row_number: 1,
            address: ADDR_A.to_string(),
            amount: "1".to_string(),
            memo: None,
            label: Some("alice".to_string()),
        };
        assert!(composer
            .load_rows(vec![row.clone(), row.clone(), row.clone()])
            .is_err());
        assert!(composer.is_empty());

        composer.load_rows(vec![row.clone(), row]).unwrap();
        assert_eq!(composer.len(), 2);
        assert_eq!(composer.snapshot().recipients[0].label.as_deref(), Some("alice"));
    }

    #[test]
    fn totals_above_supply_cap_never_validate() {
        let mut composer = composer_with(Arrrtoshi::MAX.as_u64(), 0);
        composer.add_recipient(Recipient::new(ADDR_A, "150000000")).unwrap();
        composer.add_recipient(Recipient::new(ADDR_B, "150000000")).unwrap();

        assert_eq!(composer.total_out(), Arrrtoshi::MAX);
        let errors = composer.validate_all().unwrap_err();
        assert!(errors
            .fields
            .iter()
            .any(|issue| issue.index.is_none() && issue.error == ValidationError::TotalTooLarge));
        assert_eq!(errors.taxonomy().code(), 1003);

        composer.set_amount_text(1, "1").unwrap();
        let request = composer.validate_all().unwrap();
        assert_eq!(request.total_out.to_fixed_string(), "150000001.00020000");
    }

    #[test]
    fn snapshot_exposes_field_errors() {
        let mut composer = composer_with(0, 0);
        composer.add_recipient(Recipient::new(ADDR_A, "1.123456789")).unwrap();
        let snapshot = composer.snapshot();
        let error = snapshot.recipients[0].error.as_ref().unwrap();
        assert_eq!(error.field, Field::Amount);
        assert_eq!(
            error.code,
            ValidationError::InvalidAmount(AmountError::TooManyDecimals { decimals: 9 }).code()
        );
        assert_eq!(snapshot.recipients[0].memo_remaining, MAX_MEMO_BYTES);
    }

    proptest! {
        #[test]
        fn validate_all_matches_balance_inequality(
            amounts in proptest::collection::vec(1u64..500_000_000, 1..6),
            spendable in 0u64..3_000_000_000,
        ) {
            let mut composer = composer_with(spendable, 0);
            let addresses = [ADDR_A, ADDR_B, ADDR_C];
            for (i, amount) in amounts.iter().enumerate() {
                let text = arrr(*amount).to_decimal_string();
                composer.add_recipient(Recipient::new(addresses[i % 3], text)).unwrap();
            }
            let total: u64 = amounts.iter().sum::<u64>() + composer.fee().selected_fee.as_u64();
            prop_assert_eq!(composer.validate_all().is_ok(), total <= spendable);
        }

        #[test]
        fn validate_all_is_exact_near_the_supply_cap(
            amounts in proptest::collection::vec(
                ARRRTOSHI_MAX / 4..=ARRRTOSHI_MAX,
                1..4,
            ),
            spendable in prop_oneof![Just(ARRRTOSHI_MAX), ARRRTOSHI_MAX / 2..=ARRRTOSHI_MAX],
        ) {
            let mut composer = composer_with(spendable, 0);
            let addresses = [ADDR_A, ADDR_B, ADDR_C];
            for (i, amount) in amounts.iter().enumerate() {
                let text = arrr(*amount).to_decimal_string();
                composer.add_recipient(Recipient::new(addresses[i % 3], text)).unwrap();
            }
            let total: u128 = amounts.iter().map(|a| u128::from(*a)).sum::<u128>()
                + u128::from(composer.fee().selected_fee.as_u64());
            let result = composer.validate_all();
            prop_assert_eq!(result.is_ok(), total <= u128::from(spendable));
            if let Ok(request) = result {
                prop_assert_eq!(u128::from(request.total_out.as_u64()), total);
            }
        }

        #[test]
        fn max_affordable_never_overspends(
            amounts in proptest::collection::vec(0u64..200_000_000, 2..5),
            spendable in 0u64..1_000_000_000,
            pick in 0usize..5,
        ) {
            let mut composer = composer_with(spendable, 0);
            for amount in &amounts {
                composer
                    .add_recipient(Recipient::new(ADDR_A, arrr(*amount).to_decimal_string()))
                    .unwrap();
            }
            let index = pick % amounts.len();
            let max = composer.max_affordable_for(index).unwrap().as_u64();
            let others: u64 = amounts
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != index)
                .map(|(_, a)| *a)
                .sum();
            let fee = composer.fee().selected_fee.as_u64();
            let exact = i128::from(spendable) - i128::from(fee) - i128::from(others);
            if exact >= 0 {
                prop_assert_eq!(i128::from(max), exact);
                prop_assert!(max + others + fee <= spendable);
            } else {
                prop_assert_eq!(max, 0);
            }
        }
    }
}
