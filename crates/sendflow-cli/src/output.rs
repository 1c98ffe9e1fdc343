use serde::Serialize;
use serde_json::Value;
use sendflow_core::composer::{CompositionWarning, ErrorSet, FieldIssue};
use sendflow_core::error::{Field, InsufficientFunds, TaxonomyCode};
use sendflow_core::{FlowState, PendingTransaction, SendFlowError};

#[derive(Debug)]
pub enum OutputError {
    StdinBlocked,
    Io(std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WarningLine {
    pub code: &'static str,
    pub message: String,
}

impl From<&CompositionWarning> for WarningLine {
    fn from(warning: &CompositionWarning) -> Self {
        Self {
            code: warning.code(),
            message: warning.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    Valid,
    Warning,
    Error,
}

impl RowStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// One recipient row as entered, with its validation outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipientLine {
    pub row: usize,
    pub address: String,
    pub label: Option<String>,
    pub amount: String,
    pub memo: Option<String>,
    pub status: RowStatus,
}

/// What the engine built, in display units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftSummary {
    pub id: String,
    pub outputs: usize,
    pub total_amount: String,
    pub fee: String,
    pub total_out: String,
    pub input_total: String,
    pub change: String,
    pub num_inputs: u32,
    pub expiry_height: u32,
    pub request_fingerprint: Option<String>,
}

impl From<&PendingTransaction> for DraftSummary {
    fn from(pending: &PendingTransaction) -> Self {
        Self {
            id: pending.id.to_string(),
            outputs: pending.outputs.len(),
            total_amount: pending.total_amount.to_fixed_string(),
            fee: pending.fee.to_fixed_string(),
            total_out: pending.total_out().to_fixed_string(),
            input_total: pending.input_total.to_fixed_string(),
            change: pending.change.to_fixed_string(),
            num_inputs: pending.num_inputs,
            expiry_height: pending.expiry_height,
            request_fingerprint: pending.request_fingerprint.clone(),
        }
    }
}

/// A field problem on one row, or on the list when `recipient` is `None`.
/// `recipient` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueLine {
    pub recipient: Option<usize>,
    pub field: Field,
    pub code: u16,
    pub name: &'static str,
    pub message: String,
}

impl From<&FieldIssue> for IssueLine {
    fn from(issue: &FieldIssue) -> Self {
        let taxonomy = issue.error.taxonomy();
        Self {
            recipient: issue.index.map(|index| index + 1),
            field: issue.field(),
            code: taxonomy.code(),
            name: taxonomy.name(),
            message: issue.error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FundsShortfall {
    pub code: u16,
    pub name: &'static str,
    pub message: String,
    pub required: String,
    pub spendable: String,
    pub pending: String,
    pub shortfall: String,
    pub pending_confirmation: bool,
}

impl From<&InsufficientFunds> for FundsShortfall {
    fn from(funds: &InsufficientFunds) -> Self {
        let taxonomy = funds.taxonomy();
        Self {
            code: taxonomy.code(),
            name: taxonomy.name(),
            message: funds.to_string(),
            required: funds.required.to_fixed_string(),
            spendable: funds.spendable.to_fixed_string(),
            pending: funds.pending.to_fixed_string(),
            shortfall: funds.shortfall().to_fixed_string(),
            pending_confirmation: funds.funds_pending(),
        }
    }
}

/// Why a command did not succeed. The headline code is the first field
/// issue, else the funds error, else the error's own taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub code: u16,
    pub name: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<IssueLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funds: Option<FundsShortfall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<&'static str>,
}

impl Failure {
    pub fn new(code: TaxonomyCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            name: code.name(),
            message: message.into(),
            issues: Vec::new(),
            funds: None,
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: &'static str) -> Self {
        self.hint = Some(hint);
        self
    }

    pub fn from_errors(errors: &ErrorSet) -> Self {
        let message = errors
            .fields
            .first()
            .map(ToString::to_string)
            .or_else(|| errors.funds.map(|funds| funds.to_string()))
            .unwrap_or_else(|| "composition is invalid".to_string());
        Self {
            issues: errors.fields.iter().map(IssueLine::from).collect(),
            funds: errors.funds.as_ref().map(FundsShortfall::from),
            ..Self::new(errors.taxonomy(), message)
        }
    }

    pub fn from_core(err: &SendFlowError) -> Self {
        match err {
            SendFlowError::Composition(errors) => Self::from_errors(errors),
            other => Self::new(other.taxonomy_code(), other.user_message()),
        }
    }
}

/// Result of one command, consumed by either output handler.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub ok: bool,
    pub command: String,
    pub message: String,
    pub state: Option<FlowState>,
    pub result: Option<Value>,
    pub recipients: Vec<RecipientLine>,
    pub draft: Option<DraftSummary>,
    pub warnings: Vec<WarningLine>,
    pub failure: Option<Failure>,
}

impl CommandOutput {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self {
            ok: true,
            command: command.to_string(),
            message: message.into(),
            state: None,
            result: None,
            recipients: Vec::new(),
            draft: None,
            warnings: Vec::new(),
            failure: None,
        }
    }

    pub fn failed(command: &str, failure: Failure) -> Self {
        Self {
            ok: false,
            message: failure.message.clone(),
            failure: Some(failure),
            ..Self::success(command, String::new())
        }
    }
}

/// Totals shown before the operator is asked to go ahead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendSummary {
    pub network: String,
    pub scope: String,
    pub recipient_count: usize,
    pub amount_total: String,
    pub fee: String,
    pub total_out: String,
    pub spendable: String,
    pub pending: String,
}

pub trait OutputHandler {
    fn start_operation(&mut self, operation: &str);
    fn progress(&mut self, message: &str);
    fn display_send_summary(&mut self, summary: &SendSummary);
    fn confirm_proceed(&mut self, prompt: &str) -> Result<bool, OutputError>;
    fn complete(&mut self, output: &CommandOutput);
}
