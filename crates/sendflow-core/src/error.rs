use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::AddressError;
use crate::amount::Arrrtoshi;
use crate::composer::ErrorSet;
use crate::memo::MemoError;
use crate::scope::ScopeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaxonomyCode {
    Validation1001,
    Validation1002,
    Validation1003,
    Validation1004,
    Validation1005,
    Validation1006,
    Validation1007,
    Validation1008,
    Validation1009,
    Validation1010,
    Validation1011,
    Validation1012,
    Validation1013,
    Cli2001,
    Cli2002,
    Cli2003,
    Cli2004,
    Cli2005,
    Balance3001,
    Balance3002,
    Engine4001,
    Engine4002,
    Engine4003,
    Engine4004,
    Engine4099,
    State5001,
    State5002,
    State5003,
    State5004,
}

impl TaxonomyCode {
    pub const fn code(self) -> u16 {
        match self {
            Self::Validation1001 => 1001,
            Self::Validation1002 => 1002,
            Self::Validation1003 => 1003,
            Self::Validation1004 => 1004,
            Self::Validation1005 => 1005,
            Self::Validation1006 => 1006,
            Self::Validation1007 => 1007,
            Self::Validation1008 => 1008,
            Self::Validation1009 => 1009,
            Self::Validation1010 => 1010,
            Self::Validation1011 => 1011,
            Self::Validation1012 => 1012,
            Self::Validation1013 => 1013,
            Self::Cli2001 => 2001,
            Self::Cli2002 => 2002,
            Self::Cli2003 => 2003,
            Self::Cli2004 => 2004,
            Self::Cli2005 => 2005,
            Self::Balance3001 => 3001,
            Self::Balance3002 => 3002,
            Self::Engine4001 => 4001,
            Self::Engine4002 => 4002,
            Self::Engine4003 => 4003,
            Self::Engine4004 => 4004,
            Self::Engine4099 => 4099,
            Self::State5001 => 5001,
            Self::State5002 => 5002,
            Self::State5003 => 5003,
            Self::State5004 => 5004,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Validation1001 => "INVALID_ADDRESS",
            Self::Validation1002 => "INVALID_AMOUNT",
            Self::Validation1003 => "AMOUNT_OUT_OF_RANGE",
            Self::Validation1004 => "MEMO_TOO_LONG",
            Self::Validation1005 => "MEMO_INVALID",
            Self::Validation1006 => "IMPORT_PARSE_ERROR",
            Self::Validation1007 => "NETWORK_MISMATCH",
            Self::Validation1008 => "RECIPIENT_CAPACITY",
            Self::Validation1009 => "CSV_FORMULA_INJECTION",
            Self::Validation1010 => "IMPORT_TOO_LARGE",
            Self::Validation1011 => "IMPORT_TOO_MANY_ROWS",
            Self::Validation1012 => "MISSING_REQUIRED_COLUMN",
            Self::Validation1013 => "NO_RECIPIENTS",
            Self::Cli2001 => "MISSING_REQUIRED_ARGUMENT",
            Self::Cli2002 => "INVALID_FLAG_COMBINATION",
            Self::Cli2003 => "CONFIRMATION_REQUIRED",
            Self::Cli2004 => "STDIN_BLOCKED",
            Self::Cli2005 => "INVALID_CONFIG",
            Self::Balance3001 => "INSUFFICIENT_FUNDS",
            Self::Balance3002 => "INSUFFICIENT_FUNDS_PENDING",
            Self::Engine4001 => "ENGINE_NETWORK",
            Self::Engine4002 => "ENGINE_REJECTED",
            Self::Engine4003 => "ENGINE_INSUFFICIENT_FEE",
            Self::Engine4004 => "ENGINE_INSUFFICIENT_FUNDS",
            Self::Engine4099 => "ENGINE_UNKNOWN",
            Self::State5001 => "ACTION_NOT_PERMITTED",
            Self::State5002 => "INVALID_TRANSITION",
            Self::State5003 => "MISSING_TRANSACTION",
            Self::State5004 => "STALE_TRANSACTION",
        }
    }
}

impl Display for TaxonomyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.code(), self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{code}] {message}")]
pub struct TaxonomyError {
    pub code: TaxonomyCode,
    pub message: String,
}

impl TaxonomyError {
    pub const fn code(&self) -> u16 {
        self.code.code()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount is empty")]
    EmptyInput,
    #[error("negative amounts are not allowed")]
    NegativeNotAllowed,
    #[error("amount is not a decimal number")]
    InvalidFormat,
    #[error("amount contains non-numeric characters")]
    InvalidNumeric,
    #[error("amount has {decimals} decimal places; at most 8 are supported")]
    TooManyDecimals { decimals: usize },
    #[error("amount arithmetic overflowed")]
    Overflow,
    #[error("amount {value} exceeds the maximum supply")]
    AboveMaximum { value: u64 },
}

impl AmountError {
    pub const fn taxonomy(&self) -> TaxonomyCode {
        match self {
            Self::TooManyDecimals { .. } | Self::Overflow | Self::AboveMaximum { .. } => {
                TaxonomyCode::Validation1003
            }
            _ => TaxonomyCode::Validation1002,
        }
    }

    pub const fn code(&self) -> u16 {
        self.taxonomy().code()
    }
}

/// Which part of a recipient row a validation error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Address,
    Amount,
    Memo,
    Recipients,
}

impl Field {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Address => "address",
            Self::Amount => "amount",
            Self::Memo => "memo",
            Self::Recipients => "recipients",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Address is required")]
    AddressRequired,
    #[error("Invalid address: {0}")]
    InvalidAddress(AddressError),
    #[error("Amount is required")]
    AmountRequired,
    #[error("Invalid amount: {0}")]
    InvalidAmount(AmountError),
    #[error("Amount must be greater than zero")]
    AmountZero,
    #[error("Memo is {length} bytes, maximum is {max} bytes")]
    MemoTooLong { length: usize, max: usize },
    #[error("Memo contains control characters")]
    MemoInvalid,
    #[error("At least one recipient is required")]
    NoRecipients,
    #[error("Cannot add more than {max} recipients")]
    CapacityExceeded { max: usize },
    #[error("Payment total exceeds the maximum supply")]
    TotalTooLarge,
}

impl ValidationError {
    pub const fn field(&self) -> Field {
        match self {
            Self::AddressRequired | Self::InvalidAddress(_) => Field::Address,
            Self::AmountRequired | Self::InvalidAmount(_) | Self::AmountZero => Field::Amount,
            Self::MemoTooLong { .. } | Self::MemoInvalid => Field::Memo,
            Self::NoRecipients | Self::CapacityExceeded { .. } | Self::TotalTooLarge => {
                Field::Recipients
            }
        }
    }

    pub const fn taxonomy(&self) -> TaxonomyCode {
        match self {
            Self::AddressRequired => TaxonomyCode::Validation1001,
            Self::InvalidAddress(AddressError::NetworkMismatch { .. }) => {
                TaxonomyCode::Validation1007
            }
            Self::InvalidAddress(_) => TaxonomyCode::Validation1001,
            Self::AmountRequired | Self::AmountZero => TaxonomyCode::Validation1002,
            Self::InvalidAmount(err) => err.taxonomy(),
            Self::MemoTooLong { .. } => TaxonomyCode::Validation1004,
            Self::MemoInvalid => TaxonomyCode::Validation1005,
            Self::NoRecipients => TaxonomyCode::Validation1013,
            Self::CapacityExceeded { .. } => TaxonomyCode::Validation1008,
            Self::TotalTooLarge => TaxonomyCode::Validation1003,
        }
    }

    pub const fn code(&self) -> u16 {
        self.taxonomy().code()
    }
}

impl From<MemoError> for ValidationError {
    fn from(value: MemoError) -> Self {
        match value {
            MemoError::TooLong { length, max } => Self::MemoTooLong { length, max },
            MemoError::ControlCharacters => Self::MemoInvalid,
        }
    }
}

/// Aggregate balance shortfall for a whole payment.
///
/// When funds are still confirming the message says so instead of reporting
/// a plain shortfall, so the user knows waiting may be enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InsufficientFunds {
    pub required: Arrrtoshi,
    pub spendable: Arrrtoshi,
    pub pending: Arrrtoshi,
}

impl InsufficientFunds {
    pub fn shortfall(&self) -> Arrrtoshi {
        self.required.saturating_sub(self.spendable)
    }

    pub fn funds_pending(&self) -> bool {
        !self.pending.is_zero()
    }

    pub const fn taxonomy(&self) -> TaxonomyCode {
        if self.pending.as_u64() > 0 {
            TaxonomyCode::Balance3002
        } else {
            TaxonomyCode::Balance3001
        }
    }
}

impl Display for InsufficientFunds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.funds_pending() {
            write!(
                f,
                "Insufficient spendable funds, but {} ARRR is pending confirmation: need {} ARRR, spendable {} ARRR (short by {} ARRR)",
                self.pending.to_fixed_string(),
                self.required.to_fixed_string(),
                self.spendable.to_fixed_string(),
                self.shortfall().to_fixed_string(),
            )
        } else {
            write!(
                f,
                "Insufficient funds: need {} ARRR, have {} ARRR (short by {} ARRR)",
                self.required.to_fixed_string(),
                self.spendable.to_fixed_string(),
                self.shortfall().to_fixed_string(),
            )
        }
    }
}

impl std::error::Error for InsufficientFunds {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineErrorKind {
    Network,
    RejectedByNode,
    InsufficientFee,
    InsufficientFunds,
    Unknown,
}

impl Display for EngineErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Network => "network",
            Self::RejectedByNode => "rejected by node",
            Self::InsufficientFee => "insufficient fee",
            Self::InsufficientFunds => "insufficient funds",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Failure reported by the wallet engine during build, sign or broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {detail}")]
pub struct EngineError {
    pub kind: EngineErrorKind,
    pub detail: String,
}

impl EngineError {
    pub fn new(kind: EngineErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn network(detail: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Network, detail)
    }

    pub fn rejected(detail: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::RejectedByNode, detail)
    }

    pub fn unknown(detail: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Unknown, detail)
    }

    /// Map a raw engine message onto a category, for engines that only
    /// report strings.
    pub fn classify(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let lowered = detail.to_ascii_lowercase();
        let kind = if ["fee too low", "insufficient fee", "min relay fee", "fee is too low"]
            .iter()
            .any(|needle| lowered.contains(needle))
        {
            EngineErrorKind::InsufficientFee
        } else if ["insufficient", "not enough"]
            .iter()
            .any(|needle| lowered.contains(needle))
        {
            EngineErrorKind::InsufficientFunds
        } else if lowered.contains("fee") {
            EngineErrorKind::InsufficientFee
        } else if lowered.contains("reject") || lowered.contains("invalid transaction") {
            EngineErrorKind::RejectedByNode
        } else if ["network", "connect", "timeout", "timed out", "unreachable", "unavailable"]
            .iter()
            .any(|needle| lowered.contains(needle))
        {
            EngineErrorKind::Network
        } else {
            EngineErrorKind::Unknown
        };
        Self { kind, detail }
    }

    pub fn user_message(&self) -> String {
        match self.kind {
            EngineErrorKind::Network => {
                "Unable to connect to the network. Please check your connection and try again."
                    .to_string()
            }
            EngineErrorKind::RejectedByNode => {
                format!("The transaction was rejected by the node: {}", self.detail)
            }
            EngineErrorKind::InsufficientFee => {
                "The transaction fee is too low. Please increase the fee.".to_string()
            }
            EngineErrorKind::InsufficientFunds => {
                "You don't have enough funds for this transaction. Please check your balance and try again."
                    .to_string()
            }
            EngineErrorKind::Unknown => format!("Transaction failed: {}", self.detail),
        }
    }

    pub const fn taxonomy(&self) -> TaxonomyCode {
        match self.kind {
            EngineErrorKind::Network => TaxonomyCode::Engine4001,
            EngineErrorKind::RejectedByNode => TaxonomyCode::Engine4002,
            EngineErrorKind::InsufficientFee => TaxonomyCode::Engine4003,
            EngineErrorKind::InsufficientFunds => TaxonomyCode::Engine4004,
            EngineErrorKind::Unknown => TaxonomyCode::Engine4099,
        }
    }
}

/// An action was attempted in a state that does not allow it. These are
/// contract violations by the caller, not user errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("'{action}' is not permitted while the flow is {stage}")]
    NotPermitted {
        action: &'static str,
        stage: &'static str,
    },
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
    #[error("no built transaction is held")]
    MissingTransaction,
    #[error("held transaction no longer matches the composition")]
    StaleTransaction,
}

impl StateError {
    pub const fn taxonomy(&self) -> TaxonomyCode {
        match self {
            Self::NotPermitted { .. } => TaxonomyCode::State5001,
            Self::InvalidTransition { .. } => TaxonomyCode::State5002,
            Self::MissingTransaction => TaxonomyCode::State5003,
            Self::StaleTransaction => TaxonomyCode::State5004,
        }
    }
}

#[derive(Debug, Error)]
pub enum SendFlowError {
    #[error("{0}")]
    Taxonomy(TaxonomyError),

    #[error("amount error: {0}")]
    Amount(#[from] AmountError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Composition(#[from] ErrorSet),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("scope error: {0}")]
    Scope(#[from] ScopeError),

    #[error("recipient index {index} is out of range ({len} recipients)")]
    RecipientIndex { index: usize, len: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SendFlowError {
    pub fn taxonomy(code: TaxonomyCode, message: impl Into<String>) -> Self {
        Self::Taxonomy(TaxonomyError {
            code,
            message: message.into(),
        })
    }

    pub fn taxonomy_code(&self) -> TaxonomyCode {
        match self {
            Self::Taxonomy(t) => t.code,
            Self::Amount(err) => err.taxonomy(),
            Self::Validation(err) => err.taxonomy(),
            Self::Composition(set) => set.taxonomy(),
            Self::Engine(err) => err.taxonomy(),
            Self::State(err) => err.taxonomy(),
            Self::Scope(_) => TaxonomyCode::Cli2005,
            Self::RecipientIndex { .. } => TaxonomyCode::State5001,
            Self::Io(_) => TaxonomyCode::Cli2005,
            Self::Csv(_) | Self::Json(_) => TaxonomyCode::Validation1006,
        }
    }

    pub fn code(&self) -> u16 {
        self.taxonomy_code().code()
    }

    /// Message suitable for showing to the person sending.
    pub fn user_message(&self) -> String {
        match self {
            Self::Engine(err) => err.user_message(),
            Self::Composition(set) => set.summary(),
            Self::Taxonomy(t) => t.message.clone(),
            other => other.to_string(),
        }
    }
}

/// Displayable record of the last error a flow ran into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorNotice {
    pub code: u16,
    pub name: &'static str,
    pub message: String,
}

impl From<&SendFlowError> for ErrorNotice {
    fn from(value: &SendFlowError) -> Self {
        let taxonomy = value.taxonomy_code();
        Self {
            code: taxonomy.code(),
            name: taxonomy.name(),
            message: value.user_message(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SendFlowError>;
