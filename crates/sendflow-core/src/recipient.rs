use serde::{Deserialize, Serialize};

use crate::address::{validate_address, AddressError, Network};
use crate::amount::Arrrtoshi;
use crate::error::ValidationError;
use crate::memo::{validate_memo, Memo};

/// One payment row as the user entered it.
///
/// The amount is kept as the raw text so a half-typed value survives until
/// the next edit; `parsed_amount` gives the unit value when it parses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub address: String,
    pub amount_text: String,
    pub memo: Option<Memo>,
    pub label: Option<String>,
    #[serde(skip)]
    pub error: Option<ValidationError>,
}

impl Recipient {
    pub fn new(address: impl Into<String>, amount_text: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            amount_text: amount_text.into(),
            ..Self::default()
        }
    }

    pub fn with_memo(mut self, memo: Memo) -> Self {
        self.memo = Some(memo);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The amount in units, or `None` when the text is empty or malformed.
    pub fn parsed_amount(&self) -> Option<Arrrtoshi> {
        Arrrtoshi::from_decimal_str(&self.amount_text).ok()
    }

    pub fn set_amount(&mut self, amount: Arrrtoshi) {
        self.amount_text = amount.to_decimal_string();
    }

    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

/// Validate one row. Address problems are reported alone: an invalid
/// address masks any amount or memo error on the same row.
pub fn validate_recipient(recipient: &Recipient, network: Network) -> Option<ValidationError> {
    match validate_address(&recipient.address, network) {
        Ok(()) => {}
        Err(AddressError::Empty) => return Some(ValidationError::AddressRequired),
        Err(err) => return Some(ValidationError::InvalidAddress(err)),
    }

    if recipient.amount_text.trim().is_empty() {
        return Some(ValidationError::AmountRequired);
    }
    match Arrrtoshi::from_decimal_str(&recipient.amount_text) {
        Ok(amount) if amount.is_zero() => return Some(ValidationError::AmountZero),
        Ok(_) => {}
        Err(err) => return Some(ValidationError::InvalidAmount(err)),
    }

    if let Some(memo) = &recipient.memo {
        if let Err(err) = validate_memo(memo) {
            return Some(err.into());
        }
    }
    None
}
