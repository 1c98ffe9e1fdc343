pub mod address;
pub mod amount;
pub mod composer;
pub mod config;
pub mod engine;
pub mod error;
pub mod fee;
pub mod flow;
pub mod import;
pub mod memo;
pub mod recipient;
pub mod scope;

pub use address::Network;
pub use amount::Arrrtoshi;
pub use composer::{ErrorSet, PaymentComposer, PaymentRequest};
pub use config::SendConfig;
pub use engine::{PendingTransaction, SignedTransaction, TransactionId, WalletEngine};
pub use error::{Result, SendFlowError};
pub use fee::{FeeInfo, FeePreset};
pub use flow::{CompositionChange, FlowCommand, FlowSnapshot, FlowState, SendFlow, SendFlowHandle};
pub use recipient::Recipient;
pub use scope::{BalanceSnapshot, FundingSource, SpendScope};
