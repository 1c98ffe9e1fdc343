pub mod review;
pub mod validate;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use sendflow_core::composer::{CompositionWarning, PaymentComposer};
use sendflow_core::error::TaxonomyCode;
use sendflow_core::import::{self, RecipientRow};
use sendflow_core::{
    Arrrtoshi, CompositionChange, FeePreset, Network, SendConfig, SendFlow, SendFlowError,
    SpendScope,
};
use serde_json::{json, Value};
use tokio::runtime::Runtime;
use tracing::debug;

use crate::output::{RecipientLine, RowStatus, SendSummary, WarningLine};
use crate::wallet_file::{SnapshotEngine, WalletSnapshot};

/// Arguments shared by every command that composes a payment.
#[derive(Debug, Clone, Args)]
pub struct SendArgs {
    /// Recipient list, `.csv` or `.json`.
    pub file: PathBuf,

    /// Wallet snapshot with fee bounds and funding sources.
    #[arg(long)]
    pub wallet: PathBuf,

    #[arg(long, default_value = "mainnet")]
    pub network: String,

    /// `auto`, `key:<id>` or `addresses:<id>,<id>,...`
    #[arg(long, default_value = "auto")]
    pub scope: String,

    /// `low`, `standard`, `high` or a custom fee in ARRR.
    #[arg(long, default_value = "standard")]
    pub fee: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FeeChoice {
    Preset(FeePreset),
    Custom(Arrrtoshi),
}

pub(crate) fn parse_network(input: &str) -> Result<Network, SendFlowError> {
    input.parse().map_err(|_| {
        SendFlowError::taxonomy(
            TaxonomyCode::Cli2002,
            format!(
                "unsupported network '{}', expected mainnet, testnet or regtest",
                input.trim()
            ),
        )
    })
}

pub(crate) fn parse_fee(input: &str) -> Result<FeeChoice, SendFlowError> {
    match input.parse::<FeePreset>() {
        Ok(FeePreset::Custom) => Err(SendFlowError::taxonomy(
            TaxonomyCode::Cli2002,
            "--fee custom needs an amount, e.g. --fee 0.0002",
        )),
        Ok(preset) => Ok(FeeChoice::Preset(preset)),
        Err(_) => Arrrtoshi::from_decimal_str(input.trim())
            .map(FeeChoice::Custom)
            .map_err(|err| {
                SendFlowError::taxonomy(
                    TaxonomyCode::Cli2002,
                    format!("invalid --fee '{}': {err}", input.trim()),
                )
            }),
    }
}

pub(crate) fn read_rows(file: &Path) -> Result<Vec<RecipientRow>, SendFlowError> {
    let bytes = std::fs::read(file)?;
    let source = file.display().to_string();
    let extension = file
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "csv" => import::parse_csv(&bytes, &source),
        "json" => import::parse_json(&bytes, &source),
        _ => Err(SendFlowError::taxonomy(
            TaxonomyCode::Cli2001,
            format!("unsupported input extension for '{source}': expected .csv or .json"),
        )),
    }
}

pub(crate) fn runtime() -> Result<Runtime, SendFlowError> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

/// Load the wallet snapshot and recipients and apply every flag to a fresh
/// flow sitting in `Composing`.
pub(crate) async fn compose(args: &SendArgs) -> Result<SendFlow<SnapshotEngine>, SendFlowError> {
    let network = parse_network(&args.network)?;
    let scope: SpendScope = args.scope.parse()?;
    let fee = parse_fee(&args.fee)?;
    let rows = read_rows(&args.file)?;
    let snapshot = WalletSnapshot::load(&args.wallet, network)?;

    let config = SendConfig::for_network(network);
    config.validate()?;

    let mut flow = SendFlow::new(Arc::new(SnapshotEngine::new(snapshot)), config);
    flow.start()?;
    flow.refresh_fee_info().await;
    flow.refresh_balances().await;

    if !scope.is_auto() {
        flow.change(CompositionChange::SetScope(scope.clone()))?;
        if flow.composer().scope() != &scope {
            return Err(SendFlowError::taxonomy(
                TaxonomyCode::Cli2005,
                format!("scope '{scope}' matches no funding source in the wallet snapshot"),
            ));
        }
    }

    match fee {
        FeeChoice::Preset(preset) => flow.change(CompositionChange::SetFeePreset(preset))?,
        FeeChoice::Custom(amount) => flow.change(CompositionChange::SetCustomFee(amount))?,
    }

    debug!(rows = rows.len(), file = %args.file.display(), "recipients loaded");
    flow.change(CompositionChange::LoadRows(rows))?;
    Ok(flow)
}

pub(crate) fn summary(composer: &PaymentComposer) -> SendSummary {
    let balance = composer.balance();
    SendSummary {
        network: composer.network().to_string(),
        scope: composer.scope().to_string(),
        recipient_count: composer.len(),
        amount_total: composer.amount_total().to_fixed_string(),
        fee: composer.fee().selected_fee.to_fixed_string(),
        total_out: composer.total_out().to_fixed_string(),
        spendable: balance.spendable.to_fixed_string(),
        pending: balance.pending.to_fixed_string(),
    }
}

pub(crate) fn warning_lines(composer: &PaymentComposer) -> Vec<WarningLine> {
    composer.warnings().iter().map(WarningLine::from).collect()
}

/// Per-row outcome for the recipient table.
pub(crate) fn recipient_lines(composer: &PaymentComposer) -> Vec<RecipientLine> {
    let duplicates: Vec<usize> = composer
        .warnings()
        .iter()
        .filter_map(|warning| match warning {
            CompositionWarning::DuplicateAddress { duplicate, .. } => Some(*duplicate),
            _ => None,
        })
        .collect();

    composer
        .recipients()
        .iter()
        .enumerate()
        .map(|(index, recipient)| RecipientLine {
            row: index + 1,
            address: recipient.address.clone(),
            label: recipient.label.clone(),
            amount: recipient.amount_text.clone(),
            memo: recipient
                .memo
                .as_ref()
                .and_then(|memo| memo.as_text())
                .map(ToOwned::to_owned),
            status: if recipient.error.is_some() {
                RowStatus::Error
            } else if duplicates.contains(&index) {
                RowStatus::Warning
            } else {
                RowStatus::Valid
            },
        })
        .collect()
}

pub(crate) fn composition_to_agent_result(composer: &PaymentComposer) -> Value {
    let fee = composer.fee();
    let balance = composer.balance();
    json!({
        "network": composer.network().as_str(),
        "scope": composer.scope().to_string(),
        "recipients": composer.recipients().iter().enumerate().map(|(index, recipient)| {
            json!({
                "index": index,
                "address": recipient.address,
                "amount": recipient.parsed_amount().map(|amount| amount.to_fixed_string()),
                "memoBytes": recipient.memo.as_ref().map_or(0, |memo| memo.byte_len()),
                "label": recipient.label,
            })
        }).collect::<Vec<_>>(),
        "fee": {
            "preset": fee.preset.as_str(),
            "min": fee.min_fee.to_fixed_string(),
            "max": fee.max_fee.to_fixed_string(),
            "selected": fee.selected_fee.to_fixed_string(),
        },
        "amountTotal": composer.amount_total().to_fixed_string(),
        "totalOut": composer.total_out().to_fixed_string(),
        "spendable": balance.spendable.to_fixed_string(),
        "pending": balance.pending.to_fixed_string(),
    })
}
