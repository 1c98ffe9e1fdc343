use sendflow_core::error::StateError;
use sendflow_core::{SendFlow, SendFlowError};
use tokio::runtime::Runtime;

use crate::commands;
use crate::output::{CommandOutput, DraftSummary, OutputHandler};
use crate::wallet_file::SnapshotEngine;

/// Run the flow's review step and report the built draft.
pub fn run(
    runtime: &Runtime,
    flow: &mut SendFlow<SnapshotEngine>,
    output: &mut dyn OutputHandler,
) -> Result<CommandOutput, SendFlowError> {
    output.progress("building transaction");
    runtime.block_on(flow.review())?;

    let draft = flow
        .pending_transaction()
        .map(DraftSummary::from)
        .ok_or(StateError::MissingTransaction)?;
    let composer = flow.composer();

    let mut agent_result = commands::composition_to_agent_result(composer);
    agent_result["pending"] = serde_json::to_value(&draft)?;

    let mut result = CommandOutput::success(
        "review",
        format!(
            "transaction built: {} ARRR to {} recipient(s), fee {} ARRR",
            draft.total_amount, draft.outputs, draft.fee
        ),
    );
    result.state = Some(flow.state());
    result.result = Some(agent_result);
    result.recipients = commands::recipient_lines(composer);
    result.draft = Some(draft);
    result.warnings = commands::warning_lines(composer);
    Ok(result)
}
