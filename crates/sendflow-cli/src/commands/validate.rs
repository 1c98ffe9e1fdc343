use sendflow_core::{SendFlow, SendFlowError};

use crate::commands::{self, SendArgs};
use crate::output::{CommandOutput, OutputHandler};
use crate::wallet_file::SnapshotEngine;

/// Compose the payment described by `args` and report whether it could be
/// sent. Every field error comes back at once as a `Composition` error.
pub fn run(args: &SendArgs, output: &mut dyn OutputHandler) -> Result<CommandOutput, SendFlowError> {
    let runtime = commands::runtime()?;
    let flow = runtime.block_on(commands::compose(args))?;
    output.progress("validating recipients");
    check(&flow, output)?;

    let composer = flow.composer();
    let mut result = CommandOutput::success(
        "validate",
        format!(
            "{} recipient(s) valid, {} ARRR out including fee",
            composer.len(),
            composer.total_out().to_fixed_string()
        ),
    );
    result.state = Some(flow.state());
    result.result = Some(commands::composition_to_agent_result(composer));
    result.recipients = commands::recipient_lines(composer);
    result.warnings = commands::warning_lines(composer);
    Ok(result)
}

/// Show the totals and fail with the full error set when the composition
/// cannot be sent.
pub(crate) fn check(
    flow: &SendFlow<SnapshotEngine>,
    output: &mut dyn OutputHandler,
) -> Result<(), SendFlowError> {
    let composer = flow.composer();
    output.display_send_summary(&commands::summary(composer));
    composer.validate_all()?;
    Ok(())
}
