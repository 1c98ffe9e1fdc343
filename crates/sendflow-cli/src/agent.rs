use serde::Serialize;
use serde_json::{json, Value};
use sendflow_core::error::TaxonomyCode;
use sendflow_core::FlowState;

use crate::output::{CommandOutput, Failure, OutputError, OutputHandler, SendSummary, WarningLine};

/// Agent output carries no wall-clock time so identical inputs render
/// byte-identical documents.
pub(crate) const AGENT_TIMESTAMP: &str = "1970-01-01T00:00:00Z";

/// The document printed for every agent-mode invocation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AgentEnvelope<'a> {
    success: bool,
    sendflow_version: &'static str,
    operation: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<FlowState>,
    timestamp: &'static str,
    result: Option<&'a Value>,
    error: Option<&'a Failure>,
    warnings: &'a [WarningLine],
}

impl<'a> From<&'a CommandOutput> for AgentEnvelope<'a> {
    fn from(output: &'a CommandOutput) -> Self {
        Self {
            success: output.ok,
            sendflow_version: env!("CARGO_PKG_VERSION"),
            operation: &output.command,
            state: output.state,
            timestamp: AGENT_TIMESTAMP,
            result: output.result.as_ref(),
            error: output.failure.as_ref(),
            warnings: &output.warnings,
        }
    }
}

/// Render `output` as pretty JSON. Going through `Value` sorts every
/// object's keys, since serde_json's default map is ordered.
pub(crate) fn render_agent_json(output: &CommandOutput) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(AgentEnvelope::from(output))?;
    serde_json::to_string_pretty(&value)
}

/// Machine output. Never prompts: anything that needs consent must be run
/// with `--force`.
#[derive(Debug, Default)]
pub struct AgentOutputHandler;

impl AgentOutputHandler {
    pub fn new() -> Self {
        Self
    }
}

impl OutputHandler for AgentOutputHandler {
    fn start_operation(&mut self, _operation: &str) {}

    fn progress(&mut self, _message: &str) {}

    fn display_send_summary(&mut self, _summary: &SendSummary) {}

    fn confirm_proceed(&mut self, _prompt: &str) -> Result<bool, OutputError> {
        Ok(false)
    }

    fn complete(&mut self, output: &CommandOutput) {
        match render_agent_json(output) {
            Ok(rendered) => println!("{rendered}"),
            Err(err) => {
                let fallback = json!({
                    "success": false,
                    "operation": output.command,
                    "timestamp": AGENT_TIMESTAMP,
                    "error": {
                        "code": TaxonomyCode::Engine4099.code(),
                        "name": TaxonomyCode::Engine4099.name(),
                        "message": format!("failed to render agent output: {err}"),
                    },
                });
                println!("{fallback}");
            }
        }
    }
}
