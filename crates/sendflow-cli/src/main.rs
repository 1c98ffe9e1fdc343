mod agent;
mod commands;
mod mode;
mod operator;
mod output;
mod wallet_file;

use clap::{error::ErrorKind, Parser, Subcommand, ValueEnum};
use sendflow_core::error::TaxonomyCode;
use sendflow_core::SendFlowError;
use tracing_subscriber::EnvFilter;

use commands::SendArgs;
use mode::Mode;
use output::{CommandOutput, Failure, OutputError, OutputHandler};

const LOG_ENV: &str = "SENDFLOW_LOG";

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "sendflow",
    version,
    about = "Compose, validate and review multi-recipient shielded payments"
)]
struct Cli {
    #[arg(long = "output", value_enum, global = true)]
    output_format: Option<OutputFormat>,

    #[arg(long, global = true)]
    interactive: bool,

    #[arg(long, global = true)]
    force: bool,

    #[arg(long, global = true)]
    quiet: bool,

    #[arg(long = "no-color", global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Subcommand)]
enum Commands {
    /// Compose the payment and report every problem that blocks it.
    Validate(SendArgs),
    /// Validate, then build a draft transaction for review.
    Review(SendArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitCode {
    Success = 0,
    ValidationError = 1,
    ConfigError = 2,
    IoError = 3,
    InternalError = 4,
    ConfirmationRequired = 10,
    StdinBlocked = 11,
}

impl ExitCode {
    const fn as_i32(self) -> i32 {
        self as i32
    }
}

#[derive(Debug)]
enum CliError {
    Core(SendFlowError),
    ConfirmationRequired,
    StdinBlocked,
    Internal(String),
}

impl From<SendFlowError> for CliError {
    fn from(value: SendFlowError) -> Self {
        Self::Core(value)
    }
}

impl From<OutputError> for CliError {
    fn from(value: OutputError) -> Self {
        match value {
            OutputError::StdinBlocked => Self::StdinBlocked,
            OutputError::Io(err) => Self::Internal(err.to_string()),
        }
    }
}

/// Logs go to stderr so agent JSON on stdout stays clean.
fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn build_output_handler(mode: Mode, quiet: bool, no_color: bool) -> Box<dyn OutputHandler> {
    match mode {
        Mode::Operator => Box::new(operator::OperatorOutput::new(quiet, no_color)),
        Mode::Agent => Box::new(agent::AgentOutputHandler::new()),
    }
}

fn command_label(command: &Commands) -> &'static str {
    match command {
        Commands::Validate(_) => "validate",
        Commands::Review(_) => "review",
    }
}

fn detect_mode_from_raw_args(args: &[String]) -> Mode {
    let mut output_json = false;
    let mut interactive = false;

    let mut index = 1;
    while index < args.len() {
        let arg = &args[index];
        if arg == "--interactive" {
            interactive = true;
            index += 1;
            continue;
        }
        if arg == "--output" {
            if args
                .get(index + 1)
                .is_some_and(|value| value.eq_ignore_ascii_case("json"))
            {
                output_json = true;
            }
            index += 2;
            continue;
        }
        if arg.eq_ignore_ascii_case("--output=json") {
            output_json = true;
            index += 1;
            continue;
        }
        index += 1;
    }

    mode::detect_mode(output_json, interactive)
}

fn infer_operation_from_raw_args(args: &[String]) -> &'static str {
    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "validate" => return "validate",
            "review" => return "review",
            _ => {}
        }
    }
    "validate"
}

fn clap_error_to_cli_error(err: &clap::Error) -> CliError {
    let code = match err.kind() {
        ErrorKind::MissingRequiredArgument | ErrorKind::MissingSubcommand => TaxonomyCode::Cli2001,
        ErrorKind::ArgumentConflict
        | ErrorKind::UnknownArgument
        | ErrorKind::InvalidValue
        | ErrorKind::TooManyValues => TaxonomyCode::Cli2002,
        _ => TaxonomyCode::Cli2001,
    };
    let message = err.to_string().trim().to_string();
    CliError::Core(SendFlowError::taxonomy(code, message))
}

fn maybe_confirm(
    output: &mut dyn OutputHandler,
    force: bool,
    prompt: &str,
) -> std::result::Result<(), CliError> {
    if force {
        return Ok(());
    }

    match output.confirm_proceed(prompt) {
        Ok(true) => Ok(()),
        Ok(false) => Err(CliError::ConfirmationRequired),
        Err(err) => Err(err.into()),
    }
}

fn dispatch(
    command: &Commands,
    force: bool,
    output: &mut dyn OutputHandler,
) -> std::result::Result<CommandOutput, CliError> {
    match command {
        Commands::Validate(args) => commands::validate::run(args, output).map_err(CliError::from),
        Commands::Review(args) => {
            let runtime = commands::runtime()?;
            let mut flow = runtime.block_on(commands::compose(args))?;
            commands::validate::check(&flow, output)?;
            maybe_confirm(output, force, "Build this transaction?")?;
            commands::review::run(&runtime, &mut flow, output).map_err(CliError::from)
        }
    }
}

fn exit_code_for_core_error(err: &SendFlowError) -> ExitCode {
    match err {
        SendFlowError::Io(_) | SendFlowError::Csv(_) | SendFlowError::Json(_) => ExitCode::IoError,
        other => {
            let code = other.code();
            if (1001..=1013).contains(&code) || (3001..=3002).contains(&code) {
                ExitCode::ValidationError
            } else if (2001..=2005).contains(&code) {
                ExitCode::ConfigError
            } else {
                ExitCode::InternalError
            }
        }
    }
}

fn exit_code_for_error(err: &CliError) -> ExitCode {
    match err {
        CliError::Core(core) => exit_code_for_core_error(core),
        CliError::ConfirmationRequired => ExitCode::ConfirmationRequired,
        CliError::StdinBlocked => ExitCode::StdinBlocked,
        CliError::Internal(_) => ExitCode::InternalError,
    }
}

fn failure_for(err: &CliError) -> Failure {
    match err {
        CliError::Core(core) => Failure::from_core(core),
        CliError::ConfirmationRequired => {
            Failure::new(TaxonomyCode::Cli2003, "confirmation required")
                .with_hint("Re-run with --force for non-interactive execution.")
        }
        CliError::StdinBlocked => {
            Failure::new(TaxonomyCode::Cli2004, "stdin is blocked for confirmation")
                .with_hint("Use --force or run in an interactive terminal.")
        }
        CliError::Internal(message) => {
            Failure::new(TaxonomyCode::Engine4099, format!("internal error: {message}"))
        }
    }
}

fn output_from_error(err: &CliError, command: &str) -> CommandOutput {
    CommandOutput::failed(command, failure_for(err))
}

fn run(cli: Cli) -> ExitCode {
    let output_json = matches!(cli.output_format, Some(OutputFormat::Json));
    let mode = mode::detect_mode(output_json, cli.interactive);
    let mut output = build_output_handler(mode, cli.quiet, cli.no_color);
    let command = command_label(&cli.command).to_string();

    output.start_operation(&command);
    match dispatch(&cli.command, cli.force, output.as_mut()) {
        Ok(result) => {
            output.complete(&result);
            ExitCode::Success
        }
        Err(err) => {
            let failed_output = output_from_error(&err, &command);
            output.complete(&failed_output);
            exit_code_for_error(&err)
        }
    }
}

fn main() {
    init_tracing();
    let raw_args: Vec<String> = std::env::args().collect();
    let detected_mode = detect_mode_from_raw_args(&raw_args);
    let cli = match Cli::try_parse_from(&raw_args) {
        Ok(parsed) => parsed,
        Err(err) => {
            if matches!(
                err.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
            ) {
                let _ = err.print();
                std::process::exit(0);
            }

            if detected_mode == Mode::Agent {
                let cli_error = clap_error_to_cli_error(&err);
                let operation = infer_operation_from_raw_args(&raw_args);
                let failed_output = output_from_error(&cli_error, operation);
                let mut output = agent::AgentOutputHandler::new();
                output.complete(&failed_output);
                std::process::exit(exit_code_for_error(&cli_error).as_i32());
            }

            let _ = err.print();
            std::process::exit(ExitCode::ConfigError.as_i32());
        }
    };
    let code = run(cli);
    std::process::exit(code.as_i32());
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io;
    use std::path::PathBuf;

    use clap::Parser;
    use sendflow_core::error::TaxonomyCode;
    use sendflow_core::SendFlowError;
    use serde_json::Value;
    use tempfile::TempDir;

    use crate::commands::SendArgs;
    use crate::output::{CommandOutput, OutputError, OutputHandler, SendSummary};

    use super::{
        clap_error_to_cli_error, detect_mode_from_raw_args, dispatch, exit_code_for_error,
        output_from_error, Cli, CliError, Commands, ExitCode, OutputFormat,
    };

    const ADDR_A: &str =
        "zs15feryxhrdz9m6y09mr8wrerwzgj6f8ntxvhxyrdlm5aahn0t09nl4ujy8624fl6zy54klay937y";
    const ADDR_B: &str =
        "zs1rnujckpak28lrdjg0eel92ue3gm36kcwf9tfwwqltsjqf6h5graeeeex7ervydu284rxqfxhpyd";

    struct MockOutput {
        confirm_calls: usize,
    }

    impl MockOutput {
        fn new() -> Self {
            Self { confirm_calls: 0 }
        }
    }

    impl OutputHandler for MockOutput {
        fn start_operation(&mut self, _operation: &str) {}
        fn progress(&mut self, _message: &str) {}
        fn display_send_summary(&mut self, _summary: &SendSummary) {}
        fn confirm_proceed(&mut self, _prompt: &str) -> Result<bool, OutputError> {
            self.confirm_calls += 1;
            Ok(false)
        }
        fn complete(&mut self, _output: &CommandOutput) {}
    }

    struct Fixture {
        _dir: TempDir,
        recipients: PathBuf,
        wallet: PathBuf,
    }

    impl Fixture {
        fn new(csv: &str) -> Self {
            let dir = TempDir::new().unwrap();
            let recipients = dir.path().join("recipients.csv");
            let wallet = dir.path().join("wallet.json");
            fs::write(&recipients, csv).unwrap();
            fs::write(
                &wallet,
                r#"{
                    "network": "mainnet",
                    "fee_info": { "min_fee": 10000, "default_fee": 10000, "max_fee": 1000000 },
                    "sources": [
                        { "key_id": 1, "address_id": 10, "address": "zs1funding", "spendable": 300000000, "pending": 0 }
                    ],
                    "expiry_height": 2500040,
                    "as_of": "2026-01-01T00:00:00Z"
                }"#,
            )
            .unwrap();
            Self {
                _dir: dir,
                recipients,
                wallet,
            }
        }

        fn valid() -> Self {
            Self::new(&format!(
                "address,amount,memo,label\n{ADDR_A},1,coffee,alice\n{ADDR_B},0.5,,bob\n"
            ))
        }

        fn args(&self) -> SendArgs {
            SendArgs {
                file: self.recipients.clone(),
                wallet: self.wallet.clone(),
                network: "mainnet".to_string(),
                scope: "auto".to_string(),
                fee: "standard".to_string(),
            }
        }
    }

    #[test]
    fn cli_parses_validate_with_machine_flags() {
        let cli = Cli::try_parse_from([
            "sendflow",
            "--output",
            "json",
            "--quiet",
            "validate",
            "recipients.csv",
            "--wallet",
            "wallet.json",
        ])
        .unwrap();

        assert_eq!(cli.output_format, Some(OutputFormat::Json));
        assert!(cli.quiet);
        match cli.command {
            Commands::Validate(args) => {
                assert_eq!(args.file, PathBuf::from("recipients.csv"));
                assert_eq!(args.wallet, PathBuf::from("wallet.json"));
                assert_eq!(args.network, "mainnet");
                assert_eq!(args.scope, "auto");
                assert_eq!(args.fee, "standard");
            }
            _ => panic!("expected validate command"),
        }
    }

    #[test]
    fn global_flags_are_accepted_after_subcommand() {
        let cli = Cli::try_parse_from([
            "sendflow",
            "review",
            "recipients.json",
            "--wallet",
            "wallet.json",
            "--network",
            "testnet",
            "--scope",
            "key:2",
            "--fee",
            "0.0005",
            "--force",
            "--output",
            "json",
            "--no-color",
        ])
        .unwrap();

        assert!(cli.force);
        assert!(cli.no_color);
        assert_eq!(cli.output_format, Some(OutputFormat::Json));
        match cli.command {
            Commands::Review(args) => {
                assert_eq!(args.network, "testnet");
                assert_eq!(args.scope, "key:2");
                assert_eq!(args.fee, "0.0005");
            }
            _ => panic!("expected review command"),
        }
    }

    #[test]
    fn exit_code_validation_error_mapping() {
        let err = CliError::Core(SendFlowError::taxonomy(
            TaxonomyCode::Validation1001,
            "validation",
        ));
        assert_eq!(exit_code_for_error(&err), ExitCode::ValidationError);
        let funds = CliError::Core(SendFlowError::taxonomy(TaxonomyCode::Balance3002, "pending"));
        assert_eq!(exit_code_for_error(&funds), ExitCode::ValidationError);
    }

    #[test]
    fn exit_code_config_error_mapping() {
        let err = CliError::Core(SendFlowError::taxonomy(TaxonomyCode::Cli2001, "config"));
        assert_eq!(exit_code_for_error(&err), ExitCode::ConfigError);
    }

    #[test]
    fn exit_code_io_error_mapping() {
        let err = CliError::Core(SendFlowError::Io(io::Error::other("io")));
        assert_eq!(exit_code_for_error(&err), ExitCode::IoError);
    }

    #[test]
    fn exit_code_internal_error_mapping() {
        let err = CliError::Core(SendFlowError::taxonomy(TaxonomyCode::Engine4001, "offline"));
        assert_eq!(exit_code_for_error(&err), ExitCode::InternalError);
    }

    #[test]
    fn exit_code_agent_confirmation_and_stdin_blocked_mapping() {
        assert_eq!(
            exit_code_for_error(&CliError::ConfirmationRequired),
            ExitCode::ConfirmationRequired
        );
        assert_eq!(
            exit_code_for_error(&CliError::StdinBlocked),
            ExitCode::StdinBlocked
        );
    }

    #[test]
    fn force_bypasses_confirmation_in_dispatch() {
        let fixture = Fixture::valid();
        let mut output = MockOutput::new();

        let result = dispatch(&Commands::Review(fixture.args()), true, &mut output).unwrap();
        assert!(result.ok);
        assert_eq!(output.confirm_calls, 0);
    }

    #[test]
    fn declined_confirmation_builds_nothing() {
        let fixture = Fixture::valid();
        let mut output = MockOutput::new();

        let err = dispatch(&Commands::Review(fixture.args()), false, &mut output).unwrap_err();
        assert!(matches!(err, CliError::ConfirmationRequired));
        assert_eq!(output.confirm_calls, 1);
    }

    #[test]
    fn invalid_composition_fails_before_confirmation() {
        let fixture = Fixture::new(&format!("address,amount\n{ADDR_A},\nzs1nope,1\n"));
        let mut output = MockOutput::new();

        let err = dispatch(&Commands::Review(fixture.args()), false, &mut output).unwrap_err();
        assert_eq!(exit_code_for_error(&err), ExitCode::ValidationError);
        assert_eq!(output.confirm_calls, 0);
    }

    #[test]
    fn agent_validate_and_review_both_work() {
        let fixture = Fixture::valid();
        let mut output = crate::agent::AgentOutputHandler::new();

        let validate = dispatch(&Commands::Validate(fixture.args()), false, &mut output).unwrap();
        let parsed: Value =
            serde_json::from_str(&crate::agent::render_agent_json(&validate).unwrap()).unwrap();
        assert_eq!(parsed["operation"], "validate");
        assert_eq!(parsed["success"], true);
        assert_eq!(parsed["result"]["amountTotal"], "1.50000000");
        assert_eq!(parsed["result"]["fee"]["selected"], "0.00020000");
        assert_eq!(parsed["result"]["totalOut"], "1.50020000");

        let review = dispatch(&Commands::Review(fixture.args()), true, &mut output).unwrap();
        let parsed: Value =
            serde_json::from_str(&crate::agent::render_agent_json(&review).unwrap()).unwrap();
        assert_eq!(parsed["operation"], "review");
        assert_eq!(parsed["state"], "reviewing");
        assert_eq!(parsed["result"]["pending"]["fee"], "0.00020000");
        assert_eq!(parsed["result"]["pending"]["change"], "1.49980000");
        assert_eq!(parsed["result"]["pending"]["numInputs"], 1);
    }

    #[test]
    fn deterministic_json_for_same_input() {
        let fixture = Fixture::valid();
        let mut output = crate::agent::AgentOutputHandler::new();
        let command = Commands::Review(fixture.args());

        let first = dispatch(&command, true, &mut output).unwrap();
        let first_json = crate::agent::render_agent_json(&first).unwrap();
        let second = dispatch(&command, true, &mut output).unwrap();
        let second_json = crate::agent::render_agent_json(&second).unwrap();
        assert_eq!(first_json, second_json);
    }

    #[test]
    fn composition_errors_list_every_issue() {
        let fixture = Fixture::new(&format!("address,amount\n{ADDR_A},\nzs1nope,1\n"));
        let mut output = MockOutput::new();
        let err = dispatch(&Commands::Validate(fixture.args()), false, &mut output).unwrap_err();

        let rendered = crate::agent::render_agent_json(&output_from_error(&err, "validate")).unwrap();
        let parsed: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed["success"], false);
        let issues = parsed["error"]["issues"].as_array().unwrap();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0]["recipient"], 1);
        assert_eq!(issues[0]["field"], "amount");
        assert_eq!(issues[0]["message"], "Amount is required");
        assert_eq!(issues[1]["field"], "address");
    }

    #[test]
    fn agent_error_response_contains_code_name_and_message() {
        let cli_error = CliError::Core(SendFlowError::taxonomy(
            TaxonomyCode::Validation1001,
            "invalid address",
        ));
        let output = output_from_error(&cli_error, "validate");
        let rendered = crate::agent::render_agent_json(&output).unwrap();
        let parsed: Value = serde_json::from_str(&rendered).unwrap();

        assert_eq!(parsed["success"], false);
        assert_eq!(parsed["error"]["code"], 1001);
        assert_eq!(parsed["error"]["name"], "INVALID_ADDRESS");
        assert_eq!(parsed["error"]["message"], "invalid address");
        assert!(parsed["error"].get("issues").is_none());
    }

    #[test]
    fn clap_parse_errors_map_to_cli_codes() {
        let missing_required = Cli::try_parse_from(["sendflow", "validate", "recipients.csv"]);
        let cli_error = clap_error_to_cli_error(&missing_required.unwrap_err());
        assert_eq!(exit_code_for_error(&cli_error), ExitCode::ConfigError);

        let unknown_flag = Cli::try_parse_from([
            "sendflow",
            "validate",
            "recipients.csv",
            "--wallet",
            "wallet.json",
            "--unknown-flag",
        ]);
        match clap_error_to_cli_error(&unknown_flag.unwrap_err()) {
            CliError::Core(err) => assert_eq!(err.code(), 2002),
            _ => panic!("expected taxonomy config error"),
        }
    }

    #[test]
    fn raw_arg_mode_detection_obeys_priority_rules() {
        let mode = detect_mode_from_raw_args(&[
            "sendflow".to_string(),
            "--output".to_string(),
            "json".to_string(),
            "--interactive".to_string(),
        ]);
        assert_eq!(mode, crate::mode::Mode::Agent);
    }
}
