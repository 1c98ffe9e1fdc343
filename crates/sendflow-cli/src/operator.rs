use std::io::{self, IsTerminal, Write};
use std::time::Duration;

use colored::{ColoredString, Colorize};
use comfy_table::{presets::ASCII_BORDERS_ONLY, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use sendflow_core::error::Field;

use crate::output::{
    CommandOutput, DraftSummary, Failure, FundsShortfall, IssueLine, OutputError, OutputHandler,
    RecipientLine, RowStatus, SendSummary,
};

const SPINNER_TICK_MS: u64 = 80;
const ADDRESS_PREVIEW: usize = 24;
const TEXT_PREVIEW: usize = 20;

/// Human output: tables on stdout, problems on stderr, a spinner while the
/// flow works.
pub struct OperatorOutput {
    quiet: bool,
    no_color: bool,
    spinner: Option<ProgressBar>,
}

impl OperatorOutput {
    pub fn new(quiet: bool, no_color: bool) -> Self {
        Self {
            quiet,
            no_color,
            spinner: None,
        }
    }

    fn paint(&self, text: &str, color: fn(&str) -> ColoredString) -> String {
        if self.no_color {
            text.to_string()
        } else {
            color(text).to_string()
        }
    }

    fn stop_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    fn preview(value: &str, max_len: usize) -> String {
        let mut chars = value.chars();
        let head: String = chars.by_ref().take(max_len).collect();
        if chars.next().is_some() {
            format!("{head}...")
        } else {
            head
        }
    }

    fn table(header: Vec<&str>) -> Table {
        let mut table = Table::new();
        table
            .load_preset(ASCII_BORDERS_ONLY)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(header);
        table
    }

    pub fn render_recipient_table(&self, rows: &[RecipientLine]) -> String {
        let mut table = Self::table(vec!["#", "Address", "Label", "Amount", "Memo", "Status"]);
        for row in rows {
            let status = match row.status {
                RowStatus::Valid => self.paint(row.status.as_str(), |s| s.green()),
                RowStatus::Warning => self.paint(row.status.as_str(), |s| s.yellow()),
                RowStatus::Error => self.paint(row.status.as_str(), |s| s.red()),
            };
            table.add_row(vec![
                row.row.to_string(),
                Self::preview(&row.address, ADDRESS_PREVIEW),
                row.label
                    .as_deref()
                    .map_or_else(|| "-".to_string(), |label| Self::preview(label, TEXT_PREVIEW)),
                row.amount.clone(),
                row.memo
                    .as_deref()
                    .map_or_else(|| "-".to_string(), |memo| Self::preview(memo, TEXT_PREVIEW)),
                status,
            ]);
        }
        table.to_string()
    }

    pub fn render_draft_table(draft: &DraftSummary) -> String {
        let mut table = Self::table(vec!["Amount", "Fee", "Total out", "Inputs", "Change", "Expiry"]);
        table.add_row(vec![
            draft.total_amount.clone(),
            draft.fee.clone(),
            draft.total_out.clone(),
            draft.num_inputs.to_string(),
            draft.change.clone(),
            draft.expiry_height.to_string(),
        ]);
        table.to_string()
    }

    pub fn is_confirmation_accepted(input: &str) -> bool {
        matches!(input.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }

    fn issue_hint(issue: &IssueLine) -> &'static str {
        match issue.field {
            Field::Address => "check the address encoding and the selected --network",
            Field::Amount => "use a positive decimal with at most 8 fractional digits",
            Field::Memo => "keep memos to 512 bytes of printable text",
            Field::Recipients => "a payment needs between 1 and 50 recipients within the supply",
        }
    }

    fn funds_hint(funds: &FundsShortfall) -> &'static str {
        if funds.pending_confirmation {
            "wait for pending funds to confirm, or lower the amounts"
        } else {
            "lower the amounts or choose a --scope with more funds"
        }
    }

    /// One line per problem, each followed by what to do about it.
    pub fn failure_lines(failure: &Failure) -> Vec<String> {
        let mut lines: Vec<String> = failure
            .issues
            .iter()
            .map(|issue| {
                let place = match issue.recipient {
                    Some(row) => format!("row {row} {}", issue.field.as_str()),
                    None => "recipients".to_string(),
                };
                format!("{place}: {}\n  hint: {}", issue.message, Self::issue_hint(issue))
            })
            .collect();
        if let Some(funds) = &failure.funds {
            lines.push(format!("{}\n  hint: {}", funds.message, Self::funds_hint(funds)));
        }
        if let Some(hint) = failure.hint {
            lines.push(format!("hint: {hint}"));
        }
        lines
    }
}

impl OutputHandler for OperatorOutput {
    fn start_operation(&mut self, operation: &str) {
        if self.quiet {
            return;
        }
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(format!("{operation}..."));
        spinner.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
        self.spinner = Some(spinner);
    }

    fn progress(&mut self, message: &str) {
        if self.quiet {
            return;
        }
        match &self.spinner {
            Some(spinner) => spinner.set_message(message.to_string()),
            None => println!("{message}"),
        }
    }

    fn display_send_summary(&mut self, summary: &SendSummary) {
        if self.quiet {
            return;
        }
        self.stop_spinner();

        let mut table = Self::table(vec![
            "Network",
            "Scope",
            "Recipients",
            "Amount",
            "Fee",
            "Total out",
            "Spendable",
            "Pending",
        ]);
        table.add_row(vec![
            summary.network.clone(),
            summary.scope.clone(),
            summary.recipient_count.to_string(),
            summary.amount_total.clone(),
            summary.fee.clone(),
            summary.total_out.clone(),
            summary.spendable.clone(),
            summary.pending.clone(),
        ]);
        println!("{table}");
    }

    fn confirm_proceed(&mut self, prompt: &str) -> Result<bool, OutputError> {
        if !io::stdin().is_terminal() {
            return Err(OutputError::StdinBlocked);
        }

        self.stop_spinner();
        print!("{prompt} [y/N]: ");
        io::stdout().flush().map_err(OutputError::Io)?;

        let mut input = String::new();
        io::stdin().read_line(&mut input).map_err(OutputError::Io)?;
        Ok(Self::is_confirmation_accepted(&input))
    }

    fn complete(&mut self, output: &CommandOutput) {
        self.stop_spinner();

        match &output.failure {
            None => println!("{}", self.paint(&output.message, |s| s.green())),
            Some(failure) => {
                eprintln!(
                    "{}",
                    self.paint(&format!("[{}] {}", failure.name, failure.message), |s| s.red())
                );
                for line in Self::failure_lines(failure) {
                    eprintln!("{}", self.paint(&line, |s| s.red()));
                }
            }
        }

        for warning in &output.warnings {
            let line = format!("{}: {}", warning.code, warning.message);
            eprintln!("{}", self.paint(&line, |s| s.yellow()));
        }

        if self.quiet {
            return;
        }
        if !output.recipients.is_empty() {
            println!("{}", self.render_recipient_table(&output.recipients));
        }
        if let Some(draft) = &output.draft {
            println!("{}", Self::render_draft_table(draft));
        }
    }
}
