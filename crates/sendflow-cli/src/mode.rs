use std::io::{self, IsTerminal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Operator,
    Agent,
}

/// `--output json` wins over `--interactive`; without either flag a piped
/// stdout means an agent is reading.
pub fn detect_mode(output_json: bool, interactive: bool) -> Mode {
    if output_json {
        Mode::Agent
    } else if interactive || io::stdout().is_terminal() {
        Mode::Operator
    } else {
        Mode::Agent
    }
}
