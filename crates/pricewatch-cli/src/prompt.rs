//! Interactive confirmation for the rate file fallback.

use std::io::{BufRead, IsTerminal, Write};
use std::sync::Arc;

use pricewatch::currency::FallbackGate;

/// Always allow with `assume_yes`; otherwise ask on the terminal, and deny
/// when stdin is not a terminal.
pub fn fallback_gate(assume_yes: bool) -> FallbackGate {
    if assume_yes {
        return Arc::new(|_: &str| true);
    }
    Arc::new(|question: &str| {
        if !std::io::stdin().is_terminal() {
            tracing::warn!("{question} Not a terminal, declining");
            return false;
        }
        ask(question, std::io::stdin().lock(), std::io::stderr())
    })
}

/// `question [y/N]` on `out`, answered by one line of `input`.
pub fn ask(question: &str, mut input: impl BufRead, mut out: impl Write) -> bool {
    let _ = write!(out, "{question} [y/N] ");
    let _ = out.flush();

    let mut answer = String::new();
    if input.read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
