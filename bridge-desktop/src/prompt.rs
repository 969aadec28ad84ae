//! Terminal confirmation prompt

use async_trait::async_trait;
use bridge_traits::prompt::{ConfirmRequest, ConfirmationPrompt};
use std::io::{BufRead, Write};
use tracing::{debug, warn};

/// Asks confirmations on stdin/stdout.
///
/// Anything other than an explicit yes (including EOF or a read error) is a
/// "no".
#[derive(Debug, Default, Clone)]
pub struct TerminalPrompt;

impl TerminalPrompt {
    pub fn new() -> Self {
        Self
    }

    /// Interpret a typed answer
    pub fn parse_answer(input: &str) -> bool {
        matches!(
            input.trim().to_ascii_lowercase().as_str(),
            "y" | "yes" | "ok"
        )
    }

    fn ask_blocking(message: String) -> std::io::Result<bool> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        write!(out, "{} [y/N] ", message)?;
        out.flush()?;

        let mut line = String::new();
        let read = std::io::stdin().lock().read_line(&mut line)?;
        if read == 0 {
            return Ok(false);
        }
        Ok(Self::parse_answer(&line))
    }
}

#[async_trait]
impl ConfirmationPrompt for TerminalPrompt {
    async fn confirm(&self, request: &ConfirmRequest) -> bool {
        let message = request.message();
        let kind = request.kind();

        let answer = tokio::task::spawn_blocking(move || Self::ask_blocking(message)).await;
        match answer {
            Ok(Ok(accepted)) => {
                debug!(kind, accepted, "Terminal confirmation answered");
                accepted
            }
            Ok(Err(e)) => {
                warn!(kind, error = %e, "Failed to read confirmation, treating as decline");
                false
            }
            Err(e) => {
                warn!(kind, error = %e, "Confirmation task aborted, treating as decline");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer() {
        assert!(TerminalPrompt::parse_answer("y\n"));
        assert!(TerminalPrompt::parse_answer("  YES "));
        assert!(TerminalPrompt::parse_answer("ok"));
        assert!(!TerminalPrompt::parse_answer(""));
        assert!(!TerminalPrompt::parse_answer("n"));
        assert!(!TerminalPrompt::parse_answer("yep"));
    }
}
