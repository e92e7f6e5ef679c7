// src/cli/prompt.rs
use crate::application::{Confirm, ConfirmRequest};
use async_trait::async_trait;
use std::io::{self, BufRead, Write};
use tracing::{debug, warn};

/// Asks on the terminal, or answers yes without asking when `assume_yes`.
#[derive(Debug, Clone, Copy)]
pub struct TerminalConfirm {
    assume_yes: bool,
}

impl TerminalConfirm {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

/// `y` or `yes`, case-insensitive; anything else declines.
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[async_trait]
impl Confirm for TerminalConfirm {
    async fn confirm(&self, request: &ConfirmRequest) -> bool {
        if self.assume_yes {
            debug!(?request, "Confirmed by --yes");
            return true;
        }

        let prompt = format!("{}: {} [y/N] ", request.title(), request.message());
        let answer = tokio::task::spawn_blocking(move || -> io::Result<String> {
            let mut stdout = io::stdout();
            stdout.write_all(prompt.as_bytes())?;
            stdout.flush()?;
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            Ok(line)
        })
        .await;

        match answer {
            Ok(Ok(line)) => is_affirmative(&line),
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to read confirmation, declining");
                false
            }
            Err(e) => {
                warn!(error = %e, "Confirmation prompt failed, declining");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("y\n", true)]
    #[case("YES", true)]
    #[case(" yes \n", true)]
    #[case("n", false)]
    #[case("", false)]
    #[case("yep", false)]
    fn given_answer_when_parsing_then_only_yes_confirms(#[case] answer: &str, #[case] expected: bool) {
        assert_eq!(is_affirmative(answer), expected);
    }

    #[tokio::test]
    async fn given_assume_yes_when_confirming_then_does_not_prompt() {
        let confirm = TerminalConfirm::new(true);

        assert!(confirm.confirm(&ConfirmRequest::EmptyTrash { count: 3 }).await);
    }
}
