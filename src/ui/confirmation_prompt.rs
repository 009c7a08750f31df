// Copyright 2026 Daniel Pelikan
// SPDX-License-Identifier: Apache-2.0

//! Yes/no confirmation on the console.

use async_trait::async_trait;
use std::io::Write;
use tokio::io::AsyncBufRead;
use tracing::{info, warn};

use super::SharedLines;
use crate::session::ConfirmPrompt;

/// Asks questions on stdout and reads the answer from the console input.
///
/// Anything but "y"/"yes" declines, as does closed input.
pub struct StdinConfirm<R> {
    input: SharedLines<R>,
}

impl<R> StdinConfirm<R> {
    pub fn new(input: SharedLines<R>) -> Self {
        Self { input }
    }
}

#[async_trait]
impl<R> ConfirmPrompt for StdinConfirm<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    async fn confirm(&self, question: &str) -> bool {
        print!("{} [y/N] ", question);
        let _ = std::io::stdout().flush();

        let answer = self.input.lock().await.next_line().await;
        let approved = match answer {
            Ok(Some(answer)) => is_yes(&answer),
            Ok(None) => false,
            Err(e) => {
                warn!("Failed to read confirmation: {}", e);
                false
            }
        };
        info!("{} {}", question, if approved { "approved" } else { "declined" });
        approved
    }
}

pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::sync::Mutex;

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y"));
        assert!(is_yes(" YES \n"));
        assert!(!is_yes(""));
        assert!(!is_yes("n"));
        assert!(!is_yes("yep"));
    }

    #[tokio::test]
    async fn test_reads_answer_from_shared_input() {
        let input: &'static [u8] = b"y\nno\n";
        let lines = Arc::new(Mutex::new(BufReader::new(input).lines()));
        let prompt = StdinConfirm::new(lines.clone());

        assert!(prompt.confirm("Reset Pillbox 1?").await);
        assert!(!prompt.confirm("Reset Pillbox 1?").await);
        // input exhausted
        assert!(!prompt.confirm("Reset Pillbox 1?").await);
    }
}
