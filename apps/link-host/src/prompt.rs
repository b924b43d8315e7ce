//! Console stand-in for the host's approval dialog.

use std::io::{Write, stdout};

use log::warn;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin, stdin};

/// Interprets an answer to the approval question. Anything but an explicit
/// yes is a denial.
pub fn is_approval(answer: &str) -> bool {
    matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    )
}

/// Asks on stdin whether workers may pair.
pub struct ApprovalPrompt {
    lines: Lines<BufReader<Stdin>>,
}

impl ApprovalPrompt {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(stdin()).lines(),
        }
    }

    /// Ask about `process_id` and wait for the answer. End of input denies.
    pub async fn ask(&mut self, process_id: &str) -> bool {
        print!("Worker {process_id} requests to pair with this host. Approve? [y/N] ");
        if let Err(e) = stdout().flush() {
            warn!("Failed to flush approval prompt: {}", e);
        }

        match self.lines.next_line().await {
            Ok(Some(answer)) => is_approval(&answer),
            Ok(None) => false,
            Err(e) => {
                warn!("Failed to read approval answer: {}", e);
                false
            }
        }
    }
}

impl Default for ApprovalPrompt {
    fn default() -> Self {
        Self::new()
    }
}
