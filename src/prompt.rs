//! User-facing prompts supplied by the embedding shell.

use async_trait::async_trait;

/// Shows a message to the user (an alert dialog, a toast, a status line).
pub trait Notifier: Send + Sync {
    fn alert(&self, message: &str);
}

/// Asks the user a yes/no question.
#[async_trait]
pub trait Confirm: Send + Sync {
    async fn confirm(&self, message: &str) -> bool;
}

/// Notifier for headless use: alerts go to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn alert(&self, message: &str) {
        tracing::warn!(target: "casefile::alert", "{}", message);
    }
}
