//! One-shot open/print queue for a batch of selected attachments.
//!
//! Shells usually cannot open many files from a single click, so the
//! selection becomes a list the user works through; each entry disappears
//! once launched.

use crate::db::Attachment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    Open,
    Print,
}

impl FileAction {
    /// Label key for the queue's title.
    pub fn title_key(self) -> &'static str {
        match self {
            Self::Open => "open_files_title",
            Self::Print => "print_files_title",
        }
    }
}

/// Hands a URL to the operating system.
pub trait Launcher: Send + Sync {
    fn launch(&self, url: &str) -> std::io::Result<()>;
}

/// Opens URLs with the platform's default handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn launch(&self, url: &str) -> std::io::Result<()> {
        open::that(url)
    }
}

#[derive(Debug, Clone)]
pub struct FileActionQueue {
    action: FileAction,
    remaining: Vec<Attachment>,
}

impl FileActionQueue {
    /// Queue the remote attachments among `selected`.
    pub fn new(action: FileAction, selected: Vec<Attachment>) -> Self {
        Self {
            action,
            remaining: selected.into_iter().filter(|a| a.is_remote()).collect(),
        }
    }

    pub fn action(&self) -> FileAction {
        self.action
    }

    pub fn remaining(&self) -> &[Attachment] {
        &self.remaining
    }

    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Remove and return the entry; `None` if already taken.
    pub fn take(&mut self, id: &str) -> Option<Attachment> {
        let index = self.remaining.iter().position(|a| a.id == id)?;
        Some(self.remaining.remove(index))
    }

    /// Take the entry and hand its URL to `launcher`. The entry is consumed
    /// even if launching fails.
    pub fn launch(&mut self, id: &str, launcher: &dyn Launcher) -> std::io::Result<bool> {
        let Some(attachment) = self.take(id) else {
            return Ok(false);
        };
        let Some(url) = attachment.url.as_deref() else {
            return Ok(false);
        };
        tracing::debug!(action = ?self.action, name = %attachment.name, "Launching attachment");
        launcher.launch(url)?;
        Ok(true)
    }
}
