//! casefile: the headless core of a case and client management app.
//!
//! People, cases and events live in a hosted backend (auth, REST tables and
//! object storage). This crate owns the domain model, the attachment
//! lifecycle, form state, list filtering and the reminders view. A shell
//! (desktop, web or terminal) renders it and supplies the `Notifier` and
//! `Confirm` prompts.

pub mod app;
pub mod attachments;
pub mod auth;
pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod format;
pub mod forms;
pub(crate) mod http;
pub mod i18n;
pub mod listing;
pub mod logging;
pub mod prompt;
pub mod records;
pub mod reminders;
pub mod settings;
pub mod storage;
pub mod testing;

pub use app::App;
pub use config::Config;
pub use error::{Error, Result};
pub use i18n::Language;
