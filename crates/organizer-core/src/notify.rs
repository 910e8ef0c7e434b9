//! Notification delivery: the side effect a reminder performs when it fires.
//!
//! The scheduler treats delivery as an opaque callback; these types are the
//! callbacks the application binds to each task reminder.

use std::process::Command;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

use crate::config::{NotifierConfig, NotifierKind};
use crate::error::NotifyError;

/// A single reminder ready to be shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Delivers notifications. Called from the scheduler's worker, never from
/// the application thread.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes reminders to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            title = %notification.title,
            message = %notification.message,
            "reminder"
        );
        Ok(())
    }
}

/// Forwards reminders into an mpsc channel for the front end to render.
///
/// Uses `try_send` so a stalled consumer never blocks the reminder worker.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<Notification>,
}

impl ChannelNotifier {
    pub fn new(tx: mpsc::Sender<Notification>) -> Self {
        Self { tx }
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.tx
            .try_send(notification.clone())
            .map_err(|e| NotifyError::Channel(e.to_string()))
    }
}

/// Runs an external desktop notification program as
/// `<program> <title> <message>` (e.g. `notify-send`).
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    program: String,
}

impl CommandNotifier {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let status = Command::new(&self.program)
            .arg(&notification.title)
            .arg(&notification.message)
            .status()
            .map_err(|source| NotifyError::Launch {
                program: self.program.clone(),
                source,
            })?;
        if !status.success() {
            return Err(NotifyError::ExitStatus {
                program: self.program.clone(),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

/// Build the notifier selected in config.
///
/// `Stdout` needs a channel owned by the front end, so callers pass the
/// sender; without one it degrades to logging.
pub fn build_notifier(
    config: &NotifierConfig,
    stdout_tx: Option<mpsc::Sender<Notification>>,
) -> Box<dyn Notifier> {
    match (config.kind, stdout_tx) {
        (NotifierKind::Command, _) => Box::new(CommandNotifier::new(config.command.clone())),
        (NotifierKind::Stdout, Some(tx)) => Box::new(ChannelNotifier::new(tx)),
        (NotifierKind::Stdout, None) | (NotifierKind::Log, _) => Box::new(LogNotifier),
    }
}
