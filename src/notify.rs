//! User-visible notifications.

use std::sync::Mutex;

use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
    Error,
}

/// Fire-and-forget sink for messages shown to the user.
pub trait Notifier {
    fn notify(&self, level: Level, message: &str);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, level: Level, message: &str) {
        match level {
            Level::Info => info!(target: "school_drive::notify", "{}", message),
            Level::Warning => warn!(target: "school_drive::notify", "{}", message),
            Level::Error => error!(target: "school_drive::notify", "{}", message),
        }
    }
}

/// Keeps notifications in memory, for callers that render them later.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    messages: Mutex<Vec<(Level, String)>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything collected so far.
    pub fn drain(&self) -> Vec<(Level, String)> {
        match self.messages.lock() {
            Ok(mut messages) => std::mem::take(&mut *messages),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, level: Level, message: &str) {
        let mut messages = match self.messages.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        messages.push((level, message.to_string()));
    }
}

impl<N: Notifier + ?Sized> Notifier for &N {
    fn notify(&self, level: Level, message: &str) {
        (**self).notify(level, message)
    }
}
