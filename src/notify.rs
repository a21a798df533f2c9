use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{CrmError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToastLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// A transient user-facing message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Toast {
    pub level: ToastLevel,
    pub title: String,
    pub description: Option<String>,
}

impl Toast {
    pub fn success(title: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Success,
            title: title.into(),
            description: None,
        }
    }

    pub fn warning(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level: ToastLevel::Warning,
            title: title.into(),
            description: Some(description.into()),
        }
    }

    pub fn error(title: impl Into<String>, err: &CrmError) -> Self {
        Self {
            level: ToastLevel::Error,
            title: title.into(),
            description: Some(err.user_message()),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, toast: Toast);
}

/// Collects toasts for the view layer to drain.
#[derive(Default)]
pub struct ToastQueue {
    toasts: Mutex<Vec<Toast>>,
}

impl ToastQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<Toast> {
        std::mem::take(&mut *self.toasts.lock())
    }

    pub fn len(&self) -> usize {
        self.toasts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.toasts.lock().is_empty()
    }
}

impl Notifier for ToastQueue {
    fn notify(&self, toast: Toast) {
        log::debug!("toast [{:?}] {}", toast.level, toast.title);
        self.toasts.lock().push(toast);
    }
}

/// Writes toasts to the log; for headless use.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, toast: Toast) {
        let text = match &toast.description {
            Some(d) => format!("{}: {}", toast.title, d),
            None => toast.title.clone(),
        };
        match toast.level {
            ToastLevel::Success | ToastLevel::Info => log::info!("{}", text),
            ToastLevel::Warning => log::warn!("{}", text),
            ToastLevel::Error => log::error!("{}", text),
        }
    }
}

/// What a call site does with a failed mutation after toasting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnError {
    /// Hand the error back, e.g. to keep a dialog open.
    Rethrow,
    /// The toast is enough; continue as if nothing was returned.
    Swallow,
}

/// Turns a mutation result into a toast.
pub fn report<T>(
    notifier: &dyn Notifier,
    success: &str,
    failure: &str,
    result: Result<T>,
    on_error: OnError,
) -> Result<Option<T>> {
    match result {
        Ok(value) => {
            notifier.notify(Toast::success(success));
            Ok(Some(value))
        }
        Err(e) => {
            notifier.notify(Toast::error(failure, &e));
            match on_error {
                OnError::Rethrow => Err(e),
                OnError::Swallow => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_toasts_and_applies_policy() {
        let queue = ToastQueue::new();

        let ok = report(&queue, "Contact saved", "Save failed", Ok(1), OnError::Rethrow);
        assert_eq!(ok.unwrap(), Some(1));

        let err: Result<u8> = Err(CrmError::Auth("no session".into()));
        let swallowed = report(&queue, "Contact saved", "Save failed", err.clone(), OnError::Swallow);
        assert_eq!(swallowed.unwrap(), None);

        let rethrown = report(&queue, "Contact saved", "Save failed", err, OnError::Rethrow);
        assert!(rethrown.is_err());

        let toasts = queue.drain();
        assert_eq!(toasts.len(), 3);
        assert_eq!(toasts[0].level, ToastLevel::Success);
        assert_eq!(toasts[1].level, ToastLevel::Error);
        assert_eq!(
            toasts[1].description.as_deref(),
            Some("You must be signed in to make changes.")
        );
        assert!(queue.is_empty());
    }
}
