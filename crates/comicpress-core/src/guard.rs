//! Unsaved-changes guard
//!
//! Wraps a navigation so a dirty page is saved before the user leaves it.
//! Navigation runs only after the save succeeds; a failed save blocks the
//! navigation and keeps the error for display so the user can retry.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::{debug, warn};

/// Result of an intercepted navigation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// Nothing to save; navigated immediately
    Proceeded,
    /// Saved the pending edits, then navigated
    SavedThenProceeded,
    /// Save failed; navigation suppressed
    Blocked(String),
    /// Another intercepted navigation is still saving; this one was ignored
    AlreadySaving,
}

impl NavigationOutcome {
    pub fn navigated(&self) -> bool {
        matches!(
            self,
            NavigationOutcome::Proceeded | NavigationOutcome::SavedThenProceeded
        )
    }
}

#[derive(Debug, Default)]
pub struct NavigationGuard {
    saving: AtomicBool,
    last_error: Mutex<Option<String>>,
}

impl NavigationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a save triggered by the guard is in flight
    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::SeqCst)
    }

    /// Error from the last blocked navigation
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|slot| slot.clone())
    }

    pub fn clear_error(&self) {
        self.set_error(None);
    }

    /// Run `navigate`, saving first when `dirty`
    ///
    /// `navigate` is never called before `save` resolves, and never called
    /// at all when `save` fails.
    pub async fn intercept_navigation<S, Fut, E, N>(
        &self,
        dirty: bool,
        save: S,
        navigate: N,
    ) -> NavigationOutcome
    where
        S: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
        N: FnOnce(),
    {
        if !dirty {
            navigate();
            return NavigationOutcome::Proceeded;
        }

        if self.saving.swap(true, Ordering::SeqCst) {
            debug!("Navigation ignored: save already in flight");
            return NavigationOutcome::AlreadySaving;
        }
        let _in_flight = InFlight(&self.saving);

        match save().await {
            Ok(()) => {
                self.set_error(None);
                navigate();
                NavigationOutcome::SavedThenProceeded
            }
            Err(e) => {
                let message = format!("Failed to save changes: {}", e);
                warn!("{}", message);
                self.set_error(Some(message.clone()));
                NavigationOutcome::Blocked(message)
            }
        }
    }

    fn set_error(&self, error: Option<String>) {
        if let Ok(mut slot) = self.last_error.lock() {
            *slot = error;
        }
    }
}

/// Clears the in-flight flag when the save finishes or is abandoned
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
