//! Cooperative cancellation shared by the producer and the converter pool.
//!
//! A [`CancelToken`] is a flag plus a channel whose only sender is dropped on
//! cancellation. Blocking points `select!` on [`CancelToken::signal`] next to
//! their real operation, so a cancelled import wakes every blocked thread at
//! once instead of waiting for a poll.

use crate::error::ImportError;
use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::warn;

/// Shared, idempotent cancellation signal.
///
/// Tokens form a tree through [`child`](Self::child): cancelling a token
/// cancels every descendant, never its parent.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

struct TokenInner {
    cancelled: AtomicBool,
    trigger: Mutex<Trigger>,
    signal: Receiver<()>,
}

struct Trigger {
    sender: Option<Sender<()>>,
    children: Vec<Weak<TokenInner>>,
}

impl TokenInner {
    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        let children = {
            let mut trigger = self.trigger.lock().unwrap_or_else(PoisonError::into_inner);
            trigger.sender.take();
            std::mem::take(&mut trigger.children)
        };
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                trigger: Mutex::new(Trigger {
                    sender: Some(tx),
                    children: Vec::new(),
                }),
                signal: rx,
            }),
        }
    }

    /// A new token that is cancelled together with this one but can also be
    /// cancelled on its own. A child of a cancelled token starts cancelled.
    #[must_use]
    pub fn child(&self) -> Self {
        let child = Self::new();
        {
            let mut trigger = self.inner.trigger.lock().unwrap_or_else(PoisonError::into_inner);
            if !self.is_cancelled() {
                trigger.children.retain(|c| c.strong_count() > 0);
                trigger.children.push(Arc::downgrade(&child.inner));
                return child;
            }
        }
        child.cancel();
        child
    }

    /// Raise the signal on this token and its descendants. Calling this
    /// more than once has no further effect.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Receiver that becomes ready (disconnected) once the token is
    /// cancelled. Never yields a message.
    #[must_use]
    pub fn signal(&self) -> &Receiver<()> {
        &self.inner.signal
    }

    /// `Err(Cancelled)` if the token has been raised.
    ///
    /// # Errors
    /// Returns [`ImportError::Cancelled`] after [`cancel`](Self::cancel).
    pub fn check(&self) -> Result<(), ImportError> {
        if self.is_cancelled() {
            Err(ImportError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Slot holding the first error raised by any pipeline thread.
///
/// Recording an error cancels the associated token so siblings stop; the
/// `Cancelled` errors they return afterwards are discarded. A recorded
/// `Cancelled` is replaced by the first real error that follows it, so a
/// panic or failure that triggered the cancellation is still the one
/// reported.
pub struct FirstError {
    slot: Mutex<Option<ImportError>>,
    cancel: CancelToken,
}

impl FirstError {
    #[must_use]
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            slot: Mutex::new(None),
            cancel,
        }
    }

    /// Keep `err` if no real error has been recorded yet, then cancel.
    pub fn record(&self, err: ImportError) {
        {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            let keep = match slot.as_ref() {
                None => true,
                Some(prev) => prev.is_cancelled() && !err.is_cancelled(),
            };
            if keep {
                if !err.is_cancelled() {
                    warn!(error = %err, "import failed, cancelling");
                }
                *slot = Some(err);
            }
        }
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// The recorded error, if any.
    pub fn into_inner(self) -> Option<ImportError> {
        self.slot.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cancels the token if the owning thread unwinds.
pub(crate) struct CancelOnPanic<'a>(pub &'a CancelToken);

impl Drop for CancelOnPanic<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.cancel();
        }
    }
}
