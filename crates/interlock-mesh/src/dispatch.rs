//! Signal dispatcher: kind → ordered handler lists with fallback and
//! wildcard registrations.
//!
//! Failure isolation is the hard contract here: a handler that errors or
//! panics is logged and counted, and neither prevents sibling handlers from
//! running nor escapes to the socket receive loop. One misbehaving consumer
//! must never take down the mesh listener.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::warn;

use interlock_core::{Signal, SignalMeta};

/// Handler outcome; errors are logged and counted, never propagated.
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// A registered signal consumer.
///
/// Handlers run inline on the receive loop and must return quickly; slow or
/// blocking work belongs in a task the handler spawns itself.
pub type SignalHandler = Arc<dyn Fn(&Signal, &SignalMeta) -> HandlerResult + Send + Sync>;

/// Result of routing one signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteOutcome {
    /// Handlers invoked for the signal.
    pub invoked: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

/// Registry mapping signal kinds to ordered handler lists.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<u16, Vec<SignalHandler>>,
    wildcard: Vec<SignalHandler>,
    fallback: Option<SignalHandler>,
}

impl Dispatcher {
    /// Appends a handler for `kind`; all handlers registered for a kind are
    /// invoked, in registration order.
    pub fn on(&mut self, kind: u16, handler: SignalHandler) {
        self.handlers.entry(kind).or_default().push(handler);
    }

    /// Appends a wildcard handler, invoked for every routed signal in
    /// addition to (not instead of) kind-specific handlers.
    pub fn on_any(&mut self, handler: SignalHandler) {
        self.wildcard.push(handler);
    }

    /// Sets the fallback handler, invoked only when no kind-specific
    /// handler exists for a signal's kind.
    pub fn set_default(&mut self, handler: SignalHandler) {
        self.fallback = Some(handler);
    }

    /// Removes all handlers for `kind`.
    pub fn off(&mut self, kind: u16) {
        self.handlers.remove(&kind);
    }

    /// Removes every registration including wildcard and fallback.
    pub fn clear(&mut self) {
        self.handlers.clear();
        self.wildcard.clear();
        self.fallback = None;
    }

    /// Handlers that would run for `kind`, in invocation order.
    pub fn handlers_for(&self, kind: u16) -> Vec<SignalHandler> {
        let mut selected: Vec<SignalHandler> = Vec::new();
        match self.handlers.get(&kind) {
            Some(specific) if !specific.is_empty() => selected.extend(specific.iter().cloned()),
            _ => {
                if let Some(fallback) = &self.fallback {
                    selected.push(Arc::clone(fallback));
                }
            }
        }
        selected.extend(self.wildcard.iter().cloned());
        selected
    }

    /// Invokes every matching handler for an admitted signal.
    pub fn route(&self, signal: &Signal, meta: &SignalMeta) -> RouteOutcome {
        invoke_all(&self.handlers_for(signal.kind), signal, meta)
    }
}

/// Invokes a pre-selected handler list with per-handler failure isolation.
///
/// Split out of [`Dispatcher::route`] so the socket receive loop can select
/// handlers under its registry lock, release it, then invoke.
pub fn invoke_all(handlers: &[SignalHandler], signal: &Signal, meta: &SignalMeta) -> RouteOutcome {
    let mut outcome = RouteOutcome::default();
    for handler in handlers {
        outcome.invoked += 1;
        match catch_unwind(AssertUnwindSafe(|| handler(signal, meta))) {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                outcome.failed += 1;
                warn!(kind = signal.kind, sender = %signal.sender, %error, "signal handler failed");
            }
            Err(_) => {
                outcome.failed += 1;
                warn!(kind = signal.kind, sender = %signal.sender, "signal handler panicked");
            }
        }
    }
    outcome
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("kinds", &self.handlers.len())
            .field("wildcard", &self.wildcard.len())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}
