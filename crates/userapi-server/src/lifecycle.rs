//! Server lifecycle states and post-shutdown callbacks.
//!
//! A [`Server`](crate::Server) moves through
//! `Configured -> Serving -> Draining -> Stopped` exactly once. After the
//! drain completes, the [`ShutdownHooks`] registered by the caller run in
//! registration order; the first failure stops the remaining hooks.
//!
//! # Example
//!
//! ```rust
//! use userapi_server::{LifecycleError, ShutdownHooks};
//!
//! let hooks = ShutdownHooks::new()
//!     .on_shutdown("flush_spans", || async { Ok(()) })
//!     .on_shutdown("close_pool", || async {
//!         Err(LifecycleError::new("pool already closed"))
//!     });
//!
//! assert_eq!(hooks.len(), 2);
//! ```

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};

use futures_util::future::BoxFuture;
use thiserror::Error;

/// Error type for shutdown hook failures.
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// A named shutdown hook returned an error.
    #[error("Shutdown hook '{name}' failed: {message}")]
    HookFailed {
        /// Hook name as registered
        name: String,
        /// Failure description
        message: String,
        /// Optional source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Error raised from inside a hook, before the hook name is attached.
    #[error("{message}")]
    Hook {
        /// Failure description
        message: String,
        /// Optional source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl LifecycleError {
    /// Creates a hook error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self::Hook {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a hook error wrapping a source error.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Hook {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns the name of the failing hook, once attached.
    #[must_use]
    pub fn hook_name(&self) -> Option<&str> {
        match self {
            Self::HookFailed { name, .. } => Some(name),
            Self::Hook { .. } => None,
        }
    }

    fn attach_name(self, name: &str) -> Self {
        match self {
            Self::Hook { message, source } => Self::HookFailed {
                name: name.to_string(),
                message,
                source,
            },
            named @ Self::HookFailed { .. } => named,
        }
    }
}

/// Result type for shutdown hooks.
pub type LifecycleResult<T = ()> = Result<T, LifecycleError>;

type ShutdownHook = Box<dyn FnOnce() -> BoxFuture<'static, LifecycleResult> + Send>;

/// Ordered cleanup callbacks run after the server has drained.
///
/// Hooks run at most once, in the order they were registered.
#[must_use]
#[derive(Default)]
pub struct ShutdownHooks {
    hooks: Vec<(String, ShutdownHook)>,
}

impl fmt::Debug for ShutdownHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownHooks")
            .field(
                "hooks",
                &self.hooks.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ShutdownHooks {
    /// Creates an empty hook list.
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Registers a named hook.
    pub fn on_shutdown<F, Fut>(mut self, name: impl Into<String>, hook: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = LifecycleResult> + Send + 'static,
    {
        let hook: ShutdownHook = Box::new(move || Box::pin(hook()));
        self.hooks.push((name.into(), hook));
        self
    }

    /// Returns the number of registered hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns `true` if no hooks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Runs every hook in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first hook error, tagged with the hook's name.
    pub async fn run(self) -> LifecycleResult {
        for (name, hook) in self.hooks {
            tracing::debug!(hook = %name, "Running shutdown hook");
            if let Err(e) = hook().await {
                let e = e.attach_name(&name);
                tracing::error!(hook = %name, error = %e, "Shutdown hook failed");
                return Err(e);
            }
        }
        Ok(())
    }
}

/// Lifecycle state of a [`Server`](crate::Server).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    /// Built and validated, never served
    Configured = 0,
    /// Accepting connections
    Serving = 1,
    /// Listener closed, waiting for in-flight requests
    Draining = 2,
    /// Fully stopped
    Stopped = 3,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Configured,
            1 => Self::Serving,
            2 => Self::Draining,
            _ => Self::Stopped,
        }
    }

    /// Lowercase state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Configured => "configured",
            Self::Serving => "serving",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic holder for a [`LifecycleState`].
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: LifecycleState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn get(&self) -> LifecycleState {
        LifecycleState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Moves `from -> to`, or reports the state actually found.
    pub(crate) fn transition(
        &self,
        from: LifecycleState,
        to: LifecycleState,
    ) -> Result<(), LifecycleState> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(LifecycleState::from_u8)
    }

    pub(crate) fn set(&self, state: LifecycleState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording_hook(
        log: &Arc<Mutex<Vec<&'static str>>>,
        name: &'static str,
        fail: bool,
    ) -> impl FnOnce() -> BoxFuture<'static, LifecycleResult> + Send + 'static {
        let log = Arc::clone(log);
        move || -> BoxFuture<'static, LifecycleResult> {
            Box::pin(async move {
                log.lock().unwrap().push(name);
                if fail {
                    Err(LifecycleError::new("boom"))
                } else {
                    Ok(())
                }
            })
        }
    }

    #[tokio::test]
    async fn test_hooks_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hooks = ShutdownHooks::new()
            .on_shutdown("first", recording_hook(&log, "first", false))
            .on_shutdown("second", recording_hook(&log, "second", false))
            .on_shutdown("third", recording_hook(&log, "third", false));

        hooks.run().await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_first_failure_stops_remaining_hooks() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hooks = ShutdownHooks::new()
            .on_shutdown("first", recording_hook(&log, "first", false))
            .on_shutdown("second", recording_hook(&log, "second", true))
            .on_shutdown("third", recording_hook(&log, "third", false));

        let err = hooks.run().await.unwrap_err();
        assert_eq!(err.hook_name(), Some("second"));
        assert_eq!(err.to_string(), "Shutdown hook 'second' failed: boom");
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_empty_hooks() {
        let hooks = ShutdownHooks::new();
        assert!(hooks.is_empty());
        assert!(hooks.run().await.is_ok());
    }

    #[test]
    fn test_error_with_source() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err = LifecycleError::with_source("flush failed", io).attach_name("flush");

        assert!(err.to_string().contains("flush failed"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_hooks_debug_lists_names() {
        let hooks = ShutdownHooks::new().on_shutdown("flush", || async { Ok(()) });
        assert!(format!("{hooks:?}").contains("flush"));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(LifecycleState::Configured.to_string(), "configured");
        assert_eq!(LifecycleState::Serving.to_string(), "serving");
        assert_eq!(LifecycleState::Draining.to_string(), "draining");
        assert_eq!(LifecycleState::Stopped.to_string(), "stopped");
    }

    #[test]
    fn test_state_transitions() {
        let cell = StateCell::new(LifecycleState::Configured);

        assert!(cell
            .transition(LifecycleState::Configured, LifecycleState::Serving)
            .is_ok());
        assert_eq!(cell.get(), LifecycleState::Serving);

        let found = cell
            .transition(LifecycleState::Configured, LifecycleState::Serving)
            .unwrap_err();
        assert_eq!(found, LifecycleState::Serving);

        cell.set(LifecycleState::Stopped);
        assert_eq!(cell.get(), LifecycleState::Stopped);
    }
}
