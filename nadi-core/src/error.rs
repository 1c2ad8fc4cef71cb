//! Error types for the reactive runtime.
//!
//! Reads and writes have infallible forms (`get`, `set`, `batch`) and fallible
//! forms (`try_get`, `try_set`, `try_batch`). The infallible forms raise a
//! [`ReactiveError`] as the panic payload; the fallible forms catch exactly that
//! payload at the call boundary and return it. Any other panic, such as one
//! raised by user code inside an effect, passes through untouched.
//!
//! Raising bypasses the panic hook, so an error returned by a `try_*` call
//! prints nothing. A raised error nobody catches still ends the thread like
//! any panic, with the hook silent.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::graph::NodeId;

/// Errors raised by the reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReactiveError {
    /// Propagation never settled.
    #[error("infinite reaction: {cause}")]
    InfiniteReaction {
        /// What made the runtime give up.
        cause: InfiniteReactionCause,
    },

    /// A disposed memo was read before it ever produced a value.
    #[error("{node} was disposed before it produced a value")]
    Disposed {
        /// The disposed memo.
        node: NodeId,
    },
}

/// Why a reaction was declared infinite.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InfiniteReactionCause {
    /// A flush needed more rounds than the configured cap.
    #[error("flush did not settle after {rounds} rounds")]
    FlushLimit {
        /// The cap that was exceeded.
        rounds: usize,
    },

    /// A memo was read while it was computing itself.
    #[error("{node} depends on itself")]
    Cycle {
        /// The memo that was re-entered.
        node: NodeId,
    },
}

impl ReactiveError {
    pub(crate) fn flush_limit(rounds: usize) -> Self {
        Self::InfiniteReaction {
            cause: InfiniteReactionCause::FlushLimit { rounds },
        }
    }

    pub(crate) fn cycle(node: NodeId) -> Self {
        Self::InfiniteReaction {
            cause: InfiniteReactionCause::Cycle { node },
        }
    }

    /// Whether this is an infinite reaction of any cause.
    pub fn is_infinite_reaction(&self) -> bool {
        matches!(self, Self::InfiniteReaction { .. })
    }

    /// Raise this error as a panic payload without invoking the panic hook.
    pub(crate) fn raise(self) -> ! {
        panic::resume_unwind(Box::new(self))
    }
}

/// Convert a fallible result into a value, raising the error as a panic.
pub(crate) fn raise_on_err<T>(result: Result<T, ReactiveError>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => err.raise(),
    }
}

/// Run `f`, turning a [`ReactiveError`] panic payload back into an `Err`.
pub(crate) fn catch_reactive<T, F>(f: F) -> Result<T, ReactiveError>
where
    F: FnOnce() -> Result<T, ReactiveError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(reactive_payload(payload)),
    }
}

fn reactive_payload(payload: Box<dyn Any + Send>) -> ReactiveError {
    match payload.downcast::<ReactiveError>() {
        Ok(err) => *err,
        Err(other) => panic::resume_unwind(other),
    }
}
