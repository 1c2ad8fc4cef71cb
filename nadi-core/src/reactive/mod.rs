//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, memos, effects
//! and the scopes that own them. These primitives form the foundation of
//! Nadi's fine-grained reactivity.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a memo or effect), the read is recorded
//! as a dependency of that context. When the signal's value changes, all
//! dependents are notified.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result. It re-evaluates only when
//! one of its dependencies changes, and only once something reads it.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its dependencies
//! change. Effects are used to synchronize reactive state with external systems,
//! such as updating the DOM or logging.
//!
//! ## Scopes
//!
//! A Scope owns effects, memos, child scopes and cleanup callbacks. Disposing
//! it tears all of them down.
//!
//! # Scheduling
//!
//! A write marks the graph and queues the effects it reached. Outside of a
//! [`batch`], the queue is flushed before the write returns. A flush runs
//! queued effects in the order their owning scopes were created, and effects
//! of one scope in their own creation order. An effect's children live in a
//! scope created with it, so parents run before the children they create.
//! Memos are recomputed on demand while effects read them.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to automatically
//! detect dependencies. When a signal is read, we check if there is an active
//! tracking context and, if so, register the dependency.
//!
//! This approach (sometimes called "automatic dependency tracking" or
//! "transparent reactivity") is used by SolidJS, Vue 3, and Leptos.

mod context;
mod effect;
mod memo;
mod runtime;
mod scope;
mod signal;
mod subscriber;

pub use context::{untrack, ReactiveContext};
pub use effect::{effect, Effect};
pub use memo::{computed, Memo};
pub use runtime::{batch, flush, tick, try_batch, GraphSnapshot, NodeSnapshot, Runtime};
pub use scope::{create_root, create_scope, on_cleanup, CleanupFn, Ownable, Scope};
pub use signal::{signal, signal_with_equality, EqualsFn, ReadSignal, Signal, WriteSignal};
pub use subscriber::Subscriber;
