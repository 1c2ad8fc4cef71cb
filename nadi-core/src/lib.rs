//! Nadi Core
//!
//! This crate provides the reactive runtime underneath the Nadi UI framework.
//! It implements:
//!
//! - Reactive primitives (signals, memos, effects)
//! - Dependency tracking and change propagation
//! - Batched, ordered effect scheduling
//! - Ownership scopes with cleanup and bulk disposal
//! - A server-rendering mode in which effects stay inert
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives, scopes and the per-thread runtime
//! - `graph`: Dependency graph, dirty states and the effect queue
//! - `config`: Runtime tunables, loadable from JSON
//! - `error`: Errors raised by the runtime
//! - `ssr`: Server-side rendering entry points
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use nadi_core::reactive::{create_root, Effect, Memo, Signal};
//!
//! let log = Rc::new(RefCell::new(Vec::new()));
//!
//! // Create a signal
//! let count = Signal::new(0);
//!
//! let root = create_root(|root| {
//!     // Create a derived value
//!     let doubled = {
//!         let count = count.clone();
//!         Memo::new(move || count.get() * 2)
//!     };
//!
//!     // Create an effect
//!     let (count, log) = (count.clone(), log.clone());
//!     Effect::new(move || {
//!         log.borrow_mut().push(format!("Count: {}, Doubled: {}", count.get(), doubled.get()));
//!     });
//!     root
//! });
//!
//! // Update the signal
//! count.set(5);
//! // Effect automatically ran
//! assert_eq!(log.borrow().last().unwrap(), "Count: 5, Doubled: 10");
//!
//! root.dispose();
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod ssr;

pub use config::{FlushMode, RuntimeConfig};
pub use error::{InfiniteReactionCause, ReactiveError};
pub use reactive::{
    batch, computed, create_root, create_scope, effect, on_cleanup, signal, untrack, Effect, Memo,
    ReadSignal, Runtime, Scope, Signal, WriteSignal,
};
