//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect is queued and re-runs during
//!    the next flush, at most once per flush round.
//!
//! 3. Every run records a fresh dependency set. Nodes the previous run read
//!    but this one did not are unsubscribed.
//!
//! # Use Cases
//!
//! Effects are used to synchronize reactive state with the outside world:
//!
//! - Updating the DOM when state changes
//! - Logging state changes
//! - Making network requests
//! - Writing to files
//!
//! # Differences from Memo
//!
//! - Memos return a value; effects do not.
//! - Memos are lazy (compute on access); effects are eager (run when deps change).
//! - Memos are owned weakly by their scope; effects are kept alive by it.
//!
//! # Cleanup
//!
//! Call [`on_cleanup`](super::on_cleanup) inside the effect to register
//! teardown for the current run. Cleanups fire, newest first, before the
//! effect runs again and when it is disposed.
//!
//! # Disposal
//!
//! A disposed effect is inert: it never runs again and never re-subscribes,
//! even if it is still queued in the middle of a flush. Reads made by its
//! final cleanups are not tracked; writes made there propagate normally.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{trace, warn};

use super::context::ReactiveContext;
use super::runtime::Runtime;
use super::scope::{Ownable, Owned, Scope, WeakScope};
use super::subscriber::Subscriber;
use crate::error::raise_on_err;
use crate::graph::{NodeId, NodeKind};
use crate::ssr;

type EffectFn = Box<dyn FnMut()>;

struct EffectInner {
    id: NodeId,
    /// `None` once disposed.
    f: RefCell<Option<EffectFn>>,
    /// Owns whatever a run creates; reset before every run.
    scope: Scope,
    owner: RefCell<WeakScope>,
    disposed: Cell<bool>,
    run_count: Cell<usize>,
}

impl Subscriber for EffectInner {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn run(&self) {
        if self.disposed.get() {
            return;
        }

        // Writes made by this run re-queue it.
        Runtime::mark_clean(self.id);
        self.scope.reset();
        // One of the cleanups may have disposed us.
        if self.disposed.get() {
            return;
        }

        let Ok(mut slot) = self.f.try_borrow_mut() else {
            warn!(effect = %self.id, "effect re-entered its own run; skipping");
            return;
        };
        let Some(f) = slot.as_mut() else {
            return;
        };

        trace!(effect = %self.id, "running effect");
        let frame = ReactiveContext::enter(self.id);
        self.scope.run(|| f());
        let reads = frame.finish();
        drop(slot);

        if self.disposed.get() {
            // Disposed itself mid-run: keep it out of the graph.
            let f = self.f.borrow_mut().take();
            drop(f);
            return;
        }

        Runtime::commit_dependencies(self.id, &reads);
        self.run_count.set(self.run_count.get() + 1);
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        trace!(effect = %self.id, "disposing effect");

        Runtime::unregister(self.id);
        self.scope.dispose();
        let owner = self.owner.borrow().upgrade();
        if let Some(owner) = owner {
            owner.release(self.id);
        }

        // Still borrowed when the effect disposes itself mid-run; `run` drops
        // the closure afterwards.
        let f = self.f.try_borrow_mut().ok().and_then(|mut f| f.take());
        drop(f);
    }

    fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    fn set_owner(&self, owner: &Scope) -> Option<Scope> {
        self.scope.set_parent(owner);
        Runtime::set_owner_order(self.id, owner.order());
        self.owner.replace(owner.downgrade()).upgrade()
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        if !self.disposed.get() {
            Runtime::unregister(self.id);
        }
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use nadi_core::reactive::{create_root, Effect, Signal};
///
/// let count = Signal::new(0);
/// let seen = Rc::new(Cell::new(0));
///
/// let root = create_root(|root| {
///     let (count, seen) = (count.clone(), seen.clone());
///     Effect::new(move || seen.set(count.get()));
///     root
/// });
///
/// count.set(5);
/// assert_eq!(seen.get(), 5);
///
/// root.dispose();
/// count.set(6);
/// assert_eq!(seen.get(), 5);
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    /// Create an effect owned by the current scope and run it once.
    ///
    /// With no current scope the effect is attached to the thread root
    /// scope and lives until it is disposed explicitly. While
    /// [server rendering](crate::ssr) the effect is created inert and never
    /// runs.
    ///
    /// # Panics
    ///
    /// Panics raised by `f` during the first run propagate. A
    /// [`ReactiveError`](crate::error::ReactiveError) from the flush that
    /// follows the first run is raised as well. With
    /// [`FlushMode::Deferred`](crate::FlushMode::Deferred) there is no such
    /// flush: writes made by the first run wait for the next
    /// [`flush`](super::flush) or [`tick`](super::tick).
    pub fn new(f: impl FnMut() + 'static) -> Self {
        let id = NodeId::new();

        if ssr::is_server() {
            trace!(effect = %id, "server rendering; effect will not run");
            return Self::inert(id);
        }

        let owner = Scope::current_or_thread_root("effect");
        if owner.is_disposed() {
            warn!(effect = %id, "effect created inside a disposed scope; it will never run");
            return Self::inert(id);
        }

        let inner = Rc::new(EffectInner {
            id,
            f: RefCell::new(Some(Box::new(f))),
            scope: owner.detached_child(),
            owner: RefCell::new(owner.downgrade()),
            disposed: Cell::new(false),
            run_count: Cell::new(0),
        });

        let weak: Weak<dyn Subscriber> = Rc::downgrade(&inner) as Weak<dyn Subscriber>;
        Runtime::register_computation(id, NodeKind::Effect, weak);
        Runtime::set_owner_order(id, owner.order());
        owner.adopt(Owned::Strong(id, inner.clone()));

        // Writes made by the first run are flushed once it returns, unless
        // flushing is deferred.
        raise_on_err(Runtime::batch_with_flush_mode(|| inner.run()));

        Self { inner }
    }

    fn inert(id: NodeId) -> Self {
        Self {
            inner: Rc::new(EffectInner {
                id,
                f: RefCell::new(None),
                scope: Scope::unowned(),
                owner: RefCell::new(WeakScope::default()),
                disposed: Cell::new(true),
                run_count: Cell::new(0),
            }),
        }
    }

    /// Get the effect's node id.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Dispose the effect: run its cleanups, detach it from every node it
    /// read and never run it again.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Get the number of completed runs.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Get the number of nodes read by the last run.
    pub fn dependency_count(&self) -> usize {
        Runtime::dependency_count(self.inner.id)
    }
}

impl From<&Effect> for Ownable {
    fn from(effect: &Effect) -> Self {
        let strong: Rc<dyn Subscriber> = effect.inner.clone();
        Ownable::computation(Owned::Strong(effect.inner.id, strong))
    }
}

impl From<Effect> for Ownable {
    fn from(effect: Effect) -> Self {
        Self::from(&effect)
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("disposed", &self.is_disposed())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

/// Create an effect; see [`Effect::new`].
///
/// The returned handle disposes the effect through [`Effect::dispose`].
pub fn effect(f: impl FnMut() + 'static) -> Effect {
    Effect::new(f)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
