//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. On first access, the memo runs its computation and caches the result.
//!
//! 2. When accessed again, if no dependencies have changed, returns cached value.
//!
//! 3. When a dependency changes, the memo is marked `Dirty` (direct
//!    dependency) or `MaybeDirty` (something further upstream changed).
//!
//! 4. On next access, a `MaybeDirty` memo first re-checks its own derived
//!    dependencies. If none of them produced a new value it is marked clean
//!    without running.
//!
//! 5. When a recompute produces a value equal to the cached one, nothing
//!    downstream is re-run.
//!
//! # Why This Matters
//!
//! This "lazy" approach avoids unnecessary recomputation:
//!
//! - A signal changes
//! - 10 memos depend on it
//! - Only the memos actually accessed will recompute
//! - Memos that are never read stay dirty (no wasted work)
//!
//! # Failure
//!
//! If the computation panics, the cached value and the dependency edges of
//! the previous run are kept and the memo stays dirty, so the next read
//! tries again.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{trace, warn};

use super::context::ReactiveContext;
use super::runtime::Runtime;
use super::scope::{Ownable, Owned, Scope, WeakScope};
use super::signal::EqualsFn;
use super::subscriber::Subscriber;
use crate::error::{catch_reactive, raise_on_err, ReactiveError};
use crate::graph::{DirtyState, NodeId, NodeKind};

type ComputeFn<T> = Box<dyn Fn() -> T>;

struct MemoInner<T> {
    id: NodeId,
    compute: RefCell<Option<ComputeFn<T>>>,
    /// `None` until the first successful run.
    value: RefCell<Option<T>>,
    equals: EqualsFn<T>,
    /// Owns whatever a run creates; reset before every run.
    scope: Scope,
    owner: RefCell<WeakScope>,
    disposed: Cell<bool>,
    recomputes: Cell<usize>,
}

impl<T: 'static> MemoInner<T> {
    /// Bring the cached value up to date.
    fn refresh(&self) {
        if ReactiveContext::is_running(self.id) {
            ReactiveError::cycle(self.id).raise();
        }
        Runtime::update_if_necessary(self.id);
    }

    /// Compute once, untracked, for a memo disposed before its first read,
    /// then let go of the computation.
    fn compute_detached(&self) {
        let Some(compute) = self.compute.borrow_mut().take() else {
            return;
        };

        trace!(memo = %self.id, "computing disposed memo once");
        let next = {
            let _frame = ReactiveContext::untracked();
            self.scope.run(compute)
        };
        self.recomputes.set(self.recomputes.get() + 1);
        let previous = self.value.replace(Some(next));
        drop(previous);
    }
}

impl<T: 'static> Subscriber for MemoInner<T> {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn run(&self) {
        if self.disposed.get() {
            return;
        }
        if ReactiveContext::is_running(self.id) {
            ReactiveError::cycle(self.id).raise();
        }

        self.scope.reset();

        let next = {
            let compute = self.compute.borrow();
            let Some(compute) = compute.as_ref() else {
                return;
            };

            trace!(memo = %self.id, "recomputing memo");
            let frame = ReactiveContext::enter(self.id);
            let next = self.scope.run(compute);
            let reads = frame.finish();
            Runtime::commit_dependencies(self.id, &reads);
            next
        };

        self.recomputes.set(self.recomputes.get() + 1);

        let changed = match self.value.borrow().as_ref() {
            Some(previous) => !(self.equals)(previous, &next),
            None => true,
        };
        if changed {
            let previous = self.value.replace(Some(next));
            drop(previous);
        }

        Runtime::mark_clean(self.id);
        if changed {
            Runtime::confirm_dependents_dirty(self.id);
        }
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        trace!(memo = %self.id, "disposing memo");

        Runtime::unregister(self.id);
        self.scope.dispose();
        let owner = self.owner.borrow().upgrade();
        if let Some(owner) = owner {
            owner.release(self.id);
        }

        // Never produced a value: kept for one computation on a later read.
        if self.value.borrow().is_none() {
            return;
        }

        // Still borrowed if the memo disposed itself mid-run; freed on drop then.
        let compute = self
            .compute
            .try_borrow_mut()
            .ok()
            .and_then(|mut compute| compute.take());
        drop(compute);
    }

    fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    fn set_owner(&self, owner: &Scope) -> Option<Scope> {
        self.scope.set_parent(owner);
        self.owner.replace(owner.downgrade()).upgrade()
    }
}

impl<T> Drop for MemoInner<T> {
    fn drop(&mut self) {
        if !self.disposed.get() {
            Runtime::unregister(self.id);
            if let Some(owner) = self.owner.get_mut().upgrade() {
                owner.release(self.id);
            }
        }
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// # Example
///
/// ```rust
/// use nadi_core::reactive::{Memo, Signal};
///
/// let count = Signal::new(2);
/// let squared = {
///     let count = count.clone();
///     Memo::new(move || count.get() * count.get())
/// };
///
/// assert_eq!(squared.get(), 4);
/// count.set(3);
/// assert_eq!(squared.get(), 9);
/// ```
pub struct Memo<T> {
    inner: Rc<MemoInner<T>>,
}

impl<T: PartialEq + 'static> Memo<T> {
    /// Create a new memo with the given computation function.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new(compute: impl Fn() -> T + 'static) -> Self {
        Self::with_equality(compute, |a, b| a == b)
    }
}

impl<T: 'static> Memo<T> {
    /// Create a memo whose change detection uses `equals`.
    ///
    /// The memo is owned by the current scope, if there is one, and is
    /// disposed with it.
    pub fn with_equality(
        compute: impl Fn() -> T + 'static,
        equals: impl Fn(&T, &T) -> bool + 'static,
    ) -> Self {
        let id = NodeId::new();
        let owner = Scope::current();
        let scope = match &owner {
            Some(owner) => owner.detached_child(),
            None => Scope::unowned(),
        };

        let inner = Rc::new(MemoInner {
            id,
            compute: RefCell::new(Some(Box::new(compute))),
            value: RefCell::new(None),
            equals: Box::new(equals),
            scope,
            owner: RefCell::new(owner.as_ref().map(Scope::downgrade).unwrap_or_default()),
            disposed: Cell::new(false),
            recomputes: Cell::new(0),
        });

        let weak: Weak<dyn Subscriber> = Rc::downgrade(&inner) as Weak<dyn Subscriber>;
        Runtime::register_computation(id, NodeKind::Derived, weak.clone());

        if let Some(owner) = owner {
            if owner.is_disposed() {
                warn!(memo = %id, "memo created inside a disposed scope");
            }
            owner.adopt(Owned::Weak(id, weak));
        }

        Self { inner }
    }

    /// Get the memo's node id.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// This is the main entry point for reading a memo's value.
    ///
    /// # Panics
    ///
    /// Raises [`ReactiveError`] on a dependency cycle. Panics raised by the
    /// computation itself propagate unchanged.
    ///
    /// A memo disposed before it was ever read computes once, untracked, on
    /// its first read. Only a memo that disposed itself during its first run
    /// has no value to give and raises [`ReactiveError::Disposed`].
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Fallible form of [`get`](Self::get).
    pub fn try_get(&self) -> Result<T, ReactiveError>
    where
        T: Clone,
    {
        self.try_with(T::clone)
    }

    /// Borrow the current value, recomputing if necessary.
    pub fn with<U>(&self, f: impl FnOnce(&T) -> U) -> U {
        raise_on_err(self.try_with(f))
    }

    /// Fallible form of [`with`](Self::with).
    ///
    /// A disposed memo answers with its last value and is never tracked.
    pub fn try_with<U>(&self, f: impl FnOnce(&T) -> U) -> Result<U, ReactiveError> {
        let inner = &self.inner;
        if !inner.disposed.get() {
            ReactiveContext::track_dependency(inner.id);
            catch_reactive(|| {
                inner.refresh();
                Ok(())
            })?;
        } else if inner.value.borrow().is_none() {
            catch_reactive(|| {
                inner.compute_detached();
                Ok(())
            })?;
        }

        let value = inner.value.borrow();
        value
            .as_ref()
            .map(f)
            .ok_or(ReactiveError::Disposed { node: inner.id })
    }

    /// Read without tracking; still recomputes if needed.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        super::context::untrack(|| self.get())
    }

    /// The cached value, without tracking or recomputing.
    pub fn peek(&self) -> Option<T>
    where
        T: Clone,
    {
        self.inner.value.borrow().clone()
    }

    /// Dispose the memo: it leaves the graph and keeps its last value.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Get the current dirty state; `None` once disposed.
    pub fn state(&self) -> Option<DirtyState> {
        Runtime::dirty_state(self.inner.id)
    }

    /// Check if the memo has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// How many times the computation completed.
    pub fn recompute_count(&self) -> usize {
        self.inner.recomputes.get()
    }

    /// Get the number of nodes read by the last run.
    pub fn dependency_count(&self) -> usize {
        Runtime::dependency_count(self.inner.id)
    }

    /// Get the number of dependents.
    pub fn dependent_count(&self) -> usize {
        Runtime::dependent_count(self.inner.id)
    }
}

impl<T> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> From<&Memo<T>> for Ownable {
    fn from(memo: &Memo<T>) -> Self {
        let weak: Weak<dyn Subscriber> = Rc::downgrade(&memo.inner) as Weak<dyn Subscriber>;
        Ownable::computation(Owned::Weak(memo.inner.id, weak))
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("value", &*self.inner.value.borrow())
            .field("dependent_count", &self.dependent_count())
            .finish()
    }
}

/// Create a memo; see [`Memo::new`].
pub fn computed<T: PartialEq + 'static>(compute: impl Fn() -> T + 'static) -> Memo<T> {
    Memo::new(compute)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
