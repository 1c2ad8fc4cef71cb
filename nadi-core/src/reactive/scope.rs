//! Ownership Scopes
//!
//! A Scope owns computations, child scopes and cleanup callbacks. Disposing a
//! scope tears all of them down, which is how a component unmount releases
//! everything its setup created.
//!
//! # Ownership rules
//!
//! - Parents own their children; children only keep a weak back-reference.
//! - Effects are owned strongly: the scope keeps them alive.
//! - Memos are owned weakly: their handles keep them alive, the scope only
//!   disposes them.
//! - Every effect and memo runs inside a private scope of its own. Anything
//!   created or registered with [`on_cleanup`] during a run belongs to that
//!   run and is torn down before the next one.
//!
//! # Root scopes
//!
//! [`create_root`] and [`Scope::root`] create scopes without a parent. A root
//! stays alive until it is disposed, even if every handle to it is dropped.
//!
//! Code that creates an effect with no scope at all attaches it to a
//! per-thread fallback root that is never disposed. Such effects live for
//! the rest of the thread. Prefer creating effects inside [`create_root`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace};

use super::context::ReactiveContext;
use super::subscriber::Subscriber;
use crate::graph::NodeId;

thread_local! {
    /// Currently active owner (if any).
    static OWNER: RefCell<Option<Scope>> = const { RefCell::new(None) };

    /// Root scopes kept alive until they are disposed.
    static ROOTS: RefCell<Vec<Scope>> = const { RefCell::new(Vec::new()) };

    /// Fallback owner for effects created outside of any scope.
    static THREAD_ROOT: Scope = Scope::unowned();
}

/// Cleanup callback type.
pub type CleanupFn = Box<dyn FnOnce()>;

/// A computation held by a scope.
pub(crate) enum Owned {
    /// Kept alive by the scope (effects).
    Strong(NodeId, Rc<dyn Subscriber>),
    /// Kept alive by its handles (memos).
    Weak(NodeId, Weak<dyn Subscriber>),
}

impl Owned {
    fn node_id(&self) -> NodeId {
        match self {
            Owned::Strong(id, _) | Owned::Weak(id, _) => *id,
        }
    }

    fn subscriber(&self) -> Option<Rc<dyn Subscriber>> {
        match self {
            Owned::Strong(_, subscriber) => Some(subscriber.clone()),
            Owned::Weak(_, weak) => weak.upgrade(),
        }
    }

    fn dispose(self) {
        match self {
            Owned::Strong(_, subscriber) => subscriber.dispose(),
            Owned::Weak(_, weak) => {
                if let Some(subscriber) = weak.upgrade() {
                    subscriber.dispose();
                }
            }
        }
    }
}

/// Something a scope can take ownership of: an [`Effect`](super::Effect), a
/// [`Memo`](super::Memo) or another [`Scope`].
pub struct Ownable(OwnableKind);

enum OwnableKind {
    Computation(Owned),
    Scope(Scope),
}

impl Ownable {
    pub(crate) fn computation(owned: Owned) -> Self {
        Self(OwnableKind::Computation(owned))
    }
}

impl From<Scope> for Ownable {
    fn from(scope: Scope) -> Self {
        Self(OwnableKind::Scope(scope))
    }
}

impl From<&Scope> for Ownable {
    fn from(scope: &Scope) -> Self {
        Self(OwnableKind::Scope(scope.clone()))
    }
}

struct ScopeInner {
    id: u64,
    parent: RefCell<Weak<ScopeInner>>,
    children: RefCell<Vec<Scope>>,
    owned: RefCell<Vec<Owned>>,
    cleanups: RefCell<Vec<CleanupFn>>,
    disposed: Cell<bool>,
    root: Cell<bool>,
}

/// A node of the ownership tree.
///
/// Cloning a `Scope` clones the handle; both refer to the same node.
#[derive(Clone)]
pub struct Scope {
    inner: Rc<ScopeInner>,
}

/// Non-owning reference to a scope, used by computations to find the scope
/// that owns them.
#[derive(Clone, Default)]
pub(crate) struct WeakScope(Weak<ScopeInner>);

impl WeakScope {
    pub(crate) fn upgrade(&self) -> Option<Scope> {
        self.0.upgrade().map(|inner| Scope { inner })
    }
}

impl Scope {
    fn with_parent(parent: Weak<ScopeInner>) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self {
            inner: Rc::new(ScopeInner {
                id: COUNTER.fetch_add(1, Ordering::Relaxed),
                parent: RefCell::new(parent),
                children: RefCell::new(Vec::new()),
                owned: RefCell::new(Vec::new()),
                cleanups: RefCell::new(Vec::new()),
                disposed: Cell::new(false),
                root: Cell::new(false),
            }),
        }
    }

    /// A scope nobody owns and nothing keeps alive but its handles.
    pub(crate) fn unowned() -> Self {
        Self::with_parent(Weak::new())
    }

    /// Create a root scope. It stays alive until [`dispose`](Self::dispose)
    /// is called.
    pub fn root() -> Self {
        let scope = Self::unowned();
        scope.inner.root.set(true);
        let _ = ROOTS.try_with(|roots| roots.borrow_mut().push(scope.clone()));
        scope
    }

    /// Create a child of `parent`.
    ///
    /// A child of a disposed scope is created already disposed.
    pub fn child_of(parent: &Scope) -> Self {
        let child = Self::with_parent(Rc::downgrade(&parent.inner));
        if parent.is_disposed() {
            child.inner.disposed.set(true);
        } else {
            parent.inner.children.borrow_mut().push(child.clone());
        }
        child
    }

    /// Create a scope under the current owner, or a new root if there is no
    /// owner.
    pub fn new() -> Self {
        match Self::current() {
            Some(parent) => Self::child_of(&parent),
            None => Self::root(),
        }
    }

    /// The private scope of a computation: it points at `self` but is owned by
    /// the computation, not listed among `self`'s children.
    pub(crate) fn detached_child(&self) -> Self {
        Self::with_parent(Rc::downgrade(&self.inner))
    }

    /// The currently active owner, if any.
    pub fn current() -> Option<Scope> {
        OWNER.try_with(|owner| owner.borrow().clone()).ok().flatten()
    }

    /// The current owner, falling back to the per-thread root scope.
    pub(crate) fn current_or_thread_root(what: &'static str) -> Scope {
        Self::current().unwrap_or_else(|| {
            debug!(
                computation = what,
                "created outside of any scope; attaching it to the thread root scope, which is never disposed"
            );
            THREAD_ROOT.with(Scope::clone)
        })
    }

    pub(crate) fn downgrade(&self) -> WeakScope {
        WeakScope(Rc::downgrade(&self.inner))
    }

    /// Run `f` with this scope as the current owner.
    ///
    /// Computations and cleanups created inside `f` belong to this scope.
    pub fn run<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = OwnerGuard::swap(Some(self.clone()));
        f()
    }

    /// Take ownership of an effect, memo or scope.
    ///
    /// The item is moved under this scope and released by its previous
    /// owner. Anything handed to a disposed scope is disposed immediately.
    pub fn own(&self, item: impl Into<Ownable>) {
        match item.into().0 {
            OwnableKind::Computation(owned) => self.adopt_computation(owned),
            OwnableKind::Scope(child) => self.adopt_scope(child),
        }
    }

    fn adopt_computation(&self, owned: Owned) {
        let Some(subscriber) = owned.subscriber() else {
            return;
        };
        if subscriber.is_disposed() {
            return;
        }

        if let Some(previous) = subscriber.set_owner(self) {
            if previous.ptr_eq(self) {
                return;
            }
            previous.release(owned.node_id());
        }
        drop(subscriber);
        self.adopt(owned);
    }

    /// Creation order of this scope.
    pub(crate) fn order(&self) -> u64 {
        self.inner.id
    }

    pub(crate) fn set_parent(&self, parent: &Scope) {
        *self.inner.parent.borrow_mut() = Rc::downgrade(&parent.inner);
    }

    pub(crate) fn adopt(&self, owned: Owned) {
        if self.is_disposed() {
            owned.dispose();
            return;
        }
        self.inner.owned.borrow_mut().push(owned);
    }

    fn adopt_scope(&self, child: Scope) {
        if Rc::ptr_eq(&self.inner, &child.inner) || child.is_disposed() {
            return;
        }

        child.detach();
        *child.inner.parent.borrow_mut() = Rc::downgrade(&self.inner);

        if self.is_disposed() {
            child.dispose();
        } else {
            self.inner.children.borrow_mut().push(child);
        }
    }

    /// Forget an owned computation, e.g. because it was disposed on its own.
    pub(crate) fn release(&self, node_id: NodeId) {
        let mut owned = self.inner.owned.borrow_mut();
        let Some(position) = owned.iter().position(|entry| entry.node_id() == node_id) else {
            return;
        };
        let entry = owned.remove(position);
        drop(owned);
        // Dropped after the borrow ends: it may be the last strong reference.
        drop(entry);
    }

    /// Register a callback to run when this scope is disposed, or, for the
    /// private scope of a computation, before the computation runs again.
    ///
    /// Callbacks run in reverse registration order. Registering on a disposed
    /// scope runs the callback immediately.
    pub fn on_cleanup(&self, f: impl FnOnce() + 'static) {
        if self.is_disposed() {
            let _frame = ReactiveContext::untracked();
            f();
            return;
        }
        self.inner.cleanups.borrow_mut().push(Box::new(f));
    }

    /// Dispose this scope: child scopes first, then owned computations, then
    /// cleanups in reverse registration order.
    ///
    /// Disposing an already disposed scope does nothing.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        trace!(scope = self.inner.id, "disposing scope");

        self.teardown();
        self.detach();
    }

    /// Tear down everything the scope owns but keep the scope usable.
    pub(crate) fn reset(&self) {
        self.teardown();
    }

    fn teardown(&self) {
        let children = std::mem::take(&mut *self.inner.children.borrow_mut());
        for child in children.into_iter().rev() {
            child.dispose();
        }

        let owned = std::mem::take(&mut *self.inner.owned.borrow_mut());
        for entry in owned.into_iter().rev() {
            entry.dispose();
        }

        let cleanups = std::mem::take(&mut *self.inner.cleanups.borrow_mut());
        if !cleanups.is_empty() {
            let _frame = ReactiveContext::untracked();
            for cleanup in cleanups.into_iter().rev() {
                cleanup();
            }
        }
    }

    /// Remove this scope from its parent's children, or from the live roots.
    fn detach(&self) {
        if self.inner.root.replace(false) {
            let _ = ROOTS.try_with(|roots| {
                let removed: Vec<Scope> = {
                    let mut roots = roots.borrow_mut();
                    let (removed, kept) = std::mem::take(&mut *roots)
                        .into_iter()
                        .partition(|scope| Rc::ptr_eq(&scope.inner, &self.inner));
                    *roots = kept;
                    removed
                };
                drop(removed);
            });
        }

        let parent = std::mem::take(&mut *self.inner.parent.borrow_mut());
        if let Some(parent) = parent.upgrade() {
            let removed: Vec<Scope> = {
                let mut children = parent.children.borrow_mut();
                let (removed, kept) = std::mem::take(&mut *children)
                    .into_iter()
                    .partition(|child| Rc::ptr_eq(&child.inner, &self.inner));
                *children = kept;
                removed
            };
            drop(removed);
        }
    }

    /// Whether this scope has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// The parent scope, if it is still alive.
    pub fn parent(&self) -> Option<Scope> {
        self.inner.parent.borrow().upgrade().map(|inner| Scope { inner })
    }

    /// Number of live child scopes.
    pub fn child_count(&self) -> usize {
        self.inner.children.borrow().len()
    }

    /// Number of computations owned by this scope.
    pub fn owned_count(&self) -> usize {
        self.inner.owned.borrow().len()
    }

    /// Whether two handles refer to the same scope.
    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("disposed", &self.is_disposed())
            .field("children", &self.child_count())
            .field("owned", &self.owned_count())
            .finish()
    }
}

/// Restores the previous owner when dropped.
struct OwnerGuard {
    previous: Option<Option<Scope>>,
}

impl OwnerGuard {
    fn swap(scope: Option<Scope>) -> Self {
        let previous = OWNER.with(|owner| owner.replace(scope));
        Self {
            previous: Some(previous),
        }
    }
}

impl Drop for OwnerGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            let _ = OWNER.try_with(|owner| owner.replace(previous));
        }
    }
}

/// Create a root scope, run `f` inside it and return its result.
///
/// `f` receives the root; call [`Scope::dispose`] on it to tear everything
/// down. Reads inside `f` are not tracked by any enclosing computation.
pub fn create_root<T>(f: impl FnOnce(Scope) -> T) -> T {
    let root = Scope::root();
    let _frame = ReactiveContext::untracked();
    root.run(|| f(root.clone()))
}

/// Create a scope under `parent`, or under the current owner when `parent` is
/// `None`.
pub fn create_scope(parent: Option<&Scope>) -> Scope {
    match parent {
        Some(parent) => Scope::child_of(parent),
        None => Scope::new(),
    }
}

/// Register a cleanup with the current owner.
///
/// Inside an effect or memo this is the current run: the callback fires
/// before the next run and when the computation is disposed. Outside of any
/// scope it goes to the thread root scope and only runs if that scope is
/// disposed.
pub fn on_cleanup(f: impl FnOnce() + 'static) {
    Scope::current_or_thread_root("cleanup").on_cleanup(f);
}
