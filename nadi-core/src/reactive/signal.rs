//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! is a source node of the dependency graph.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (memo/effect), the
//!    read is recorded as a dependency of that computation.
//!
//! 2. When a write changes the value, the runtime marks everything
//!    downstream and queues the effects it reached.
//!
//! 3. Writes that do not change the value, according to the signal's
//!    equality, do nothing at all.
//!
//! # Handles
//!
//! [`Signal`] is a cheap, clonable handle. [`ReadSignal`] and
//! [`WriteSignal`] are the two halves returned by [`signal`]; all of them
//! refer to the same cell. The graph node lives as long as any handle does.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::context::ReactiveContext;
use super::runtime::Runtime;
use crate::error::{catch_reactive, raise_on_err, ReactiveError};
use crate::graph::NodeId;

/// Equality used to decide whether a write is a change.
pub type EqualsFn<T> = Box<dyn Fn(&T, &T) -> bool>;

struct SignalInner<T> {
    id: NodeId,
    value: RefCell<T>,
    equals: EqualsFn<T>,
    version: Cell<u64>,
}

impl<T: 'static> SignalInner<T> {
    fn track(&self) {
        ReactiveContext::track_dependency(self.id);
    }

    fn write(&self, next: T) -> Result<(), ReactiveError> {
        if (self.equals)(&*self.value.borrow(), &next) {
            return Ok(());
        }
        let previous = self.value.replace(next);
        self.version.set(self.version.get() + 1);
        drop(previous);
        Runtime::notify_changed(self.id)
    }

    fn update(&self, f: impl FnOnce(&T) -> T) -> Result<(), ReactiveError> {
        let next = f(&*self.value.borrow());
        self.write(next)
    }
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        Runtime::unregister(self.id);
    }
}

/// A reactive cell holding a value of type `T`.
///
/// # Example
///
/// ```rust
/// use nadi_core::reactive::Signal;
///
/// let count = Signal::new(0);
///
/// // Read the value
/// assert_eq!(count.get(), 0);
///
/// // Update the value (notifies dependents)
/// count.set(5);
/// count.update(|n| n + 1);
/// assert_eq!(count.get(), 6);
/// ```
pub struct Signal<T> {
    inner: Rc<SignalInner<T>>,
}

impl<T: PartialEq + 'static> Signal<T> {
    /// Create a new signal. Writes of an equal value are ignored.
    pub fn new(value: T) -> Self {
        Self::with_equality(value, |a, b| a == b)
    }
}

impl<T: 'static> Signal<T> {
    /// Create a signal with a custom equality.
    ///
    /// Pass `|_, _| false` to make every write a change.
    pub fn with_equality(value: T, equals: impl Fn(&T, &T) -> bool + 'static) -> Self {
        let id = NodeId::new();
        Runtime::register_source(id);
        Self {
            inner: Rc::new(SignalInner {
                id,
                value: RefCell::new(value),
                equals: Box::new(equals),
                version: Cell::new(0),
            }),
        }
    }

    /// The signal's node in the dependency graph.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// How many writes changed the value so far.
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also records the signal as
    /// a dependency of the running computation.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Borrow the current value, tracking the read.
    ///
    /// Do not write to this signal from inside `f`.
    pub fn with<U>(&self, f: impl FnOnce(&T) -> U) -> U {
        self.inner.track();
        f(&*self.inner.value.borrow())
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.with_untracked(T::clone)
    }

    /// Borrow the current value without tracking the read.
    pub fn with_untracked<U>(&self, f: impl FnOnce(&T) -> U) -> U {
        f(&*self.inner.value.borrow())
    }

    /// Replace the value.
    ///
    /// Outside of a batch, dependent effects have run by the time this
    /// returns.
    ///
    /// # Panics
    ///
    /// Raises [`ReactiveError`] if propagation does not settle. See
    /// [`try_set`](Self::try_set).
    pub fn set(&self, value: T) {
        raise_on_err(self.try_set(value));
    }

    /// Replace the value, returning runtime errors instead of raising them.
    pub fn try_set(&self, value: T) -> Result<(), ReactiveError> {
        catch_reactive(|| self.inner.write(value))
    }

    /// Replace the value with `f(current)`.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        raise_on_err(self.try_update(f));
    }

    /// Fallible form of [`update`](Self::update).
    pub fn try_update(&self, f: impl FnOnce(&T) -> T) -> Result<(), ReactiveError> {
        catch_reactive(|| self.inner.update(f))
    }

    /// Number of computations currently reading this signal.
    pub fn subscriber_count(&self) -> usize {
        Runtime::dependent_count(self.inner.id)
    }

    /// A read-only handle to this signal.
    pub fn read_only(&self) -> ReadSignal<T> {
        ReadSignal {
            inner: self.inner.clone(),
        }
    }

    /// A write-only handle to this signal.
    pub fn write_only(&self) -> WriteSignal<T> {
        WriteSignal {
            inner: self.inner.clone(),
        }
    }

    /// Split into a read half and a write half.
    pub fn split(self) -> (ReadSignal<T>, WriteSignal<T>) {
        (self.read_only(), self.write_only())
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

/// Read half of a signal.
pub struct ReadSignal<T> {
    inner: Rc<SignalInner<T>>,
}

impl<T: 'static> ReadSignal<T> {
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// Get the current value, tracking the read.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Borrow the current value, tracking the read.
    pub fn with<U>(&self, f: impl FnOnce(&T) -> U) -> U {
        self.inner.track();
        f(&*self.inner.value.borrow())
    }

    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.inner.value.borrow().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        Runtime::dependent_count(self.inner.id)
    }
}

impl<T> Clone for ReadSignal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ReadSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadSignal")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

/// Write half of a signal.
pub struct WriteSignal<T> {
    inner: Rc<SignalInner<T>>,
}

impl<T: 'static> WriteSignal<T> {
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Replace the value; see [`Signal::set`].
    pub fn set(&self, value: T) {
        raise_on_err(self.try_set(value));
    }

    pub fn try_set(&self, value: T) -> Result<(), ReactiveError> {
        catch_reactive(|| self.inner.write(value))
    }

    /// Replace the value with `f(current)`; see [`Signal::update`].
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        raise_on_err(self.try_update(f));
    }

    pub fn try_update(&self, f: impl FnOnce(&T) -> T) -> Result<(), ReactiveError> {
        catch_reactive(|| self.inner.update(f))
    }
}

impl<T> Clone for WriteSignal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for WriteSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteSignal")
            .field("id", &self.inner.id)
            .finish()
    }
}

/// Create a signal and return its read and write halves.
pub fn signal<T: PartialEq + 'static>(value: T) -> (ReadSignal<T>, WriteSignal<T>) {
    Signal::new(value).split()
}

/// Like [`signal`], with a custom equality.
pub fn signal_with_equality<T: 'static>(
    value: T,
    equals: impl Fn(&T, &T) -> bool + 'static,
) -> (ReadSignal<T>, WriteSignal<T>) {
    Signal::with_equality(value, equals).split()
}
