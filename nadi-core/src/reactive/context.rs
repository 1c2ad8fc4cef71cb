//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal is read,
//! it is recorded in the frame of the innermost running computation.
//!
//! # Implementation
//!
//! We use a thread-local stack of frames. Running a memo or effect pushes a
//! frame for it; the frame is popped when the guard returned by
//! [`ReactiveContext::enter`] is finished or dropped, so the stack stays
//! balanced even if the computation panics.
//!
//! [`ReactiveContext::untracked`] pushes a frame that belongs to nobody:
//! reads inside it are not attributed to any enclosing computation.

use std::cell::RefCell;

use indexmap::IndexSet;

use crate::graph::NodeId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
#[derive(Debug)]
struct ContextEntry {
    /// The computation this frame records for; `None` for untracked frames.
    subscriber_id: Option<NodeId>,
    /// Nodes read during this frame, in first-read order.
    dependencies: IndexSet<NodeId>,
}

/// Guard for one frame of the reactive context stack.
///
/// Pops its frame when dropped. Use [`finish`](Self::finish) to pop it and
/// keep the dependencies it collected.
#[must_use = "the frame is popped as soon as the guard is dropped"]
pub struct ReactiveContext {
    subscriber_id: Option<NodeId>,
    depth: usize,
    popped: bool,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given computation.
    ///
    /// While this context is active, any node that is read is recorded as a
    /// dependency of `subscriber_id`.
    pub fn enter(subscriber_id: NodeId) -> Self {
        Self::push(Some(subscriber_id))
    }

    /// Enter a frame that records nothing.
    pub fn untracked() -> Self {
        Self::push(None)
    }

    fn push(subscriber_id: Option<NodeId>) -> Self {
        let depth = CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(ContextEntry {
                subscriber_id,
                dependencies: IndexSet::new(),
            });
            stack.len()
        });

        Self {
            subscriber_id,
            depth,
            popped: false,
        }
    }

    /// Check if reads are currently being recorded for some computation.
    pub fn is_active() -> bool {
        Self::current_subscriber().is_some()
    }

    /// Get the computation reads are recorded for, if any.
    pub fn current_subscriber() -> Option<NodeId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|entry| entry.subscriber_id))
    }

    /// Whether `id` has a frame anywhere on the stack, i.e. it is running
    /// further up the call stack.
    pub fn is_running(id: NodeId) -> bool {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .iter()
                .any(|entry| entry.subscriber_id == Some(id))
        })
    }

    /// Number of frames on the stack.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }

    /// Record a dependency on the given node in the innermost frame.
    ///
    /// This is called by signals and memos when they are read. Inside an
    /// untracked frame, or with no frame at all, it does nothing.
    pub fn track_dependency(node_id: NodeId) {
        CONTEXT_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                if entry.subscriber_id.is_some() && entry.subscriber_id != Some(node_id) {
                    entry.dependencies.insert(node_id);
                }
            }
        });
    }

    /// Get the dependencies collected in the current frame so far.
    pub fn get_dependencies() -> Vec<NodeId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|entry| entry.dependencies.iter().copied().collect())
                .unwrap_or_default()
        })
    }

    /// Pop this frame and return the dependencies it collected.
    pub fn finish(mut self) -> IndexSet<NodeId> {
        self.popped = true;
        self.pop().map(|entry| entry.dependencies).unwrap_or_default()
    }

    fn pop(&self) -> Option<ContextEntry> {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let balanced = stack.len() == self.depth
                && stack.last().map(|entry| entry.subscriber_id) == Some(self.subscriber_id);

            if !balanced {
                let found = stack.last().map(|entry| entry.subscriber_id);
                let len = stack.len();
                drop(stack);
                // Unwinding already: a second panic would abort the process.
                if std::thread::panicking() {
                    return None;
                }
                panic!(
                    "reactive context mismatch: expected frame {:?} at depth {}, found {:?} at depth {}",
                    self.subscriber_id, self.depth, found, len
                );
            }

            stack.pop()
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        if !self.popped {
            self.popped = true;
            self.pop();
        }
    }
}

/// Run `f` without recording any dependency.
///
/// Reads inside `f` never subscribe the surrounding computation.
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    let _frame = ReactiveContext::untracked();
    f()
}
