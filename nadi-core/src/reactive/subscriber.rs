//! Subscriber trait for the reactive system.
//!
//! A Subscriber is any computation that depends on reactive values: memos
//! and effects. The graph only stores weak references to subscribers; the
//! runtime upgrades them when a node has to be brought up to date.

use super::scope::Scope;
use crate::graph::NodeId;

/// A computation registered in the dependency graph.
pub trait Subscriber {
    /// The node this computation occupies in the graph.
    fn node_id(&self) -> NodeId;

    /// Re-run the computation unconditionally.
    ///
    /// Implementations must track their reads in a fresh
    /// [`ReactiveContext`](super::ReactiveContext) frame and replace their
    /// dependency set afterwards. A disposed subscriber does nothing.
    fn run(&self);

    /// Detach from the graph and release everything owned by the
    /// computation. Calling it twice is a no-op.
    fn dispose(&self);

    /// Whether [`dispose`](Self::dispose) has been called.
    fn is_disposed(&self) -> bool;

    /// Move the computation under `owner`, returning the scope that owned it
    /// before. Computations that do not track an owner ignore the call.
    fn set_owner(&self, owner: &Scope) -> Option<Scope> {
        let _ = owner;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Counter {
        id: NodeId,
        runs: Cell<usize>,
        disposed: Cell<bool>,
    }

    impl Subscriber for Counter {
        fn node_id(&self) -> NodeId {
            self.id
        }

        fn run(&self) {
            if !self.disposed.get() {
                self.runs.set(self.runs.get() + 1);
            }
        }

        fn dispose(&self) {
            self.disposed.set(true);
        }

        fn is_disposed(&self) -> bool {
            self.disposed.get()
        }
    }

    #[test]
    fn subscriber_is_object_safe() {
        let counter = Counter {
            id: NodeId::new(),
            runs: Cell::new(0),
            disposed: Cell::new(false),
        };
        let subscriber: &dyn Subscriber = &counter;

        subscriber.run();
        subscriber.dispose();
        subscriber.run();

        assert!(subscriber.is_disposed());
        assert_eq!(counter.runs.get(), 1);
        assert_eq!(subscriber.node_id(), counter.id);
    }
}
