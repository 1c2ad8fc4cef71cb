//! Integration Tests for Reactive System
//!
//! These tests verify that signals, memos, effects and scopes work together
//! correctly through the public surface.

use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use nadi_core::error::InfiniteReactionCause;
use nadi_core::reactive::{
    batch, create_root, create_scope, effect, on_cleanup, signal, try_batch, untrack, Effect,
    Memo, ReactiveContext, Runtime, Scope, Signal,
};
use nadi_core::{ReactiveError, RuntimeConfig};

type Log<T> = Rc<RefCell<Vec<T>>>;

fn log<T>() -> Log<T> {
    Rc::new(RefCell::new(Vec::new()))
}

/// Count 0, doubled memo, effect logging doubled; single write then batch.
#[test]
fn counter_scenario_logs_each_flush_once() {
    let seen: Log<i32> = log();
    let count = Signal::new(0);

    let root = create_root(|root| {
        let count = count.clone();
        let doubled = Memo::new(move || count.get() * 2);
        let seen = seen.clone();
        effect(move || seen.borrow_mut().push(doubled.get()));
        root
    });
    assert_eq!(*seen.borrow(), vec![0]);

    count.set(5);
    assert_eq!(*seen.borrow(), vec![0, 10]);

    batch(|| {
        count.set(1);
        count.set(2);
        count.set(3);
    });
    assert_eq!(*seen.borrow(), vec![0, 10, 6]);

    root.dispose();
}

/// Test that a memo tracks signal dependencies.
#[test]
fn memo_tracks_signal_dependency() {
    let signal = Signal::new(10);

    let signal_clone = signal.clone();
    let memo = Memo::new(move || signal_clone.get() * 2);

    assert_eq!(memo.get(), 20);

    // No manual invalidation: the write marks the memo.
    signal.set(5);
    assert_eq!(memo.get(), 10);
    assert_eq!(signal.subscriber_count(), 1);
}

/// Test that memos can depend on other memos.
#[test]
fn memo_depends_on_memo() {
    let base = Signal::new(2);

    let base_clone = base.clone();
    let squared = Memo::new(move || base_clone.get() * base_clone.get());

    let squared_clone = squared.clone();
    let plus_one = Memo::new(move || squared_clone.get() + 1);

    assert_eq!(plus_one.get(), 5);
    base.set(3);
    assert_eq!(plus_one.get(), 10);
    assert_eq!(squared.recompute_count(), 2);
    assert_eq!(plus_one.recompute_count(), 2);
}

#[test]
fn batch_only_exposes_final_values() {
    let first = Signal::new(String::from("Ada"));
    let last = Signal::new(String::from("Lovelace"));
    let seen: Log<String> = log();

    let root = create_root(|root| {
        let (first, last, seen) = (first.clone(), last.clone(), seen.clone());
        Effect::new(move || {
            seen.borrow_mut()
                .push(format!("{} {}", first.get(), last.get()));
        });
        root
    });

    batch(|| {
        first.set(String::from("Grace"));
        last.set(String::from("Lovelace-Hopper"));
        last.set(String::from("Hopper"));
        assert_eq!(seen.borrow().len(), 1);
    });

    assert_eq!(*seen.borrow(), vec!["Ada Lovelace", "Grace Hopper"]);
    root.dispose();
}

#[test]
fn memo_recomputes_at_most_once_between_flushes() {
    let count = Signal::new(1);
    let computes = Rc::new(Cell::new(0));

    let (count2, computes2) = (count.clone(), computes.clone());
    let memo = Memo::new(move || {
        computes2.set(computes2.get() + 1);
        count2.get() + 1
    });

    // Unread memo: writes cost nothing.
    count.set(2);
    count.set(3);
    assert_eq!(computes.get(), 0);

    assert_eq!(memo.get(), 4);
    assert_eq!(memo.get(), 4);
    assert_eq!(computes.get(), 1);

    count.set(4);
    assert_eq!(memo.get(), 5);
    assert_eq!(memo.get(), 5);
    assert_eq!(computes.get(), 2);
}

#[test]
fn dependencies_are_exact_after_each_run() {
    let show_details = Signal::new(true);
    let details = Signal::new(String::from("long text"));
    let runs = Rc::new(Cell::new(0));

    let root = create_root(|root| {
        let (show_details, details, runs) = (show_details.clone(), details.clone(), runs.clone());
        Effect::new(move || {
            runs.set(runs.get() + 1);
            if show_details.get() {
                details.with(|text| text.len());
            }
        });
        root
    });

    show_details.set(false);
    assert_eq!(runs.get(), 2);
    assert_eq!(details.subscriber_count(), 0);

    // Read only by a previous run: no re-run.
    details.set(String::from("changed"));
    assert_eq!(runs.get(), 2);

    root.dispose();
}

#[test]
fn diamond_is_glitch_free() {
    let source = Signal::new(1);
    let seen: Log<(i32, i32, i32)> = log();
    let total_runs = Rc::new(Cell::new(0));

    let root = create_root(|root| {
        let s = source.clone();
        let left = Memo::new(move || s.get() + 1);
        let s = source.clone();
        let right = Memo::new(move || s.get() * 10);

        let (left2, right2, total_runs) = (left.clone(), right.clone(), total_runs.clone());
        let total = Memo::new(move || {
            total_runs.set(total_runs.get() + 1);
            left2.get() + right2.get()
        });

        let (s, seen) = (source.clone(), seen.clone());
        Effect::new(move || {
            seen.borrow_mut()
                .push((s.get(), left.get() + right.get(), total.get()));
        });
        root
    });

    source.set(2);
    source.set(3);

    // Every observation is consistent with one source value.
    let observed = seen.borrow().clone();
    assert_eq!(observed, vec![(1, 12, 12), (2, 23, 23), (3, 34, 34)]);
    assert_eq!(total_runs.get(), 3);
    root.dispose();
}

#[test]
fn equal_writes_notify_nobody() {
    let (read, write) = signal(3);
    let runs = Rc::new(Cell::new(0));

    let root = create_root(|root| {
        let runs = runs.clone();
        Effect::new(move || {
            read.get();
            runs.set(runs.get() + 1);
        });
        root
    });

    write.set(3);
    write.update(|n| *n);
    assert_eq!(runs.get(), 1);

    write.set(4);
    assert_eq!(runs.get(), 2);
    root.dispose();
}

#[test]
fn effects_run_in_creation_order() {
    let trigger = Signal::new(0);
    let order: Log<&'static str> = log();

    let root = create_root(|root| {
        for name in ["first", "second", "third"] {
            let (trigger, order) = (trigger.clone(), order.clone());
            Effect::new(move || {
                if trigger.get() > 0 {
                    order.borrow_mut().push(name);
                }
            });
        }
        root
    });

    trigger.set(1);
    assert_eq!(*order.borrow(), vec!["first", "second", "third"]);
    root.dispose();
}

#[test]
fn effects_of_older_scopes_run_first() {
    let trigger = Signal::new(0);
    let order: Log<&'static str> = log();

    let older = Scope::root();
    let newer = Scope::root();

    // Effects created in the reverse order of their scopes.
    for (scope, name) in [(&newer, "newer"), (&older, "older")] {
        let (trigger, order) = (trigger.clone(), order.clone());
        scope.run(|| {
            Effect::new(move || {
                if trigger.get() > 0 {
                    order.borrow_mut().push(name);
                }
            })
        });
    }

    trigger.set(1);
    assert_eq!(*order.borrow(), vec!["older", "newer"]);

    older.dispose();
    newer.dispose();
}

#[test]
fn writes_during_flush_join_the_same_flush() {
    let celsius = Signal::new(0);
    let fahrenheit = Signal::new(32);
    let seen: Log<i32> = log();

    let root = create_root(|root| {
        let (celsius, fahrenheit) = (celsius.clone(), fahrenheit.clone());
        Effect::new(move || fahrenheit.set(celsius.get() * 9 / 5 + 32));
        root
    });

    let (fahrenheit2, seen2) = (fahrenheit.clone(), seen.clone());
    let printer = root.run(|| Effect::new(move || seen2.borrow_mut().push(fahrenheit2.get())));

    celsius.set(100);
    assert_eq!(*seen.borrow(), vec![32, 212]);
    assert!(!Runtime::has_pending());

    printer.dispose();
    root.dispose();
}

/// An effect writes a cell feeding a memo that an earlier effect already
/// consumed in the same flush: the earlier effect re-runs before the flush
/// returns.
#[test]
fn memo_consumed_earlier_in_flush_is_revisited() {
    let input = Signal::new(1);
    let offset = Signal::new(0);
    let seen: Log<i32> = log();

    let root = create_root(|root| {
        let (input2, offset2) = (input.clone(), offset.clone());
        let sum = Memo::new(move || input2.get() + offset2.get());

        let (sum2, seen) = (sum.clone(), seen.clone());
        Effect::new(move || seen.borrow_mut().push(sum2.get()));

        let (input3, offset3) = (input.clone(), offset.clone());
        Effect::new(move || offset3.set(input3.get() * 100));
        root
    });
    // Creation: reader saw 1, then the writer moved offset to 100.
    assert_eq!(*seen.borrow(), vec![1, 101]);

    input.set(2);
    assert_eq!(*seen.borrow(), vec![1, 101, 102, 202]);
    assert!(!Runtime::has_pending());
    root.dispose();
}

#[test]
fn cyclic_memos_raise_infinite_reaction() {
    let holder: Rc<RefCell<Option<Memo<i32>>>> = Rc::new(RefCell::new(None));

    let holder2 = holder.clone();
    let b = Memo::new(move || {
        let a = holder2.borrow().clone();
        a.map_or(0, |a| a.get() + 1)
    });
    let b2 = b.clone();
    let a = Memo::new(move || b2.get() + 1);
    *holder.borrow_mut() = Some(a.clone());

    let err = a.try_get().unwrap_err();
    assert!(err.is_infinite_reaction());
    assert_eq!(
        err,
        ReactiveError::InfiniteReaction {
            cause: InfiniteReactionCause::Cycle { node: a.id() }
        }
    );
    assert_eq!(ReactiveContext::depth(), 0);

    let raised = panic::catch_unwind(AssertUnwindSafe(|| a.get()));
    let payload = raised.unwrap_err();
    assert!(payload.downcast_ref::<ReactiveError>().is_some());

    holder.borrow_mut().take();
}

#[test]
fn runaway_feedback_hits_flush_limit_and_recovers() {
    Runtime::configure(RuntimeConfig::default().with_max_flush_rounds(10)).unwrap();
    let ping = Signal::new(0);
    let pong = Signal::new(0);

    let root = create_root(|root| {
        let (ping2, pong2) = (ping.clone(), pong.clone());
        Effect::new(move || {
            let value = ping2.get();
            if value > 0 {
                pong2.set(value + 1);
            }
        });
        let (ping3, pong3) = (ping.clone(), pong.clone());
        Effect::new(move || {
            let value = pong3.get();
            if value > 0 {
                ping3.set(value + 1);
            }
        });
        root
    });

    let err = ping.try_set(1_000).unwrap_err();
    assert_eq!(
        err,
        ReactiveError::InfiniteReaction {
            cause: InfiniteReactionCause::FlushLimit { rounds: 10 }
        }
    );
    assert!(!Runtime::has_pending());
    assert!(!Runtime::is_flushing());

    // The scheduler is usable again.
    root.dispose();
    let quiet = Signal::new(0);
    let seen = Rc::new(Cell::new(0));
    let (quiet2, seen2) = (quiet.clone(), seen.clone());
    let watcher = Effect::new(move || seen2.set(quiet2.get()));
    quiet.set(9);
    assert_eq!(seen.get(), 9);
    watcher.dispose();

    Runtime::configure(RuntimeConfig::default()).unwrap();
}

#[test]
fn disposal_is_transitive_and_idempotent() {
    let cleanups: Log<&'static str> = log();
    let source = Signal::new(0);

    let root = create_root(|root| {
        let child = create_scope(None);
        let grandchild = create_scope(Some(&child));

        let c = cleanups.clone();
        root.on_cleanup(move || c.borrow_mut().push("root"));
        let c = cleanups.clone();
        child.on_cleanup(move || c.borrow_mut().push("child"));
        let c = cleanups.clone();
        grandchild.on_cleanup(move || c.borrow_mut().push("grandchild"));

        let (c, source) = (cleanups.clone(), source.clone());
        grandchild.run(|| {
            Effect::new(move || {
                source.get();
                let c = c.clone();
                on_cleanup(move || c.borrow_mut().push("effect"));
            })
        });
        root
    });
    assert_eq!(source.subscriber_count(), 1);

    root.dispose();
    root.dispose();

    assert_eq!(
        *cleanups.borrow(),
        vec!["effect", "grandchild", "child", "root"]
    );
    assert_eq!(source.subscriber_count(), 0);
}

#[test]
fn disposing_scope_mid_flush_skips_its_pending_effects() {
    let trigger = Signal::new(0);
    let late_runs = Rc::new(Cell::new(0));

    let host = Scope::root();
    let doomed = Scope::root();
    let (trigger2, doomed2) = (trigger.clone(), doomed.clone());
    host.run(|| {
        Effect::new(move || {
            if trigger2.get() > 0 {
                doomed2.dispose();
            }
        })
    });

    let (trigger3, late_runs2) = (trigger.clone(), late_runs.clone());
    doomed.run(|| {
        Effect::new(move || {
            trigger3.get();
            late_runs2.set(late_runs2.get() + 1);
        })
    });
    assert_eq!(late_runs.get(), 1);

    // Both effects are queued; the older scope's effect disposes the other.
    trigger.set(1);
    assert_eq!(late_runs.get(), 1);
    assert!(doomed.is_disposed());

    host.dispose();
}

#[test]
fn cleanups_fire_before_rerun_in_lifo_order() {
    let events: Log<String> = log();
    let source = Signal::new(1);

    let root = create_root(|root| {
        let (source, events) = (source.clone(), events.clone());
        Effect::new(move || {
            let value = source.get();
            events.borrow_mut().push(format!("run {value}"));
            for timer in ["timer", "listener"] {
                let events = events.clone();
                on_cleanup(move || events.borrow_mut().push(format!("stop {timer} {value}")));
            }
        });
        root
    });

    source.set(2);
    root.dispose();

    assert_eq!(
        *events.borrow(),
        vec![
            "run 1",
            "stop listener 1",
            "stop timer 1",
            "run 2",
            "stop listener 2",
            "stop timer 2",
        ]
    );
}

/// Reads in a disposed computation's final cleanups do not re-subscribe it;
/// writes there propagate normally.
#[test]
fn disposed_computation_cannot_resubscribe() {
    let watched = Signal::new(0);
    let audit = Signal::new(0);
    let runs = Rc::new(Cell::new(0));
    let audit_seen = Rc::new(Cell::new(0));

    let root = create_root(|root| {
        let (audit2, audit_seen2) = (audit.clone(), audit_seen.clone());
        Effect::new(move || audit_seen2.set(audit2.get()));
        root
    });

    let (watched2, audit3, runs2) = (watched.clone(), audit.clone(), runs.clone());
    let doomed = Effect::new(move || {
        runs2.set(runs2.get() + 1);
        watched2.get();
        let (watched, audit) = (watched2.clone(), audit3.clone());
        on_cleanup(move || {
            watched.get();
            audit.update(|n| n + 1);
        });
    });

    watched.set(5);
    assert_eq!(runs.get(), 2);
    assert_eq!(audit_seen.get(), 1);

    doomed.dispose();
    assert_eq!(audit_seen.get(), 2);
    assert_eq!(watched.subscriber_count(), 0);

    watched.set(6);
    assert_eq!(runs.get(), 2);
    assert_eq!(watched.subscriber_count(), 0);
    root.dispose();
}

#[test]
fn untrack_hides_reads_from_effects() {
    let tracked = Signal::new(0);
    let ignored = Signal::new(0);
    let runs = Rc::new(Cell::new(0));

    let (tracked2, ignored2, runs2) = (tracked.clone(), ignored.clone(), runs.clone());
    let watcher = Effect::new(move || {
        tracked2.get();
        untrack(|| ignored2.get());
        runs2.set(runs2.get() + 1);
    });

    ignored.set(1);
    assert_eq!(runs.get(), 1);
    tracked.set(1);
    assert_eq!(runs.get(), 2);
    assert_eq!(watcher.dependency_count(), 1);
    watcher.dispose();
}

/// Test nested reactive contexts (effect inside effect).
#[test]
fn nested_reactive_contexts() {
    let outer = Signal::new(0);
    let inner = Signal::new(0);
    let outer_runs = Rc::new(Cell::new(0));

    let root = create_root(|root| {
        let (outer, inner, outer_runs) = (outer.clone(), inner.clone(), outer_runs.clone());
        Effect::new(move || {
            outer.get();
            outer_runs.set(outer_runs.get() + 1);
            let inner = inner.clone();
            Effect::new(move || {
                inner.get();
            });
        });
        root
    });

    // Inner reads belong to the inner effect only.
    inner.set(1);
    assert_eq!(outer_runs.get(), 1);
    outer.set(1);
    assert_eq!(outer_runs.get(), 2);
    assert_eq!(inner.subscriber_count(), 1);
    root.dispose();
}

#[test]
fn user_panic_propagates_to_writer_and_graph_stays_usable() {
    let count = Signal::new(0);
    let seen = Rc::new(Cell::new(0));

    let root = create_root(|root| {
        let (count, seen) = (count.clone(), seen.clone());
        Effect::new(move || {
            let value = count.get();
            assert!(value != 13, "unlucky number");
            seen.set(value);
        });
        root
    });

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| count.set(13)));
    assert!(outcome.is_err());
    assert_eq!(ReactiveContext::depth(), 0);
    assert!(!Runtime::is_flushing());

    count.set(14);
    assert_eq!(seen.get(), 14);
    root.dispose();
}

#[test]
fn panicking_effect_leaves_the_rest_of_its_round_queued() {
    let source = Signal::new(0);
    let mirrored = Rc::new(Cell::new(0));

    let root = create_root(|root| {
        let fragile = source.clone();
        Effect::new(move || assert!(fragile.get() != 1, "cannot handle one"));

        let (source, mirrored) = (source.clone(), mirrored.clone());
        Effect::new(move || mirrored.set(source.get()));
        root
    });

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| source.set(1)));
    assert!(outcome.is_err());
    assert!(!Runtime::is_flushing());
    assert!(Runtime::has_pending());
    assert_eq!(mirrored.get(), 0);

    Runtime::flush().unwrap();
    assert_eq!(mirrored.get(), 1);
    assert!(!Runtime::has_pending());

    // The panicking effect kept its subscription.
    source.set(2);
    assert_eq!(mirrored.get(), 2);
    root.dispose();
}

#[test]
fn try_batch_returns_flush_errors() {
    Runtime::configure(RuntimeConfig::default().with_max_flush_rounds(3)).unwrap();
    let count = Signal::new(0);

    let count2 = count.clone();
    let looping = Effect::new(move || {
        let next = count2.get() + 1;
        count2.set(next);
    });

    let result = try_batch(|| count.set(100));
    assert!(matches!(
        result,
        Err(ReactiveError::InfiniteReaction {
            cause: InfiniteReactionCause::FlushLimit { rounds: 3 }
        })
    ));

    looping.dispose();
    Runtime::configure(RuntimeConfig::default()).unwrap();
}

#[test]
fn snapshot_tracks_live_graph() {
    let count = Signal::new(0);
    let root = create_root(|root| {
        let count = count.clone();
        Effect::new(move || {
            count.get();
        });
        root
    });

    let snapshot = Runtime::snapshot();
    let node = snapshot.node(count.id()).unwrap();
    assert_eq!(node.dependents.len(), 1);

    root.dispose();
    let snapshot = Runtime::snapshot();
    assert!(snapshot.node(count.id()).unwrap().dependents.is_empty());
}
