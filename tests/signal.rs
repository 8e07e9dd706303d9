use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sockflow::{Continuation, ReadySignal, RegisterOutcome, WaitGate};

fn counting_continuation(hits: &Arc<AtomicUsize>) -> Continuation {
    let hits = hits.clone();
    Continuation::Callback(Box::new(move || {
        hits.fetch_add(1, Ordering::SeqCst);
    }))
}

fn run(continuation: Continuation) {
    match continuation {
        Continuation::Callback(task) => task(),
        Continuation::Waker(waker) => waker.wake(),
    }
}

#[test]
fn set_ready_is_idempotent() {
    let signal = ReadySignal::new();
    assert!(!signal.is_ready());
    assert!(signal.set_ready().is_none());
    assert!(signal.is_ready());
    assert!(signal.set_ready().is_none());
    assert!(signal.is_ready());
}

#[test]
fn parked_continuation_is_returned_exactly_once() {
    let signal = ReadySignal::new();
    let hits = Arc::new(AtomicUsize::new(0));

    match signal.register(counting_continuation(&hits)) {
        RegisterOutcome::Registered => {}
        _ => panic!("expected to park"),
    }
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    if let Some(cont) = signal.set_ready() {
        run(cont);
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // Second signal has nothing left to hand out.
    assert!(signal.set_ready().is_none());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn register_after_ready_hands_the_continuation_back() {
    let signal = ReadySignal::new();
    signal.set_ready();

    let hits = Arc::new(AtomicUsize::new(0));
    match signal.register(counting_continuation(&hits)) {
        RegisterOutcome::AlreadyReady(cont) => run(cont),
        _ => panic!("expected immediate dispatch"),
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn overlapping_registration_comes_back_busy() {
    let signal = ReadySignal::new();
    let hits = Arc::new(AtomicUsize::new(0));

    assert!(matches!(
        signal.register(counting_continuation(&hits)),
        RegisterOutcome::Registered
    ));
    match signal.register(counting_continuation(&hits)) {
        RegisterOutcome::Busy(mine) => {
            // Fail-fast protocol: force ready, dispatch both.
            if let Some(theirs) = signal.set_ready() {
                run(theirs);
            }
            run(mine);
        }
        _ => panic!("expected busy"),
    }
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[test]
fn reset_rearms_only_from_ready() {
    let signal = ReadySignal::new();
    assert!(!signal.reset());
    signal.set_ready();
    assert!(signal.reset());
    assert!(!signal.is_ready());
    assert!(!signal.reset());

    // A fresh cycle still works after the reset.
    signal.set_ready();
    assert!(signal.is_ready());
}

#[test]
fn gate_open_is_sticky_until_closed() {
    let gate = WaitGate::new();
    assert!(!gate.is_open());

    gate.open();
    assert!(gate.is_open());
    // Every wait passes straight through while the gate is open.
    gate.wait();
    gate.wait();

    gate.close();
    assert!(!gate.is_open());
    gate.open();
    assert!(gate.is_open());
}

#[test]
fn wait_blocks_until_signaled() {
    let signal = Arc::new(ReadySignal::new());
    let waiter = {
        let signal = signal.clone();
        thread::spawn(move || signal.wait())
    };
    thread::sleep(Duration::from_millis(100));
    assert!(!waiter.is_finished());

    signal.set_ready();
    waiter.join().unwrap();
}

#[test]
fn wait_returns_immediately_when_already_ready() {
    let signal = ReadySignal::new();
    signal.set_ready();
    signal.wait();
}

#[test]
fn concurrent_producers_dispatch_the_waiter_once() {
    for _ in 0..100 {
        let signal = Arc::new(ReadySignal::new());
        let hits = Arc::new(AtomicUsize::new(0));
        assert!(matches!(
            signal.register(counting_continuation(&hits)),
            RegisterOutcome::Registered
        ));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let signal = signal.clone();
            handles.push(thread::spawn(move || {
                if let Some(cont) = signal.set_ready() {
                    run(cont);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
