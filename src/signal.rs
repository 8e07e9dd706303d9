// Lock-free tri-state completion signal.
//
// The channel uses one of these to tell a waiting consumer "new bytes or a
// terminal condition are available". It offers two wait surfaces over the
// same state: a blocking gate for thread-per-connection consumers and a
// one-shot continuation slot for cooperatively scheduled ones.

use std::cell::UnsafeCell;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering::{AcqRel, Acquire};
use std::task::Waker;

use crossbeam_utils::CachePadded;

use crate::futex::WaitGate;

// Explicit state tags rather than sentinel pointers. REGISTERING is a
// transient claim so the continuation slot is written by exactly one thread.
const IDLE: u8 = 0;
const REGISTERING: u8 = 1;
const WAITING: u8 = 2;
const READY: u8 = 3;

/// What runs when the signal fires with a waiter parked.
pub enum Continuation {
    /// Dispatched through the channel's [`Scheduler`](crate::Scheduler).
    Callback(Box<dyn FnOnce() + Send>),
    /// Woken directly; a waker already carries its own scheduling.
    Waker(Waker),
}

/// Result of a registration attempt.
pub enum RegisterOutcome {
    /// Parked; the next [`ReadySignal::set_ready`] returns it for dispatch.
    Registered,
    /// The signal was already ready. The continuation is handed back and
    /// should be dispatched now.
    AlreadyReady(Continuation),
    /// Another continuation is already parked. The caller gets its own
    /// continuation back and must fail both waiters (see
    /// `InputChannel::register`).
    Busy(Continuation),
}

pub struct ReadySignal {
    state: CachePadded<AtomicU8>,
    slot: UnsafeCell<Option<Continuation>>,
    gate: WaitGate,
}

// Safety: `slot` is written only by the thread that moved IDLE ->
// REGISTERING and taken only by the thread whose swap/CAS observed WAITING
// (or by the registering thread itself when its publish CAS loses to
// `set_ready`). The atomic transitions give the required happens-before
// edges.
unsafe impl Send for ReadySignal {}
unsafe impl Sync for ReadySignal {}

impl ReadySignal {
    pub fn new() -> Self {
        Self {
            state: CachePadded::new(AtomicU8::new(IDLE)),
            slot: UnsafeCell::new(None),
            gate: WaitGate::new(),
        }
    }

    /// Non-blocking readiness check.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.state.load(Acquire) == READY
    }

    /// Force the ready state and unblock the gate. If a continuation was
    /// parked it is returned for the caller to dispatch. Idempotent.
    pub fn set_ready(&self) -> Option<Continuation> {
        let prev = self.state.swap(READY, AcqRel);
        self.gate.open();
        if prev == WAITING {
            // Sole taker: only one swap can observe WAITING.
            unsafe { (*self.slot.get()).take() }
        } else {
            None
        }
    }

    /// Try to park a continuation for the next `set_ready`.
    ///
    /// At most one waiter may be parked at a time; an overlapping attempt
    /// comes back as [`RegisterOutcome::Busy`] and is the caller's
    /// fail-fast case.
    pub fn register(&self, continuation: Continuation) -> RegisterOutcome {
        match self.state.compare_exchange(IDLE, REGISTERING, AcqRel, Acquire) {
            Ok(_) => {
                unsafe { *self.slot.get() = Some(continuation) };
                match self.state.compare_exchange(REGISTERING, WAITING, AcqRel, Acquire) {
                    Ok(_) => RegisterOutcome::Registered,
                    Err(_) => {
                        // set_ready fired mid-registration; it saw
                        // REGISTERING and left the slot to us.
                        match unsafe { (*self.slot.get()).take() } {
                            Some(cont) => RegisterOutcome::AlreadyReady(cont),
                            None => RegisterOutcome::Registered,
                        }
                    }
                }
            }
            Err(state) if state == READY => RegisterOutcome::AlreadyReady(continuation),
            Err(_) => RegisterOutcome::Busy(continuation),
        }
    }

    /// Block the calling thread until the signal is ready.
    pub fn wait(&self) {
        if self.is_ready() {
            return;
        }
        self.gate.wait();
    }

    /// Re-arm: ready -> idle, closing the gate. Returns false if the signal
    /// was not in the ready state. Callers serialize resets (the channel
    /// does this under its chain lock).
    pub fn reset(&self) -> bool {
        if self.state.compare_exchange(READY, IDLE, AcqRel, Acquire).is_ok() {
            self.gate.close();
            true
        } else {
            false
        }
    }
}
