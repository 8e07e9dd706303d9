// Blocking wait handle underneath the completion signal.
//
// On Linux this is a raw futex; elsewhere a condvar does the same job.

#[cfg(target_os = "linux")]
mod sys {
    use std::ptr;
    use std::sync::atomic::{AtomicU32, Ordering};

    pub fn futex_wait(atomic: &AtomicU32, expected: u32) {
        // Check condition first to avoid the syscall if possible
        if atomic.load(Ordering::Acquire) != expected {
            return;
        }

        unsafe {
            libc::syscall(
                libc::SYS_futex,
                atomic as *const AtomicU32 as *const u32,
                libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                expected,
                ptr::null::<libc::timespec>(),
                ptr::null::<u32>(),
                0u32,
            );
        }
    }

    pub fn futex_wake_all(atomic: &AtomicU32) {
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                atomic as *const AtomicU32 as *const u32,
                libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                i32::MAX, // wake every waiter
                ptr::null::<libc::timespec>(),
                ptr::null::<u32>(),
                0u32,
            );
        }
    }
}

/// An open/closed latch a consumer thread can block on.
///
/// `wait` blocks while the gate is closed. `open` is sticky: every current
/// and future waiter passes through until `close` re-arms the gate.
#[cfg(target_os = "linux")]
pub struct WaitGate {
    // 0 = closed, 1 = open
    state: std::sync::atomic::AtomicU32,
}

#[cfg(target_os = "linux")]
impl WaitGate {
    pub fn new() -> Self {
        Self {
            state: std::sync::atomic::AtomicU32::new(0),
        }
    }

    pub fn open(&self) {
        use std::sync::atomic::Ordering;
        if self.state.swap(1, Ordering::AcqRel) == 0 {
            sys::futex_wake_all(&self.state);
        }
    }

    pub fn close(&self) {
        use std::sync::atomic::Ordering;
        self.state.store(0, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        use std::sync::atomic::Ordering;
        self.state.load(Ordering::Acquire) == 1
    }

    pub fn wait(&self) {
        use std::sync::atomic::Ordering;
        while self.state.load(Ordering::Acquire) == 0 {
            sys::futex_wait(&self.state, 0);
        }
    }
}

/// Portable fallback: same latch semantics on top of a condvar.
#[cfg(not(target_os = "linux"))]
pub struct WaitGate {
    open: parking_lot::Mutex<bool>,
    cond: parking_lot::Condvar,
}

#[cfg(not(target_os = "linux"))]
impl WaitGate {
    pub fn new() -> Self {
        Self {
            open: parking_lot::Mutex::new(false),
            cond: parking_lot::Condvar::new(),
        }
    }

    pub fn open(&self) {
        let mut open = self.open.lock();
        if !*open {
            *open = true;
            self.cond.notify_all();
        }
    }

    pub fn close(&self) {
        *self.open.lock() = false;
    }

    pub fn is_open(&self) -> bool {
        *self.open.lock()
    }

    pub fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.cond.wait(&mut open);
        }
    }
}
