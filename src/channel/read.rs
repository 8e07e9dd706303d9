// Cooperative wait surface: a readiness future and the async read loop.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;

use crate::channel::InputChannel;
use crate::signal::Continuation;

/// Resolves once the channel has bytes or a terminal condition available,
/// surfacing the pending error if one is set.
///
/// Re-polling updates the stored waker in place; it is not a second logical
/// waiter. Dropping a still-pending `Readiness` leaves its registration
/// armed, and a later overlapping wait will observe the
/// concurrent-waits error, same as abandoning the channel's continuation
/// protocol mid-wait.
pub struct Readiness<'a> {
    channel: &'a InputChannel,
    waker_slot: Option<Arc<Mutex<Option<Waker>>>>,
}

impl InputChannel {
    /// Future form of [`wait_blocking`](InputChannel::wait_blocking).
    pub fn readiness(&self) -> Readiness<'_> {
        Readiness {
            channel: self,
            waker_slot: None,
        }
    }

    /// Async read with the same contract as
    /// [`read_blocking`](InputChannel::read_blocking): suspends until
    /// signaled, copies out, `Ok(0)` means end of stream.
    pub async fn read(&self, dst: &mut [u8]) -> io::Result<usize> {
        if dst.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "destination buffer is empty",
            ));
        }
        loop {
            self.readiness().await?;
            if let Some(n) = self.try_read(dst)? {
                return Ok(n);
            }
        }
    }
}

impl Future for Readiness<'_> {
    type Output = io::Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.channel.is_ready() {
            return Poll::Ready(this.channel.surface_pending());
        }

        match &this.waker_slot {
            Some(slot) => {
                *slot.lock() = Some(cx.waker().clone());
            }
            None => {
                let slot = Arc::new(Mutex::new(Some(cx.waker().clone())));
                this.waker_slot = Some(slot.clone());
                this.channel.register(Continuation::Callback(Box::new(move || {
                    if let Some(waker) = slot.lock().take() {
                        waker.wake();
                    }
                })));
            }
        }

        // The signal may have fired between the readiness check and the
        // registration/update; the parked callback will also fire, which is
        // a harmless extra wake.
        if this.channel.is_ready() {
            return Poll::Ready(this.channel.surface_pending());
        }
        Poll::Pending
    }
}
