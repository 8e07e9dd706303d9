// The socket input channel: pooled block chain, producer/consumer hand-off,
// and the completion signal that threads through both sides.

mod builder;
mod consumer;
mod producer;
mod read;

pub use builder::ChannelBuilder;
pub use producer::WriteReservation;
pub use read::Readiness;

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::block::{BlockHandle, Cursor};
use crate::hooks::{FlowControl, Scheduler};
use crate::pool::BlockPool;
use crate::signal::{Continuation, ReadySignal, RegisterOutcome};

/// Minimum spare tail capacity a write reservation must offer.
pub(crate) const MIN_WRITE_CAPACITY: usize = 2048;

/// How a surfaced failure is classified.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum FailureClass {
    Cancelled,
    Misuse,
    Io,
}

/// The sticky error surfaced to waiting consumers. Persists across waits
/// until a consuming pass re-arms the signal.
#[derive(Clone, Debug)]
pub(crate) struct PendingError {
    class: FailureClass,
    message: String,
}

impl PendingError {
    fn cancelled(message: &str) -> Self {
        Self {
            class: FailureClass::Cancelled,
            message: message.to_string(),
        }
    }

    fn misuse(message: &str) -> Self {
        Self {
            class: FailureClass::Misuse,
            message: message.to_string(),
        }
    }

    fn from_io(err: io::Error) -> Self {
        let class = match err.kind() {
            io::ErrorKind::ConnectionAborted | io::ErrorKind::Interrupted => {
                FailureClass::Cancelled
            }
            io::ErrorKind::InvalidInput => FailureClass::Misuse,
            // Anything else surfaces as a generic I/O failure
            _ => FailureClass::Io,
        };
        Self {
            class,
            message: err.to_string(),
        }
    }

    fn to_io(&self) -> io::Error {
        let kind = match self.class {
            FailureClass::Cancelled => io::ErrorKind::ConnectionAborted,
            FailureClass::Misuse => io::ErrorKind::InvalidInput,
            FailureClass::Io => io::ErrorKind::Other,
        };
        io::Error::new(kind, self.message.clone())
    }
}

/// One linked block plus its valid-data window.
/// Invariant: `0 <= start <= end <= block.capacity()`.
pub(crate) struct Segment {
    pub(crate) seq: u64,
    pub(crate) block: BlockHandle,
    pub(crate) start: usize,
    pub(crate) end: usize,
}

/// Record of an uncommitted in-flight write.
pub(crate) enum Pinned {
    /// The reservation targets the spare region of the current tail.
    Tail,
    /// The reservation owns a freshly leased, not-yet-linked block.
    Fresh,
}

pub(crate) struct ChainState {
    pub(crate) chain: VecDeque<Segment>,
    /// Sequence assigned to the next linked block. Starts at 1; 0 means
    /// [`Cursor::UNSET`].
    pub(crate) next_seq: u64,
    pub(crate) pinned: Option<Pinned>,
    pub(crate) consuming: bool,
    pub(crate) disposed: bool,
    /// Stream-end flag: the peer finished sending.
    pub(crate) fin: bool,
    pub(crate) pending: Option<PendingError>,
}

impl ChainState {
    fn new() -> Self {
        Self {
            chain: VecDeque::new(),
            next_seq: 1,
            pinned: None,
            consuming: false,
            disposed: false,
            fin: false,
            pending: None,
        }
    }

    /// Whether `cursor` sits at or past the last committed byte. Trivially
    /// true on an empty chain.
    pub(crate) fn at_logical_end(&self, cursor: Cursor) -> bool {
        match self.chain.back() {
            None => true,
            Some(tail) => cursor.block == tail.seq && cursor.index >= tail.end,
        }
    }

    /// Bytes between the current head and `to` (exclusive).
    pub(crate) fn count_from_head(&self, to: Cursor) -> usize {
        let mut count = 0;
        for seg in &self.chain {
            if seg.seq < to.block {
                count += seg.end - seg.start;
            } else if seg.seq == to.block {
                count += to.index.saturating_sub(seg.start);
                break;
            } else {
                break;
            }
        }
        count
    }

    /// Copy committed bytes starting at `from` into `dst`. Returns the byte
    /// count and the cursor where copying stopped (walked to the logical
    /// end if the chain is drained).
    pub(crate) fn copy_from(&self, from: Cursor, dst: &mut [u8]) -> (usize, Cursor) {
        let mut pos = from;
        if pos.is_unset() {
            match self.chain.front() {
                Some(head) => pos = Cursor::new(head.seq, head.start),
                None => return (0, from),
            }
        }

        let first = pos.block;
        let mut copied = 0;
        for seg in self.chain.iter().skip_while(move |s| s.seq < first) {
            let at = if seg.seq == pos.block { pos.index } else { seg.start };
            let avail = seg.end.saturating_sub(at);
            let take = avail.min(dst.len() - copied);
            if take > 0 {
                // Safety: [at, at + take) is committed data; the producer
                // only writes past `end`.
                unsafe { seg.block.copy_out(at, &mut dst[copied..copied + take]) };
                copied += take;
            }
            pos = Cursor::new(seg.seq, at + take);
            if copied == dst.len() {
                break;
            }
        }
        (copied, pos)
    }
}

/// Ingestion-side buffer for one connection's inbound byte stream.
///
/// A single producer (the transport receive path) appends bytes through the
/// `incoming_*` operations; at most one consumer drains them through
/// consuming passes or the [`read_blocking`](InputChannel::read_blocking) /
/// [`read`](InputChannel::read) surfaces. Chain mutations serialize on one
/// lock; readiness signaling is lock-free so the producer is never stalled
/// behind a consumer holding the lock.
pub struct InputChannel {
    state: Mutex<ChainState>,
    signal: ReadySignal,
    pool: Arc<dyn BlockPool>,
    flow: Option<Arc<dyn FlowControl>>,
    scheduler: Arc<dyn Scheduler>,
}

impl InputChannel {
    pub(crate) fn new(
        pool: Arc<dyn BlockPool>,
        flow: Option<Arc<dyn FlowControl>>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            state: Mutex::new(ChainState::new()),
            signal: ReadySignal::new(),
            pool,
            flow,
            scheduler,
        }
    }

    /// Whether bytes or a terminal condition are available right now.
    pub fn is_ready(&self) -> bool {
        self.signal.is_ready()
    }

    /// Committed-but-unconsumed byte count.
    pub fn buffered_bytes(&self) -> usize {
        let st = self.state.lock();
        st.chain.iter().map(|s| s.end - s.start).sum()
    }

    pub(crate) fn lock_state(&self) -> parking_lot::MutexGuard<'_, ChainState> {
        self.state.lock()
    }

    pub(crate) fn pool(&self) -> &Arc<dyn BlockPool> {
        &self.pool
    }

    pub(crate) fn flow(&self) -> Option<&Arc<dyn FlowControl>> {
        self.flow.as_ref()
    }

    fn dispatch(&self, continuation: Continuation) {
        match continuation {
            Continuation::Callback(task) => self.scheduler.run(task),
            Continuation::Waker(waker) => waker.wake(),
        }
    }

    /// Force readiness and dispatch any parked waiter.
    pub(crate) fn signal_ready(&self) {
        if let Some(cont) = self.signal.set_ready() {
            self.dispatch(cont);
        }
    }

    pub(crate) fn signal(&self) -> &ReadySignal {
        &self.signal
    }

    /// Park a continuation for the next readiness transition.
    ///
    /// If the channel is already ready the continuation is dispatched
    /// immediately. Two overlapping registrations are a contract violation:
    /// both continuations are dispatched and both waits observe an
    /// invalid-operation error.
    pub fn register(&self, continuation: Continuation) {
        match self.signal.register(continuation) {
            RegisterOutcome::Registered => {}
            RegisterOutcome::AlreadyReady(cont) => self.dispatch(cont),
            RegisterOutcome::Busy(mine) => {
                debug!("overlapping wait registrations on input channel");
                {
                    let mut st = self.state.lock();
                    st.pending =
                        Some(PendingError::misuse("concurrent waits on input channel"));
                }
                // Fail fast: force ready so both waiters resume and see the
                // error.
                let theirs = self.signal.set_ready();
                if let Some(cont) = theirs {
                    self.dispatch(cont);
                }
                self.dispatch(mine);
            }
        }
    }

    /// Block until the channel is ready, then surface any pending error.
    pub fn wait_blocking(&self) -> io::Result<()> {
        self.signal.wait();
        self.surface_pending()
    }

    /// Pending error as a result, without consuming it. The error stays
    /// sticky until a consuming pass re-arms the signal.
    pub(crate) fn surface_pending(&self) -> io::Result<()> {
        let st = self.state.lock();
        match &st.pending {
            Some(pending) => Err(pending.to_io()),
            None => Ok(()),
        }
    }

    /// Cancel: wake any waiter with a cancellation error. Callable from any
    /// thread at any time.
    pub fn abort(&self, reason: &str) {
        debug!("input channel aborted: {}", reason);
        {
            let mut st = self.state.lock();
            st.pending = Some(PendingError::cancelled(reason));
        }
        self.signal_ready();
    }

    /// Tear down: abort waiters and free the chain.
    ///
    /// If a consuming pass is open the blocks stay alive until its
    /// `consuming_complete`, which observes the disposed flag and frees
    /// them; freeing under a live cursor would be a use-after-free by
    /// convention. Idempotent.
    pub fn dispose(&self) {
        let freed = {
            let mut st = self.state.lock();
            if st.disposed {
                return;
            }
            st.disposed = true;
            if st.pending.is_none() {
                st.pending = Some(PendingError::cancelled("input channel disposed"));
            }
            if st.consuming {
                // Deferred to the in-flight consuming pass.
                None
            } else {
                Some(st.chain.drain(..).map(|s| s.block).collect::<Vec<_>>())
            }
        };
        if let Some(blocks) = freed {
            debug!("input channel disposed, freeing {} blocks", blocks.len());
            for block in blocks {
                self.pool.release(block);
            }
        }
        self.signal_ready();
    }
}
