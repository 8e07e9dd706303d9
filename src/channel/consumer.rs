// Consumer-side operations: consuming passes and the blocking read surface.

use std::io;

use log::trace;

use crate::block::{BlockHandle, Cursor};
use crate::channel::InputChannel;

impl InputChannel {
    /// Open a consuming pass and return a cursor at the chain head
    /// ([`Cursor::UNSET`] on an empty chain). Only one pass may be open at
    /// a time; a reentrant call fails immediately.
    pub fn consuming_start(&self) -> io::Result<Cursor> {
        let mut st = self.lock_state();
        if st.consuming {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "read already in progress",
            ));
        }
        st.consuming = true;
        Ok(match st.chain.front() {
            Some(head) => Cursor::new(head.seq, head.start),
            None => Cursor::UNSET,
        })
    }

    /// Close the consuming pass opened by
    /// [`consuming_start`](InputChannel::consuming_start).
    ///
    /// `consumed` marks bytes irrevocably processed: the head advances to
    /// it, blocks left strictly behind the new head go back to the pool,
    /// and only then is flow accounting decremented. `examined` marks how
    /// far the consumer looked; if it reached the logical end of buffered
    /// data with no stream end and no pending error, the signal re-arms
    /// (ready back to idle) so the next wait blocks for fresh input.
    ///
    /// On a channel disposed while this pass was open, the whole remaining
    /// chain is freed instead. Fails if no pass is open.
    pub fn consuming_complete(&self, consumed: Cursor, examined: Cursor) -> io::Result<()> {
        let mut released: Vec<BlockHandle> = Vec::new();
        let mut subtract = 0usize;
        {
            let mut st = self.lock_state();
            if !st.consuming {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "no read in progress",
                ));
            }

            if st.disposed {
                released.extend(st.chain.drain(..).map(|s| s.block));
                st.consuming = false;
                trace!("deferred dispose: freed {} blocks", released.len());
            } else {
                if !consumed.is_unset() {
                    // Count before the head moves; the old start offsets
                    // are gone afterwards. Skipped entirely without a flow
                    // hook.
                    if self.flow().is_some() {
                        subtract = st.count_from_head(consumed);
                    }
                    while let Some(head) = st.chain.front() {
                        if head.seq < consumed.block {
                            if let Some(seg) = st.chain.pop_front() {
                                released.push(seg.block);
                            }
                        } else {
                            break;
                        }
                    }
                    if let Some(head) = st.chain.front_mut() {
                        if head.seq == consumed.block {
                            debug_assert!(consumed.index >= head.start);
                            debug_assert!(consumed.index <= head.end);
                            head.start = consumed.index.min(head.end);
                        }
                    }
                }

                if st.at_logical_end(examined) && !st.fin && st.pending.is_none() {
                    // Re-arm for the next delivery. Resetting is gated on an
                    // empty pending slot, so no stale error can resurface on
                    // a later wait.
                    self.signal().reset();
                }
                st.consuming = false;
            }
        }

        // Decrement only after the head has actually advanced.
        if subtract > 0 {
            if let Some(flow) = self.flow() {
                flow.subtract(subtract);
            }
        }
        for block in released {
            self.pool().release(block);
        }
        Ok(())
    }

    /// Copy committed bytes starting at `from` into `dst` without consuming
    /// them. Returns the byte count and the cursor where copying stopped,
    /// suitable as `consumed`/`examined` for
    /// [`consuming_complete`](InputChannel::consuming_complete).
    pub fn copy_buffered(&self, from: Cursor, dst: &mut [u8]) -> (usize, Cursor) {
        let st = self.lock_state();
        st.copy_from(from, dst)
    }

    /// Blocking read: waits until bytes or a terminal condition are
    /// available, copies up to `dst.len()` bytes out, and closes the pass
    /// at the copy endpoint. Returns `Ok(0)` exactly when the stream has
    /// ended; it never means "try again".
    pub fn read_blocking(&self, dst: &mut [u8]) -> io::Result<usize> {
        if dst.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "destination buffer is empty",
            ));
        }
        loop {
            self.wait_blocking()?;
            if let Some(n) = self.try_read(dst)? {
                return Ok(n);
            }
        }
    }

    /// One ready-state read attempt. `None` means nothing was buffered and
    /// the stream is still live; the pass was closed examined-to-end, so
    /// the signal has re-armed and the caller should wait again.
    pub(crate) fn try_read(&self, dst: &mut [u8]) -> io::Result<Option<usize>> {
        let start = self.consuming_start()?;
        let (n, end) = self.copy_buffered(start, dst);
        if n > 0 {
            self.consuming_complete(end, end)?;
            return Ok(Some(n));
        }

        let fin = self.lock_state().fin;
        self.consuming_complete(start, end)?;
        if fin {
            Ok(Some(0))
        } else {
            Ok(None)
        }
    }
}
