// Producer-side operations: the transport receive path appends bytes here.

use std::io;

use log::trace;

use crate::block::BlockHandle;
use crate::channel::{InputChannel, Pinned, Segment, MIN_WRITE_CAPACITY};

#[derive(Debug)]
enum PinKind {
    Tail { seq: u64 },
    Fresh,
}

/// An uncommitted in-flight write into a pinned block.
///
/// Produced by [`InputChannel::incoming_start`]; the transport fills
/// [`spare_mut`](WriteReservation::spare_mut) directly (e.g. as a recv
/// target) and then commits with `incoming_complete` or cancels with
/// `incoming_deferred`. Consuming the reservation by value makes double
/// commits unrepresentable.
#[derive(Debug)]
pub struct WriteReservation {
    block: BlockHandle,
    kind: PinKind,
    offset: usize,
    capacity: usize,
}

impl WriteReservation {
    /// Writable spare region of the pinned block.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        // Safety: [offset, capacity) is reserved for this writer alone; the
        // consumer never reads past the committed `end`, which stays at or
        // below `offset` until commit.
        unsafe { self.block.window_mut(self.offset, self.capacity - self.offset) }
    }

    /// Bytes available in the write window.
    pub fn spare_capacity(&self) -> usize {
        self.capacity - self.offset
    }
}

impl InputChannel {
    /// Reserve a write target with at least 2048 spare bytes: the current
    /// tail if it has room, else a freshly leased block.
    /// Chain visibility is unchanged until `incoming_complete`.
    ///
    /// Fails if a reservation is already outstanding (single-producer
    /// contract, detected rather than prevented) or the channel is
    /// disposed.
    pub fn incoming_start(&self) -> io::Result<WriteReservation> {
        let mut st = self.lock_state();
        if st.disposed {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "input channel disposed",
            ));
        }
        if st.pinned.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "write already reserved",
            ));
        }

        let tail_pin = st.chain.back().and_then(|tail| {
            let spare = tail.block.capacity() - tail.end;
            (spare >= MIN_WRITE_CAPACITY).then(|| (tail.seq, tail.block.clone(), tail.end))
        });
        if let Some((seq, block, offset)) = tail_pin {
            st.pinned = Some(Pinned::Tail);
            let capacity = block.capacity();
            return Ok(WriteReservation {
                block,
                kind: PinKind::Tail { seq },
                offset,
                capacity,
            });
        }

        let block = self.pool().lease();
        let capacity = block.capacity();
        st.pinned = Some(Pinned::Fresh);
        Ok(WriteReservation {
            block,
            kind: PinKind::Fresh,
            offset: 0,
            capacity,
        })
    }

    /// Commit a reservation: `count` bytes written into its window become
    /// visible, flow accounting is advanced first, `count == 0` marks
    /// stream end, and `error` (if any) becomes the pending error. Clears
    /// the pin and signals completion.
    pub fn incoming_complete(
        &self,
        reservation: WriteReservation,
        count: usize,
        error: Option<io::Error>,
    ) -> io::Result<()> {
        let over_commit = count > reservation.spare_capacity();
        let mut released: Option<BlockHandle> = None;
        {
            let mut st = self.lock_state();
            st.pinned = None;

            if over_commit {
                // The reservation is spent either way; unlinked blocks go
                // back before the misuse error is raised.
                if matches!(reservation.kind, PinKind::Fresh) {
                    released = Some(reservation.block);
                }
                drop(st);
                if let Some(block) = released {
                    self.pool().release(block);
                }
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "commit exceeds reserved capacity",
                ));
            }

            if st.disposed {
                // The chain is gone; nothing to link. Only a fresh block
                // goes back here; a pinned tail was already freed with the
                // chain.
                if matches!(reservation.kind, PinKind::Fresh) {
                    released = Some(reservation.block);
                }
            } else {
                // Flow accounting advances before the bytes become visible.
                if count > 0 {
                    if let Some(flow) = self.flow() {
                        flow.add(count);
                    }
                }
                match reservation.kind {
                    PinKind::Tail { seq } => {
                        if let Some(seg) = st.chain.iter_mut().find(|s| s.seq == seq) {
                            seg.end += count;
                        }
                    }
                    PinKind::Fresh => {
                        if count > 0 {
                            let seq = st.next_seq;
                            st.next_seq += 1;
                            st.chain.push_back(Segment {
                                seq,
                                block: reservation.block,
                                start: 0,
                                end: count,
                            });
                        } else {
                            // Unused lease.
                            released = Some(reservation.block);
                        }
                    }
                }
                if count == 0 {
                    st.fin = true;
                }
                if let Some(err) = error {
                    st.pending = Some(super::PendingError::from_io(err));
                }
            }
        }

        if let Some(block) = released {
            self.pool().release(block);
        }
        trace!("incoming commit: {} bytes", count);
        self.signal_ready();
        Ok(())
    }

    /// Cancel a reservation without committing, e.g. when the read would
    /// block and will be retried. A fresh (unlinked) block goes back to the
    /// pool; a pinned tail is simply unpinned.
    pub fn incoming_deferred(&self, reservation: WriteReservation) {
        let released = {
            let mut st = self.lock_state();
            st.pinned = None;
            match reservation.kind {
                PinKind::Fresh => Some(reservation.block),
                PinKind::Tail { .. } => None,
            }
        };
        if let Some(block) = released {
            self.pool().release(block);
        }
    }

    /// Append a copy of `bytes` to the chain, leasing tail blocks as
    /// needed. A zero-length slice marks stream end. Flow accounting
    /// advances before the bytes become visible; completion is signaled
    /// either way.
    ///
    /// Fails while a write reservation is outstanding: interleaving the
    /// copy-in path with a pinned write would publish bytes ahead of the
    /// earlier reservation, reordering the stream. Complete or defer the
    /// reservation first.
    pub fn incoming_data(&self, bytes: &[u8]) -> io::Result<()> {
        {
            let mut st = self.lock_state();
            if st.disposed {
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "input channel disposed",
                ));
            }
            if st.pinned.is_some() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "write already reserved",
                ));
            }

            if bytes.is_empty() {
                st.fin = true;
            } else {
                if let Some(flow) = self.flow() {
                    flow.add(bytes.len());
                }

                let mut remaining = bytes;
                while !remaining.is_empty() {
                    let writable = matches!(
                        st.chain.back(),
                        Some(tail) if tail.end < tail.block.capacity()
                    );
                    if !writable {
                        let block = self.pool().lease();
                        let seq = st.next_seq;
                        st.next_seq += 1;
                        st.chain.push_back(Segment {
                            seq,
                            block,
                            start: 0,
                            end: 0,
                        });
                    }
                    if let Some(tail) = st.chain.back_mut() {
                        let spare = tail.block.capacity() - tail.end;
                        let take = spare.min(remaining.len());
                        // Safety: single producer; the consumer never reads
                        // past `end`.
                        unsafe { tail.block.copy_in(tail.end, &remaining[..take]) };
                        tail.end += take;
                        remaining = &remaining[take..];
                    }
                }
            }
        }

        trace!("incoming data: {} bytes", bytes.len());
        self.signal_ready();
        Ok(())
    }

    /// Deliver stream end: equivalent to a zero-length `incoming_data`.
    pub fn incoming_fin(&self) -> io::Result<()> {
        self.incoming_data(&[])
    }
}
