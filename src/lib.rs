//! Pooled inbound byte buffering for a single socket connection.
//!
//! One producer (the transport receive path) appends received bytes into a
//! chain of pooled blocks; one consumer drains them, blocking a thread or
//! suspending cooperatively until the lock-free completion signal fires.
//! Backpressure accounting and continuation scheduling are injected hooks,
//! so the channel itself never allocates raw storage and never blocks the
//! producer on consumer progress.

mod block;
mod channel;
mod futex;
mod hooks;
mod pool;
mod signal;

pub use block::{Block, BlockHandle, Cursor};
pub use channel::{ChannelBuilder, InputChannel, Readiness, WriteReservation};
pub use futex::WaitGate;
pub use hooks::{FlowControl, FlowMeter, Scheduler, ThreadScheduler};
pub use pool::{BlockPool, SlabPool};
pub use signal::{Continuation, ReadySignal, RegisterOutcome};
