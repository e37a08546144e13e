//! Double-buffered sample storage.
//!
//! Two fixed-capacity FIFO buffers, `A` and `B`, allocated once at startup.
//! The sampler fills the active one; when it reaches capacity the sampler hands
//! it to the aggregator and switches to the other, so the timer tick never
//! waits for aggregation.
//!
//! Ownership is split at construction: [`AlternatingBuffer::split`] returns one
//! [`BufferWriter`] (producer) and one [`BufferReader`] (consumer), neither of
//! which is `Clone`. Each buffer sits behind its own mutex. The producer only
//! ever uses `try_lock`, so it cannot block on a slow drain; in the steady state
//! the two sides touch different buffers and never contend.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{AppResult, PipelineError};
use crate::hardware::Sample;
use crate::pipeline::notify::NotificationChannel;

/// Identifies one of the two buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferId {
    /// First buffer
    #[serde(alias = "A")]
    A,
    /// Second buffer
    #[serde(alias = "B")]
    B,
}

impl BufferId {
    /// The other buffer.
    pub fn other(self) -> Self {
        match self {
            BufferId::A => BufferId::B,
            BufferId::B => BufferId::A,
        }
    }

    fn index(self) -> usize {
        match self {
            BufferId::A => 0,
            BufferId::B => 1,
        }
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferId::A => write!(f, "A"),
            BufferId::B => write!(f, "B"),
        }
    }
}

/// Sampler state: which buffer is being filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillState {
    /// Samples go to buffer A
    FillingA,
    /// Samples go to buffer B
    FillingB,
}

impl FillState {
    /// Buffer receiving samples in this state.
    pub fn buffer(self) -> BufferId {
        match self {
            FillState::FillingA => BufferId::A,
            FillState::FillingB => BufferId::B,
        }
    }
}

impl From<BufferId> for FillState {
    fn from(id: BufferId) -> Self {
        match id {
            BufferId::A => FillState::FillingA,
            BufferId::B => FillState::FillingB,
        }
    }
}

/// Result of [`BufferWriter::push_active`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Stored; the buffer still has room.
    Accepted,
    /// Stored, and this sample filled the buffer to capacity.
    BecameFull(BufferId),
    /// Not stored: the active buffer is full or held by an unfinished drain.
    Dropped,
}

/// Result of [`BufferWriter::swap_and_notify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handoff {
    /// Buffer handed to the aggregator
    pub full: BufferId,
    /// Buffer that now receives samples
    pub now_active: BufferId,
    /// Unread notification replaced by this one
    pub overwritten: Option<BufferId>,
    /// Stale samples discarded from `now_active` because it was never drained
    pub reclaimed: usize,
}

impl Handoff {
    /// Whether `now_active` still held undrained data (buffer overrun).
    pub fn is_overrun(&self) -> bool {
        self.reclaimed > 0
    }
}

/// Fixed-capacity FIFO over a pre-allocated slice.
#[derive(Debug)]
struct FixedBuffer {
    samples: Box<[Sample]>,
    len: usize,
}

impl FixedBuffer {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: vec![0.0; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    fn push(&mut self, sample: Sample) -> bool {
        match self.samples.get_mut(self.len) {
            Some(slot) => {
                *slot = sample;
                self.len += 1;
                true
            }
            None => false,
        }
    }

    fn is_full(&self) -> bool {
        self.len == self.samples.len()
    }

    fn as_slice(&self) -> &[Sample] {
        &self.samples[..self.len]
    }

    fn take_into(&mut self, out: &mut Vec<Sample>) {
        out.extend_from_slice(self.as_slice());
        self.len = 0;
    }
}

/// Shared state behind the writer and reader halves.
#[derive(Debug)]
pub struct AlternatingBuffer {
    slots: [Mutex<FixedBuffer>; 2],
    capacity: usize,
    channel: NotificationChannel,
}

impl AlternatingBuffer {
    /// Allocate both buffers and split them into producer and consumer halves.
    ///
    /// # Arguments
    /// * `capacity` - Samples per buffer (N), at least 1
    /// * `initial` - Buffer that receives the first sample
    pub fn split(capacity: usize, initial: BufferId) -> (BufferWriter, BufferReader) {
        let capacity = capacity.max(1);
        let shared = Arc::new(Self {
            slots: [
                Mutex::new(FixedBuffer::with_capacity(capacity)),
                Mutex::new(FixedBuffer::with_capacity(capacity)),
            ],
            capacity,
            channel: NotificationChannel::new(initial),
        });

        (
            BufferWriter {
                shared: Arc::clone(&shared),
                reclaim_pending: false,
                late_reclaimed: 0,
            },
            BufferReader { shared },
        )
    }

    /// Samples per buffer.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn slot(&self, id: BufferId) -> &Mutex<FixedBuffer> {
        &self.slots[id.index()]
    }
}

/// Producer half: pushes samples and performs the swap-and-notify step.
#[derive(Debug)]
pub struct BufferWriter {
    shared: Arc<AlternatingBuffer>,
    // set when the last swap could not lock the newly active slot
    reclaim_pending: bool,
    late_reclaimed: usize,
}

impl BufferWriter {
    /// Buffer currently receiving samples.
    pub fn active(&self) -> BufferId {
        self.shared.channel.active()
    }

    /// Current fill state.
    pub fn state(&self) -> FillState {
        self.active().into()
    }

    /// Samples per buffer.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Append `sample` to the active buffer. Never blocks.
    ///
    /// Returns [`PushOutcome::BecameFull`] exactly when this push brought the
    /// active buffer to capacity. The caller is expected to follow up with
    /// [`swap_and_notify`](Self::swap_and_notify) before the next push.
    pub fn push_active(&mut self, sample: Sample) -> PushOutcome {
        let active = self.active();
        let Some(mut slot) = self.shared.slot(active).try_lock() else {
            return PushOutcome::Dropped;
        };
        if self.reclaim_pending {
            self.reclaim_pending = false;
            self.late_reclaimed += slot.len;
            slot.len = 0;
        }
        if !slot.push(sample) {
            return PushOutcome::Dropped;
        }
        if slot.is_full() {
            PushOutcome::BecameFull(active)
        } else {
            PushOutcome::Accepted
        }
    }

    /// Samples discarded by a push that finished a reclaim the last swap had
    /// to skip. Resets the count.
    pub fn take_late_reclaimed(&mut self) -> usize {
        std::mem::take(&mut self.late_reclaimed)
    }

    /// Hand `full` to the consumer and make the other buffer active.
    ///
    /// The selector flip and the notification are one atomic step. If the
    /// newly active buffer still holds samples the consumer never drained,
    /// they are discarded so the producer can keep going; the count is
    /// reported in [`Handoff::reclaimed`].
    pub fn swap_and_notify(&mut self, full: BufferId) -> Handoff {
        let overwritten = self.shared.channel.raise(full);
        let now_active = full.other();

        // The consumer holds the slot. It either drains it or, having seen
        // the flip, leaves it alone; the next push reclaims whatever is left.
        let reclaimed = match self.shared.slot(now_active).try_lock() {
            Some(mut slot) => std::mem::take(&mut slot.len),
            None => {
                self.reclaim_pending = true;
                0
            }
        };

        Handoff {
            full,
            now_active,
            overwritten,
            reclaimed,
        }
    }
}

/// Consumer half: waits for full buffers and drains them.
#[derive(Debug)]
pub struct BufferReader {
    shared: Arc<AlternatingBuffer>,
}

impl BufferReader {
    /// Samples per buffer.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Buffer the producer is currently filling.
    pub fn active(&self) -> BufferId {
        self.shared.channel.active()
    }

    /// Read and clear the pending full-buffer notification.
    pub fn take_full(&self) -> Option<BufferId> {
        self.shared.channel.take()
    }

    /// Wait up to `timeout` for a full-buffer notification.
    pub async fn wait_full(&self, timeout: std::time::Duration) -> Option<BufferId> {
        self.shared.channel.wait(timeout).await
    }

    /// Number of samples currently held by `id`.
    pub fn len(&self, id: BufferId) -> usize {
        self.shared.slot(id).lock().len
    }

    /// Remove and return every sample in `id`, in push order.
    pub fn drain(&mut self, id: BufferId) -> AppResult<Vec<Sample>> {
        let mut out = Vec::with_capacity(self.shared.capacity);
        self.drain_into(id, &mut out)?;
        Ok(out)
    }

    /// Like [`drain`](Self::drain) but reuses `out`, which is cleared first.
    ///
    /// Refuses to drain the active buffer, which would race the producer.
    /// The slot is locked before the selector is checked: while the guard is
    /// held the producer can neither reclaim nor push into it, so a flip that
    /// lands after the check cannot hand it fresh samples.
    pub fn drain_into(&mut self, id: BufferId, out: &mut Vec<Sample>) -> AppResult<usize> {
        let mut slot = self.shared.slot(id).lock();
        if id == self.active() {
            return Err(PipelineError::DrainActiveBuffer(id));
        }
        out.clear();
        slot.take_into(out);
        Ok(out.len())
    }
}
