//! Overwrite-on-write hand-off between the sampler and the aggregator.
//!
//! The active-buffer selector and the pending "buffer X is full" notification
//! are packed into one `AtomicU8`, so the producer flips the selector and posts
//! the notification in a single atomic store that the consumer can never
//! observe half-done:
//!
//! ```text
//!   bit 0      active buffer (0 = A, 1 = B)
//!   bits 1..2  pending notification (0 = none, 1 = A full, 2 = B full)
//! ```
//!
//! Only the producer changes the active bit. The consumer clears the pending
//! bits with `fetch_and`, which leaves the active bit untouched. A notification
//! posted while another is still unread replaces it; [`NotificationChannel::raise`]
//! returns the one that was lost.
//!
//! Wake-ups go through `tokio::sync::Notify`. `notify_one` never blocks and
//! stores a permit when nobody is waiting yet, so a notification raised just
//! before the consumer starts waiting is not missed.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};

use crate::pipeline::buffer::BufferId;

const ACTIVE_MASK: u8 = 0b001;
const PENDING_SHIFT: u8 = 1;

/// Single-slot, last-writer-wins notification plus the active-buffer selector.
#[derive(Debug)]
pub struct NotificationChannel {
    state: AtomicU8,
    wake: Notify,
}

impl NotificationChannel {
    /// Create a channel with `active` selected and nothing pending.
    pub fn new(active: BufferId) -> Self {
        Self {
            state: AtomicU8::new(encode(active, None)),
            wake: Notify::new(),
        }
    }

    /// Buffer currently receiving samples.
    pub fn active(&self) -> BufferId {
        decode_active(self.state.load(Ordering::Acquire))
    }

    /// Unread notification, if any, without clearing it.
    pub fn pending(&self) -> Option<BufferId> {
        decode_pending(self.state.load(Ordering::Acquire))
    }

    /// Producer side: make the other buffer active and announce that `full`
    /// is ready, in one atomic step, then wake the consumer.
    ///
    /// Returns the notification this one overwrote, if the consumer had not
    /// read it yet. Never blocks.
    pub fn raise(&self, full: BufferId) -> Option<BufferId> {
        let previous = self
            .state
            .swap(encode(full.other(), Some(full)), Ordering::AcqRel);
        self.wake.notify_one();
        decode_pending(previous)
    }

    /// Consumer side: read and clear the pending notification.
    pub fn take(&self) -> Option<BufferId> {
        decode_pending(self.state.fetch_and(ACTIVE_MASK, Ordering::AcqRel))
    }

    /// Consumer side: wait up to `timeout` for a notification, then take it.
    ///
    /// Returns `None` when the wait timed out with nothing pending. Stale
    /// wake permits (left behind by a notification that was already taken)
    /// do not end the wait early.
    pub async fn wait(&self, timeout: Duration) -> Option<BufferId> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(full) = self.take() {
                return Some(full);
            }
            if timeout_at(deadline, self.wake.notified()).await.is_err() {
                return self.take();
            }
        }
    }
}

fn encode(active: BufferId, pending: Option<BufferId>) -> u8 {
    let active_bit = match active {
        BufferId::A => 0,
        BufferId::B => 1,
    };
    let pending_bits = match pending {
        None => 0,
        Some(BufferId::A) => 1,
        Some(BufferId::B) => 2,
    };
    active_bit | (pending_bits << PENDING_SHIFT)
}

fn decode_active(state: u8) -> BufferId {
    if state & ACTIVE_MASK == 0 {
        BufferId::A
    } else {
        BufferId::B
    }
}

fn decode_pending(state: u8) -> Option<BufferId> {
    match state >> PENDING_SHIFT {
        1 => Some(BufferId::A),
        2 => Some(BufferId::B),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn raise_flips_active_and_posts_full_buffer() {
        let channel = NotificationChannel::new(BufferId::A);
        assert_eq!(channel.active(), BufferId::A);
        assert_eq!(channel.pending(), None);

        assert_eq!(channel.raise(BufferId::A), None);
        assert_eq!(channel.active(), BufferId::B);
        assert_eq!(channel.pending(), Some(BufferId::A));
    }

    #[test]
    fn take_clears_pending_but_keeps_active() {
        let channel = NotificationChannel::new(BufferId::B);
        channel.raise(BufferId::B);

        assert_eq!(channel.take(), Some(BufferId::B));
        assert_eq!(channel.take(), None);
        assert_eq!(channel.active(), BufferId::A);
    }

    #[test]
    fn second_raise_overwrites_unread_notification() {
        let channel = NotificationChannel::new(BufferId::A);
        assert_eq!(channel.raise(BufferId::A), None);
        assert_eq!(channel.raise(BufferId::B), Some(BufferId::A));

        // only the newest survives
        assert_eq!(channel.take(), Some(BufferId::B));
        assert_eq!(channel.take(), None);
        assert_eq!(channel.active(), BufferId::A);
    }

    #[tokio::test]
    async fn wait_returns_pending_immediately() {
        let channel = NotificationChannel::new(BufferId::A);
        channel.raise(BufferId::A);
        let got = channel.wait(Duration::from_secs(5)).await;
        assert_eq!(got, Some(BufferId::A));
    }

    #[tokio::test]
    async fn wait_times_out_when_idle() {
        let channel = NotificationChannel::new(BufferId::A);
        let started = std::time::Instant::now();
        assert_eq!(channel.wait(Duration::from_millis(20)).await, None);
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn stale_permit_does_not_end_wait_early() {
        let channel = NotificationChannel::new(BufferId::A);
        channel.raise(BufferId::A);
        // consume the notification without consuming the wake permit
        assert_eq!(channel.take(), Some(BufferId::A));

        let started = std::time::Instant::now();
        assert_eq!(channel.wait(Duration::from_millis(30)).await, None);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn waiter_is_woken_by_raise() {
        let channel = NotificationChannel::new(BufferId::A);
        let mut waiting = tokio_test::task::spawn(channel.wait(Duration::from_secs(5)));
        tokio_test::assert_pending!(waiting.poll());

        channel.raise(BufferId::A);
        assert!(waiting.is_woken());
        assert_eq!(tokio_test::assert_ready!(waiting.poll()), Some(BufferId::A));
    }

    #[tokio::test]
    async fn raise_from_another_thread_wakes_waiter() {
        let channel = Arc::new(NotificationChannel::new(BufferId::A));
        let producer = Arc::clone(&channel);

        let thread = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            producer.raise(BufferId::A);
        });

        let got = channel.wait(Duration::from_secs(5)).await;
        assert_eq!(got, Some(BufferId::A));
        thread.join().unwrap();
    }
}
