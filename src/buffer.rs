#![allow(clippy::declare_interior_mutable_const)] // Usage is legit in this module.

use core::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

/// A fixed-capacity byte ring shared between one producer and one consumer.
///
/// The producer is the RX interrupt, the consumer is foreground code. Both sides only need a
/// shared reference, so the ring can sit inside a `static` driver context.
///
/// `head` and `tail` count modulo `2 * N`, and a slot index is the position modulo `N`. The
/// doubled range tells a full ring from an empty one without giving up a slot, and keeps the
/// slot sequence continuous across the wrap for any `N`. The number of stored bytes is
/// `head - tail` modulo `2 * N` and never exceeds `N`.
///
/// When the ring is full, [`push`](RingBuffer::push) discards the oldest byte to make room.
/// Discarding moves `tail`, which the consumer also moves, so `tail` is only ever advanced with
/// a compare-exchange. `head` has a single writer.
pub struct RingBuffer<const N: usize> {
    data: [AtomicU8; N],
    head: AtomicUsize,
    tail: AtomicUsize,
}

impl<const N: usize> RingBuffer<N> {
    /// Range of the `head` and `tail` positions.
    const WRAP: usize = 2 * N;

    pub const fn new() -> Self {
        assert!(N > 0 && N <= usize::MAX / 2, "ring capacity out of range");
        const SLOT: AtomicU8 = AtomicU8::new(0);
        Self {
            data: [SLOT; N],
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    fn advance(pos: usize) -> usize {
        let next = pos + 1;
        if next == Self::WRAP {
            0
        } else {
            next
        }
    }

    fn distance(head: usize, tail: usize) -> usize {
        if head >= tail {
            head - tail
        } else {
            head + Self::WRAP - tail
        }
    }

    fn slot(&self, pos: usize) -> &AtomicU8 {
        &self.data[pos % N]
    }

    // Amount of bytes available for reading
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        Self::distance(head, tail).min(N)
    }

    pub fn is_empty(&self) -> bool {
        self.tail.load(Ordering::Acquire) == self.head.load(Ordering::Acquire)
    }

    /// Appends a byte. Producer side only.
    ///
    /// Returns `true` if the oldest unread byte was dropped to make room.
    pub fn push(&self, byte: u8) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);

        let full = Self::distance(head, tail) >= N;
        if full {
            // Losing this race means the consumer took the oldest byte first; the slot is free
            // either way.
            let _ = self.tail.compare_exchange(
                tail,
                Self::advance(tail),
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }

        self.slot(head).store(byte, Ordering::Relaxed);
        self.head.store(Self::advance(head), Ordering::Release);
        full
    }

    /// Removes the oldest byte. Consumer side only.
    pub fn pop(&self) -> Option<u8> {
        let mut tail = self.tail.load(Ordering::Acquire);
        loop {
            if tail == self.head.load(Ordering::Acquire) {
                return None;
            }

            let byte = self.slot(tail).load(Ordering::Acquire);
            match self.tail.compare_exchange_weak(
                tail,
                Self::advance(tail),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(byte),
                // The producer dropped this byte (or the CAS failed spuriously); retry.
                Err(current) => tail = current,
            }
        }
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
