//! Interrupt-to-task ring buffers.
//!
//! Each input stream (MIDI, select bus, I2C) gets one fixed-capacity
//! circular queue. The interrupt handler is the only producer and the
//! task-context drain loop is the only consumer, so no locking is needed:
//! correctness relies on the single-producer/single-consumer discipline
//! and on each cursor having exactly one writer.
//!
//! The push side is deliberately lossy: when the queue is full the
//! incoming element is dropped and a counter incremented. Under sustained
//! overload the module keeps its audio deadline and sheds input instead.
//! Consumers can observe the shed count via [`RingBuffer::dropped`].
//!
//! Capacity must be a power of two; the cursors advance with bit-masking,
//! never division, so a push is a handful of instructions in interrupt
//! context.

/// Fixed-capacity single-producer/single-consumer circular queue.
///
/// The read cursor trails the slot it last consumed by one, so a buffer
/// of capacity `N` holds at most `N - 1` elements; `push` reports the
/// queue full when the write cursor catches the read cursor. This is the
/// firmware convention and keeps both cursor updates single-word.
///
/// # Example
///
/// ```rust
/// use pulso_core::spsc::RingBuffer;
///
/// let mut q: RingBuffer<u8, 8> = RingBuffer::new();
/// assert!(q.push(0x90));
/// assert!(q.push(0x40));
/// assert_eq!(q.pop(), Some(0x90));
/// assert_eq!(q.pop(), Some(0x40));
/// assert_eq!(q.pop(), None);
/// ```
#[derive(Debug, Clone)]
pub struct RingBuffer<T, const N: usize> {
    buf: [T; N],
    /// Index of the last slot consumed. Starts one behind the first write.
    read: usize,
    /// Index of the next slot to fill.
    write: usize,
    dropped: u32,
}

impl<T: Copy + Default, const N: usize> RingBuffer<T, N> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        const { assert!(N.is_power_of_two(), "capacity must be a power of two") };
        Self {
            buf: [T::default(); N],
            read: N - 1,
            write: 0,
            dropped: 0,
        }
    }

    /// Enqueues one element from the producer (interrupt) side.
    ///
    /// Never blocks and never allocates. Returns `false` if the queue is
    /// full, in which case the element is dropped and counted.
    #[inline]
    pub fn push(&mut self, item: T) -> bool {
        if self.read == self.write {
            self.dropped = self.dropped.saturating_add(1);
            return false;
        }
        self.buf[self.write] = item;
        self.write = (self.write + 1) & (N - 1);
        true
    }

    /// Dequeues one element from the consumer (task) side.
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        let next = (self.read + 1) & (N - 1);
        if next == self.write {
            return None;
        }
        self.read = next;
        Some(self.buf[next])
    }

    /// Number of elements currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        (self.write.wrapping_sub(self.read).wrapping_sub(1)) & (N - 1)
    }

    /// Returns `true` if there is nothing to pop.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        (self.read + 1) & (N - 1) == self.write
    }

    /// Total elements shed because the queue was full.
    ///
    /// Production code takes no corrective action on overflow; the count
    /// exists so tests and diagnostics can observe the lossy policy.
    #[must_use]
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

impl<T: Copy + Default, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// One event on the I2C slave bus.
///
/// The I2C stream needs out-of-band framing the byte streams don't:
/// the decoder must see transaction boundaries (address bytes) and the
/// start of a read phase. On the wire these share the queue with data
/// bytes as negative `i16` sentinels; the decoder consumes the decoded
/// enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum I2cEvent {
    /// A data byte within the current transaction.
    Data(u8),
    /// An address byte; starts a new write transaction.
    Address(u8),
    /// The master began a read phase.
    #[default]
    ReadStarted,
}

impl I2cEvent {
    /// Sentinel for [`I2cEvent::ReadStarted`] in the wire encoding.
    pub const READ_STARTED_WIRE: i16 = -0x100;

    /// Decodes the firmware's tagged-word encoding: data bytes are stored
    /// as-is, address bytes negated, and a read phase as `-0x100`.
    #[must_use]
    pub fn from_wire(word: i16) -> Self {
        if word >= 0 {
            Self::Data(word as u8)
        } else if word == Self::READ_STARTED_WIRE {
            Self::ReadStarted
        } else {
            Self::Address((-word) as u8)
        }
    }

    /// Encodes back to the tagged-word form used by the interrupt handler.
    #[must_use]
    pub fn to_wire(self) -> i16 {
        match self {
            Self::Data(b) => i16::from(b),
            Self::Address(b) => -i16::from(b),
            Self::ReadStarted => Self::READ_STARTED_WIRE,
        }
    }

    /// Returns `true` for the out-of-band tags that reset the decoder.
    #[must_use]
    pub fn is_tag(self) -> bool {
        !matches!(self, Self::Data(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let mut q: RingBuffer<u8, 16> = RingBuffer::new();
        for b in 0..10u8 {
            assert!(q.push(b));
        }
        for b in 0..10u8 {
            assert_eq!(q.pop(), Some(b));
        }
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn drops_when_full() {
        let mut q: RingBuffer<u8, 8> = RingBuffer::new();
        // Usable capacity is N - 1.
        for b in 0..7u8 {
            assert!(q.push(b));
        }
        assert!(!q.push(99));
        assert_eq!(q.dropped(), 1);
        assert_eq!(q.len(), 7);
        // The dropped element never appears.
        let mut seen = alloc_free_collect(&mut q);
        seen.sort_unstable();
        assert_eq!(seen, [0, 1, 2, 3, 4, 5, 6]);
    }

    fn alloc_free_collect(q: &mut RingBuffer<u8, 8>) -> [u8; 7] {
        let mut out = [0u8; 7];
        for slot in &mut out {
            *slot = q.pop().unwrap();
        }
        out
    }

    #[test]
    fn wraps_around() {
        let mut q: RingBuffer<u8, 4> = RingBuffer::new();
        for round in 0..20u8 {
            assert!(q.push(round));
            assert_eq!(q.pop(), Some(round));
        }
        assert!(q.is_empty());
        assert_eq!(q.dropped(), 0);
    }

    #[test]
    fn i2c_event_wire_encoding() {
        assert_eq!(I2cEvent::from_wire(0x48), I2cEvent::Data(0x48));
        assert_eq!(I2cEvent::from_wire(-0x31), I2cEvent::Address(0x31));
        assert_eq!(I2cEvent::from_wire(-0x100), I2cEvent::ReadStarted);
        for ev in [
            I2cEvent::Data(0xFF),
            I2cEvent::Address(0x62),
            I2cEvent::ReadStarted,
        ] {
            assert_eq!(I2cEvent::from_wire(ev.to_wire()), ev);
        }
    }

    #[test]
    fn tags_are_tags() {
        assert!(I2cEvent::Address(1).is_tag());
        assert!(I2cEvent::ReadStarted.is_tag());
        assert!(!I2cEvent::Data(1).is_tag());
    }
}
