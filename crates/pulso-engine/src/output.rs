//! Output ports: the MIDI out queue, the select-bus loopback guard, and
//! the diagnostic display capability.

use pulso_core::spsc::RingBuffer;
use pulso_proto::sink::{MidiSink, SelectSink};

/// Capacity of the MIDI output queue.
pub const MIDI_OUT_QUEUE_LEN: usize = 1024;

/// A byte transmitter (UART-shaped): a ready flag and a write register.
pub trait ByteTx {
    /// Returns `true` when the transmitter can accept a byte.
    fn ready(&mut self) -> bool;
    /// Hands one byte to the transmitter.
    fn write(&mut self, byte: u8);
}

/// The MIDI output path: a queue drained into the transmitter.
///
/// [`MidiOut::pump`] runs from the transmit-ready path; [`MidiSink::send`]
/// is lossless - when the queue is full it drains into the transmitter
/// until space frees up, so sysex replies are never torn.
pub struct MidiOut<T: ByteTx> {
    queue: RingBuffer<u8, MIDI_OUT_QUEUE_LEN>,
    tx: T,
}

impl<T: ByteTx> MidiOut<T> {
    /// An empty output queue over `tx`.
    pub fn new(tx: T) -> Self {
        Self {
            queue: RingBuffer::new(),
            tx,
        }
    }

    /// Moves one queued byte into the transmitter if it is ready.
    /// Returns `false` once the queue is empty, `true` while there is
    /// still work (queued bytes or a busy transmitter).
    pub fn pump(&mut self) -> bool {
        if !self.tx.ready() {
            return true;
        }
        match self.queue.pop() {
            Some(b) => {
                self.tx.write(b);
                true
            }
            None => false,
        }
    }

    /// Pumps until the queue is empty.
    pub fn flush(&mut self) {
        while self.pump() {}
    }

    /// Queued bytes not yet handed to the transmitter.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// The underlying transmitter.
    pub fn tx_mut(&mut self) -> &mut T {
        &mut self.tx
    }
}

impl<T: ByteTx> MidiSink for MidiOut<T> {
    fn send(&mut self, byte: u8) {
        while !self.queue.push(byte) {
            while !self.tx.ready() {}
            self.pump();
        }
    }
}

/// Select-bus transmitter wrapper that counts loopback bytes.
///
/// The select bus is shared: every byte the module sends reappears at
/// its own receiver. The wrapper counts sent bytes so the receive path
/// can discard exactly that many.
pub struct SelectLoopback<S: SelectSink> {
    inner: S,
    pending_ignores: u32,
}

impl<S: SelectSink> SelectLoopback<S> {
    /// Wraps a transmitter with a zeroed loopback count.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            pending_ignores: 0,
        }
    }

    /// Consumes one pending ignore; `true` means the received byte was
    /// our own echo and must be discarded.
    pub fn take_ignore(&mut self) -> bool {
        if self.pending_ignores > 0 {
            self.pending_ignores -= 1;
            true
        } else {
            false
        }
    }

    /// Echo bytes still expected back.
    #[must_use]
    pub fn pending_ignores(&self) -> u32 {
        self.pending_ignores
    }

    /// The wrapped transmitter.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }
}

impl<S: SelectSink> SelectSink for SelectLoopback<S> {
    fn send(&mut self, byte: u8) {
        self.inner.send(byte);
        self.pending_ignores += 1;
    }
}

/// Four-line diagnostic display, implemented by the UI layer.
pub trait ShowMessage {
    /// Displays a short message to the user.
    fn show_message(&mut self, lines: [&str; 4]);
}
