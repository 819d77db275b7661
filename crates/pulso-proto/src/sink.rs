//! Output capabilities the decoders write into.
//!
//! The decoders never own hardware. Anything that leaves the module - a
//! byte on the MIDI out UART, a byte echoed onto the select bus, the
//! response to an I2C master read - goes through one of these traits,
//! implemented by the task-context wiring layer.

/// Byte sink for the MIDI output stream.
///
/// Implementations are allowed to block until queue space frees up, but
/// must service the audio checkpoint while they do.
pub trait MidiSink {
    /// Queues one byte for transmission.
    fn send(&mut self, byte: u8);
}

/// Byte sink for the select-bus transmitter.
///
/// Bytes sent here appear on the shared bus and are looped back into the
/// module's own select-bus receiver; implementations must arrange for
/// the loopback to be suppressed (see the engine's `ignore_bytes`
/// counter).
pub trait SelectSink {
    /// Queues one byte for transmission.
    fn send(&mut self, byte: u8);
}

/// Slave-side driver hooks for the I2C read phase.
///
/// Invoked by the I2C decoder when the master starts a read; owned by
/// the caller.
pub trait SlaveControl {
    /// Supplies the next response byte to the in-progress master read.
    fn supply_read_byte(&mut self, byte: u8);

    /// Signals that the response is exhausted; the driver stops
    /// acknowledging further read requests in this transaction.
    fn end_of_data(&mut self);
}
