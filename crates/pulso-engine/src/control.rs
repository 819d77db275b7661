//! Task-context wiring: interrupt queues in, decoders, shared handler.
//!
//! [`ControlCore`] owns the three interrupt ring buffers and the three
//! decoder states, and implements the scheduler's
//! [`BackgroundService`] hook by draining every queue through its
//! decoder once per half-block. The interrupt entry points
//! (`*_received`) only push; everything else happens in task context.

use pulso_core::calibration::{CalibrationRecord, CalibrationTable};
use pulso_core::scheduler::{BackgroundService, Checkpoint};
use pulso_core::settings::{ControlSettings, SettingsStore, StoreError};
use pulso_core::spsc::{I2cEvent, RingBuffer};
use pulso_proto::i2c::{I2cDecoder, I2cHandler};
use pulso_proto::midi::{MidiDecoder, MidiHandler};
use pulso_proto::recall::{RecallDecoder, RecallHandler};
use pulso_proto::sink::{MidiSink, SelectSink, SlaveControl};

use crate::handler::CoreHandler;
use crate::output::{SelectLoopback, ShowMessage};

/// Capacity of the MIDI receive queue.
pub const MIDI_QUEUE_LEN: usize = 1024;
/// Capacity of the select-bus receive queue; recall traffic is sparse.
pub const SELECT_QUEUE_LEN: usize = 16;
/// Capacity of the I2C event queue.
pub const I2C_QUEUE_LEN: usize = 256;

/// The control core: queues, decoders, and the shared handler.
///
/// Generic over the output ports so tests and hardware bring-up supply
/// their own transmitters.
pub struct ControlCore<H, M, S, C>
where
    H: MidiHandler + RecallHandler + I2cHandler,
    M: MidiSink,
    S: SelectSink,
    C: SlaveControl,
{
    midi_rx: RingBuffer<u8, MIDI_QUEUE_LEN>,
    select_rx: RingBuffer<u8, SELECT_QUEUE_LEN>,
    i2c_rx: RingBuffer<I2cEvent, I2C_QUEUE_LEN>,
    midi_dec: MidiDecoder,
    recall_dec: RecallDecoder,
    i2c_dec: I2cDecoder,
    handler: H,
    midi_out: M,
    select_out: SelectLoopback<S>,
    slave: C,
    settings: ControlSettings,
    last_dropped: [u32; 3],
}

impl<H, M, S, C> ControlCore<H, M, S, C>
where
    H: MidiHandler + RecallHandler + I2cHandler,
    M: MidiSink,
    S: SelectSink,
    C: SlaveControl,
{
    /// Wires the core together with empty queues and idle decoders.
    pub fn new(handler: H, midi_out: M, select_out: S, slave: C, settings: ControlSettings) -> Self {
        Self {
            midi_rx: RingBuffer::new(),
            select_rx: RingBuffer::new(),
            i2c_rx: RingBuffer::new(),
            midi_dec: MidiDecoder::new(),
            recall_dec: RecallDecoder::new(),
            i2c_dec: I2cDecoder::new(),
            handler,
            midi_out,
            select_out: SelectLoopback::new(select_out),
            slave,
            settings,
            last_dropped: [0; 3],
        }
    }

    /// The shared downstream handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// The shared downstream handler, mutable.
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// The MIDI output port.
    pub fn midi_out_mut(&mut self) -> &mut M {
        &mut self.midi_out
    }

    /// The persisted control settings.
    pub fn settings(&self) -> &ControlSettings {
        &self.settings
    }

    /// The persisted control settings, mutable. Call
    /// [`ControlSettings::mark_dirty`] after changing them.
    pub fn settings_mut(&mut self) -> &mut ControlSettings {
        &mut self.settings
    }

    /// MIDI receive interrupt entry: push-only, never blocks. Returns
    /// `false` if the byte was dropped.
    pub fn midi_byte_received(&mut self, byte: u8) -> bool {
        self.midi_rx.push(byte)
    }

    /// Select-bus receive interrupt entry. Bytes the module itself
    /// echoed onto the shared bus are discarded here.
    pub fn select_byte_received(&mut self, byte: u8) -> bool {
        if self.select_out.take_ignore() {
            return true;
        }
        self.select_rx.push(byte)
    }

    /// I2C slave interrupt entry: address tags, data bytes, and
    /// read-phase starts all land in the same queue.
    pub fn i2c_event_received(&mut self, ev: I2cEvent) -> bool {
        self.i2c_rx.push(ev)
    }

    /// Flushes dirty settings through `store`, servicing audio via
    /// `checkpoint` while the flash is busy. Main-loop work; never call
    /// this from the block path.
    pub fn flush_settings(
        &mut self,
        store: &mut dyn SettingsStore,
        checkpoint: &mut dyn Checkpoint,
    ) -> Result<bool, StoreError> {
        self.settings.flush_if_dirty(store, checkpoint)
    }

    /// Bytes dropped so far per stream: `[midi, select, i2c]`.
    #[must_use]
    pub fn dropped_counts(&self) -> [u32; 3] {
        [
            self.midi_rx.dropped(),
            self.select_rx.dropped(),
            self.i2c_rx.dropped(),
        ]
    }

    fn report_drops(&mut self) {
        let now = self.dropped_counts();
        for (stream, (seen, last)) in ["midi", "select", "i2c"]
            .into_iter()
            .zip(now.into_iter().zip(self.last_dropped))
        {
            if seen != last {
                tracing::warn!(stream, dropped = seen, "receive queue overflowed");
            }
        }
        self.last_dropped = now;
    }
}

impl<H, M, S, C> BackgroundService for ControlCore<H, M, S, C>
where
    H: MidiHandler + RecallHandler + I2cHandler,
    M: MidiSink,
    S: SelectSink,
    C: SlaveControl,
{
    /// Drains all three queues to empty, I2C first (it can inject MIDI
    /// and select-bus traffic), then select, then MIDI. Bounded by the
    /// queue capacities.
    fn drain(&mut self, _checkpoint: &mut dyn Checkpoint) {
        while let Some(ev) = self.i2c_rx.pop() {
            self.i2c_dec.feed(
                ev,
                &mut self.handler,
                &mut self.midi_out,
                &mut self.select_out,
                &mut self.slave,
            );
        }
        while let Some(b) = self.select_rx.pop() {
            self.recall_dec.feed(b, &mut self.handler);
        }
        while let Some(b) = self.midi_rx.pop() {
            self.midi_dec.feed(b, &mut self.handler);
        }
        self.report_drops();
    }
}

/// Builds the calibration table from stored points, surfacing a warning
/// when invalid data forced defaults.
pub fn load_calibration(
    record: &CalibrationRecord,
    display: &mut dyn ShowMessage,
) -> CalibrationTable {
    let (table, used_defaults) = CalibrationTable::from_record(record);
    if used_defaults {
        tracing::warn!("calibration data out of range; defaults substituted");
        display.show_message(["", "Calibration data", "invalid - using", "defaults"]);
    }
    table
}

/// A ready-made core around [`CoreHandler`].
pub type StandardCore<M, S, C> = ControlCore<CoreHandler, M, S, C>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::CoreHandler;
    use pulso_core::calibration::InputPoints;
    use pulso_proto::i2c::opcode;

    struct Null;
    impl Checkpoint for Null {
        fn maybe_service(&mut self) {}
    }

    #[derive(Default)]
    struct Wire(Vec<u8>);
    impl SelectSink for Wire {
        fn send(&mut self, byte: u8) {
            self.0.push(byte);
        }
    }
    impl MidiSink for Wire {
        fn send(&mut self, byte: u8) {
            self.0.push(byte);
        }
    }

    #[derive(Default)]
    struct Slave {
        supplied: Vec<u8>,
        ended: u32,
    }
    impl SlaveControl for Slave {
        fn supply_read_byte(&mut self, byte: u8) {
            self.supplied.push(byte);
        }
        fn end_of_data(&mut self) {
            self.ended += 1;
        }
    }

    fn core() -> StandardCore<Wire, Wire, Slave> {
        ControlCore::new(
            CoreHandler::new(0),
            Wire::default(),
            Wire::default(),
            Slave::default(),
            ControlSettings::default(),
        )
    }

    #[test]
    fn midi_bytes_flow_to_shared_handler() {
        let mut c = core();
        for b in [0xC0, 0x07] {
            assert!(c.midi_byte_received(b));
        }
        c.drain(&mut Null);
        assert_eq!(c.handler().current_preset(), 7);
    }

    #[test]
    fn select_bus_recall_flow() {
        let mut c = core();
        for b in [0xB0, 16, 127, 0xC0, 9] {
            assert!(c.select_byte_received(b));
        }
        c.drain(&mut Null);
        assert_eq!(c.handler().last_saved(), Some(9));
    }

    #[test]
    fn i2c_get_then_read_drains_reply() {
        let mut c = core();
        c.i2c_event_received(I2cEvent::Address(0x62));
        c.i2c_event_received(I2cEvent::Data(opcode::GET_CURRENT_PRESET));
        c.drain(&mut Null);
        c.i2c_event_received(I2cEvent::ReadStarted);
        c.i2c_event_received(I2cEvent::ReadStarted);
        c.i2c_event_received(I2cEvent::ReadStarted);
        c.drain(&mut Null);
        assert_eq!(c.slave.supplied, vec![0x00, 0x00]);
        assert_eq!(c.slave.ended, 1);
    }

    #[test]
    fn i2c_select_passthrough_suppresses_loopback() {
        let mut c = core();
        c.i2c_event_received(I2cEvent::Address(0x62));
        for b in [opcode::SEND_SELECT_BUS_MESSAGE, 0xC0, 0x05] {
            c.i2c_event_received(I2cEvent::Data(b));
        }
        c.drain(&mut Null);
        assert_eq!(c.select_out.inner_mut().0, vec![0xC0, 0x05]);
        // The echo comes back and is discarded without touching the
        // handler.
        c.select_byte_received(0xC0);
        c.select_byte_received(0x05);
        c.drain(&mut Null);
        assert_eq!(c.handler().current_preset(), 0);
        // A genuine program change afterwards still decodes.
        c.select_byte_received(0xC0);
        c.select_byte_received(0x03);
        c.drain(&mut Null);
        assert_eq!(c.handler().current_preset(), 3);
    }

    #[test]
    fn select_queue_overflow_is_counted_not_fatal() {
        let mut c = core();
        for _ in 0..SELECT_QUEUE_LEN + 4 {
            c.select_byte_received(0x00);
        }
        let dropped = c.dropped_counts()[1];
        assert!(dropped >= 4, "dropped {dropped}");
        c.drain(&mut Null);
        // Stream recovers on the next message boundary.
        for b in [0xC0, 0x02] {
            c.select_byte_received(b);
        }
        c.drain(&mut Null);
        assert_eq!(c.handler().current_preset(), 2);
    }

    #[test]
    fn calibration_warning_reaches_display() {
        #[derive(Default)]
        struct Screen(Vec<String>);
        impl ShowMessage for Screen {
            fn show_message(&mut self, lines: [&str; 4]) {
                self.0.push(lines.join(" "));
            }
        }
        let mut screen = Screen::default();
        let mut record = CalibrationRecord::default();
        load_calibration(&record, &mut screen);
        assert!(screen.0.is_empty());
        record.inputs[1] = InputPoints {
            zero: 0x700000,
            three_volt: 0x266666,
        };
        load_calibration(&record, &mut screen);
        assert_eq!(screen.0.len(), 1);
    }
}
