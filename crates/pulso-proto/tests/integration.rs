//! Cross-decoder integration tests.
//!
//! The three decoders are independent state machines, but in the module
//! they converge: MIDI and select-bus share one downstream handler, and
//! I2C can inject traffic into the MIDI output. These tests exercise
//! those seams.

use pulso_core::spsc::I2cEvent;
use pulso_proto::i2c::{I2cDecoder, I2cHandler, opcode};
use pulso_proto::midi::{MidiDecoder, MidiHandler};
use pulso_proto::recall::{RecallDecoder, RecallHandler};
use pulso_proto::sink::{MidiSink, SelectSink, SlaveControl};

#[derive(Default)]
struct Shared {
    messages: Vec<(u8, u8, [u8; 2])>,
    saved: Vec<u8>,
    loaded: Vec<u8>,
}

impl MidiHandler for Shared {
    fn message(&mut self, status: u8, channel: u8, data: &[u8; 2]) {
        self.messages.push((status, channel, *data));
    }
}

impl RecallHandler for Shared {
    fn save_slot(&mut self, slot: u8) {
        self.saved.push(slot);
    }
    fn load_slot(&mut self, slot: u8) {
        self.loaded.push(slot);
    }
}

impl I2cHandler for Shared {}

#[derive(Default)]
struct Buffer(Vec<u8>);
impl MidiSink for Buffer {
    fn send(&mut self, byte: u8) {
        self.0.push(byte);
    }
}
impl SelectSink for Buffer {
    fn send(&mut self, byte: u8) {
        self.0.push(byte);
    }
}

#[derive(Default)]
struct NullSlave;
impl SlaveControl for NullSlave {
    fn supply_read_byte(&mut self, _byte: u8) {}
    fn end_of_data(&mut self) {}
}

/// Both stream decoders feed the same handler object while keeping
/// independent running status and save-mode state.
#[test]
fn midi_and_select_share_one_handler() {
    let mut midi = MidiDecoder::new();
    let mut select = RecallDecoder::new();
    let mut shared = Shared::default();

    // Arm save mode on the select bus, latch note-on status on MIDI.
    for &b in &[0xB0u8, 16, 127] {
        select.feed(b, &mut shared);
    }
    for &b in &[0x90u8, 0x40, 0x7F] {
        midi.feed(b, &mut shared);
    }
    // A program change on each bus: the select one saves, the MIDI one
    // falls through as a plain message.
    select.feed(0xC0, &mut shared);
    select.feed(5, &mut shared);
    midi.feed(0xC1, &mut shared);
    midi.feed(9, &mut shared);
    // MIDI running status is unaffected by select-bus traffic.
    midi.feed(0xC1, &mut shared);
    midi.feed(2, &mut shared);

    assert_eq!(shared.saved, vec![5]);
    assert!(shared.loaded.is_empty());
    assert_eq!(
        shared.messages,
        vec![
            (0x90, 0, [0x40, 0x7F]),
            (0xC0, 1, [9, 0x7F]),
            (0xC0, 1, [2, 0x7F]),
        ]
    );
}

/// A MIDI message injected over I2C decodes on the MIDI output side
/// exactly as if it had arrived on the wire.
#[test]
fn i2c_injected_midi_round_trips_through_decoder() {
    let mut i2c = I2cDecoder::new();
    let mut shared = Shared::default();
    let mut midi_out = Buffer::default();
    let mut select_out = Buffer::default();
    let mut slave = NullSlave;

    i2c.feed(
        I2cEvent::Address(0x62),
        &mut shared,
        &mut midi_out,
        &mut select_out,
        &mut slave,
    );
    for &b in &[opcode::SEND_MIDI_MESSAGE, 0x92, 0x3C, 0x64] {
        i2c.feed(
            I2cEvent::Data(b),
            &mut shared,
            &mut midi_out,
            &mut select_out,
            &mut slave,
        );
    }

    let mut decoder = MidiDecoder::new();
    let mut downstream = Shared::default();
    for &b in &midi_out.0 {
        decoder.feed(b, &mut downstream);
    }
    assert_eq!(downstream.messages, vec![(0x90, 2, [0x3C, 0x64])]);
}
