//! MIDI byte-stream decoder.
//!
//! A classic running-status state machine: status bytes latch the
//! message kind and channel, data bytes fill in the payload, and system
//! real-time bytes (>= 0xF8) cut through at any point without touching
//! decoder state. System exclusive frames accumulate into a bounded
//! buffer and are routed by header on the closing 0xF7.
//!
//! The decoder owns no policy. Completed messages go to a
//! [`MidiHandler`], which the select-bus decoder shares (see
//! `recall`), so both streams feed one downstream consumer while
//! keeping independent parse state.

use crate::sink::MidiSink;

/// Manufacturer sysex header that marks a frame as native to this
/// module.
pub const NATIVE_HEADER: [u8; 4] = [0xF0, 0x00, 0x21, 0x27];

/// Hardware family tag, the first byte after the manufacturer header in
/// a native frame.
pub const HARDWARE_TAG: u8 = 0x5D;

/// Device id that addresses every unit on the bus.
pub const BROADCAST_ID: u8 = 0x7F;

/// Sysex payload capacity. Bytes past this are dropped but the frame is
/// still tracked to its terminator.
pub const MAX_SYSEX: usize = 4096;

/// MIDI clock period: four quarter notes at 24 pulses per quarter.
pub const CLOCK_PERIOD: u32 = 96 * 4;

/// Downstream consumer of decoded MIDI.
///
/// `status` is the high nibble (0x80..=0xF0) and `channel` the low
/// nibble of the latched status byte. For system real-time bytes the
/// decoder calls `message(0xF0, byte & 0x0F, ..)` with unspecified data
/// bytes.
pub trait MidiHandler {
    /// A complete channel or system message.
    fn message(&mut self, status: u8, channel: u8, data: &[u8; 2]);

    /// A complete sysex frame carrying the native manufacturer header.
    /// `frame` spans from the opening 0xF0 through the closing 0xF7
    /// (the terminator is absent only if the frame overflowed).
    fn native_sysex(&mut self, frame: &[u8]) {
        let _ = frame;
    }

    /// A complete universal non-realtime sysex frame (`frame[1] == 0x7E`).
    fn non_realtime_sysex(&mut self, frame: &[u8]) {
        let _ = frame;
    }
}

/// Splits a native sysex frame into `(message_type, payload)`.
///
/// Checks the hardware tag and that the frame addresses `device_id` (or
/// broadcast). The payload excludes the trailing 0xF7 when present.
#[must_use]
pub fn parse_native(frame: &[u8], device_id: u8) -> Option<(u8, &[u8])> {
    if frame.len() <= 5 || frame[4] != HARDWARE_TAG {
        return None;
    }
    if frame.len() <= 7 {
        return None;
    }
    let id = frame[5];
    if id != BROADCAST_ID && id != device_id {
        return None;
    }
    let end = if frame[frame.len() - 1] == 0xF7 {
        frame.len() - 1
    } else {
        frame.len()
    };
    Some((frame[6], &frame[7..end]))
}

/// Frames a native sysex response into `sink`:
/// `F0 00 21 27 5D <id> <code> <payload & 0x7F>.. F7`.
pub fn sysex_reply<S: MidiSink + ?Sized>(sink: &mut S, device_id: u8, code: u8, payload: &[u8]) {
    for b in NATIVE_HEADER {
        sink.send(b);
    }
    sink.send(HARDWARE_TAG);
    sink.send(device_id);
    sink.send(code);
    for &b in payload {
        sink.send(b & 0x7F);
    }
    sink.send(0xF7);
}

/// Transport state tracker for the MIDI clock.
///
/// Counts clock pulses modulo [`CLOCK_PERIOD`]; the first clock after a
/// Start message re-zeroes the count so downstream phase math lines up
/// with the transport.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClockHandler {
    first_clock: bool,
    counter: u32,
}

impl ClockHandler {
    /// Feeds a system real-time message (the low status nibble, >= 0x8).
    pub fn real_time(&mut self, channel: u8) {
        match channel {
            0xA => self.first_clock = true, // start
            0x8 => {
                // clock
                if self.first_clock {
                    self.first_clock = false;
                    self.counter = 0;
                } else {
                    self.counter += 1;
                    if self.counter >= CLOCK_PERIOD {
                        self.counter = 0;
                    }
                }
            }
            _ => {}
        }
    }

    /// Current clock phase in `0..CLOCK_PERIOD`.
    #[must_use]
    pub fn counter(&self) -> u32 {
        self.counter
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    WantByte1of1,
    WantByte1of2,
    WantByte2,
    WantSysex,
}

/// The MIDI in-stream decoder.
pub struct MidiDecoder {
    state: State,
    status: u8,
    channel: u8,
    message: [u8; 2],
    sysex: [u8; MAX_SYSEX],
    sysex_len: usize,
}

impl Default for MidiDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiDecoder {
    /// A decoder in the idle state with no latched status.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            status: 0,
            channel: 0,
            message: [0; 2],
            sysex: [0; MAX_SYSEX],
            sysex_len: 0,
        }
    }

    /// Consumes one byte from the stream, dispatching any message it
    /// completes.
    pub fn feed<H: MidiHandler + ?Sized>(&mut self, b: u8, handler: &mut H) {
        if b >= 0xF8 {
            // System real-time: dispatch immediately, leave all decoder
            // state alone.
            handler.message(0xF0, b & 0x0F, &[0, 0]);
            return;
        }

        match self.state {
            State::Idle => self.process_status(b, handler),
            State::WantByte1of1 => {
                self.message[0] = b;
                self.state = State::Idle;
                handler.message(self.status, self.channel, &self.message);
            }
            State::WantByte1of2 => {
                self.message[0] = b;
                self.state = State::WantByte2;
            }
            State::WantByte2 => {
                self.message[1] = b;
                self.state = State::Idle;
                handler.message(self.status, self.channel, &self.message);
            }
            State::WantSysex => {
                if self.sysex_len < MAX_SYSEX {
                    self.sysex[self.sysex_len] = b;
                    self.sysex_len += 1;
                }
                if b & 0x80 != 0 {
                    self.state = State::Idle;
                    if b == 0xF7 {
                        self.end_of_sysex(handler);
                    } else {
                        // An unterminated frame is abandoned and the
                        // status byte re-processed.
                        self.process_status(b, handler);
                    }
                }
            }
        }
    }

    fn process_status<H: MidiHandler + ?Sized>(&mut self, b: u8, handler: &mut H) {
        if b & 0x80 != 0 {
            self.status = b & 0xF0;
            self.channel = b & 0x0F;
        }
        match self.status {
            // note off/on, poly pressure, control change, pitch bend
            0x80 | 0x90 | 0xA0 | 0xB0 | 0xE0 => self.state = State::WantByte1of2,
            // program change, channel pressure
            0xC0 | 0xD0 => self.state = State::WantByte1of1,
            0xF0 => {
                if self.channel == 0 {
                    self.state = State::WantSysex;
                    self.sysex[0] = b;
                    self.sysex_len = 1;
                }
            }
            _ => {}
        }
        // Running status: a data byte lands straight in the refreshed
        // state.
        if b & 0x80 == 0 && self.state != State::Idle {
            self.feed(b, handler);
        }
    }

    fn end_of_sysex<H: MidiHandler + ?Sized>(&mut self, handler: &mut H) {
        let frame = &self.sysex[..self.sysex_len];
        if frame.len() > 4 && frame[..4] == NATIVE_HEADER {
            handler.native_sysex(frame);
        } else if frame.len() > 2 && frame[1] == 0x7E {
            handler.non_realtime_sysex(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        messages: Vec<(u8, u8, [u8; 2])>,
        native: Vec<Vec<u8>>,
        universal: Vec<Vec<u8>>,
    }

    impl MidiHandler for Recorder {
        fn message(&mut self, status: u8, channel: u8, data: &[u8; 2]) {
            self.messages.push((status, channel, *data));
        }
        fn native_sysex(&mut self, frame: &[u8]) {
            self.native.push(frame.to_vec());
        }
        fn non_realtime_sysex(&mut self, frame: &[u8]) {
            self.universal.push(frame.to_vec());
        }
    }

    fn feed_all(d: &mut MidiDecoder, h: &mut Recorder, bytes: &[u8]) {
        for &b in bytes {
            d.feed(b, h);
        }
    }

    #[test]
    fn note_on_dispatches() {
        let mut d = MidiDecoder::new();
        let mut h = Recorder::default();
        feed_all(&mut d, &mut h, &[0x91, 0x40, 0x7F]);
        assert_eq!(h.messages, vec![(0x90, 1, [0x40, 0x7F])]);
    }

    #[test]
    fn running_status_reuses_latched_status() {
        let mut d = MidiDecoder::new();
        let mut h = Recorder::default();
        feed_all(&mut d, &mut h, &[0x90, 0x40, 0x7F, 0x41, 0x7F]);
        assert_eq!(
            h.messages,
            vec![(0x90, 0, [0x40, 0x7F]), (0x90, 0, [0x41, 0x7F])]
        );
    }

    #[test]
    fn stray_data_byte_with_no_status_ignored() {
        let mut d = MidiDecoder::new();
        let mut h = Recorder::default();
        feed_all(&mut d, &mut h, &[0x40, 0x7F]);
        assert!(h.messages.is_empty());
    }

    #[test]
    fn program_change_takes_one_data_byte() {
        let mut d = MidiDecoder::new();
        let mut h = Recorder::default();
        feed_all(&mut d, &mut h, &[0xC2, 0x05]);
        assert_eq!(h.messages, vec![(0xC0, 2, [0x05, 0x00])]);
    }

    #[test]
    fn real_time_does_not_disturb_in_progress_message() {
        let mut d = MidiDecoder::new();
        let mut h = Recorder::default();
        feed_all(&mut d, &mut h, &[0x90, 0x40, 0xF8, 0x7F]);
        assert_eq!(
            h.messages,
            vec![(0xF0, 0x08, [0, 0]), (0x90, 0, [0x40, 0x7F])]
        );
    }

    #[test]
    fn native_sysex_routed_by_header() {
        let mut d = MidiDecoder::new();
        let mut h = Recorder::default();
        feed_all(
            &mut d,
            &mut h,
            &[0xF0, 0x00, 0x21, 0x27, 0x5D, 0x00, 0x22, 0xF7],
        );
        assert_eq!(h.native.len(), 1);
        assert_eq!(h.native[0].last(), Some(&0xF7));
        assert!(h.universal.is_empty());
    }

    #[test]
    fn universal_sysex_routed_by_sub_id() {
        let mut d = MidiDecoder::new();
        let mut h = Recorder::default();
        feed_all(&mut d, &mut h, &[0xF0, 0x7E, 0x00, 0x06, 0x01, 0xF7]);
        assert_eq!(h.universal.len(), 1);
        assert!(h.native.is_empty());
    }

    #[test]
    fn interrupted_sysex_reprocesses_status() {
        let mut d = MidiDecoder::new();
        let mut h = Recorder::default();
        feed_all(&mut d, &mut h, &[0xF0, 0x01, 0x02, 0x90, 0x40, 0x7F]);
        // The frame never saw its 0xF7: nothing sysex-shaped fires, and
        // the note-on that cut it short decodes normally.
        assert!(h.native.is_empty());
        assert!(h.universal.is_empty());
        assert_eq!(h.messages, vec![(0x90, 0, [0x40, 0x7F])]);
    }

    #[test]
    fn oversize_sysex_truncates_but_still_terminates() {
        let mut d = MidiDecoder::new();
        let mut h = Recorder::default();
        d.feed(0xF0, &mut h);
        d.feed(0x00, &mut h);
        d.feed(0x21, &mut h);
        d.feed(0x27, &mut h);
        for _ in 0..(2 * MAX_SYSEX) {
            d.feed(0x55, &mut h);
        }
        d.feed(0xF7, &mut h);
        assert_eq!(h.native.len(), 1);
        assert_eq!(h.native[0].len(), MAX_SYSEX);
        // The decoder resynchronized: a normal message decodes next.
        feed_all(&mut d, &mut h, &[0x90, 0x40, 0x7F]);
        assert_eq!(h.messages, vec![(0x90, 0, [0x40, 0x7F])]);
    }

    #[test]
    fn parse_native_checks_tag_and_id() {
        let frame = [0xF0, 0x00, 0x21, 0x27, 0x5D, 0x03, 0x46, 0x01, 0x02, 0xF7];
        let (code, payload) = parse_native(&frame, 0x03).unwrap();
        assert_eq!(code, 0x46);
        assert_eq!(payload, &[0x01, 0x02]);
        // Broadcast id always matches.
        assert!(parse_native(&frame, 0x09).is_none());
        let mut bcast = frame;
        bcast[5] = BROADCAST_ID;
        assert!(parse_native(&bcast, 0x09).is_some());
    }

    #[test]
    fn sysex_reply_frames_and_masks() {
        struct Out(Vec<u8>);
        impl MidiSink for Out {
            fn send(&mut self, byte: u8) {
                self.0.push(byte);
            }
        }
        let mut out = Out(Vec::new());
        sysex_reply(&mut out, 0x00, 0x32, &[0x41, 0xC2]);
        assert_eq!(
            out.0,
            vec![0xF0, 0x00, 0x21, 0x27, 0x5D, 0x00, 0x32, 0x41, 0x42, 0xF7]
        );
    }

    #[test]
    fn clock_counter_wraps_and_resets_on_start() {
        let mut c = ClockHandler::default();
        for _ in 0..CLOCK_PERIOD + 5 {
            c.real_time(0x8);
        }
        assert_eq!(c.counter(), 5);
        c.real_time(0xA); // start
        c.real_time(0x8); // first clock after start re-zeroes
        assert_eq!(c.counter(), 0);
        c.real_time(0x8);
        assert_eq!(c.counter(), 1);
    }
}
