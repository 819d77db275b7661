//! Select-bus (preset recall) decoder.
//!
//! The select bus carries ordinary MIDI framing with a small recall
//! vocabulary layered on top: a control-change latch arms "save mode",
//! program changes then save or load a numbered slot, and a one-byte
//! system-common shortcut saves directly. Anything that does not match
//! the vocabulary falls through to the same [`MidiHandler`] the MIDI
//! decoder feeds, so both streams share one downstream consumer while
//! keeping independent parse state.

use crate::midi::{MidiHandler, NATIVE_HEADER};

/// Controller number that arms/disarms save mode on channel 0.
pub const SAVE_MODE_CC: u8 = 16;

/// Slot numbers wrap at this count.
pub const SLOT_COUNT: u8 = 64;

/// Sysex capacity on the select bus; recall frames are tiny.
pub const MAX_SYSEX: usize = 20;

/// Preset save/load actions decoded from the bus.
pub trait RecallHandler {
    /// Stores the current preset in `slot`.
    fn save_slot(&mut self, slot: u8);
    /// Recalls the preset in `slot`.
    fn load_slot(&mut self, slot: u8);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    WantByte1of1,
    WantByte1of2,
    WantByte2,
    WantSysex,
}

/// The select-bus in-stream decoder.
pub struct RecallDecoder {
    state: State,
    status: u8,
    channel: u8,
    message: [u8; 2],
    sysex: [u8; MAX_SYSEX],
    sysex_len: usize,
    save_mode: bool,
}

impl Default for RecallDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RecallDecoder {
    /// A decoder in the idle state with save mode disarmed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            status: 0,
            channel: 0,
            message: [0; 2],
            sysex: [0; MAX_SYSEX],
            sysex_len: 0,
            save_mode: false,
        }
    }

    /// Returns `true` while the save-mode latch is armed.
    #[must_use]
    pub fn save_mode(&self) -> bool {
        self.save_mode
    }

    /// Consumes one byte from the bus, dispatching any action or
    /// fall-through message it completes. `handler` receives both the
    /// recall actions and the fall-through MIDI; the MIDI decoder can
    /// share the same object.
    pub fn feed<H>(&mut self, b: u8, handler: &mut H)
    where
        H: RecallHandler + MidiHandler + ?Sized,
    {
        match self.state {
            State::Idle => self.process_status(b, handler),
            State::WantByte1of1 => {
                self.message[0] = b;
                self.state = State::Idle;
                self.process_message(handler);
            }
            State::WantByte1of2 => {
                self.message[0] = b;
                self.state = State::WantByte2;
            }
            State::WantByte2 => {
                self.message[1] = b;
                self.state = State::Idle;
                self.process_message(handler);
            }
            State::WantSysex => {
                if self.sysex_len < MAX_SYSEX {
                    self.sysex[self.sysex_len] = b;
                    self.sysex_len += 1;
                }
                if b & 0x80 != 0 {
                    self.state = State::Idle;
                    if b == 0xF7 {
                        let frame = &self.sysex[..self.sysex_len];
                        if frame.len() > 4 && frame[..4] == NATIVE_HEADER {
                            handler.native_sysex(frame);
                        }
                    } else {
                        self.process_status(b, handler);
                    }
                }
            }
        }
    }

    fn process_status<H>(&mut self, b: u8, handler: &mut H)
    where
        H: RecallHandler + MidiHandler + ?Sized,
    {
        if b & 0x80 != 0 {
            self.status = b & 0xF0;
            self.channel = b & 0x0F;
        }
        match self.status {
            0x80 | 0x90 | 0xA0 | 0xB0 | 0xE0 => self.state = State::WantByte1of2,
            0xC0 | 0xD0 => self.state = State::WantByte1of1,
            0xF0 => {
                if self.channel == 0x4 {
                    // One-data-byte save shortcut.
                    self.state = State::WantByte1of1;
                } else if self.channel == 0x0 {
                    self.state = State::WantSysex;
                    self.sysex[0] = b;
                    self.sysex_len = 1;
                } else {
                    handler.message(self.status, self.channel, &self.message);
                    return;
                }
            }
            _ => {}
        }
        if b & 0x80 == 0 && self.state != State::Idle {
            self.feed(b, handler);
        }
    }

    fn process_message<H>(&mut self, handler: &mut H)
    where
        H: RecallHandler + MidiHandler + ?Sized,
    {
        let mut handled = false;
        if self.channel == 0 {
            match self.status {
                0xB0 => {
                    if self.message[0] == SAVE_MODE_CC {
                        self.save_mode = self.message[1] == 127;
                        handled = true;
                    }
                }
                0xC0 => {
                    let slot = self.message[0] % SLOT_COUNT;
                    if self.save_mode {
                        handler.save_slot(slot);
                    } else {
                        handler.load_slot(slot);
                    }
                    handled = true;
                }
                _ => {}
            }
        } else if (self.status | self.channel) == 0xF4 {
            // 0xF4 0x40 is "save all", which this module does not
            // support.
            if self.message[0] < 0x40 {
                handler.save_slot(self.message[0] % SLOT_COUNT);
            }
            handled = true;
        }
        if !handled {
            handler.message(self.status, self.channel, &self.message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        saved: Vec<u8>,
        loaded: Vec<u8>,
        messages: Vec<(u8, u8, [u8; 2])>,
        native: Vec<Vec<u8>>,
    }

    impl RecallHandler for Recorder {
        fn save_slot(&mut self, slot: u8) {
            self.saved.push(slot);
        }
        fn load_slot(&mut self, slot: u8) {
            self.loaded.push(slot);
        }
    }

    impl MidiHandler for Recorder {
        fn message(&mut self, status: u8, channel: u8, data: &[u8; 2]) {
            self.messages.push((status, channel, *data));
        }
        fn native_sysex(&mut self, frame: &[u8]) {
            self.native.push(frame.to_vec());
        }
    }

    fn feed_all(d: &mut RecallDecoder, h: &mut Recorder, bytes: &[u8]) {
        for &b in bytes {
            d.feed(b, h);
        }
    }

    #[test]
    fn armed_program_change_saves() {
        let mut d = RecallDecoder::new();
        let mut h = Recorder::default();
        feed_all(&mut d, &mut h, &[0xB0, 16, 127, 0xC0, 5]);
        assert_eq!(h.saved, vec![5]);
        assert!(h.loaded.is_empty());
        assert!(h.messages.is_empty());
    }

    #[test]
    fn disarmed_program_change_loads() {
        let mut d = RecallDecoder::new();
        let mut h = Recorder::default();
        feed_all(&mut d, &mut h, &[0xB0, 16, 0, 0xC0, 3]);
        assert_eq!(h.loaded, vec![3]);
        assert!(h.saved.is_empty());
    }

    #[test]
    fn slot_number_wraps() {
        let mut d = RecallDecoder::new();
        let mut h = Recorder::default();
        feed_all(&mut d, &mut h, &[0xC0, 64 + 7]);
        assert_eq!(h.loaded, vec![7]);
    }

    #[test]
    fn system_common_save_shortcut() {
        let mut d = RecallDecoder::new();
        let mut h = Recorder::default();
        feed_all(&mut d, &mut h, &[0xF4, 0x05]);
        assert_eq!(h.saved, vec![5]);
        // 0x40 and up ("save all") is swallowed without action.
        feed_all(&mut d, &mut h, &[0xF4, 0x40]);
        assert_eq!(h.saved, vec![5]);
        assert!(h.messages.is_empty());
    }

    #[test]
    fn unmatched_messages_fall_through() {
        let mut d = RecallDecoder::new();
        let mut h = Recorder::default();
        // Note-on, CC other than 16 on channel 0, CC 16 on channel 1:
        // none belong to the recall vocabulary.
        feed_all(&mut d, &mut h, &[0x90, 0x40, 0x7F]);
        feed_all(&mut d, &mut h, &[0xB0, 17, 127]);
        feed_all(&mut d, &mut h, &[0xB1, 16, 127]);
        assert!(h.saved.is_empty() && h.loaded.is_empty());
        assert_eq!(
            h.messages,
            vec![
                (0x90, 0, [0x40, 0x7F]),
                (0xB0, 0, [17, 127]),
                (0xB0, 1, [16, 127]),
            ]
        );
    }

    #[test]
    fn native_sysex_forwards_to_shared_handler() {
        let mut d = RecallDecoder::new();
        let mut h = Recorder::default();
        feed_all(&mut d, &mut h, &[0xF0, 0x00, 0x21, 0x27, 0x5D, 0x00, 0x22, 0xF7]);
        assert_eq!(h.native.len(), 1);
    }

    #[test]
    fn running_status_program_changes() {
        let mut d = RecallDecoder::new();
        let mut h = Recorder::default();
        feed_all(&mut d, &mut h, &[0xC0, 1, 2, 3]);
        assert_eq!(h.loaded, vec![1, 2, 3]);
    }
}
