//! I2C command-channel decoder.
//!
//! The module sits on the bus as a slave. The interrupt layer turns bus
//! traffic into [`I2cEvent`]s: address bytes and read-phase starts are
//! out-of-band tags, everything else is command data. Each write
//! transaction carries one or more commands; the first byte of a command
//! is an opcode, and a static table maps opcode to total frame length
//! (1 to 4 bytes, or a nested-MIDI length for the passthrough
//! commands).
//!
//! Completed frames dispatch to an [`I2cHandler`] by length family.
//! Get-style commands write up to four bytes into the decoder's
//! [`ResponseBuffer`]; the master's subsequent read transaction drains
//! it one byte per read request through the [`SlaveControl`] capability.
//! Unknown opcodes and frames cut short by a new transaction are
//! dropped without dispatching anything - the decoder resynchronizes on
//! the next address tag.

use pulso_core::spsc::I2cEvent;

use crate::sink::{MidiSink, SelectSink, SlaveControl};

/// The command vocabulary. Opcode values are fixed by the bus protocol.
pub mod opcode {
    /// Set a virtual controller to a signed 16-bit value.
    pub const SET_CONTROLLER: u8 = 0x11;
    /// Recall the preset in the given slot.
    pub const LOAD_PRESET: u8 = 0x40;
    /// Store the current preset in the given slot.
    pub const SAVE_PRESET: u8 = 0x41;
    /// Reset the working preset to defaults.
    pub const RESET_PRESET: u8 = 0x42;
    /// Query the current preset slot (2-byte reply).
    pub const GET_CURRENT_PRESET: u8 = 0x43;
    /// Switch to the given algorithm.
    pub const LOAD_ALGORITHM: u8 = 0x44;
    /// Query the current algorithm (1-byte reply).
    pub const GET_CURRENT_ALGORITHM: u8 = 0x45;
    /// Set a parameter to an absolute value.
    pub const SET_PARAMETER: u8 = 0x46;
    /// Set a parameter from a 0..16384 controller range.
    pub const SET_PARAMETER_SCALED: u8 = 0x47;
    /// Query a parameter value (2-byte reply).
    pub const GET_PARAMETER_VALUE: u8 = 0x48;
    /// Query a parameter minimum (2-byte reply).
    pub const GET_PARAMETER_MIN: u8 = 0x49;
    /// Query a parameter maximum (2-byte reply).
    pub const GET_PARAMETER_MAX: u8 = 0x4A;
    /// Start/stop the recorder.
    pub const RECORDER_RECORD: u8 = 0x4B;
    /// Start/stop recorder playback.
    pub const RECORDER_PLAY: u8 = 0x4C;
    /// Set the loop pitch.
    pub const LOOP_SET_PITCH: u8 = 0x4D;
    /// Advance the loop clock.
    pub const LOOP_SEND_CLOCK: u8 = 0x4E;
    /// Forward a nested MIDI message to the MIDI output.
    pub const SEND_MIDI_MESSAGE: u8 = 0x4F;
    /// Forward a nested MIDI message onto the select bus.
    pub const SEND_SELECT_BUS_MESSAGE: u8 = 0x50;
    /// Set the pitch of an allocated voice.
    pub const VOICE_PITCH: u8 = 0x51;
    /// Gate an allocated voice on.
    pub const VOICE_NOTE_ON: u8 = 0x52;
    /// Gate an allocated voice off.
    pub const VOICE_NOTE_OFF: u8 = 0x53;
    /// Set the pitch of a numbered note.
    pub const NOTE_PITCH: u8 = 0x54;
    /// Gate a numbered note on.
    pub const NOTE_ON: u8 = 0x55;
    /// Gate a numbered note off.
    pub const NOTE_OFF: u8 = 0x56;
    /// Release every sounding note.
    pub const ALL_NOTES_OFF: u8 = 0x57;
    /// Clear the looper.
    pub const LOOPER_CLEAR: u8 = 0x58;
    /// Query looper state (2-byte reply).
    pub const LOOPER_GET_STATE: u8 = 0x59;
    /// Second-channel variant of [`GET_PARAMETER_VALUE`].
    pub const DUAL_GET_PARAMETER_VALUE: u8 = 0x5A;
    /// Second-channel variant of [`GET_PARAMETER_MIN`].
    pub const DUAL_GET_PARAMETER_MIN: u8 = 0x5B;
    /// Second-channel variant of [`GET_PARAMETER_MAX`].
    pub const DUAL_GET_PARAMETER_MAX: u8 = 0x5C;
    /// Second-channel variant of [`SET_PARAMETER`].
    pub const DUAL_SET_PARAMETER: u8 = 0x5D;
    /// Second-channel variant of [`SET_PARAMETER_SCALED`].
    pub const DUAL_SET_PARAMETER_SCALED: u8 = 0x5E;
    /// Query one channel's algorithm (1-byte reply).
    pub const DUAL_GET_CURRENT_ALGORITHM: u8 = 0x5F;
    /// Load an algorithm into one channel.
    pub const DUAL_LOAD_ALGORITHM: u8 = 0x60;
    /// Query both channels' algorithms (2-byte reply).
    pub const DUAL_GET_CURRENT_ALGORITHMS: u8 = 0x61;
    /// Load algorithms into both channels.
    pub const DUAL_LOAD_ALGORITHMS: u8 = 0x62;
    /// Recall a preset into one channel.
    pub const DUAL_LOAD_PRESET: u8 = 0x63;
    /// Store a preset from one channel.
    pub const DUAL_SAVE_PRESET: u8 = 0x64;
    /// Take over the Z input for one channel.
    pub const DUAL_TAKEOVER_Z: u8 = 0x65;
    /// Query the Z takeover state.
    pub const DUAL_GET_Z: u8 = 0x66;
    /// Route outputs to the expander header.
    pub const SET_EXPANDER: u8 = 0x67;
}

/// Total frame length implied by an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLen {
    /// Opcode only.
    One,
    /// Opcode plus one argument byte.
    Two,
    /// Opcode plus a signed 16-bit value.
    Three,
    /// Opcode plus an argument byte and a signed 16-bit value.
    Four,
    /// Opcode plus a nested MIDI message of status-dependent length.
    Midi,
}

/// The opcode -> frame-length table. `None` for opcodes outside the
/// vocabulary.
#[must_use]
pub fn frame_len(op: u8) -> Option<FrameLen> {
    use opcode::*;
    Some(match op {
        SET_CONTROLLER | SET_PARAMETER | SET_PARAMETER_SCALED | VOICE_PITCH | VOICE_NOTE_ON
        | NOTE_PITCH | NOTE_ON | DUAL_SET_PARAMETER_SCALED => FrameLen::Four,
        SEND_MIDI_MESSAGE | SEND_SELECT_BUS_MESSAGE => FrameLen::Midi,
        LOAD_PRESET | SAVE_PRESET | LOOP_SET_PITCH | DUAL_SET_PARAMETER | DUAL_LOAD_ALGORITHM
        | DUAL_LOAD_ALGORITHMS | DUAL_LOAD_PRESET | DUAL_SAVE_PRESET | DUAL_TAKEOVER_Z
        | SET_EXPANDER => FrameLen::Three,
        LOAD_ALGORITHM | GET_PARAMETER_VALUE | GET_PARAMETER_MIN | GET_PARAMETER_MAX
        | RECORDER_RECORD | RECORDER_PLAY | VOICE_NOTE_OFF | NOTE_OFF | LOOPER_GET_STATE
        | DUAL_GET_PARAMETER_VALUE | DUAL_GET_PARAMETER_MIN | DUAL_GET_PARAMETER_MAX
        | DUAL_GET_CURRENT_ALGORITHM => FrameLen::Two,
        RESET_PRESET | GET_CURRENT_PRESET | GET_CURRENT_ALGORITHM | LOOP_SEND_CLOCK
        | ALL_NOTES_OFF | LOOPER_CLEAR | DUAL_GET_CURRENT_ALGORITHMS | DUAL_GET_Z => FrameLen::One,
        _ => return None,
    })
}

/// Byte count of a nested MIDI message, from its status byte. `None`
/// for sysex (which cannot be nested in a command frame) and for bytes
/// that are not a status at all.
fn nested_midi_len(status: u8) -> Option<usize> {
    Some(match status & 0xF0 {
        0x80 | 0x90 | 0xA0 | 0xB0 | 0xE0 => 3,
        0xC0 | 0xD0 => 2,
        0xF0 => match status & 0x0F {
            0x0 => return None,
            0x1 | 0x3 => 2, // MTC, song select
            0x2 => 3,       // song position
            _ => 1,
        },
        _ => return None,
    })
}

/// Staging area for a reply to the next master read.
///
/// Holds at most four bytes; [`ResponseBuffer::next_read_byte`] drains
/// one byte per read request and returns `None` once exhausted.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseBuffer {
    bytes: [u8; 4],
    index: u8,
    size: u8,
}

impl ResponseBuffer {
    /// Stages `data` (at most four bytes) and rewinds the read index.
    pub fn set(&mut self, data: &[u8]) {
        let n = data.len().min(4);
        self.bytes[..n].copy_from_slice(&data[..n]);
        self.index = 0;
        self.size = n as u8;
    }

    /// Stages a big-endian 16-bit reply.
    pub fn set_u16(&mut self, value: u16) {
        self.set(&value.to_be_bytes());
    }

    /// Takes the next undelivered byte, if any.
    pub fn next_read_byte(&mut self) -> Option<u8> {
        if self.index < self.size {
            let b = self.bytes[usize::from(self.index)];
            self.index += 1;
            Some(b)
        } else {
            None
        }
    }

    /// Bytes staged and not yet delivered.
    #[must_use]
    pub fn remaining(&self) -> usize {
        usize::from(self.size - self.index)
    }
}

/// Downstream consumer of decoded commands, one method per length
/// family. Get-style commands stage their reply in `reply`.
pub trait I2cHandler {
    /// A one-byte command.
    fn command(&mut self, op: u8, reply: &mut ResponseBuffer) {
        let _ = (op, reply);
    }

    /// A two-byte command.
    fn command_arg(&mut self, op: u8, arg: u8, reply: &mut ResponseBuffer) {
        let _ = (op, arg, reply);
    }

    /// A three-byte command with its signed 16-bit value.
    fn command_value(&mut self, op: u8, value: i16, reply: &mut ResponseBuffer) {
        let _ = (op, value, reply);
    }

    /// A four-byte command with its argument and signed 16-bit value.
    fn command_arg_value(&mut self, op: u8, arg: u8, value: i16, reply: &mut ResponseBuffer) {
        let _ = (op, arg, value, reply);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Between commands; data bytes are ignored until a new address tag.
    Idle,
    WantByte1,
    WantByte2of2,
    WantByte2of3,
    WantByte3of3,
    WantByte2of4,
    WantByte3of4,
    WantByte4of4,
    WantByte2ofN,
}

/// The I2C command decoder.
pub struct I2cDecoder {
    state: State,
    msg: [u8; 4],
    response: ResponseBuffer,
}

impl Default for I2cDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl I2cDecoder {
    /// A decoder waiting for its first transaction.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            msg: [0; 4],
            response: ResponseBuffer::default(),
        }
    }

    /// The staged reply, for inspection.
    #[must_use]
    pub fn response(&self) -> &ResponseBuffer {
        &self.response
    }

    /// Consumes one event from the interrupt queue.
    ///
    /// Address tags reset the state machine (abandoning any incomplete
    /// frame); read tags additionally drain one reply byte through
    /// `slave`. Completed command frames dispatch to `handler`, except
    /// the MIDI passthrough commands, which forward their nested bytes
    /// into `midi` or `select`.
    pub fn feed<H, M, S, C>(
        &mut self,
        ev: I2cEvent,
        handler: &mut H,
        midi: &mut M,
        select: &mut S,
        slave: &mut C,
    ) where
        H: I2cHandler + ?Sized,
        M: MidiSink + ?Sized,
        S: SelectSink + ?Sized,
        C: SlaveControl + ?Sized,
    {
        let b = match ev {
            I2cEvent::Data(b) => b,
            I2cEvent::Address(_) => {
                self.state = State::WantByte1;
                return;
            }
            I2cEvent::ReadStarted => {
                match self.response.next_read_byte() {
                    Some(b) => slave.supply_read_byte(b),
                    None => slave.end_of_data(),
                }
                self.state = State::WantByte1;
                return;
            }
        };

        match self.state {
            State::Idle => {}
            State::WantByte1 => {
                self.msg[0] = b;
                self.state = match frame_len(b) {
                    Some(FrameLen::Four) => State::WantByte2of4,
                    Some(FrameLen::Midi) => State::WantByte2ofN,
                    Some(FrameLen::Three) => State::WantByte2of3,
                    Some(FrameLen::Two) => State::WantByte2of2,
                    Some(FrameLen::One) => {
                        handler.command(b, &mut self.response);
                        State::Idle
                    }
                    None => State::Idle,
                };
            }
            State::WantByte2of4 => {
                self.msg[1] = b;
                self.state = State::WantByte3of4;
            }
            State::WantByte3of4 => {
                self.msg[2] = b;
                self.state = State::WantByte4of4;
            }
            State::WantByte4of4 => {
                self.msg[3] = b;
                self.state = State::Idle;
                if self.is_passthrough() {
                    self.midi_passthrough(midi, select);
                } else {
                    let value = i16::from_be_bytes([self.msg[2], self.msg[3]]);
                    handler.command_arg_value(self.msg[0], self.msg[1], value, &mut self.response);
                }
            }
            State::WantByte2ofN => {
                self.msg[1] = b;
                self.state = match nested_midi_len(b) {
                    Some(3) => State::WantByte3of4,
                    Some(2) => State::WantByte3of3,
                    Some(1) => {
                        // Single-byte system message: forward it now.
                        self.midi_passthrough(midi, select);
                        State::Idle
                    }
                    // Nested sysex and non-status bytes abort the
                    // frame.
                    _ => State::Idle,
                };
            }
            State::WantByte2of2 => {
                self.msg[1] = b;
                self.state = State::Idle;
                handler.command_arg(self.msg[0], self.msg[1], &mut self.response);
            }
            State::WantByte2of3 => {
                self.msg[1] = b;
                self.state = State::WantByte3of3;
            }
            State::WantByte3of3 => {
                self.msg[2] = b;
                self.state = State::Idle;
                if self.is_passthrough() {
                    self.midi_passthrough(midi, select);
                } else {
                    let value = i16::from_be_bytes([self.msg[1], self.msg[2]]);
                    handler.command_value(self.msg[0], value, &mut self.response);
                }
            }
        }
    }

    fn is_passthrough(&self) -> bool {
        matches!(
            self.msg[0],
            opcode::SEND_MIDI_MESSAGE | opcode::SEND_SELECT_BUS_MESSAGE
        )
    }

    fn midi_passthrough<M, S>(&mut self, midi: &mut M, select: &mut S)
    where
        M: MidiSink + ?Sized,
        S: SelectSink + ?Sized,
    {
        let Some(count) = nested_midi_len(self.msg[1]) else {
            return;
        };
        let bytes = &self.msg[1..1 + count];
        match self.msg[0] {
            opcode::SEND_MIDI_MESSAGE => {
                for &b in bytes {
                    midi.send(b);
                }
            }
            opcode::SEND_SELECT_BUS_MESSAGE => {
                for &b in bytes {
                    select.send(b);
                }
            }
            _ => {}
        }
    }
}
