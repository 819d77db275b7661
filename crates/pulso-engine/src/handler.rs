//! The shared downstream handler behind all three decoders.
//!
//! [`CoreHandler`] holds the module-level control state the protocols
//! act on: the current preset slot, the per-channel algorithm
//! selectors, a parameter bank, and the virtual controllers. The same
//! object receives decoded MIDI, recall actions, and I2C commands, so
//! a preset change looks identical no matter which bus requested it.

use pulso_proto::i2c::{I2cHandler, ResponseBuffer, opcode};
use pulso_proto::midi::{ClockHandler, MidiHandler, parse_native};
use pulso_proto::recall::{RecallHandler, SLOT_COUNT};

/// Parameters in the bank. Parameter numbers on the wire are 1-based.
pub const NUM_PARAMETERS: usize = 16;

/// Virtual controllers settable over I2C or MIDI CC.
pub const NUM_CONTROLLERS: usize = 4;

/// Native sysex message type carrying a display message.
pub const SYSEX_DISPLAY_MESSAGE: u8 = 0x02;

/// Module-level control state fed by all three buses.
#[derive(Debug, Clone)]
pub struct CoreHandler {
    clock: ClockHandler,
    device_id: u8,
    current_preset: u8,
    last_saved: Option<u8>,
    algorithm: [u8; 2],
    params: [i16; NUM_PARAMETERS],
    controllers: [i16; NUM_CONTROLLERS],
    pending_message: Option<String>,
}

impl CoreHandler {
    /// Fresh state for the unit with the given sysex device id.
    #[must_use]
    pub fn new(device_id: u8) -> Self {
        Self {
            clock: ClockHandler::default(),
            device_id,
            current_preset: 0,
            last_saved: None,
            algorithm: [1, 1],
            params: [0; NUM_PARAMETERS],
            controllers: [0; NUM_CONTROLLERS],
            pending_message: None,
        }
    }

    /// The preset slot most recently loaded.
    #[must_use]
    pub fn current_preset(&self) -> u8 {
        self.current_preset
    }

    /// The slot most recently saved to, if any.
    #[must_use]
    pub fn last_saved(&self) -> Option<u8> {
        self.last_saved
    }

    /// MIDI clock phase tracker.
    #[must_use]
    pub fn clock(&self) -> &ClockHandler {
        &self.clock
    }

    /// Parameter `number` (1-based, as on the wire).
    #[must_use]
    pub fn param(&self, number: u8) -> Option<i16> {
        let i = usize::from(number).checked_sub(1)?;
        self.params.get(i).copied()
    }

    /// Virtual controller `index`.
    #[must_use]
    pub fn controller(&self, index: u8) -> Option<i16> {
        self.controllers.get(usize::from(index)).copied()
    }

    /// Takes the display message requested over sysex, if one arrived.
    pub fn take_message(&mut self) -> Option<String> {
        self.pending_message.take()
    }

    fn set_param(&mut self, number: u8, value: i16) {
        if let Some(i) = usize::from(number).checked_sub(1)
            && let Some(p) = self.params.get_mut(i)
        {
            *p = value;
        }
    }
}

impl MidiHandler for CoreHandler {
    fn message(&mut self, status: u8, channel: u8, data: &[u8; 2]) {
        match status {
            0xF0 if channel >= 0x8 => self.clock.real_time(channel),
            // Program change recalls a preset, as on the select bus.
            0xC0 => self.load_slot(data[0] % SLOT_COUNT),
            0xB0 if usize::from(data[0]) < NUM_CONTROLLERS => {
                self.controllers[usize::from(data[0])] = i16::from(data[1]);
            }
            _ => {}
        }
    }

    fn native_sysex(&mut self, frame: &[u8]) {
        if let Some((code, payload)) = parse_native(frame, self.device_id)
            && code == SYSEX_DISPLAY_MESSAGE
        {
            self.pending_message = Some(String::from_utf8_lossy(payload).into_owned());
        }
    }
}

impl RecallHandler for CoreHandler {
    fn save_slot(&mut self, slot: u8) {
        self.last_saved = Some(slot);
        self.current_preset = slot;
    }

    fn load_slot(&mut self, slot: u8) {
        self.current_preset = slot;
    }
}

impl I2cHandler for CoreHandler {
    fn command(&mut self, op: u8, reply: &mut ResponseBuffer) {
        match op {
            opcode::RESET_PRESET => self.params = [0; NUM_PARAMETERS],
            opcode::GET_CURRENT_PRESET => reply.set_u16(u16::from(self.current_preset)),
            opcode::GET_CURRENT_ALGORITHM => reply.set(&[self.algorithm[0]]),
            opcode::DUAL_GET_CURRENT_ALGORITHMS => reply.set(&self.algorithm),
            _ => {}
        }
    }

    fn command_arg(&mut self, op: u8, arg: u8, reply: &mut ResponseBuffer) {
        match op {
            opcode::LOAD_ALGORITHM => self.algorithm[0] = arg,
            opcode::GET_PARAMETER_VALUE => {
                if let Some(v) = self.param(arg) {
                    reply.set_u16(v as u16);
                }
            }
            // The bank has no per-parameter metadata; the range is the
            // full signed 16-bit span.
            opcode::GET_PARAMETER_MIN => reply.set_u16(i16::MIN as u16),
            opcode::GET_PARAMETER_MAX => reply.set_u16(i16::MAX as u16),
            _ => {}
        }
    }

    fn command_value(&mut self, op: u8, value: i16, _reply: &mut ResponseBuffer) {
        match op {
            opcode::LOAD_PRESET => self.load_slot((value as u8) % SLOT_COUNT),
            opcode::SAVE_PRESET => self.save_slot((value as u8) % SLOT_COUNT),
            _ => {}
        }
    }

    fn command_arg_value(&mut self, op: u8, arg: u8, value: i16, _reply: &mut ResponseBuffer) {
        match op {
            opcode::SET_PARAMETER => self.set_param(arg, value),
            opcode::SET_PARAMETER_SCALED => {
                // 0..16383 controller range mapped onto the full span.
                let scaled = (i32::from(value) * 4 - 0x8000).clamp(-0x8000, 0x7FFF);
                self.set_param(arg, scaled as i16);
            }
            opcode::SET_CONTROLLER => {
                if let Some(c) = self.controllers.get_mut(usize::from(arg)) {
                    *c = value;
                }
            }
            _ => {}
        }
    }
}
