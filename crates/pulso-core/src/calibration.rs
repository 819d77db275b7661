//! Two-point calibration for the converter channels.
//!
//! Every CV input and output goes through an affine transform between raw
//! converter codes and volts. The coefficients derive from two measured
//! points per channel, stored in non-volatile settings:
//!
//! - inputs: the code read at 0 V (`zero`) and at +3 V (`three_volt`);
//! - outputs: the code that produces 0 V (`zero`) and the code measured
//!   when the DAC is driven with the internal half-scale code 0x400000
//!   (`half_scale`).
//!
//! With `B = (three_volt - zero) / 3` (codes per volt on the paired
//! input), an input converts as `volts = (code - zero) / B`. An output
//! channel derives `D = (zero_out - zero_in) / B` and
//! `E = (half_scale - zero_out) / (B * 0x400000)`, and converts as
//! `code = volts / E - D / E`, which runs in the audio path as one float
//! multiply and one integer subtract.
//!
//! Calibration data is validated on load; out-of-range points are
//! replaced by built-in defaults and the caller is told so it can surface
//! a warning. Degenerate (zero-span) points fall back to nominal scale
//! constants instead of dividing by zero.

/// Number of calibrated CV inputs.
pub const NUM_INPUTS: usize = 6;
/// Number of calibrated CV outputs.
pub const NUM_OUTPUTS: usize = 4;

/// Reference voltage applied when measuring the input scale point.
pub const REFERENCE_VOLTS: i32 = 3;
/// Internal DAC code driven when measuring the output half-scale point.
pub const HALF_SCALE_CODE: i32 = 0x400000;

/// Output codes are signed 24-bit.
pub const CODE_MIN: i32 = -0x800000;
/// Output codes are signed 24-bit.
pub const CODE_MAX: i32 = 0x7FFFFF;

const DEFAULT_THREE_VOLT: i32 = 0x266666;
const DEFAULT_HALF_SCALE: i32 = HALF_SCALE_CODE;
// Nominal codes-per-volt fallbacks for zero-span points.
const FALLBACK_SPAN_F: f32 = ((3 << 23) / 10) as f32;
const FALLBACK_B: i32 = 0xCCCCC;
const FALLBACK_HALF_SPAN: i32 = 0x399999;

/// Raw measured points for one input channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputPoints {
    /// Code read with the input at 0 V.
    pub zero: i32,
    /// Code read with the input at +3 V.
    pub three_volt: i32,
}

impl Default for InputPoints {
    fn default() -> Self {
        Self {
            zero: 0,
            three_volt: DEFAULT_THREE_VOLT,
        }
    }
}

/// Raw measured points for one output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputPoints {
    /// Code that produces 0 V at the jack.
    pub zero: i32,
    /// Code read back when driving the internal code 0x400000.
    pub half_scale: i32,
}

impl Default for OutputPoints {
    fn default() -> Self {
        Self {
            zero: 0,
            half_scale: DEFAULT_HALF_SCALE,
        }
    }
}

/// The persisted calibration record for the whole module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalibrationRecord {
    /// Measured points for the six CV inputs.
    pub inputs: [InputPoints; NUM_INPUTS],
    /// Measured points for the four CV outputs.
    pub outputs: [OutputPoints; NUM_OUTPUTS],
}

fn in_range(v: i32, min: i32, max: i32) -> bool {
    v >= min && v <= max
}

impl CalibrationRecord {
    /// Detects erased or never-written storage: the first input's scale
    /// point reads as all-zeros or all-ones flash.
    #[must_use]
    pub fn is_wiped(&self) -> bool {
        let tv = self.inputs[0].three_volt;
        tv == 0 || tv == -1
    }

    /// Returns `true` when every point falls within the documented sane
    /// ranges. Consumed by the start-up sequence.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.inputs.iter().all(|p| {
            in_range(p.zero, -0x100000, 0x100000) && in_range(p.three_volt, 0x100000, 0x380000)
        }) && self.outputs.iter().all(|p| {
            in_range(p.zero, -0x100000, 0x100000) && in_range(p.half_scale, 0x200000, 0x600000)
        })
    }

    /// Replaces out-of-range points with the built-in defaults.
    ///
    /// Returns `true` if anything was replaced, so the caller can surface
    /// a "using defaults" warning.
    pub fn sanitize(&mut self) -> bool {
        let mut bad = false;
        for p in &mut self.inputs {
            if !in_range(p.zero, -0x100000, 0x100000) {
                bad = true;
                p.zero = 0;
            }
            if !in_range(p.three_volt, 0x100000, 0x380000) {
                bad = true;
                p.three_volt = DEFAULT_THREE_VOLT;
            }
        }
        for p in &mut self.outputs {
            if !in_range(p.zero, -0x100000, 0x100000) {
                bad = true;
                p.zero = 0;
            }
            if !in_range(p.half_scale, 0x200000, 0x600000) {
                bad = true;
                p.half_scale = DEFAULT_HALF_SCALE;
            }
        }
        bad
    }
}

/// Derived coefficients for one input channel.
#[derive(Debug, Clone, Copy)]
pub struct InputChannel {
    zero: i32,
    /// `1 / B` — volts per code.
    inv_scale: f32,
    /// `-zero / B` — folds the zero offset into the multiply-add.
    offset: f32,
    /// `0x800_0000_0000 / B` — fixed-point reciprocal for the integer path.
    recip_b: i64,
}

impl InputChannel {
    fn from_points(p: InputPoints) -> Self {
        let mut span = (p.three_volt - p.zero) as f32;
        if span == 0.0 {
            span = FALLBACK_SPAN_F;
        }
        let b = span / REFERENCE_VOLTS as f32;
        let inv_scale = 1.0 / b;

        let mut b_int = (p.three_volt - p.zero) / REFERENCE_VOLTS;
        if b_int == 0 {
            b_int = FALLBACK_B;
        }
        let recip_b = 0x800_0000_0000_i64 / i64::from(b_int);

        Self {
            zero: p.zero,
            inv_scale,
            offset: -(p.zero as f32) * inv_scale,
            recip_b,
        }
    }

    /// Converts a raw ADC code to volts. This is the per-sample audio
    /// path: one multiply, one add.
    #[inline]
    #[must_use]
    pub fn to_volts(&self, code: i32) -> f32 {
        code as f32 * self.inv_scale + self.offset
    }

    /// Integer conversion to Q19 volts (1 V = `1 << 19`), for consumers
    /// that stay in fixed point.
    #[inline]
    #[must_use]
    pub fn to_volts_q19(&self, code: i32) -> i32 {
        ((i64::from(code - self.zero) * self.recip_b) >> 24) as i32
    }
}

/// Derived coefficients for one output channel.
#[derive(Debug, Clone, Copy)]
pub struct OutputChannel {
    /// `1 / E` — codes per volt.
    inv_e: f32,
    /// `D / E` — integer code offset subtracted after the scale multiply.
    offset: i32,
}

impl OutputChannel {
    fn from_points(p: OutputPoints, paired: InputPoints) -> Self {
        let mut b = (paired.three_volt - paired.zero) as f32;
        if b == 0.0 {
            b = FALLBACK_SPAN_F;
        }
        b /= REFERENCE_VOLTS as f32;

        let mut half_span = p.half_scale - p.zero;
        if half_span == 0 {
            half_span = FALLBACK_HALF_SPAN;
        }

        let d = (p.zero - paired.zero) as f32 / b;
        let e = half_span as f32 / (b * HALF_SCALE_CODE as f32);
        Self {
            inv_e: 1.0 / e,
            offset: (d / e) as i32,
        }
    }

    /// Converts volts to a raw DAC code, clamped to the signed 24-bit
    /// converter range. One multiply, one subtract, one clamp.
    #[inline]
    #[must_use]
    pub fn from_volts(&self, volts: f32) -> i32 {
        let code = (volts * self.inv_e) as i32 - self.offset;
        code.clamp(CODE_MIN, CODE_MAX)
    }
}

/// The full set of derived channel coefficients, computed once at
/// start-up (or on demand after the calibration data changes).
#[derive(Debug, Clone, Copy)]
pub struct CalibrationTable {
    inputs: [InputChannel; NUM_INPUTS],
    outputs: [OutputChannel; NUM_OUTPUTS],
}

impl CalibrationTable {
    /// Builds the table from a stored record.
    ///
    /// Wiped storage resets the whole record to defaults; individual
    /// out-of-range points are replaced per [`CalibrationRecord::sanitize`].
    /// The returned flag is `true` when defaults were substituted for
    /// data that was present but invalid — the caller must surface that
    /// to the user.
    #[must_use]
    pub fn from_record(record: &CalibrationRecord) -> (Self, bool) {
        let mut rec = *record;
        if rec.is_wiped() {
            rec = CalibrationRecord::default();
        }
        let used_defaults = rec.sanitize();

        let inputs = core::array::from_fn(|i| InputChannel::from_points(rec.inputs[i]));
        // Output k shares the scale of the input on the same converter
        // half: outputs 0,1 pair with inputs 0,1 and outputs 2,3 with
        // inputs 3,4.
        let outputs = core::array::from_fn(|k| {
            let paired = rec.inputs[(k / 2) * 3 + (k % 2)];
            OutputChannel::from_points(rec.outputs[k], paired)
        });
        (Self { inputs, outputs }, used_defaults)
    }

    /// Coefficients for input channel `ch`.
    #[must_use]
    pub fn input(&self, ch: usize) -> &InputChannel {
        &self.inputs[ch]
    }

    /// Coefficients for output channel `ch`.
    #[must_use]
    pub fn output(&self, ch: usize) -> &OutputChannel {
        &self.outputs[ch]
    }
}

impl Default for CalibrationTable {
    fn default() -> Self {
        Self::from_record(&CalibrationRecord::default()).0
    }
}
