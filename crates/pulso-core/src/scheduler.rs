//! Cooperative audio-block scheduling.
//!
//! The audio path is driven by a double-buffered block transfer: while
//! the transfer hardware fills one half of the block buffer, the
//! processor works on the other. Per half-block the scheduler advances
//! the sample clock, runs the external DSP step, and then performs the
//! outstanding bounded background work (queue draining, settings flush)
//! before the next half-transfer completes.
//!
//! Everything else in the firmware — display refresh, flash programming,
//! blocking byte transmission — runs in ordinary task context and stays
//! deadline-safe by calling the cooperative checkpoint
//! ([`Scheduler::maybe_service`]) on every iteration of any unbounded
//! loop. The checkpoint services a half-block if one is pending and is a
//! no-op while the scheduler is already inside its own block path, so
//! nested background work cannot recurse into it.
//!
//! The scheduler also enforces a *minimum* per-block compute time: some
//! downstream interrupt logic needs a minimum interval between audio
//! interrupts, so finishing a block too early is as much a bug as
//! finishing late. When measured utilization is below the floor the
//! scheduler spins in a calibrated busy loop before returning.

/// Frames per half-block at the audio rate.
pub const FRAMES_PER_BLOCK: usize = 32;
/// Stereo input pairs delivered by the transfer hardware.
pub const NUM_INPUT_PAIRS: usize = 3;
/// Stereo output pairs consumed by the transfer hardware.
pub const NUM_OUTPUT_PAIRS: usize = 2;
/// Audio sample rate in Hz.
pub const SAMPLE_RATE: u32 = 96_000;
/// Rate of the slow (UI) tick in Hz.
pub const SLOW_RATE: u32 = 600;
/// Samples per slow tick.
pub const SLOW_TICK_RATIO: i32 = (SAMPLE_RATE / SLOW_RATE) as i32;

/// Which half of the ping-pong block buffer is being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Half {
    /// First half of the double buffer.
    #[default]
    Ping,
    /// Second half of the double buffer.
    Pong,
}

impl Half {
    /// Frame offset of this half within a channel's double buffer.
    #[must_use]
    pub fn offset(self) -> usize {
        match self {
            Self::Ping => 0,
            Self::Pong => 2 * FRAMES_PER_BLOCK,
        }
    }

    /// The other half.
    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            Self::Ping => Self::Pong,
            Self::Pong => Self::Ping,
        }
    }
}

/// The raw audio block buffers, interleaved stereo and double buffered.
///
/// Each channel array holds both halves back to back: index with
/// `half.offset() + 2 * frame + side`.
#[derive(Debug, Clone)]
pub struct AudioBlocks {
    /// Raw input codes, three stereo pairs.
    pub input: [[i32; 4 * FRAMES_PER_BLOCK]; NUM_INPUT_PAIRS],
    /// Raw output codes, two stereo pairs.
    pub output: [[i32; 4 * FRAMES_PER_BLOCK]; NUM_OUTPUT_PAIRS],
}

impl Default for AudioBlocks {
    fn default() -> Self {
        Self {
            input: [[0; 4 * FRAMES_PER_BLOCK]; NUM_INPUT_PAIRS],
            output: [[0; 4 * FRAMES_PER_BLOCK]; NUM_OUTPUT_PAIRS],
        }
    }
}

/// The external DSP algorithm, out of scope for the control core.
pub trait AlgorithmStep {
    /// Processes one half-block in place: reads raw input codes for
    /// `half`, writes raw output codes for the same half.
    fn step(&mut self, blocks: &mut AudioBlocks, half: Half);
}

/// The block-transfer hardware seam.
///
/// Models the DMA half/complete interrupt flags: `half_pending` reads
/// the flag, `clear_pending` acknowledges it.
pub trait BlockTransfer {
    /// Returns `true` once the transfer of the next half has completed.
    fn half_pending(&mut self) -> bool;
    /// Acknowledges the pending half-transfer.
    fn clear_pending(&mut self);
    /// Blocks until the next half-transfer completes and acknowledges it.
    fn wait_half(&mut self) {
        while !self.half_pending() {}
        self.clear_pending();
    }
}

/// Monotonic processor cycle counter used for load measurement.
pub trait CycleCounter {
    /// Current cycle count; wraps at `u32::MAX`.
    fn now(&mut self) -> u32;
}

/// Bounded background work run once per half-block.
///
/// Implementations drain the interrupt ring buffers through the protocol
/// decoders and kick any pending settings flush. The work must be
/// bounded: unbounded loops belong outside, calling the checkpoint.
pub trait BackgroundService {
    /// Performs the outstanding bounded work.
    fn drain(&mut self, checkpoint: &mut dyn Checkpoint);
}

/// The cooperative checkpoint capability.
///
/// Any loop with an unbounded iteration count (byte-at-a-time
/// transmission, busy-polling a flash operation) calls
/// [`Checkpoint::maybe_service`] each iteration so the audio deadline is
/// never missed while it runs.
pub trait Checkpoint {
    /// Services a pending half-block, if any; no-op when the scheduler
    /// is already mid-block.
    fn maybe_service(&mut self);
}

/// Checkpoint handed to background work invoked *from* the block path.
///
/// The scheduler is already mid-block at that point, so the in-progress
/// guard makes servicing a no-op; handing out this inert checkpoint is
/// how the guard is realized without re-entrant borrows.
struct InFlightCheckpoint;

impl Checkpoint for InFlightCheckpoint {
    fn maybe_service(&mut self) {}
}

/// Result of servicing one half-block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HalfOutcome {
    /// `true` once per slow-tick period; gates low-rate UI work.
    pub slow_tick: bool,
    /// Measured processor load for the step, in percent.
    pub load_pct: u32,
}

/// Drives the periodic audio processing step and owns the ping-pong
/// bookkeeping, the sample clock, and the load floor.
#[derive(Debug)]
pub struct Scheduler {
    sample_time: u64,
    half: Half,
    in_progress: bool,
    slow_countdown: i32,
    cycles_per_block: u32,
    load_floor_pct: u32,
    last_load_pct: u32,
}

impl Scheduler {
    /// Creates a scheduler.
    ///
    /// `cycles_per_block` is the cycle budget of one half-block
    /// (`frames * cpu_hz / sample_rate`); `load_floor_pct` is the
    /// minimum utilization enforced by the busy-wait floor.
    #[must_use]
    pub fn new(cycles_per_block: u32, load_floor_pct: u32) -> Self {
        Self {
            sample_time: 0,
            half: Half::Ping,
            in_progress: false,
            slow_countdown: SLOW_TICK_RATIO,
            cycles_per_block,
            load_floor_pct,
            last_load_pct: 0,
        }
    }

    /// Monotonic sample-time counter, advanced per half-block.
    #[must_use]
    pub fn sample_time(&self) -> u64 {
        self.sample_time
    }

    /// The half the next service call will process.
    #[must_use]
    pub fn current_half(&self) -> Half {
        self.half
    }

    /// Measured load of the most recent step, in percent.
    #[must_use]
    pub fn load_pct(&self) -> u32 {
        self.last_load_pct
    }

    /// Services one half-block: advances the sample clock, runs the
    /// algorithm step under the load floor, then drains background work.
    ///
    /// Non-reentrant: a nested call (via a checkpoint reached from
    /// `background`) is a no-op.
    pub fn service_half(
        &mut self,
        blocks: &mut AudioBlocks,
        algo: &mut dyn AlgorithmStep,
        cycles: &mut dyn CycleCounter,
        background: &mut dyn BackgroundService,
    ) -> HalfOutcome {
        if self.in_progress {
            return HalfOutcome {
                slow_tick: false,
                load_pct: self.last_load_pct,
            };
        }
        self.in_progress = true;

        self.sample_time += FRAMES_PER_BLOCK as u64;

        let t0 = cycles.now();
        algo.step(blocks, self.half);
        self.enforce_load_floor(cycles, t0);

        background.drain(&mut InFlightCheckpoint);

        self.half = self.half.flipped();
        self.slow_countdown -= FRAMES_PER_BLOCK as i32;
        let slow_tick = self.slow_countdown <= 0;
        if slow_tick {
            self.slow_countdown = SLOW_TICK_RATIO;
        }

        self.in_progress = false;
        HalfOutcome {
            slow_tick,
            load_pct: self.last_load_pct,
        }
    }

    /// The cooperative checkpoint: services a half-block if the transfer
    /// hardware reports one pending and the scheduler is not already
    /// mid-block. Returns `true` if a half was serviced.
    pub fn maybe_service(
        &mut self,
        transfer: &mut dyn BlockTransfer,
        blocks: &mut AudioBlocks,
        algo: &mut dyn AlgorithmStep,
        cycles: &mut dyn CycleCounter,
        background: &mut dyn BackgroundService,
    ) -> bool {
        if self.in_progress || !transfer.half_pending() {
            return false;
        }
        transfer.clear_pending();
        self.service_half(blocks, algo, cycles, background);
        true
    }

    /// Services a whole block (both halves), waiting on the transfer
    /// between them. This is the per-audio-interrupt path.
    pub fn service_block(
        &mut self,
        transfer: &mut dyn BlockTransfer,
        blocks: &mut AudioBlocks,
        algo: &mut dyn AlgorithmStep,
        cycles: &mut dyn CycleCounter,
        background: &mut dyn BackgroundService,
    ) -> HalfOutcome {
        let first = self.service_half(blocks, algo, cycles, background);
        transfer.wait_half();
        let second = self.service_half(blocks, algo, cycles, background);
        HalfOutcome {
            slow_tick: first.slow_tick || second.slow_tick,
            load_pct: second.load_pct,
        }
    }

    /// Spins until measured utilization reaches the floor. A minimum
    /// interval between audio interrupts is required downstream, so the
    /// step must not return early under light load.
    fn enforce_load_floor(&mut self, cycles: &mut dyn CycleCounter, t0: u32) {
        loop {
            let elapsed = cycles.now().wrapping_sub(t0);
            let load = elapsed.saturating_mul(100) / self.cycles_per_block;
            if load >= self.load_floor_pct {
                self.last_load_pct = load;
                return;
            }
            Self::burn();
        }
    }

    /// Calibrated busy work; opaque to the optimizer.
    fn burn() {
        let mut x = 0u32;
        for i in 0..400u32 {
            x = core::hint::black_box(x.wrapping_add(i));
        }
        core::hint::black_box(x);
    }
}
