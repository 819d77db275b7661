//! Pulso Core - real-time control primitives for a Eurorack module
//!
//! This crate provides the building blocks that keep a fixed-latency
//! audio pipeline alive while three asynchronous input streams are
//! ingested and decoded: interrupt-to-task ring buffers, the cooperative
//! audio-block scheduler, the calibration engine, and the persisted
//! control settings record.
//!
//! # Core Abstractions
//!
//! ## Interrupt Handoff
//!
//! - [`RingBuffer`] - fixed-capacity SPSC queue, lossy on overflow
//! - [`I2cEvent`] - tagged element distinguishing I2C address/data bytes
//!
//! ## Scheduling
//!
//! - [`Scheduler`] - ping-pong half-block sequencing with a load floor
//! - [`Checkpoint`] - cooperative service point for unbounded loops
//! - [`AlgorithmStep`], [`BlockTransfer`], [`CycleCounter`],
//!   [`BackgroundService`] - seams to the hardware and the DSP step
//!
//! ## Calibration
//!
//! - [`CalibrationRecord`] - stored two-point data, validated on load
//! - [`CalibrationTable`] - derived affine coefficients per channel
//!
//! ## Settings
//!
//! - [`ControlSettings`] - magic-tagged persisted record with
//!   dirty-flag flushing through [`SettingsStore`]
//!
//! # Concurrency Model
//!
//! Single-threaded, interrupt-driven, cooperative. Interrupt handlers
//! only push into their ring buffer; all decoding and dispatch happens
//! in task context. There are no locks: every piece of shared state has
//! exactly one writer at a time by construction, and unit tests
//! instantiate independent instances instead of touching globals.
//!
//! # no_std Support
//!
//! This crate is `no_std` compatible. Disable the default `std` feature
//! in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! pulso-core = { version = "0.1", default-features = false }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

pub mod calibration;
pub mod scheduler;
pub mod settings;
pub mod spsc;

// Re-export main types at crate root
pub use calibration::{CalibrationRecord, CalibrationTable, InputPoints, OutputPoints};
pub use scheduler::{
    AlgorithmStep, AudioBlocks, BackgroundService, BlockTransfer, Checkpoint, CycleCounter, Half,
    HalfOutcome, Scheduler,
};
pub use settings::{ControlSettings, SettingsStore, StoreError};
pub use spsc::{I2cEvent, RingBuffer};
