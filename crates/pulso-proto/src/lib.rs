//! Pulso Proto - byte-stream protocol decoders
//!
//! The control processor ingests three asynchronous byte streams, each
//! with its own variable-length framing: the MIDI bus, the inter-module
//! select bus, and the I2C command channel. This crate holds the three
//! state machines that turn those streams into dispatched commands.
//!
//! # Core Abstractions
//!
//! - [`MidiDecoder`] - running-status MIDI parser with bounded sysex
//! - [`RecallDecoder`] - select-bus parser with the preset-recall
//!   vocabulary layered on top, falling through to the shared
//!   [`MidiHandler`]
//! - [`I2cDecoder`] - opcode/length-table command parser over tagged
//!   [`pulso_core::spsc::I2cEvent`]s
//! - [`MidiSink`], [`SelectSink`], [`SlaveControl`] - output
//!   capabilities implemented by the wiring layer
//!
//! Decoders are plain state machines: they own no queues and no
//! hardware, consume one byte (or event) per call from task context,
//! and dispatch through handler traits. Feeding them from the interrupt
//! ring buffers is the engine crate's job.
//!
//! # no_std Support
//!
//! This crate is `no_std` compatible. Disable the default `std` feature
//! in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! pulso-proto = { version = "0.1", default-features = false }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

pub mod i2c;
pub mod midi;
pub mod recall;
pub mod sink;

// Re-export main types at crate root
pub use i2c::{FrameLen, I2cDecoder, I2cHandler, ResponseBuffer};
pub use midi::{ClockHandler, MidiDecoder, MidiHandler};
pub use recall::{RecallDecoder, RecallHandler};
pub use sink::{MidiSink, SelectSink, SlaveControl};
