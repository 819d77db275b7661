//! Pulso Engine - task-context wiring for the control core
//!
//! This crate assembles the pieces from `pulso-core` and `pulso-proto`
//! into a running control core: the interrupt entry points, the
//! queue-draining background service the audio scheduler invokes per
//! half-block, the shared command handler behind all three buses, and
//! the output ports.
//!
//! # Core Abstractions
//!
//! - [`ControlCore`] - owns the receive queues and decoder states;
//!   implements [`pulso_core::scheduler::BackgroundService`]
//! - [`CoreHandler`] - the shared downstream handler: presets,
//!   parameters, controllers, the MIDI clock
//! - [`MidiOut`] - lossless MIDI output queue over a [`ByteTx`]
//! - [`SelectLoopback`] - suppresses re-ingesting our own select-bus
//!   traffic
//! - [`load_calibration`] - calibration load with the user-visible
//!   defaults warning
//!
//! Diagnostics go through `tracing`; nothing here renders a display or
//! touches hardware registers directly.

pub mod control;
pub mod handler;
pub mod output;

pub use control::{ControlCore, StandardCore, load_calibration};
pub use handler::CoreHandler;
pub use output::{ByteTx, MidiOut, SelectLoopback, ShowMessage};
