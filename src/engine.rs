// keysynth -- a minimal keyboard and MIDI synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! The audio engine owns the actual sound generating equipment:
//! oscillators, gain stages and the connections between them.
//! Whoever drives the engine only ever sees opaque node handles.

use snafu::Snafu;

#[cfg(test)]
pub(crate) mod mock;
mod oscillator;
mod param;
mod render;

pub use oscillator::{Oscillator, Phase, WaveShape};
pub use param::GainParam;
pub use render::RenderEngine;

slotmap::new_key_type! {
    /// Handle of a node living inside an audio engine.
    pub struct NodeId;
}

/// Where the output of a node is sent to.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum Output {
    /// The input of another node.
    Node(NodeId),
    /// The speakers.
    Destination,
}

/// Possible errors when manipulating the nodes of an engine.
#[derive(Debug, PartialEq, Snafu)]
pub enum EngineError {
    #[snafu(display("Referenced node {:?} does not exist", node))]
    UnknownNode { node: NodeId },
    #[snafu(display("Node {:?} is not an oscillator", node))]
    NotAnOscillator { node: NodeId },
    #[snafu(display("Node {:?} is not a gain stage", node))]
    NotAGain { node: NodeId },
    #[snafu(display("Cannot ramp exponentially towards {}", value))]
    InvalidRampTarget { value: f64 },
    #[snafu(display("Connecting {:?} would create a cycle", node))]
    Cycle { node: NodeId },
}

/// The primitives a synthesizer needs from its sound backend.
///
/// Times are measured in seconds on the clock of the engine,
/// see [`AudioEngine::current_time`].
pub trait AudioEngine {
    /// Create a stopped oscillator. It only produces sound after [`AudioEngine::start`].
    fn create_oscillator(&mut self, shape: WaveShape, frequency: f64) -> NodeId;

    /// Create a gain stage multiplying its input by `gain`.
    fn create_gain(&mut self, gain: f64) -> NodeId;

    fn connect(&mut self, source: NodeId, destination: Output) -> Result<(), EngineError>;

    /// Drop all outgoing connections of a node and release it.
    /// The handle is invalid afterwards.
    fn disconnect(&mut self, node: NodeId) -> Result<(), EngineError>;

    fn start(&mut self, oscillator: NodeId) -> Result<(), EngineError>;

    fn stop(&mut self, oscillator: NodeId) -> Result<(), EngineError>;

    /// The value of a gain stage at the current time.
    fn gain_value(&self, gain: NodeId) -> Result<f64, EngineError>;

    /// Forget all automation of a gain stage scheduled at or after `time`.
    fn cancel_scheduled_values(&mut self, gain: NodeId, time: f64) -> Result<(), EngineError>;

    fn set_value_at_time(&mut self, gain: NodeId, value: f64, time: f64) -> Result<(), EngineError>;

    /// Move the gain exponentially from its previous automation value to `value`,
    /// arriving at `end_time`. `value` must be positive.
    fn exponential_ramp_to_value_at_time(
        &mut self,
        gain: NodeId,
        value: f64,
        end_time: f64,
    ) -> Result<(), EngineError>;

    /// Whether the oscillator exists and has been started but not stopped.
    fn is_oscillator_running(&self, oscillator: NodeId) -> bool;

    /// Number of nodes currently allocated.
    fn node_count(&self) -> usize;

    /// Seconds since the engine was created, advancing only while running.
    fn current_time(&self) -> f64;

    fn is_running(&self) -> bool;
}
