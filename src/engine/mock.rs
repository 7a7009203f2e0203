// keysynth -- a minimal keyboard and MIDI synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! An engine that only keeps books, with a clock the test sets by hand.

use slotmap::SlotMap;

use super::*;

#[derive(Debug)]
pub enum MockKind {
    Oscillator {
        frequency: f64,
        started: bool,
        stopped: bool,
    },
    Gain {
        param: GainParam,
    },
}

#[derive(Debug)]
pub struct MockNode {
    pub kind: MockKind,
    pub outputs: Vec<Output>,
    /// Released nodes stay around so tests can inspect what happened to them.
    pub released: bool,
}

#[derive(Debug)]
pub struct MockEngine {
    pub nodes: SlotMap<NodeId, MockNode>,
    pub time: f64,
    pub running: bool,
    /// Calls on nodes that were already released.
    pub use_after_release: usize,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            time: 0.0,
            running: true,
            use_after_release: 0,
        }
    }

    pub fn advance(&mut self, seconds: f64) {
        self.time += seconds;
    }

    pub fn node(&self, node: NodeId) -> &MockNode {
        &self.nodes[node]
    }

    pub fn frequency(&self, oscillator: NodeId) -> f64 {
        match self.nodes[oscillator].kind {
            MockKind::Oscillator { frequency, .. } => frequency,
            MockKind::Gain { .. } => panic!("{:?} is not an oscillator", oscillator),
        }
    }

    pub fn was_stopped(&self, oscillator: NodeId) -> bool {
        match self.nodes[oscillator].kind {
            MockKind::Oscillator { stopped, .. } => stopped,
            MockKind::Gain { .. } => panic!("{:?} is not an oscillator", oscillator),
        }
    }

    pub fn is_released(&self, node: NodeId) -> bool {
        self.nodes[node].released
    }

    /// Oscillators that were started and not yet stopped, released or not.
    pub fn sounding_oscillators(&self) -> usize {
        self.nodes
            .values()
            .filter(|node| match node.kind {
                MockKind::Oscillator {
                    started, stopped, ..
                } => started && !stopped,
                MockKind::Gain { .. } => false,
            })
            .count()
    }

    fn live(&mut self, node: NodeId) -> Result<&mut MockNode, EngineError> {
        match self.nodes.get_mut(node) {
            Some(holder) if !holder.released => Ok(holder),
            Some(_) => {
                self.use_after_release += 1;
                Err(EngineError::UnknownNode { node })
            }
            None => Err(EngineError::UnknownNode { node }),
        }
    }

    fn param(&mut self, node: NodeId) -> Result<&mut GainParam, EngineError> {
        match &mut self.live(node)?.kind {
            MockKind::Gain { param } => Ok(param),
            MockKind::Oscillator { .. } => Err(EngineError::NotAGain { node }),
        }
    }
}

impl AudioEngine for MockEngine {
    fn create_oscillator(&mut self, _shape: WaveShape, frequency: f64) -> NodeId {
        self.nodes.insert(MockNode {
            kind: MockKind::Oscillator {
                frequency,
                started: false,
                stopped: false,
            },
            outputs: Vec::new(),
            released: false,
        })
    }

    fn create_gain(&mut self, gain: f64) -> NodeId {
        self.nodes.insert(MockNode {
            kind: MockKind::Gain {
                param: GainParam::new(gain),
            },
            outputs: Vec::new(),
            released: false,
        })
    }

    fn connect(&mut self, source: NodeId, destination: Output) -> Result<(), EngineError> {
        if let Output::Node(target) = destination {
            self.live(target)?;
        }
        self.live(source)?.outputs.push(destination);
        Ok(())
    }

    fn disconnect(&mut self, node: NodeId) -> Result<(), EngineError> {
        let holder = self.live(node)?;
        holder.outputs.clear();
        holder.released = true;
        Ok(())
    }

    fn start(&mut self, oscillator: NodeId) -> Result<(), EngineError> {
        match &mut self.live(oscillator)?.kind {
            MockKind::Oscillator { started, .. } => {
                *started = true;
                Ok(())
            }
            MockKind::Gain { .. } => Err(EngineError::NotAnOscillator { node: oscillator }),
        }
    }

    fn stop(&mut self, oscillator: NodeId) -> Result<(), EngineError> {
        match &mut self.live(oscillator)?.kind {
            MockKind::Oscillator { stopped, .. } => {
                *stopped = true;
                Ok(())
            }
            MockKind::Gain { .. } => Err(EngineError::NotAnOscillator { node: oscillator }),
        }
    }

    fn gain_value(&self, gain: NodeId) -> Result<f64, EngineError> {
        match self.nodes.get(gain).map(|node| &node.kind) {
            Some(MockKind::Gain { param }) => Ok(param.value_at(self.time)),
            Some(MockKind::Oscillator { .. }) => Err(EngineError::NotAGain { node: gain }),
            None => Err(EngineError::UnknownNode { node: gain }),
        }
    }

    fn cancel_scheduled_values(&mut self, gain: NodeId, time: f64) -> Result<(), EngineError> {
        self.param(gain)?.cancel_scheduled_values(time);
        Ok(())
    }

    fn set_value_at_time(&mut self, gain: NodeId, value: f64, time: f64) -> Result<(), EngineError> {
        self.param(gain)?.set_value_at_time(value, time);
        Ok(())
    }

    fn exponential_ramp_to_value_at_time(
        &mut self,
        gain: NodeId,
        value: f64,
        end_time: f64,
    ) -> Result<(), EngineError> {
        let now = self.time;
        self.param(gain)?
            .exponential_ramp_to_value_at_time(value, end_time, now)
    }

    fn is_oscillator_running(&self, oscillator: NodeId) -> bool {
        match self.nodes.get(oscillator) {
            Some(MockNode {
                kind: MockKind::Oscillator {
                    started, stopped, ..
                },
                released: false,
                ..
            }) => *started && !*stopped,
            _ => false,
        }
    }

    fn node_count(&self) -> usize {
        self.nodes.values().filter(|node| !node.released).count()
    }

    fn current_time(&self) -> f64 {
        self.time
    }

    fn is_running(&self) -> bool {
        self.running
    }
}
