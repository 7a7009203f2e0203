// keysynth -- a minimal keyboard and MIDI synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! An audio engine that renders its node graph block by block into an [`AudioBuffer`].

use log::trace;
use slotmap::{SecondaryMap, SlotMap};

use super::*;
use crate::wave::{AudioBuffer, Stereo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Playback {
    Idle,
    Playing,
    Stopped,
}

enum NodeKind {
    Oscillator {
        oscillator: Oscillator,
        playback: Playback,
    },
    Gain {
        param: GainParam,
    },
}

struct NodeHolder {
    kind: NodeKind,
    outputs: Vec<Output>,
    /// Sum of everything connected to this node during the current block.
    input: Vec<f64>,
    output: Vec<f64>,
}

impl NodeHolder {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            outputs: Vec::new(),
            input: Vec::new(),
            output: Vec::new(),
        }
    }
}

/// Renders oscillators and gain stages with a sample accurate clock.
///
/// While suspended, the engine renders silence and its clock stands still.
pub struct RenderEngine {
    nodes: SlotMap<NodeId, NodeHolder>,
    /// Nodes sorted from sources to sinks, recomputed lazily after the graph changed.
    evaluation_order: Vec<NodeId>,
    order_valid: bool,
    sample_rate: f64,
    samples_rendered: u64,
    running: bool,
    mix: Vec<f64>,
}

impl RenderEngine {
    /// Create a running engine.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            nodes: SlotMap::with_key(),
            evaluation_order: Vec::new(),
            order_valid: true,
            sample_rate: f64::from(sample_rate),
            samples_rendered: 0,
            running: true,
            mix: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn resume(&mut self) {
        self.running = true;
    }

    pub fn suspend(&mut self) {
        self.running = false;
    }

    /// Fill the buffer with the next samples of everything connected to the destination.
    pub fn render(&mut self, buffer: &mut AudioBuffer) {
        buffer.fill_zero();
        if !self.running {
            return;
        }

        let length = buffer.len();
        if !self.order_valid {
            self.sort_nodes();
        }

        for holder in self.nodes.values_mut() {
            holder.input.clear();
            holder.input.resize(length, 0.0);
            holder.output.resize(length, 0.0);
        }
        self.mix.clear();
        self.mix.resize(length, 0.0);

        let start = self.current_time();
        for index in 0..self.evaluation_order.len() {
            let id = self.evaluation_order[index];
            let holder = &mut self.nodes[id];
            render_node(holder, start, self.sample_rate);

            let output = std::mem::take(&mut holder.output);
            let targets = std::mem::take(&mut holder.outputs);
            for target in targets.iter() {
                let sum = match *target {
                    Output::Node(other) => &mut self.nodes[other].input,
                    Output::Destination => &mut self.mix,
                };
                for (s, o) in sum.iter_mut().zip(output.iter()) {
                    *s += *o;
                }
            }
            let holder = &mut self.nodes[id];
            holder.output = output;
            holder.outputs = targets;
        }

        for (sample, value) in buffer.samples_mut().iter_mut().zip(self.mix.iter()) {
            *sample = Stereo::mono(*value);
        }
        self.samples_rendered += length as u64;
    }

    /// Topological sort using Kahn's algorithm.
    fn sort_nodes(&mut self) {
        let mut incoming: SecondaryMap<NodeId, usize> =
            self.nodes.keys().map(|id| (id, 0)).collect();
        for holder in self.nodes.values() {
            for output in &holder.outputs {
                if let Output::Node(target) = output {
                    if let Some(count) = incoming.get_mut(*target) {
                        *count += 1;
                    }
                }
            }
        }

        let mut sorted_nodes = Vec::with_capacity(self.nodes.len());
        let mut nodes_without_incoming_edges: Vec<NodeId> = incoming
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| id)
            .collect();

        while let Some(n) = nodes_without_incoming_edges.pop() {
            sorted_nodes.push(n);
            for output in &self.nodes[n].outputs {
                if let Output::Node(m) = output {
                    if let Some(count) = incoming.get_mut(*m) {
                        *count -= 1;
                        if *count == 0 {
                            nodes_without_incoming_edges.push(*m);
                        }
                    }
                }
            }
        }

        // `connect` refuses cycles, so every node ends up in the order.
        debug_assert_eq!(sorted_nodes.len(), self.nodes.len());
        self.evaluation_order = sorted_nodes;
        self.order_valid = true;
    }

    /// Whether `to` is reachable from `from` along the connections.
    fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut pending = vec![from];
        while let Some(id) = pending.pop() {
            if id == to {
                return true;
            }
            if let Some(holder) = self.nodes.get(id) {
                pending.extend(holder.outputs.iter().filter_map(|output| match output {
                    Output::Node(next) => Some(*next),
                    Output::Destination => None,
                }));
            }
        }
        false
    }

    fn holder(&self, node: NodeId) -> Result<&NodeHolder, EngineError> {
        self.nodes.get(node).ok_or(EngineError::UnknownNode { node })
    }

    fn gain_param(&self, node: NodeId) -> Result<&GainParam, EngineError> {
        match &self.holder(node)?.kind {
            NodeKind::Gain { param } => Ok(param),
            NodeKind::Oscillator { .. } => Err(EngineError::NotAGain { node }),
        }
    }

    fn gain_param_mut(&mut self, node: NodeId) -> Result<&mut GainParam, EngineError> {
        let holder = self
            .nodes
            .get_mut(node)
            .ok_or(EngineError::UnknownNode { node })?;
        match &mut holder.kind {
            NodeKind::Gain { param } => Ok(param),
            NodeKind::Oscillator { .. } => Err(EngineError::NotAGain { node }),
        }
    }

    fn playback_mut(&mut self, node: NodeId) -> Result<&mut Playback, EngineError> {
        let holder = self
            .nodes
            .get_mut(node)
            .ok_or(EngineError::UnknownNode { node })?;
        match &mut holder.kind {
            NodeKind::Oscillator { playback, .. } => Ok(playback),
            NodeKind::Gain { .. } => Err(EngineError::NotAnOscillator { node }),
        }
    }
}

fn render_node(holder: &mut NodeHolder, start: f64, sample_rate: f64) {
    match &mut holder.kind {
        NodeKind::Oscillator {
            oscillator,
            playback,
        } => {
            if *playback == Playback::Playing {
                for o in holder.output.iter_mut() {
                    *o = oscillator.next_sample();
                }
            } else {
                holder.output.iter_mut().for_each(|o| *o = 0.0);
            }
        }
        NodeKind::Gain { param } => {
            for (i, (o, x)) in holder.output.iter_mut().zip(holder.input.iter()).enumerate() {
                let t = start + i as f64 / sample_rate;
                *o = *x * param.value_at(t);
            }
        }
    }
}

impl AudioEngine for RenderEngine {
    fn create_oscillator(&mut self, shape: WaveShape, frequency: f64) -> NodeId {
        self.order_valid = false;
        self.nodes.insert(NodeHolder::new(NodeKind::Oscillator {
            oscillator: Oscillator::new(shape, self.sample_rate, frequency),
            playback: Playback::Idle,
        }))
    }

    fn create_gain(&mut self, gain: f64) -> NodeId {
        self.order_valid = false;
        self.nodes.insert(NodeHolder::new(NodeKind::Gain {
            param: GainParam::new(gain),
        }))
    }

    fn connect(&mut self, source: NodeId, destination: Output) -> Result<(), EngineError> {
        self.holder(source)?;
        if let Output::Node(target) = destination {
            self.holder(target)?;
            if self.reaches(target, source) {
                return Err(EngineError::Cycle { node: source });
            }
        }

        let outputs = &mut self.nodes[source].outputs;
        if !outputs.contains(&destination) {
            outputs.push(destination);
            self.order_valid = false;
        }
        Ok(())
    }

    fn disconnect(&mut self, node: NodeId) -> Result<(), EngineError> {
        self.nodes
            .remove(node)
            .ok_or(EngineError::UnknownNode { node })?;
        for holder in self.nodes.values_mut() {
            holder.outputs.retain(|output| *output != Output::Node(node));
        }
        self.order_valid = false;
        trace!("released node {:?}, {} left", node, self.nodes.len());
        Ok(())
    }

    fn start(&mut self, oscillator: NodeId) -> Result<(), EngineError> {
        let playback = self.playback_mut(oscillator)?;
        if *playback == Playback::Idle {
            *playback = Playback::Playing;
        }
        Ok(())
    }

    fn stop(&mut self, oscillator: NodeId) -> Result<(), EngineError> {
        *self.playback_mut(oscillator)? = Playback::Stopped;
        Ok(())
    }

    fn gain_value(&self, gain: NodeId) -> Result<f64, EngineError> {
        Ok(self.gain_param(gain)?.value_at(self.current_time()))
    }

    fn cancel_scheduled_values(&mut self, gain: NodeId, time: f64) -> Result<(), EngineError> {
        self.gain_param_mut(gain)?.cancel_scheduled_values(time);
        Ok(())
    }

    fn set_value_at_time(&mut self, gain: NodeId, value: f64, time: f64) -> Result<(), EngineError> {
        self.gain_param_mut(gain)?.set_value_at_time(value, time);
        Ok(())
    }

    fn exponential_ramp_to_value_at_time(
        &mut self,
        gain: NodeId,
        value: f64,
        end_time: f64,
    ) -> Result<(), EngineError> {
        let now = self.current_time();
        self.gain_param_mut(gain)?
            .exponential_ramp_to_value_at_time(value, end_time, now)
    }

    fn is_oscillator_running(&self, oscillator: NodeId) -> bool {
        match self.nodes.get(oscillator).map(|holder| &holder.kind) {
            Some(NodeKind::Oscillator { playback, .. }) => *playback == Playback::Playing,
            _ => false,
        }
    }

    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn current_time(&self) -> f64 {
        self.samples_rendered as f64 / self.sample_rate
    }

    fn is_running(&self) -> bool {
        self.running
    }
}
