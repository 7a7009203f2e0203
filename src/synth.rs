// keysynth -- a minimal keyboard and MIDI synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! The control loop tying inputs, voices and audio output together.
//!
//! All voice bookkeeping happens on the thread running the loop. Input
//! threads only ever talk to it through the message channel.

use std::io;

use crossbeam_channel::{Receiver, TryRecvError};
use log::{debug, error, info};

use crate::engine::{AudioEngine, RenderEngine};
use crate::input::{self, InputMessage};
use crate::output::AudioSink;
use crate::voice::VoiceManager;
use crate::wave::AudioBuffer;

pub struct Synth<S> {
    voices: VoiceManager<RenderEngine>,
    events: Receiver<InputMessage>,
    sink: S,
    buffer: AudioBuffer,
}

impl<S: AudioSink> Synth<S> {
    /// `block_size` is the number of samples rendered between two looks at the
    /// input, it bounds the latency of note events.
    pub fn new(
        voices: VoiceManager<RenderEngine>,
        events: Receiver<InputMessage>,
        sink: S,
        block_size: usize,
    ) -> Self {
        Self {
            voices,
            events,
            sink,
            buffer: AudioBuffer::new(block_size),
        }
    }

    pub fn voices(&self) -> &VoiceManager<RenderEngine> {
        &self.voices
    }

    /// Handle pending input, then render and emit one block.
    /// Returns `false` once the loop should end.
    pub fn step(&mut self) -> io::Result<bool> {
        loop {
            match self.events.try_recv() {
                Ok(message) => {
                    if !self.handle(message) {
                        return Ok(false);
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("all inputs are gone");
                    return Ok(false);
                }
            }
        }

        self.voices.engine_mut().render(&mut self.buffer);
        self.voices.poll();
        self.sink.write_buffer(&self.buffer)?;
        Ok(true)
    }

    /// Run until shut down, silencing all voices at the end.
    pub fn run(mut self) -> io::Result<S> {
        info!("synthesizer running");
        loop {
            match self.step() {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => {
                    error!("Failed to write audio: {}", err);
                    self.voices.kill_all();
                    return Err(err);
                }
            }
        }
        self.voices.kill_all();
        info!("synthesizer stopped");
        Ok(self.sink)
    }

    fn handle(&mut self, message: InputMessage) -> bool {
        match message {
            InputMessage::Note(event) => input::dispatch(&mut self.voices, event),
            InputMessage::ToggleEngine => {
                let engine = self.voices.engine_mut();
                if engine.is_running() {
                    engine.suspend();
                    info!("audio suspended");
                } else {
                    engine.resume();
                    info!("audio resumed");
                }
            }
            InputMessage::Shutdown => return false,
        }
        true
    }
}
