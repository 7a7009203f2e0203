// keysynth -- a minimal keyboard and MIDI synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

/// Position within one period of a wave, always in `[0, 1)`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Phase(f64);

impl Phase {
    pub const ZERO: Phase = Phase(0.0);

    pub fn new(offset: f64) -> Phase {
        Phase(offset.rem_euclid(1.0))
    }

    pub fn offset(self) -> f64 {
        self.0
    }

    pub fn step(self, amount: f64) -> Phase {
        Phase::new(self.0 + amount)
    }

    pub fn step_frequency(self, frequency: f64, sample_rate: f64) -> Phase {
        self.step(frequency / sample_rate)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WaveShape {
    Sine,
    Square,
    Triangle,
    Saw,
}

impl Default for WaveShape {
    fn default() -> Self {
        WaveShape::Sine
    }
}

impl std::str::FromStr for WaveShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sine" => Ok(WaveShape::Sine),
            "square" => Ok(WaveShape::Square),
            "triangle" => Ok(WaveShape::Triangle),
            "saw" | "sawtooth" => Ok(WaveShape::Saw),
            _ => Err(format!("unknown waveform \"{}\"", s)),
        }
    }
}

impl WaveShape {
    pub fn eval(self, phase: Phase) -> f64 {
        let offset = phase.offset();
        use std::f64::consts::PI;
        match self {
            WaveShape::Sine => (offset * 2.0 * PI).sin(),
            WaveShape::Square => {
                if offset < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            WaveShape::Triangle => {
                if offset < 0.25 {
                    4.0 * offset
                } else if offset < 0.75 {
                    2.0 - 4.0 * offset
                } else {
                    4.0 * offset - 4.0
                }
            }
            WaveShape::Saw => 2.0 * offset - 1.0,
        }
    }
}

/// An oscillator sampling a wave of some shape at a fixed sample rate.
#[derive(Debug)]
pub struct Oscillator {
    shape: WaveShape,
    sample_rate: f64,
    frequency: f64,
    phase: Phase,
}

impl Oscillator {
    pub fn new(shape: WaveShape, sample_rate: f64, frequency: f64) -> Self {
        Self {
            shape,
            sample_rate,
            frequency,
            phase: Phase::ZERO,
        }
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn next_sample(&mut self) -> f64 {
        let result = self.shape.eval(self.phase);
        self.phase = self.phase.step_frequency(self.frequency, self.sample_rate);
        result
    }
}
