// keysynth -- a minimal keyboard and MIDI synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

pub mod engine;
pub mod input;
pub mod note;
pub mod output;
pub mod synth;
pub mod tuning;
pub mod voice;
pub mod wave;

// Utility modules
pub mod schedule;
