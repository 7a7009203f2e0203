// keysynth -- a minimal keyboard and MIDI synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Where rendered audio ends up.

use std::io;

use crate::wave::AudioBuffer;

pub mod sox;

pub use sox::{SoxSink, SoxTarget};

/// Consumer of rendered audio blocks.
///
/// Writing may block until the consumer caught up, which is what paces the
/// synthesizer loop in real time.
pub trait AudioSink {
    fn write_buffer(&mut self, buffer: &AudioBuffer) -> io::Result<()>;
}

impl<S: AudioSink + ?Sized> AudioSink for Box<S> {
    fn write_buffer(&mut self, buffer: &AudioBuffer) -> io::Result<()> {
        (**self).write_buffer(buffer)
    }
}
