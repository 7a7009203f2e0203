// keysynth -- a minimal keyboard and MIDI synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Sources of note events. Every source boils its input down to [`NoteEvent`]s.

use log::{trace, warn};

use crate::engine::AudioEngine;
use crate::note::{Note, Velocity};
use crate::voice::VoiceManager;

pub mod keyboard;
pub mod midi;
pub mod terminal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteEventKind {
    On,
    Off,
}

/// A key was pressed or released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    pub note: Note,
    /// Always zero for releases.
    pub velocity: Velocity,
    pub kind: NoteEventKind,
}

impl NoteEvent {
    pub fn on(note: Note, velocity: Velocity) -> Self {
        Self {
            note,
            velocity,
            kind: NoteEventKind::On,
        }
    }

    pub fn off(note: Note) -> Self {
        Self {
            note,
            velocity: Velocity::MIN,
            kind: NoteEventKind::Off,
        }
    }
}

/// Everything the input threads can tell the synthesizer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMessage {
    Note(NoteEvent),
    /// Start the engine if it is suspended and suspend it otherwise.
    ToggleEngine,
    Shutdown,
}

/// Hand a note event to the voices. Problems are only logged, never passed on.
pub fn dispatch<E: AudioEngine>(voices: &mut VoiceManager<E>, event: NoteEvent) {
    trace!("dispatching {:?}", event);
    let result = match event.kind {
        NoteEventKind::On => voices.note_on(event.note, event.velocity),
        NoteEventKind::Off => voices.note_off(event.note),
    };
    if let Err(err) = result {
        warn!("{}", err);
    }
}
