// keysynth -- a minimal keyboard and MIDI synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Playing notes on the computer keyboard.

use std::collections::{HashMap, HashSet};

use log::trace;

use super::NoteEvent;
use crate::note::{Note, Velocity};

/// Velocity of every note played on the computer keyboard.
pub const KEYBOARD_VELOCITY: u8 = 100;

/// Assignment of keys to notes.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyMap {
    keys: HashMap<char, Note>,
}

impl KeyMap {
    pub fn new() -> Self {
        Self {
            keys: HashMap::new(),
        }
    }

    pub fn bind(&mut self, key: char, note: Note) {
        self.keys.insert(key.to_ascii_lowercase(), note);
    }

    pub fn note(&self, key: char) -> Option<Note> {
        self.keys.get(&key.to_ascii_lowercase()).copied()
    }
}

/// Piano layout on a QWERTY keyboard.
/// The home row plays C4 to C5 with the sharps on the row above,
/// the bottom row plays the white keys from C3 to B3.
impl Default for KeyMap {
    fn default() -> Self {
        let upper = "awsedftgyhujk";
        let lower = [
            ('z', 48),
            ('x', 50),
            ('c', 52),
            ('v', 53),
            ('b', 55),
            ('n', 57),
            ('m', 59),
        ];

        let mut map = KeyMap::new();
        for (key, midi) in upper.chars().zip(60..) {
            map.bind(key, Note::from_midi(midi));
        }
        for &(key, midi) in lower.iter() {
            map.bind(key, Note::from_midi(midi));
        }
        map
    }
}

/// Turns key presses and releases into note events.
///
/// Keys held down are remembered, so that auto-repeated presses do not
/// retrigger the note and a release is only reported for a held key.
///
/// # Examples
///
/// ```
/// use keysynth::input::keyboard::KeyboardAdapter;
/// use keysynth::input::NoteEvent;
/// use keysynth::note::{Note, Velocity};
///
/// let mut keyboard = KeyboardAdapter::default();
/// assert_eq!(
///     keyboard.press('h'),
///     Some(NoteEvent::on(Note::from_midi(69), Velocity::from_midi(100)))
/// );
/// assert_eq!(keyboard.press('h'), None);
/// assert_eq!(keyboard.release('h'), Some(NoteEvent::off(Note::from_midi(69))));
/// assert_eq!(keyboard.release('h'), None);
/// assert_eq!(keyboard.press('q'), None);
/// ```
#[derive(Debug, Clone)]
pub struct KeyboardAdapter {
    map: KeyMap,
    velocity: Velocity,
    pressed: HashSet<char>,
}

impl Default for KeyboardAdapter {
    fn default() -> Self {
        Self::new(KeyMap::default())
    }
}

impl KeyboardAdapter {
    pub fn new(map: KeyMap) -> Self {
        Self {
            map,
            velocity: Velocity::from_midi(KEYBOARD_VELOCITY),
            pressed: HashSet::new(),
        }
    }

    pub fn with_velocity(mut self, velocity: Velocity) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn key_map(&self) -> &KeyMap {
        &self.map
    }

    pub fn is_pressed(&self, key: char) -> bool {
        self.pressed.contains(&key.to_ascii_lowercase())
    }

    /// A key went down. Returns `None` for unmapped keys and repeats.
    pub fn press(&mut self, key: char) -> Option<NoteEvent> {
        let key = key.to_ascii_lowercase();
        let note = match self.map.note(key) {
            Some(note) => note,
            None => {
                trace!("ignoring unmapped key {:?}", key);
                return None;
            }
        };
        if self.pressed.insert(key) {
            Some(NoteEvent::on(note, self.velocity))
        } else {
            None
        }
    }

    /// A key went up. Returns `None` for unmapped keys and keys that were not held.
    pub fn release(&mut self, key: char) -> Option<NoteEvent> {
        let key = key.to_ascii_lowercase();
        let note = self.map.note(key)?;
        if self.pressed.remove(&key) {
            Some(NoteEvent::off(note))
        } else {
            None
        }
    }

    /// Let go of every held key.
    pub fn release_all(&mut self) -> Vec<NoteEvent> {
        let held: Vec<char> = self.pressed.iter().copied().collect();
        held.into_iter().filter_map(|key| self.release(key)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::NoteEventKind;

    #[test]
    fn default_layout() {
        let map = KeyMap::default();
        assert_eq!(map.note('a'), Some(Note::from_midi(60)));
        assert_eq!(map.note('w'), Some(Note::from_midi(61)));
        assert_eq!(map.note('k'), Some(Note::from_midi(72)));
        assert_eq!(map.note('z'), Some(Note::from_midi(48)));
        assert_eq!(map.note('m'), Some(Note::from_midi(59)));
        assert_eq!(map.note('A'), Some(Note::from_midi(60)));
        assert_eq!(map.note('1'), None);
    }

    #[test]
    fn one_event_per_physical_press() {
        let mut keyboard = KeyboardAdapter::default();
        let events: Vec<_> = vec![
            keyboard.press('a'),
            keyboard.press('a'),
            keyboard.press('A'),
            keyboard.release('a'),
            keyboard.release('a'),
        ]
        .into_iter()
        .flatten()
        .collect();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, NoteEventKind::On);
        assert_eq!(events[0].velocity, Velocity::from_midi(KEYBOARD_VELOCITY));
        assert_eq!(events[1].kind, NoteEventKind::Off);
    }

    #[test]
    fn release_all_reports_held_keys() {
        let mut keyboard = KeyboardAdapter::default().with_velocity(Velocity::MAX);
        assert_eq!(
            keyboard.press('d'),
            Some(NoteEvent::on(Note::from_midi(64), Velocity::MAX))
        );
        keyboard.press('g');
        keyboard.press('g');

        let mut released: Vec<u8> = keyboard
            .release_all()
            .into_iter()
            .map(|event| event.note.to_midi())
            .collect();
        released.sort();
        assert_eq!(released, vec![64, 67]);
        assert!(!keyboard.is_pressed('d'));
        assert!(keyboard.release_all().is_empty());
    }

    #[test]
    fn custom_bindings() {
        let mut map = KeyMap::new();
        map.bind('Q', Note::from_midi(36));
        let mut keyboard = KeyboardAdapter::new(map);
        assert_eq!(
            keyboard.press('q').map(|event| event.note),
            Some(Note::from_midi(36))
        );
        assert_eq!(keyboard.press('a'), None);
    }
}
