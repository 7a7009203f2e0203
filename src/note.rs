// keysynth -- a minimal keyboard and MIDI synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Definitions of what a note is and how hard it is played.

/// A "note" is just an index on the synthesizers keyboard.
/// This definition follows the MIDI standard where C4 corresponds to index 60.
///
/// Note indices range from 0 to 127. At 12 semitones per octave,
/// this corresponds to a dynamic range of more then 10 octaves,
/// or a frequency ratio of about 1625 between the lowest and the
/// highest frequency.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Note(u8);

/// The name of a note in standard notation.
pub enum NoteName {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
}

/// Any offset applied to a note in standard notation.
pub enum NoteOffset {
    /// The note is a half-tone lower then indicated by its name.
    Flat,
    /// The note is left unchanged.
    Base,
    /// The note is a half-tone higher then indicated by its name.
    Sharp,
}

impl Note {
    /// Convert a note from standard notation to a MIDI note index.
    /// Note that different names may refer to the same note, e.g. a G♯ is the same as a A♭.
    /// Returns `None` if the note is not representable in the MIDI note system.
    ///
    /// # Examples
    ///
    /// ```
    /// use keysynth::note::*;
    ///
    /// assert_eq!(Note::try_named(NoteName::A, NoteOffset::Base, 4), Some(Note::from_midi(69)));
    /// assert_eq!(Note::try_named(NoteName::C, NoteOffset::Sharp, 6), Some(Note::from_midi(85)));
    /// assert_eq!(Note::try_named(NoteName::G, NoteOffset::Flat, 2), Some(Note::from_midi(42)));
    /// assert_eq!(Note::try_named(NoteName::C, NoteOffset::Flat, -1), None);
    /// ```
    pub fn try_named(name: NoteName, offset: NoteOffset, octave: i32) -> Option<Note> {
        let name_index = match name {
            NoteName::C => 0,
            NoteName::D => 2,
            NoteName::E => 4,
            NoteName::F => 5,
            NoteName::G => 7,
            NoteName::A => 9,
            NoteName::B => 11,
        };
        let offset_index = match offset {
            NoteOffset::Base => 0,
            NoteOffset::Flat => -1,
            NoteOffset::Sharp => 1,
        };
        // C4 is MIDI note number 60
        let normalize_index = 60 - 4 * 12;
        let note_index = octave * 12 + name_index + offset_index + normalize_index;
        Note::try_from_midi(i64::from(note_index))
    }

    /// Convert a note from standard notation to a MIDI note index.
    ///
    /// # Panics
    ///
    /// - If the note is not representable in the MIDI note system.
    pub fn named(name: NoteName, offset: NoteOffset, octave: i32) -> Note {
        Note::try_named(name, offset, octave).expect("Note not representable in MIDI system.")
    }

    /// Parse a name string of the format `<letter><offset><octave>`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use keysynth::note::*;
    ///
    /// assert_eq!(Note::named_str("A4"), Some(Note::from_midi(69)));
    /// assert_eq!(Note::named_str("a4"), Some(Note::from_midi(69)));
    /// assert_eq!(Note::named_str("C#5"), Some(Note::from_midi(73)));
    /// assert_eq!(Note::named_str("Gb2"), Some(Note::from_midi(42)));
    /// assert_eq!(Note::named_str("H2"), None);
    /// ```
    pub fn named_str(name_str: &str) -> Option<Note> {
        let mut name_chars = name_str.chars();
        let name_ch = name_chars.next()?;
        let name = match name_ch.to_ascii_uppercase() {
            'A' => NoteName::A,
            'B' => NoteName::B,
            'C' => NoteName::C,
            'D' => NoteName::D,
            'E' => NoteName::E,
            'F' => NoteName::F,
            'G' => NoteName::G,
            _ => return None,
        };

        let offset_str = name_chars
            .as_str()
            .trim_end_matches(|ch: char| ch.is_ascii_digit() || ch == '-');
        let offset = match offset_str {
            "sharp" | "♯" | "#" => NoteOffset::Sharp,
            "flat" | "♭" | "b" => NoteOffset::Flat,
            "" => NoteOffset::Base,
            _ => return None,
        };

        let octave_str = &name_chars.as_str()[offset_str.len()..];
        let octave = octave_str.parse().ok()?;
        Note::try_named(name, offset, octave)
    }

    pub fn from_midi(midi_note: u8) -> Note {
        assert!(midi_note < 128, "MIDI only has notes 0 - 127");
        Note(midi_note)
    }

    pub fn try_from_midi(midi_note: i64) -> Option<Note> {
        if (0..128).contains(&midi_note) {
            Some(Note(midi_note as u8))
        } else {
            None
        }
    }

    pub fn to_midi(self) -> u8 {
        self.0
    }

    /// Return the note index in a signed type, convenient for further calculations.
    pub fn index(self) -> i32 {
        i32::from(self.0)
    }
}

impl std::fmt::Display for Note {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MIDI {}", self.0)
    }
}

/// The velocity of a key press indicates how hard/fast the key was pressed down.
/// Follows the MIDI range from 0 to 127 inclusive, where 0 means the key
/// was not actually pressed.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Velocity(u8);

impl Velocity {
    pub const MAX: Velocity = Velocity(127);
    pub const MIN: Velocity = Velocity(0);

    /// # Panics
    ///
    /// This function panics if `velocity` is not a 7 bit value.
    pub fn from_midi(velocity: u8) -> Velocity {
        assert!(velocity < 128, "MIDI only has velocities 0 - 127");
        Velocity(velocity)
    }

    pub fn try_from_midi(velocity: i64) -> Option<Velocity> {
        if (0..128).contains(&velocity) {
            Some(Velocity(velocity as u8))
        } else {
            None
        }
    }

    pub fn to_midi(self) -> u8 {
        self.0
    }

    /// A zero velocity is how MIDI spells "note off".
    pub fn is_silent(self) -> bool {
        self.0 == 0
    }

    /// Linear amplitude factor of this velocity.
    ///
    /// # Examples
    ///
    /// ```
    /// use keysynth::note::*;
    ///
    /// assert_eq!(Velocity::MAX.amplitude(), 1.0);
    /// assert_eq!(Velocity::MIN.amplitude(), 0.0);
    /// assert!(Velocity::from_midi(1).amplitude() < Velocity::from_midi(2).amplitude());
    /// ```
    pub fn amplitude(self) -> f64 {
        f64::from(self.0) / 127.0
    }
}
