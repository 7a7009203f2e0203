// keysynth -- a minimal keyboard and MIDI synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Receiving notes from MIDI devices.

use std::fmt;

use crossbeam_channel::Sender;
use log::{debug, info, trace, warn};
use midir::{MidiInput, MidiInputConnection, MidiInputPort};
use snafu::{ResultExt, Snafu};

use super::{InputMessage, NoteEvent};
use crate::note::{Note, Velocity};

/// Bit mask for the message kind in the status byte.
const STATUS_BIT_MASK: u8 = 0b1111_0000;
/// Bit mask for the channel in the status byte.
const CHANNEL_BIT_MASK: u8 = 0b0000_1111;
/// Status bytes have the high bit set, data bytes never do.
const STATUS_FLAG: u8 = 0b1000_0000;

const MIDI_NOTE_OFF: u8 = 0x80;
const MIDI_NOTE_ON: u8 = 0x90;

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum MidiParseError {
    #[snafu(display("empty MIDI message"))]
    Empty,
    #[snafu(display("MIDI message starts with data byte {:#04x}", byte))]
    MissingStatus { byte: u8 },
    #[snafu(display(
        "MIDI message with status {:#04x} needs 3 bytes, got {}",
        status,
        len
    ))]
    Truncated { status: u8, len: usize },
}

/// The parts of a raw MIDI message the synthesizer cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn { note: u8, velocity: u8, ch: u8 },
    NoteOff { note: u8, velocity: u8, ch: u8 },
    /// Any other channel or system message.
    Other { status: u8 },
}

impl MidiMessage {
    /// Decode a message as delivered by the MIDI driver.
    ///
    /// # Examples
    ///
    /// ```
    /// use keysynth::input::midi::{MidiMessage, MidiParseError};
    ///
    /// assert_eq!(
    ///     MidiMessage::parse(&[0x90, 60, 100]),
    ///     Ok(MidiMessage::NoteOn { note: 60, velocity: 100, ch: 0 })
    /// );
    /// assert_eq!(
    ///     MidiMessage::parse(&[0x83, 60, 0]),
    ///     Ok(MidiMessage::NoteOff { note: 60, velocity: 0, ch: 3 })
    /// );
    /// assert_eq!(
    ///     MidiMessage::parse(&[0x90, 60]),
    ///     Err(MidiParseError::Truncated { status: 0x90, len: 2 })
    /// );
    /// ```
    pub fn parse(bytes: &[u8]) -> Result<Self, MidiParseError> {
        let status = *bytes.first().ok_or(MidiParseError::Empty)?;
        if status & STATUS_FLAG == 0 {
            return Err(MidiParseError::MissingStatus { byte: status });
        }

        let kind = status & STATUS_BIT_MASK;
        let ch = status & CHANNEL_BIT_MASK;
        if kind != MIDI_NOTE_ON && kind != MIDI_NOTE_OFF {
            return Ok(MidiMessage::Other { status });
        }
        if bytes.len() < 3 {
            return Err(MidiParseError::Truncated {
                status,
                len: bytes.len(),
            });
        }

        let (note, velocity) = (bytes[1], bytes[2]);
        Ok(if kind == MIDI_NOTE_ON {
            MidiMessage::NoteOn { note, velocity, ch }
        } else {
            MidiMessage::NoteOff { note, velocity, ch }
        })
    }

    /// The note event this message stands for, if any.
    ///
    /// A note-on with zero velocity is a release. Messages carrying data bytes
    /// outside of the 7 bit range yield nothing.
    pub fn to_note_event(self) -> Option<NoteEvent> {
        match self {
            MidiMessage::NoteOn { note, velocity, .. } => {
                let note = Note::try_from_midi(note.into())?;
                let velocity = Velocity::try_from_midi(velocity.into())?;
                if velocity.is_silent() {
                    Some(NoteEvent::off(note))
                } else {
                    Some(NoteEvent::on(note, velocity))
                }
            }
            MidiMessage::NoteOff { note, velocity, .. } => {
                Velocity::try_from_midi(velocity.into())?;
                Note::try_from_midi(note.into()).map(NoteEvent::off)
            }
            MidiMessage::Other { .. } => None,
        }
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiMessage::NoteOn { note, velocity, ch } => write!(
                f,
                "Note On: note {}, velocity {}, channel {}",
                note, velocity, ch
            ),
            MidiMessage::NoteOff { note, velocity, ch } => write!(
                f,
                "Note Off: note {}, velocity {}, channel {}",
                note, velocity, ch
            ),
            MidiMessage::Other { status } => write!(f, "status {:#04x}", status),
        }
    }
}

/// Turn raw MIDI bytes into a note event, logging whatever is not one.
pub fn decode(bytes: &[u8]) -> Option<NoteEvent> {
    match MidiMessage::parse(bytes) {
        Ok(message) => {
            let event = message.to_note_event();
            if event.is_none() {
                trace!("ignoring MIDI message: {}", message);
            }
            event
        }
        Err(err) => {
            debug!("{}", err);
            None
        }
    }
}

#[derive(Debug, Snafu)]
pub enum MidiConnectError {
    #[snafu(display("Could not initialize MIDI input: {}", source))]
    Init { source: midir::InitError },
    #[snafu(display("No MIDI input ports were found"))]
    NoPorts,
    #[snafu(display("No MIDI input port contains \"{}\"", substring))]
    NoMatchingPort { substring: String },
    #[snafu(display("Could not connect to MIDI port: {}", message))]
    Connect { message: String },
}

/// A connection to a MIDI input port forwarding note events to a channel.
/// The connection is closed when the listener is dropped.
pub struct MidiListener {
    connection: MidiInputConnection<()>,
    port_name: String,
}

impl MidiListener {
    /// Connect to the first input port, or the first one whose name contains
    /// `port_substring` (ignoring case).
    pub fn connect(
        client_name: &str,
        port_substring: Option<&str>,
        events: Sender<InputMessage>,
    ) -> Result<Self, MidiConnectError> {
        let input = MidiInput::new(client_name).context(Init)?;
        let ports = input.ports();
        if ports.is_empty() {
            return Err(MidiConnectError::NoPorts);
        }

        let port = match port_substring {
            None => ports[0].clone(),
            Some(substring) => find_port(&input, &ports, substring).ok_or_else(|| {
                MidiConnectError::NoMatchingPort {
                    substring: substring.to_owned(),
                }
            })?,
        };
        let port_name = input
            .port_name(&port)
            .unwrap_or_else(|_| String::from("UNKNOWN"));
        info!("listening on MIDI port \"{}\"", port_name);

        let connection = input
            .connect(
                &port,
                &format!("{}_input", client_name),
                move |_stamp, bytes, _| {
                    if let Some(event) = decode(bytes) {
                        if events.send(InputMessage::Note(event)).is_err() {
                            warn!("dropping MIDI event, synthesizer is gone");
                        }
                    }
                },
                (),
            )
            .map_err(|err| MidiConnectError::Connect {
                message: err.to_string(),
            })?;

        Ok(Self {
            connection,
            port_name,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn close(self) {
        self.connection.close();
    }
}

fn find_port(input: &MidiInput, ports: &[MidiInputPort], substring: &str) -> Option<MidiInputPort> {
    let needle = substring.to_lowercase();
    ports
        .iter()
        .find(|port| match input.port_name(port) {
            Ok(name) => name.to_lowercase().contains(&needle),
            Err(_) => false,
        })
        .cloned()
}

/// Names of all MIDI input ports currently available.
pub fn port_names(client_name: &str) -> Result<Vec<String>, MidiConnectError> {
    let input = MidiInput::new(client_name).context(Init)?;
    Ok(input
        .ports()
        .iter()
        .map(|port| {
            input
                .port_name(port)
                .unwrap_or_else(|_| String::from("UNKNOWN"))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::NoteEventKind;

    #[test]
    fn note_on_any_channel() {
        for ch in 0..16 {
            let event = decode(&[MIDI_NOTE_ON | ch, 64, 90]).unwrap();
            assert_eq!(event, NoteEvent::on(Note::from_midi(64), Velocity::from_midi(90)));
        }
    }

    #[test]
    fn silent_note_on_releases() {
        assert_eq!(decode(&[0x91, 64, 0]), Some(NoteEvent::off(Note::from_midi(64))));
    }

    #[test]
    fn note_off_ignores_release_velocity() {
        let event = decode(&[0x80, 72, 64]).unwrap();
        assert_eq!(event.kind, NoteEventKind::Off);
        assert_eq!(event.note, Note::from_midi(72));
        assert!(event.velocity.is_silent());
    }

    #[test]
    fn other_messages_are_ignored() {
        // control change, pitch bend, timing clock
        assert_eq!(decode(&[0xB0, 7, 100]), None);
        assert_eq!(decode(&[0xE0, 0, 64]), None);
        assert_eq!(decode(&[0xF8]), None);
        assert_eq!(
            MidiMessage::parse(&[0xF8]),
            Ok(MidiMessage::Other { status: 0xF8 })
        );
    }

    #[test]
    fn malformed_messages() {
        assert_eq!(MidiMessage::parse(&[]), Err(MidiParseError::Empty));
        assert_eq!(
            MidiMessage::parse(&[60, 100]),
            Err(MidiParseError::MissingStatus { byte: 60 })
        );
        assert_eq!(
            MidiMessage::parse(&[0x90]),
            Err(MidiParseError::Truncated { status: 0x90, len: 1 })
        );
        assert_eq!(decode(&[0x90, 60]), None);
    }

    #[test]
    fn out_of_range_data_bytes() {
        assert_eq!(decode(&[0x90, 200, 100]), None);
        assert_eq!(decode(&[0x90, 60, 128]), None);
        assert_eq!(decode(&[0x80, 60, 255]), None);
    }

    #[test]
    fn display() {
        let message = MidiMessage::parse(&[0x92, 61, 33]).unwrap();
        assert_eq!(
            message.to_string(),
            "Note On: note 61, velocity 33, channel 2"
        );
    }
}
