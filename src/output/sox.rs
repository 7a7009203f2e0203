// keysynth -- a minimal keyboard and MIDI synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Easy interface for getting sound to play using a sox subprocess.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use log::debug;

use super::AudioSink;
use crate::wave::AudioBuffer;

pub enum SoxTarget<'a> {
    /// Play on the default sound device.
    Play,
    /// Record into a file, sox picks the format from the extension.
    File(&'a Path),
}

pub struct SoxSink {
    player: Child,
    audio_stream: ChildStdin,
    buffer: Vec<u8>,
}

impl SoxSink {
    pub fn new(sample_rate: u32, target: SoxTarget) -> io::Result<Self> {
        let sample_rate_str = format!("{}", sample_rate);
        let input_args = &[
            "-R", // make the output reproducible
            "--channels",
            "2",
            "--rate",
            &sample_rate_str,
            "--type",
            "f64",
            "/dev/stdin",
        ];

        let (play, sox) = sox_binaries();
        let mut player = match target {
            SoxTarget::Play => Command::new(&play)
                .args(input_args)
                .stdin(Stdio::piped())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()?,
            SoxTarget::File(outfile) => Command::new(&sox)
                .args(input_args)
                .arg(outfile)
                .stdin(Stdio::piped())
                .spawn()?,
        };

        let audio_stream = player
            .stdin
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "sox has no stdin"))?;

        Ok(Self {
            player,
            audio_stream,
            buffer: Vec::new(),
        })
    }

    /// Close the stream and wait for sox to flush everything.
    pub fn finish(self) -> io::Result<()> {
        let SoxSink {
            mut player,
            audio_stream,
            ..
        } = self;
        drop(audio_stream);
        let status = player.wait()?;
        debug!("sox exited with {}", status);
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::Other,
                format!("sox exited with {}", status),
            ))
        }
    }
}

impl AudioSink for SoxSink {
    fn write_buffer(&mut self, audio: &AudioBuffer) -> io::Result<()> {
        if self.buffer.len() < audio.byte_len() {
            self.buffer.resize(audio.byte_len(), 0);
        }
        audio.copy_bytes_to(&mut self.buffer);
        self.audio_stream
            .write_all(&self.buffer[..audio.byte_len()])?;
        self.audio_stream.flush()
    }
}

fn sox_binaries() -> (PathBuf, PathBuf) {
    // For properly recording the sox dependency on nix:
    if let Some(sox_bin) = option_env!("NIX_SOX_BIN") {
        debug!("using sox from nix store {}", sox_bin);
        (Path::new(sox_bin).join("play"), Path::new(sox_bin).join("sox"))
    } else {
        ("play".into(), "sox".into())
    }
}
