// keysynth -- a minimal keyboard and MIDI synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! `keysynth` - play sine tones on the computer keyboard or a MIDI controller.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use snafu::{ResultExt, Snafu};
use structopt::StructOpt;

use keysynth::engine::{RenderEngine, WaveShape};
use keysynth::input::keyboard::KeyboardAdapter;
use keysynth::input::midi::{self, MidiConnectError, MidiListener};
use keysynth::input::terminal::{self, KeyTranslator, TerminalGuard};
use keysynth::output::{SoxSink, SoxTarget};
use keysynth::synth::Synth;
use keysynth::tuning::Tuning;
use keysynth::voice::{VoiceConfig, VoiceManager};

const CLIENT_NAME: &str = "keysynth";

#[derive(Debug, StructOpt)]
#[structopt(name = "keysynth", about = "A minimal keyboard and MIDI synthesizer")]
struct Opt {
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    verbose: usize,

    /// Listen to a MIDI input, either the first one or the first whose name contains the given text.
    #[structopt(long)]
    midi: Option<Option<String>>,

    /// Print the available MIDI inputs and exit.
    #[structopt(long)]
    list_midi_ports: bool,

    /// Do not read notes from the computer keyboard.
    #[structopt(long)]
    no_keyboard: bool,

    /// How long keys count as held without repeating, for terminals that do not report releases.
    #[structopt(long, default_value = "600")]
    hold_timeout_ms: u64,

    /// Release time of a note.
    #[structopt(long, default_value = "50")]
    release_ms: u64,

    /// Fade applied when a note is struck again while it is still sounding.
    #[structopt(long)]
    retrigger_fade_ms: Option<u64>,

    /// Gain applied to every voice.
    #[structopt(long, default_value = "0.33")]
    base_gain: f64,

    /// One of sine, square, triangle or saw.
    #[structopt(long, default_value = "sine")]
    waveform: WaveShape,

    /// Frequency of A4 in Hz.
    #[structopt(long, default_value = "440")]
    tuning: f64,

    #[structopt(long, default_value = "44100")]
    sample_rate: u32,

    /// Record into this file (any sox-supported format) instead of playing.
    #[structopt(short, long, parse(from_os_str))]
    output: Option<PathBuf>,

    /// Start with audio suspended, toggle it with the space bar.
    #[structopt(long)]
    start_suspended: bool,
}

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("Could not set up logging: {}", source))]
    Logger { source: log::SetLoggerError },
    #[snafu(display("{}", source))]
    Midi { source: MidiConnectError },
    #[snafu(display("Could not take over the terminal: {}", source))]
    Terminal { source: io::Error },
    #[snafu(display("Could not start sox: {}", source))]
    Sox { source: io::Error },
    #[snafu(display("Audio output failed: {}", source))]
    Audio { source: io::Error },
    #[snafu(display("Reading the keyboard failed: {}", source))]
    Keyboard { source: io::Error },
    #[snafu(display("Neither keyboard nor MIDI input is enabled"))]
    NoInput,
}

fn main() -> Result<(), Error> {
    let opt = Opt::from_args();

    let level = match opt.verbose {
        0 => log::Level::Info,
        1 => log::Level::Debug,
        _ => log::Level::Trace,
    };
    simple_logger::init_with_level(level).context(Logger)?;

    if opt.list_midi_ports {
        for name in midi::port_names(CLIENT_NAME).context(Midi)? {
            println!("{}", name);
        }
        return Ok(());
    }
    if opt.no_keyboard && opt.midi.is_none() {
        return Err(Error::NoInput);
    }

    let config = VoiceConfig {
        base_gain: opt.base_gain,
        release: Duration::from_millis(opt.release_ms),
        waveform: opt.waveform,
        tuning: Tuning::with_reference_frequency(opt.tuning),
        retrigger_fade: opt.retrigger_fade_ms.map(Duration::from_millis),
        ..VoiceConfig::default()
    };
    let mut engine = RenderEngine::new(opt.sample_rate);
    if opt.start_suspended {
        engine.suspend();
        info!("audio is suspended, press space to start");
    }
    let voices = VoiceManager::with_config(engine, config);

    let (sender, receiver) = crossbeam_channel::unbounded();

    let listener = match &opt.midi {
        Some(port) => Some(
            MidiListener::connect(CLIENT_NAME, port.as_deref(), sender.clone()).context(Midi)?,
        ),
        None => None,
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    let keyboard = if opt.no_keyboard {
        None
    } else {
        let guard = TerminalGuard::enable().context(Terminal)?;
        let translator = KeyTranslator::new(
            KeyboardAdapter::default(),
            guard.reports_releases(),
            Duration::from_millis(opt.hold_timeout_ms),
        );
        info!("play on the keyboard, space toggles audio, escape quits");
        let thread = terminal::spawn_keyboard(translator, sender.clone(), shutdown.clone());
        Some((guard, thread))
    };
    // Only the inputs keep the channel open from here on.
    drop(sender);

    let target = match &opt.output {
        Some(path) => SoxTarget::File(path),
        None => SoxTarget::Play,
    };
    let sink = SoxSink::new(opt.sample_rate, target).context(Sox)?;

    let block_size = (opt.sample_rate / 100).max(1) as usize;
    let result = Synth::new(voices, receiver, sink, block_size).run();

    shutdown.store(true, Ordering::Relaxed);
    if let Some((guard, thread)) = keyboard {
        match thread.join() {
            Ok(status) => status.context(Keyboard)?,
            Err(_) => warn!("keyboard thread panicked"),
        }
        drop(guard);
    }
    if let Some(listener) = listener {
        listener.close();
    }

    result.context(Audio)?.finish().context(Audio)
}
