// keysynth -- a minimal keyboard and MIDI synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Turning note presses and releases into sounding voices, one voice per note.
//!
//! Every voice is a small chain in the audio engine:
//!
//! ```text
//! oscillator -> base gain -> velocity gain -> destination
//! ```
//!
//! Releasing a note ramps the base gain down exponentially and frees the chain
//! once the ramp has finished. Pressing a note that still has a voice frees the
//! old chain right away, so that there is never more than one voice per note.

use std::collections::HashMap;
use std::time::Duration;

use log::{debug, info, trace, warn};
use snafu::{ResultExt, Snafu};

use crate::engine::{AudioEngine, EngineError, NodeId, Output, WaveShape};
use crate::note::{Note, Velocity};
use crate::schedule::{Scheduler, TaskId};
use crate::tuning::Tuning;

/// Parameters influencing how voices sound and fade.
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Constant attenuation of every voice, keeps the sum of several voices from clipping.
    pub base_gain: f64,
    /// How long a released voice takes to fade out.
    pub release: Duration,
    /// The level the release fades to. Exponential ramps cannot reach zero.
    pub release_floor: f64,
    pub waveform: WaveShape,
    pub tuning: Tuning,
    /// Fade applied to a voice that is cut off by a new press of the same note.
    /// `None` frees it immediately, at the risk of an audible click.
    pub retrigger_fade: Option<Duration>,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            base_gain: 0.33,
            release: Duration::from_millis(50),
            release_floor: 0.001,
            waveform: WaveShape::Sine,
            tuning: Tuning::default(),
            retrigger_fade: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Sounding,
    Releasing,
}

/// The engine resources making up a single playing note.
#[derive(Debug)]
pub struct Voice {
    note: Note,
    velocity: Velocity,
    oscillator: NodeId,
    base_gain: NodeId,
    velocity_gain: NodeId,
    state: VoiceState,
    /// Pending teardown while the voice is releasing.
    teardown: Option<TaskId>,
}

impl Voice {
    pub fn note(&self) -> Note {
        self.note
    }

    pub fn velocity(&self) -> Velocity {
        self.velocity
    }

    pub fn oscillator(&self) -> NodeId {
        self.oscillator
    }

    pub fn base_gain(&self) -> NodeId {
        self.base_gain
    }

    pub fn velocity_gain(&self) -> NodeId {
        self.velocity_gain
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }
}

/// Non-fatal conditions reported by the voice manager.
#[derive(Debug, PartialEq, Snafu)]
pub enum VoiceError {
    #[snafu(display("The audio engine is not running"))]
    DeviceNotReady,
    #[snafu(display("{} is not currently playing", note))]
    RedundantRelease { note: Note },
    #[snafu(display("The audio engine refused a voice: {}", source))]
    Engine { source: EngineError },
}

/// Work that has to happen once a fade has run its course.
enum Teardown {
    /// The releasing voice registered for this note.
    Release(Note),
    /// A voice already replaced by a newer one of the same note.
    Retired(Voice),
}

/// Owns the voices and decides when they are created and destroyed.
pub struct VoiceManager<E> {
    engine: E,
    config: VoiceConfig,
    voices: HashMap<Note, Voice>,
    teardowns: Scheduler<Teardown>,
}

impl<E: AudioEngine> VoiceManager<E> {
    pub fn new(engine: E) -> Self {
        Self::with_config(engine, VoiceConfig::default())
    }

    pub fn with_config(engine: E, config: VoiceConfig) -> Self {
        Self {
            engine,
            config,
            voices: HashMap::new(),
            teardowns: Scheduler::new(),
        }
    }

    pub fn config(&self) -> &VoiceConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn voice(&self, note: Note) -> Option<&Voice> {
        self.voices.get(&note)
    }

    pub fn is_active(&self, note: Note) -> bool {
        self.voices.contains_key(&note)
    }

    /// Number of registered voices, sounding or releasing.
    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Start playing a note.
    ///
    /// A zero velocity releases the note instead, as in MIDI.
    /// Any voice still registered for the note is cut off first.
    pub fn note_on(&mut self, note: Note, velocity: Velocity) -> Result<(), VoiceError> {
        if !self.engine.is_running() {
            return Err(VoiceError::DeviceNotReady);
        }
        if velocity.is_silent() {
            return self.note_off(note);
        }

        if let Some(previous) = self.voices.remove(&note) {
            debug!("retriggering {} ({:?})", note, previous.state);
            self.retire(previous);
        }

        let voice = self.spawn(note, velocity).context(Engine)?;
        info!(
            "note on: {} ({:.2} Hz), velocity {}",
            note,
            self.config.tuning.frequency(note),
            velocity.to_midi()
        );
        self.voices.insert(note, voice);
        Ok(())
    }

    /// Start the release of a note. The voice keeps sounding while it fades
    /// and is freed by [`VoiceManager::poll`] afterwards.
    pub fn note_off(&mut self, note: Note) -> Result<(), VoiceError> {
        if !self.engine.is_running() {
            return Err(VoiceError::DeviceNotReady);
        }

        let voice = match self.voices.get_mut(&note) {
            Some(voice) if voice.state == VoiceState::Sounding => voice,
            _ => return Err(VoiceError::RedundantRelease { note }),
        };

        let now = self.engine.current_time();
        let release = self.config.release.as_secs_f64();
        let ramp = fade_out(
            &mut self.engine,
            voice.base_gain,
            now,
            release,
            self.config.release_floor,
        );

        // The teardown is scheduled even if the ramp failed, the voice must not linger.
        voice.state = VoiceState::Releasing;
        voice.teardown = Some(self.teardowns.schedule(now + release, Teardown::Release(note)));
        debug!("releasing {} until {:.3}s", note, now + release);

        ramp.context(Engine)
    }

    /// Free every voice whose fade has finished by now.
    /// Returns the number of freed voices.
    pub fn poll(&mut self) -> usize {
        let now = self.engine.current_time();
        let mut freed = 0;
        while let Some((id, task)) = self.teardowns.pop_due(now) {
            match task {
                Teardown::Release(note) => match self.voices.remove(&note) {
                    Some(voice) => {
                        debug_assert_eq!(voice.teardown, Some(id));
                        self.free(voice);
                        info!("note off: {}", note);
                        freed += 1;
                    }
                    None => warn!("teardown for {} found no voice", note),
                },
                Teardown::Retired(voice) => {
                    self.free(voice);
                    freed += 1;
                }
            }
        }
        freed
    }

    /// Release every sounding voice.
    pub fn release_all(&mut self) {
        let sounding: Vec<Note> = self
            .voices
            .values()
            .filter(|voice| voice.state == VoiceState::Sounding)
            .map(|voice| voice.note)
            .collect();
        for note in sounding {
            if let Err(err) = self.note_off(note) {
                debug!("could not release {}: {}", note, err);
            }
        }
    }

    /// Immediately free all voices, including those still fading out.
    pub fn kill_all(&mut self) {
        for task in self.teardowns.drain() {
            if let Teardown::Retired(voice) = task {
                self.free(voice);
            }
        }
        let voices: Vec<Voice> = self.voices.drain().map(|(_, voice)| voice).collect();
        for voice in voices {
            self.free(voice);
        }
    }

    fn spawn(&mut self, note: Note, velocity: Velocity) -> Result<Voice, EngineError> {
        let frequency = self.config.tuning.frequency(note);
        let oscillator = self.engine.create_oscillator(self.config.waveform, frequency);
        let base_gain = self.engine.create_gain(self.config.base_gain);
        let velocity_gain = self.engine.create_gain(velocity.amplitude());

        let voice = Voice {
            note,
            velocity,
            oscillator,
            base_gain,
            velocity_gain,
            state: VoiceState::Sounding,
            teardown: None,
        };

        let wired = wire(&mut self.engine, &voice);
        if let Err(err) = wired {
            self.free(voice);
            return Err(err);
        }
        Ok(voice)
    }

    /// Get rid of a voice which is no longer registered.
    fn retire(&mut self, mut voice: Voice) {
        if let Some(id) = voice.teardown.take() {
            self.teardowns.cancel(id);
        }

        match self.config.retrigger_fade {
            None => self.free(voice),
            Some(fade) => {
                let now = self.engine.current_time();
                let fade = fade.as_secs_f64();
                if let Err(err) = fade_out(
                    &mut self.engine,
                    voice.base_gain,
                    now,
                    fade,
                    self.config.release_floor,
                ) {
                    debug!("could not fade out retired {}: {}", voice.note, err);
                }
                voice.state = VoiceState::Releasing;
                self.teardowns.schedule(now + fade, Teardown::Retired(voice));
            }
        }
    }

    fn free(&mut self, voice: Voice) {
        trace!("freeing voice of {}", voice.note);
        let results = [
            self.engine.stop(voice.oscillator),
            self.engine.disconnect(voice.oscillator),
            self.engine.disconnect(voice.base_gain),
            self.engine.disconnect(voice.velocity_gain),
        ];
        for err in results.iter().filter_map(|result| result.as_ref().err()) {
            warn!("while freeing voice of {}: {}", voice.note, err);
        }
    }
}

fn wire<E: AudioEngine>(engine: &mut E, voice: &Voice) -> Result<(), EngineError> {
    engine.connect(voice.oscillator, Output::Node(voice.base_gain))?;
    engine.connect(voice.base_gain, Output::Node(voice.velocity_gain))?;
    engine.connect(voice.velocity_gain, Output::Destination)?;
    engine.start(voice.oscillator)
}

/// Ramp a gain from wherever it currently is down to `floor`, arriving `duration` seconds from `now`.
fn fade_out<E: AudioEngine>(
    engine: &mut E,
    gain: NodeId,
    now: f64,
    duration: f64,
    floor: f64,
) -> Result<(), EngineError> {
    let current = engine.gain_value(gain)?;
    engine.cancel_scheduled_values(gain, now)?;
    engine.set_value_at_time(gain, current, now)?;
    engine.exponential_ramp_to_value_at_time(gain, floor, now + duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::MockEngine;

    const RELEASE: f64 = 0.05;

    fn manager() -> VoiceManager<MockEngine> {
        VoiceManager::new(MockEngine::new())
    }

    fn note(n: u8) -> Note {
        Note::from_midi(n)
    }

    fn vel(v: u8) -> Velocity {
        Velocity::from_midi(v)
    }

    #[test]
    fn note_on_builds_a_wired_voice() {
        let mut voices = manager();
        voices.note_on(note(69), vel(127)).unwrap();

        let voice = voices.voice(note(69)).unwrap();
        assert_eq!(voice.state(), VoiceState::Sounding);
        let engine = voices.engine();
        assert_eq!(engine.frequency(voice.oscillator()), 440.0);
        assert!(engine.is_oscillator_running(voice.oscillator()));
        assert_eq!(engine.gain_value(voice.base_gain()), Ok(0.33));
        assert_eq!(engine.gain_value(voice.velocity_gain()), Ok(1.0));
        assert_eq!(
            engine.node(voice.oscillator()).outputs,
            vec![Output::Node(voice.base_gain())]
        );
        assert_eq!(
            engine.node(voice.base_gain()).outputs,
            vec![Output::Node(voice.velocity_gain())]
        );
        assert_eq!(
            engine.node(voice.velocity_gain()).outputs,
            vec![Output::Destination]
        );
    }

    #[test]
    fn notes_are_independent() {
        let mut voices = manager();
        voices.note_on(note(60), vel(100)).unwrap();
        voices.note_on(note(64), vel(100)).unwrap();
        voices.note_off(note(60)).unwrap();

        assert_eq!(voices.len(), 2);
        assert_eq!(
            voices.voice(note(64)).map(Voice::state),
            Some(VoiceState::Sounding)
        );
    }

    #[test]
    fn retrigger_keeps_a_single_voice() {
        let mut voices = manager();
        voices.note_on(note(60), vel(100)).unwrap();
        let first = voices.voice(note(60)).unwrap().oscillator();
        voices.note_on(note(60), vel(80)).unwrap();

        assert_eq!(voices.len(), 1);
        let second = voices.voice(note(60)).unwrap();
        assert_ne!(second.oscillator(), first);
        assert_eq!(second.velocity(), vel(80));

        let engine = voices.engine();
        assert!(engine.was_stopped(first));
        assert!(engine.is_released(first));
        assert_eq!(engine.sounding_oscillators(), 1);
        assert_eq!(engine.node_count(), 3);
    }

    #[test]
    fn retrigger_while_releasing_cancels_the_pending_teardown() {
        let mut voices = manager();
        voices.note_on(note(60), vel(100)).unwrap();
        voices.note_off(note(60)).unwrap();
        voices.engine_mut().advance(0.02);
        voices.note_on(note(60), vel(90)).unwrap();

        // the old teardown would have been due now
        voices.engine_mut().advance(RELEASE);
        assert_eq!(voices.poll(), 0);
        assert_eq!(
            voices.voice(note(60)).map(Voice::state),
            Some(VoiceState::Sounding)
        );
        assert_eq!(voices.engine().use_after_release, 0);
        assert_eq!(voices.engine().sounding_oscillators(), 1);
    }

    #[test]
    fn redundant_release_leaves_registry_alone() {
        let mut voices = manager();
        voices.note_on(note(62), vel(100)).unwrap();
        assert_eq!(
            voices.note_off(note(60)),
            Err(VoiceError::RedundantRelease { note: note(60) })
        );
        assert_eq!(voices.len(), 1);
        assert!(voices.is_active(note(62)));
    }

    #[test]
    fn double_release_is_redundant() {
        let mut voices = manager();
        voices.note_on(note(60), vel(100)).unwrap();
        voices.note_off(note(60)).unwrap();
        assert_eq!(
            voices.note_off(note(60)),
            Err(VoiceError::RedundantRelease { note: note(60) })
        );

        voices.engine_mut().advance(RELEASE);
        assert_eq!(voices.poll(), 1);
        assert_eq!(voices.engine().use_after_release, 0);
    }

    #[test]
    fn zero_velocity_is_a_release() {
        let mut voices = manager();
        assert_eq!(
            voices.note_on(note(64), vel(0)),
            Err(VoiceError::RedundantRelease { note: note(64) })
        );
        assert!(voices.is_empty());
        assert_eq!(voices.engine().node_count(), 0);

        voices.note_on(note(64), vel(100)).unwrap();
        voices.note_on(note(64), vel(0)).unwrap();
        assert_eq!(
            voices.voice(note(64)).map(Voice::state),
            Some(VoiceState::Releasing)
        );
    }

    #[test]
    fn release_lifecycle() {
        let mut voices = manager();
        voices.note_on(note(60), vel(100)).unwrap();
        let oscillator = voices.voice(note(60)).unwrap().oscillator();
        voices.engine_mut().advance(0.5);
        voices.note_off(note(60)).unwrap();

        assert_eq!(
            voices.voice(note(60)).map(Voice::state),
            Some(VoiceState::Releasing)
        );
        assert!(voices.engine().is_oscillator_running(oscillator));

        voices.engine_mut().advance(RELEASE / 2.0);
        assert_eq!(voices.poll(), 0);
        assert!(voices.is_active(note(60)));

        voices.engine_mut().advance(RELEASE / 2.0 + 1e-9);
        assert_eq!(voices.poll(), 1);
        assert!(!voices.is_active(note(60)));
        assert!(voices.engine().was_stopped(oscillator));
        assert!(!voices.engine().is_oscillator_running(oscillator));
        assert_eq!(voices.engine().node_count(), 0);
    }

    #[test]
    fn release_ramps_the_base_gain_to_the_floor() {
        let mut voices = manager();
        voices.note_on(note(60), vel(100)).unwrap();
        let gain = voices.voice(note(60)).unwrap().base_gain();
        voices.engine_mut().advance(1.0);
        voices.note_off(note(60)).unwrap();

        let mut last = voices.engine().gain_value(gain).unwrap();
        assert_eq!(last, 0.33);
        for _ in 0..10 {
            voices.engine_mut().advance(RELEASE / 10.0);
            let value = voices.engine().gain_value(gain).unwrap();
            assert!(value < last);
            assert!(value > 0.0);
            last = value;
        }
        assert!((last - 0.001).abs() < 1e-9);
    }

    #[test]
    fn velocity_scales_linearly() {
        let mut voices = manager();
        voices.note_on(note(60), vel(127)).unwrap();
        voices.note_on(note(61), vel(1)).unwrap();
        voices.note_on(note(62), vel(64)).unwrap();

        let amplitude = |n: u8| {
            let voice = voices.voice(note(n)).unwrap();
            voices.engine().gain_value(voice.velocity_gain()).unwrap()
        };
        assert!(amplitude(60) > amplitude(61));
        assert!((amplitude(61) - 1.0 / 127.0).abs() < 1e-12);
        assert!((amplitude(62) - 64.0 / 127.0).abs() < 1e-12);
    }

    #[test]
    fn stopped_engine_refuses_notes() {
        let mut voices = manager();
        voices.note_on(note(60), vel(100)).unwrap();
        voices.engine_mut().running = false;

        assert_eq!(voices.note_on(note(62), vel(100)), Err(VoiceError::DeviceNotReady));
        assert_eq!(voices.note_off(note(60)), Err(VoiceError::DeviceNotReady));
        assert_eq!(voices.len(), 1);

        voices.engine_mut().running = true;
        voices.note_off(note(60)).unwrap();
        voices.note_on(note(62), vel(100)).unwrap();
        assert_eq!(voices.len(), 2);
    }

    #[test]
    fn at_most_one_voice_per_note_under_any_sequence() {
        let mut voices = manager();
        let n = note(60);
        let steps: &[(bool, f64)] = &[
            (true, 0.0),
            (true, 0.01),
            (false, 0.0),
            (true, 0.03),
            (false, 0.06),
            (false, 0.0),
            (true, 0.0),
            (false, 0.02),
            (true, 0.04),
        ];
        for (press, advance) in steps {
            let _ = if *press {
                voices.note_on(n, vel(100))
            } else {
                voices.note_off(n)
            };
            voices.engine_mut().advance(*advance);
            voices.poll();
            assert!(voices.len() <= 1);
            assert!(voices.engine().sounding_oscillators() <= 1);
        }
        assert_eq!(voices.engine().use_after_release, 0);
    }

    #[test]
    fn retrigger_fade_keeps_old_voice_fading_outside_the_registry() {
        let config = VoiceConfig {
            retrigger_fade: Some(Duration::from_millis(5)),
            ..VoiceConfig::default()
        };
        let mut voices = VoiceManager::with_config(MockEngine::new(), config);
        voices.note_on(note(60), vel(100)).unwrap();
        let first = voices.voice(note(60)).unwrap().oscillator();
        voices.note_on(note(60), vel(100)).unwrap();

        assert_eq!(voices.len(), 1);
        assert!(voices.engine().is_oscillator_running(first));

        voices.engine_mut().advance(0.005);
        assert_eq!(voices.poll(), 1);
        assert!(voices.engine().was_stopped(first));
        assert_eq!(voices.len(), 1);
        assert_eq!(voices.engine().sounding_oscillators(), 1);
    }

    #[test]
    fn kill_all_frees_everything() {
        let config = VoiceConfig {
            retrigger_fade: Some(Duration::from_millis(5)),
            ..VoiceConfig::default()
        };
        let mut voices = VoiceManager::with_config(MockEngine::new(), config);
        voices.note_on(note(60), vel(100)).unwrap();
        voices.note_on(note(60), vel(100)).unwrap();
        voices.note_on(note(62), vel(100)).unwrap();
        voices.note_off(note(62)).unwrap();

        voices.kill_all();
        assert!(voices.is_empty());
        assert_eq!(voices.engine().node_count(), 0);
        assert_eq!(voices.engine().sounding_oscillators(), 0);

        voices.engine_mut().advance(1.0);
        assert_eq!(voices.poll(), 0);
        assert_eq!(voices.engine().use_after_release, 0);
    }

    #[test]
    fn release_all_only_touches_sounding_voices() {
        let mut voices = manager();
        voices.note_on(note(60), vel(100)).unwrap();
        voices.note_on(note(62), vel(100)).unwrap();
        voices.note_off(note(60)).unwrap();
        voices.engine_mut().advance(0.01);
        voices.release_all();

        assert!(voices
            .voice(note(62))
            .map_or(false, |v| v.state() == VoiceState::Releasing));

        voices.engine_mut().advance(RELEASE - 0.005);
        assert_eq!(voices.poll(), 1);
        assert!(voices.is_active(note(62)));
        voices.engine_mut().advance(0.01);
        assert_eq!(voices.poll(), 1);
        assert!(voices.is_empty());
    }
}
