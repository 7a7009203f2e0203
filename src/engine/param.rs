// keysynth -- a minimal keyboard and MIDI synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Time-based automation of a gain value.

use super::EngineError;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Event {
    /// Jump to `value` at `time`.
    SetValue { value: f64, time: f64 },
    /// Move exponentially from the value of the previous event to `value`,
    /// arriving at `end_time`.
    ExponentialRamp { value: f64, end_time: f64 },
}

impl Event {
    fn time(&self) -> f64 {
        match *self {
            Event::SetValue { time, .. } => time,
            Event::ExponentialRamp { end_time, .. } => end_time,
        }
    }
}

/// A gain value that can follow a schedule of changes.
///
/// Without any scheduled events the value is constant.
/// Events are kept sorted by their time, and the value after the last event
/// is held indefinitely.
///
/// # Examples
///
/// ```
/// use keysynth::engine::GainParam;
///
/// let mut gain = GainParam::new(0.5);
/// gain.set_value_at_time(0.5, 1.0);
/// gain.exponential_ramp_to_value_at_time(0.125, 3.0, 1.0).unwrap();
/// assert_eq!(gain.value_at(0.0), 0.5);
/// assert!((gain.value_at(2.0) - 0.25).abs() < 1e-12);
/// assert_eq!(gain.value_at(10.0), 0.125);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct GainParam {
    value: f64,
    events: Vec<Event>,
}

impl GainParam {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            events: Vec::new(),
        }
    }

    /// Evaluate the automation curve at this point in time.
    pub fn value_at(&self, t: f64) -> f64 {
        let mut previous_value = self.value;
        let mut previous_time = f64::NEG_INFINITY;

        for event in &self.events {
            match *event {
                Event::SetValue { value, time } => {
                    if t < time {
                        return previous_value;
                    }
                    previous_value = value;
                    previous_time = time;
                }
                Event::ExponentialRamp { value, end_time } => {
                    if t < end_time {
                        return exponential_interpolation(
                            previous_value,
                            previous_time,
                            value,
                            end_time,
                            t,
                        );
                    }
                    previous_value = value;
                    previous_time = end_time;
                }
            }
        }
        previous_value
    }

    pub fn set_value_at_time(&mut self, value: f64, time: f64) {
        self.insert(Event::SetValue { value, time });
    }

    /// Schedule an exponential ramp to `value`, arriving at `end_time`.
    /// If nothing was scheduled before, the ramp starts at `now` from the current value.
    pub fn exponential_ramp_to_value_at_time(
        &mut self,
        value: f64,
        end_time: f64,
        now: f64,
    ) -> Result<(), EngineError> {
        if !(value > 0.0) {
            return Err(EngineError::InvalidRampTarget { value });
        }
        if self.events.is_empty() {
            let start = self.value_at(now);
            self.set_value_at_time(start, now);
        }
        self.insert(Event::ExponentialRamp { value, end_time });
        Ok(())
    }

    /// Remove all events at or after `time`.
    pub fn cancel_scheduled_values(&mut self, time: f64) {
        self.events.retain(|event| event.time() < time);
    }

    /// Whether any change is scheduled at all.
    pub fn is_automated(&self) -> bool {
        !self.events.is_empty()
    }

    fn insert(&mut self, event: Event) {
        // Events at the same time are kept in the order they were scheduled.
        let position = self
            .events
            .iter()
            .position(|existing| existing.time() > event.time())
            .unwrap_or_else(|| self.events.len());
        self.events.insert(position, event);
    }
}

/// Exponential curve through `(t0, v0)` and `(t1, v1)`.
/// Undefined when the start value is not positive, in which case the start value is held.
fn exponential_interpolation(v0: f64, t0: f64, v1: f64, t1: f64, t: f64) -> f64 {
    if !(v0 > 0.0) || !t0.is_finite() || t1 <= t0 {
        return v0;
    }
    if t <= t0 {
        return v0;
    }
    v0 * (v1 / v0).powf((t - t0) / (t1 - t0))
}
