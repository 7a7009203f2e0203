// keysynth -- a minimal keyboard and MIDI synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Reading the computer keyboard from the terminal.
//!
//! Terminals that understand the keyboard enhancement protocol report key
//! releases. Everywhere else a key counts as released once the terminal has
//! not repeated it for a while.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::{execute, terminal};
use log::{debug, warn};

use super::keyboard::KeyboardAdapter;
use super::InputMessage;

/// How long a key stays down without a repeat when releases are not reported.
pub const DEFAULT_HOLD_TIMEOUT: Duration = Duration::from_millis(600);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Puts the terminal into raw mode for as long as it lives.
pub struct TerminalGuard {
    enhanced: bool,
}

impl TerminalGuard {
    pub fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        let enhanced = match terminal::supports_keyboard_enhancement() {
            Ok(true) => {
                execute!(
                    io::stdout(),
                    PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
                )?;
                true
            }
            Ok(false) => false,
            Err(err) => {
                debug!("could not query keyboard enhancement support: {}", err);
                false
            }
        };
        if !enhanced {
            warn!("terminal does not report key releases, notes end when keys stop repeating");
        }
        Ok(Self { enhanced })
    }

    /// Whether key releases arrive as events of their own.
    pub fn reports_releases(&self) -> bool {
        self.enhanced
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if self.enhanced {
            if let Err(err) = execute!(io::stdout(), PopKeyboardEnhancementFlags) {
                warn!("could not restore keyboard mode: {}", err);
            }
        }
        if let Err(err) = terminal::disable_raw_mode() {
            warn!("could not leave raw mode: {}", err);
        }
    }
}

/// Maps terminal key events to messages for the synthesizer.
pub struct KeyTranslator {
    keyboard: KeyboardAdapter,
    /// `None` when the terminal reports releases itself.
    hold_timeout: Option<Duration>,
    last_seen: HashMap<char, Instant>,
}

impl KeyTranslator {
    pub fn new(keyboard: KeyboardAdapter, reports_releases: bool, hold_timeout: Duration) -> Self {
        Self {
            keyboard,
            hold_timeout: if reports_releases {
                None
            } else {
                Some(hold_timeout)
            },
            last_seen: HashMap::new(),
        }
    }

    pub fn key_event(&mut self, key: KeyEvent, now: Instant) -> Vec<InputMessage> {
        let mut messages = Vec::new();
        match key.code {
            KeyCode::Esc => messages.push(InputMessage::Shutdown),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                messages.push(InputMessage::Shutdown)
            }
            KeyCode::Char(' ') => {
                if key.kind == KeyEventKind::Press {
                    messages.push(InputMessage::ToggleEngine);
                }
            }
            KeyCode::Char(c) => match key.kind {
                KeyEventKind::Press | KeyEventKind::Repeat => {
                    if self.hold_timeout.is_some() {
                        self.last_seen.insert(c.to_ascii_lowercase(), now);
                    }
                    messages.extend(self.keyboard.press(c).map(InputMessage::Note));
                }
                KeyEventKind::Release => {
                    self.last_seen.remove(&c.to_ascii_lowercase());
                    messages.extend(self.keyboard.release(c).map(InputMessage::Note));
                }
            },
            _ => {}
        }
        messages
    }

    /// Release keys that went quiet for longer than the hold timeout.
    pub fn expire(&mut self, now: Instant) -> Vec<InputMessage> {
        let timeout = match self.hold_timeout {
            Some(timeout) => timeout,
            None => return Vec::new(),
        };
        let expired: Vec<char> = self
            .last_seen
            .iter()
            .filter(|(_, seen)| now.duration_since(**seen) >= timeout)
            .map(|(key, _)| *key)
            .collect();
        expired
            .into_iter()
            .filter_map(|key| {
                self.last_seen.remove(&key);
                self.keyboard.release(key)
            })
            .map(InputMessage::Note)
            .collect()
    }

    /// Release everything still held.
    pub fn release_all(&mut self) -> Vec<InputMessage> {
        self.last_seen.clear();
        self.keyboard
            .release_all()
            .into_iter()
            .map(InputMessage::Note)
            .collect()
    }
}

/// Read key events on a separate thread until `shutdown` is set, the
/// synthesizer hangs up, or the user asks to quit.
pub fn spawn_keyboard(
    mut translator: KeyTranslator,
    events: Sender<InputMessage>,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<io::Result<()>> {
    thread::spawn(move || {
        while !shutdown.load(Ordering::Relaxed) {
            let mut messages = Vec::new();
            if event::poll(POLL_INTERVAL)? {
                if let Event::Key(key) = event::read()? {
                    messages = translator.key_event(key, Instant::now());
                }
            }
            messages.extend(translator.expire(Instant::now()));

            for message in messages {
                let quit = message == InputMessage::Shutdown;
                if events.send(message).is_err() || quit {
                    shutdown.store(true, Ordering::Relaxed);
                    break;
                }
            }
        }
        for message in translator.release_all() {
            if events.send(message).is_err() {
                break;
            }
        }
        Ok(())
    })
}
