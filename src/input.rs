use audiometer_experiment::{InputError, InputEvent, InputSource};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::time::Duration;

/// Space or Enter means "heard it"; Esc, q or Ctrl-C ends the test.
pub fn map_key(key: &KeyEvent) -> Option<InputEvent> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    match key.code {
        KeyCode::Char(' ') | KeyCode::Enter => Some(InputEvent::Detect),
        KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => Some(InputEvent::Abort),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(InputEvent::Abort)
        }
        _ => None,
    }
}

/// Terminal keyboard. Raw mode is switched on at the first poll and restored
/// on drop.
#[derive(Default)]
pub struct KeyboardSource {
    raw: bool,
}

impl KeyboardSource {
    pub fn new() -> Self {
        Self { raw: false }
    }
}

impl InputSource for KeyboardSource {
    fn poll(&mut self, timeout: Duration) -> Result<Option<InputEvent>, InputError> {
        if !self.raw {
            enable_raw_mode()?;
            self.raw = true;
        }
        if !event::poll(timeout)? {
            return Ok(None);
        }
        match event::read()? {
            Event::Key(key) => Ok(map_key(&key)),
            _ => Ok(None),
        }
    }
}

impl Drop for KeyboardSource {
    fn drop(&mut self) {
        if self.raw {
            if let Err(err) = disable_raw_mode() {
                log::warn!("Failed to restore terminal: {}", err);
            }
        }
    }
}
