use std::io::{self, Write};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

/// Outcome of feeding one key to a [`SecretInput`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyResult {
    Continue,
    Submitted(String),
    Aborted,
}

/// Accumulates a secret typed key by key, without echo.
#[derive(Debug, Default)]
pub struct SecretInput {
    buffer: String,
}

impl SecretInput {
    pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult {
        if key.kind != KeyEventKind::Press {
            return KeyResult::Continue;
        }
        match key.code {
            KeyCode::Enter => KeyResult::Submitted(std::mem::take(&mut self.buffer)),
            KeyCode::Esc => KeyResult::Aborted,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                KeyResult::Aborted
            }
            KeyCode::Backspace => {
                self.buffer.pop();
                KeyResult::Continue
            }
            KeyCode::Char(_)
                if key
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
            {
                KeyResult::Continue
            }
            KeyCode::Char(ch) => {
                self.buffer.push(ch);
                KeyResult::Continue
            }
            _ => KeyResult::Continue,
        }
    }
}

/// Reads a password from the terminal in raw mode. `None` when the user aborts.
pub fn read_password(label: &str) -> io::Result<Option<String>> {
    let mut stderr = io::stderr();
    write!(stderr, "{label}")?;
    stderr.flush()?;

    enable_raw_mode()?;
    let result = read_secret();
    disable_raw_mode()?;
    writeln!(stderr)?;
    result
}

fn read_secret() -> io::Result<Option<String>> {
    let mut input = SecretInput::default();
    loop {
        if let Event::Key(key) = event::read()? {
            match input.handle_key(key) {
                KeyResult::Continue => {}
                KeyResult::Submitted(secret) => return Ok(Some(secret)),
                KeyResult::Aborted => return Ok(None),
            }
        }
    }
}
