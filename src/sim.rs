use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::dispatch::InputDispatch;
use crate::error::DispatchError;
use crate::model::{ControlKey, KeyEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub at: Instant,
    pub event: KeyEvent,
}

#[derive(Debug, Default, Clone)]
struct SimEditorState {
    buf: Vec<char>,
    cursor: usize,
    journal: Vec<JournalEntry>,
}

impl SimEditorState {
    fn insert_char(&mut self, c: char) {
        self.buf.insert(self.cursor, c);
        self.cursor += 1;
    }

    fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        self.buf.remove(self.cursor);
    }

    fn apply(&mut self, event: &KeyEvent) {
        match event {
            KeyEvent::Press { key } => match key {
                ControlKey::Enter => self.insert_char('\n'),
                ControlKey::Tab => self.insert_char('\t'),
                ControlKey::Backspace => self.backspace(),
            },
            KeyEvent::Insert { text } => {
                for c in text.chars() {
                    self.insert_char(c);
                }
            }
        }
        self.journal.push(JournalEntry {
            at: Instant::now(),
            event: event.clone(),
        });
    }
}

/// In-memory text editor that records every event it receives.
///
/// Used by the console backend for dry runs and by tests to observe what a
/// run emitted and when. It models a single cursor at the end of the typed
/// text; it does not model editor features such as auto-indent.
#[derive(Debug, Default)]
pub struct EditorSim {
    state: Mutex<SimEditorState>,
}

impl EditorSim {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an event directly, outside of any dispatch call.
    pub fn apply(&self, event: &KeyEvent) {
        self.lock().apply(event);
    }

    pub fn text(&self) -> String {
        self.lock().buf.iter().collect()
    }

    pub fn journal(&self) -> Vec<JournalEntry> {
        self.lock().journal.clone()
    }

    pub fn events(&self) -> Vec<KeyEvent> {
        self.lock().journal.iter().map(|e| e.event.clone()).collect()
    }

    pub fn backspaces(&self) -> usize {
        self.lock()
            .journal
            .iter()
            .filter(|e| {
                e.event
                    == KeyEvent::Press {
                        key: ControlKey::Backspace,
                    }
            })
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimEditorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl InputDispatch for EditorSim {
    async fn press_key(&self, key: ControlKey) -> Result<(), DispatchError> {
        self.apply(&KeyEvent::Press { key });
        Ok(())
    }

    async fn insert_text(&self, text: &str) -> Result<(), DispatchError> {
        self.apply(&KeyEvent::Insert {
            text: text.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(s: &str) -> KeyEvent {
        KeyEvent::Insert {
            text: s.to_string(),
        }
    }

    #[test]
    fn backspace_removes_the_last_character() {
        let sim = EditorSim::new();
        sim.apply(&insert("h"));
        sim.apply(&insert("w"));
        sim.apply(&KeyEvent::Press {
            key: ControlKey::Backspace,
        });
        sim.apply(&insert("i"));
        assert_eq!(sim.text(), "hi");
        assert_eq!(sim.backspaces(), 1);
        assert_eq!(sim.journal().len(), 4);
    }

    #[test]
    fn control_keys_insert_whitespace() {
        let sim = EditorSim::new();
        sim.apply(&insert("a"));
        sim.apply(&KeyEvent::Press {
            key: ControlKey::Enter,
        });
        sim.apply(&KeyEvent::Press {
            key: ControlKey::Tab,
        });
        assert_eq!(sim.text(), "a\n\t");
    }

    #[test]
    fn backspace_on_empty_buffer_is_harmless() {
        let sim = EditorSim::new();
        sim.apply(&KeyEvent::Press {
            key: ControlKey::Backspace,
        });
        assert_eq!(sim.text(), "");
    }
}
