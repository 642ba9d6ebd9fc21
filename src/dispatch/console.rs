use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::dispatch::{InputDispatch, TargetHost};
use crate::error::{DispatchError, TypingError};
use crate::model::ControlKey;
use crate::session::SessionId;
use crate::sim::EditorSim;

pub const CONSOLE_TARGET: &str = "console";

fn escape_for_log(s: &str) -> String {
    s.chars().flat_map(char::escape_default).collect()
}

fn print_trace_line(line: &str) {
    const RESET: &str = "\x1b[0m";
    const TYPING: &str = "\x1b[34m";
    const KEY: &str = "\x1b[33m";

    if let Some(rest) = line.strip_prefix("Typing") {
        eprintln!("{TYPING}Typing{RESET}{rest}");
    } else if let Some(rest) = line.strip_prefix("Key") {
        eprintln!("{KEY}Key{RESET}{rest}");
    } else {
        eprintln!("{line}");
    }
}

/// Dry-run dispatcher: events land in an [`EditorSim`] and, optionally, on stderr.
pub struct ConsoleDispatch {
    editor: EditorSim,
    trace: bool,
}

impl ConsoleDispatch {
    pub fn new(trace: bool) -> Self {
        Self {
            editor: EditorSim::new(),
            trace,
        }
    }

    pub fn editor(&self) -> &EditorSim {
        &self.editor
    }
}

#[async_trait]
impl InputDispatch for ConsoleDispatch {
    async fn press_key(&self, key: ControlKey) -> Result<(), DispatchError> {
        if self.trace {
            print_trace_line(&format!("Key {}", key.key()));
        }
        self.editor.press_key(key).await
    }

    async fn insert_text(&self, text: &str) -> Result<(), DispatchError> {
        if self.trace {
            print_trace_line(&format!("Typing \"{}\"", escape_for_log(text)));
        }
        self.editor.insert_text(text).await
    }
}

/// Host with a single simulated document named [`CONSOLE_TARGET`].
pub struct ConsoleHost {
    trace: bool,
    attached: Mutex<HashMap<SessionId, Arc<ConsoleDispatch>>>,
}

impl ConsoleHost {
    pub fn new(trace: bool) -> Self {
        Self {
            trace,
            attached: Mutex::new(HashMap::new()),
        }
    }

    /// Text typed into `target` since it was last attached.
    pub fn text(&self, target: &SessionId) -> Option<String> {
        let attached = self.attached.lock().unwrap_or_else(PoisonError::into_inner);
        attached.get(target).map(|d| d.editor().text())
    }
}

#[async_trait]
impl TargetHost for ConsoleHost {
    async fn active_target(&self) -> Result<SessionId, TypingError> {
        Ok(SessionId::new(CONSOLE_TARGET))
    }

    async fn attach(&self, target: &SessionId) -> Result<Arc<dyn InputDispatch>, DispatchError> {
        let dispatch = Arc::new(ConsoleDispatch::new(self.trace));
        let mut attached = self.attached.lock().unwrap_or_else(PoisonError::into_inner);
        attached.insert(target.clone(), dispatch.clone());
        Ok(dispatch)
    }

    async fn detach(&self, _target: &SessionId) {
        // Keep the editor around so its text can still be read.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn attached_documents_collect_text() {
        let host = ConsoleHost::new(false);
        let target = host.active_target().await.unwrap();
        assert_eq!(host.text(&target), None);

        let dispatch = host.attach(&target).await.unwrap();
        dispatch.insert_text("o").await.unwrap();
        dispatch.insert_text("k").await.unwrap();
        dispatch.press_key(ControlKey::Enter).await.unwrap();
        assert_eq!(host.text(&target).as_deref(), Some("ok\n"));
    }

    #[test]
    fn log_escaping_shows_control_characters() {
        assert_eq!(escape_for_log("a\n\"b\""), "a\\n\\\"b\\\"");
    }
}
