use serde::{Deserialize, Serialize};

pub const WPM_MIN: f64 = 5.0;
pub const WPM_MAX: f64 = 240.0;
pub const FLUCTUATION_MAX: f64 = 160.0;
pub const MAX_PAUSE_SECS_MAX: f64 = 30.0;

pub const DEFAULT_WPM: f64 = 60.0;

/// Typing personality. Resolved once when a request is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Mild jitter and the occasional hesitation, never a mistake.
    #[default]
    Normal,
    /// Mistakes, long hesitations and random distraction pauses.
    Bad,
    /// Minimal jitter, no mistakes.
    Perfect,
}

impl Mode {
    /// `perfect` wins over `bad` when both are requested.
    pub fn resolve(bad: bool, perfect: bool) -> Self {
        match (bad, perfect) {
            (_, true) => Mode::Perfect,
            (true, false) => Mode::Bad,
            (false, false) => Mode::Normal,
        }
    }
}

/// Wire form of a typing request as sent by an operator panel.
///
/// Every field is optional; missing or non-finite numbers take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartPayload {
    pub text: Option<String>,
    pub wpm: Option<f64>,
    #[serde(alias = "fluctuation")]
    pub fluct: Option<f64>,
    /// Percent, 0-100.
    pub typo_chance: Option<f64>,
    pub bad_mode: bool,
    pub perfect_mode: bool,
    pub max_pause_sec: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypingRequest {
    pub text: String,
    pub wpm: f64,
    pub fluctuation: f64,
    /// Probability in `[0, 1]`.
    pub typo_chance: f64,
    pub mode: Mode,
    pub max_pause_ms: u64,
}

fn finite_or(value: Option<f64>, default: f64) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(default)
}

impl TypingRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into().replace("\r\n", "\n"),
            wpm: DEFAULT_WPM,
            fluctuation: 0.0,
            typo_chance: 0.0,
            mode: Mode::Normal,
            max_pause_ms: 0,
        }
    }

    pub fn from_payload(payload: &StartPayload) -> Self {
        Self::new(payload.text.clone().unwrap_or_default())
            .with_wpm(finite_or(payload.wpm, DEFAULT_WPM))
            .with_fluctuation(finite_or(payload.fluct, 0.0))
            .with_typo_percent(finite_or(payload.typo_chance, 0.0))
            .with_mode(Mode::resolve(payload.bad_mode, payload.perfect_mode))
            .with_max_pause_secs(finite_or(payload.max_pause_sec, 0.0))
    }

    pub fn with_wpm(mut self, wpm: f64) -> Self {
        self.wpm = wpm.clamp(WPM_MIN, WPM_MAX);
        self
    }

    pub fn with_fluctuation(mut self, fluctuation: f64) -> Self {
        self.fluctuation = fluctuation.clamp(0.0, FLUCTUATION_MAX);
        self
    }

    pub fn with_typo_percent(mut self, percent: f64) -> Self {
        self.typo_chance = percent.clamp(0.0, 100.0) / 100.0;
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_pause_secs(mut self, secs: f64) -> Self {
        let secs = secs.clamp(0.0, MAX_PAUSE_SECS_MAX);
        self.max_pause_ms = (secs * 1000.0).round() as u64;
        self
    }

    /// Blank and whitespace-only texts are not typed at all.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Non-printable keys the scheduler presses as a down+up pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKey {
    Enter,
    Tab,
    Backspace,
}

impl ControlKey {
    pub fn key(self) -> &'static str {
        match self {
            ControlKey::Enter => "Enter",
            ControlKey::Tab => "Tab",
            ControlKey::Backspace => "Backspace",
        }
    }

    pub fn code(self) -> &'static str {
        // DOM `code` values match the key names for these three.
        self.key()
    }

    /// Windows virtual key code.
    pub fn key_code(self) -> u32 {
        match self {
            ControlKey::Enter => 13,
            ControlKey::Tab => 9,
            ControlKey::Backspace => 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KeyEvent {
    Press { key: ControlKey },
    Insert { text: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Stopped,
    NoText,
}

impl RunOutcome {
    pub fn message(self) -> &'static str {
        match self {
            RunOutcome::Completed => "Done.",
            RunOutcome::Stopped => "Stopped.",
            RunOutcome::NoText => "No text provided.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Intended characters fully emitted (typos count once).
    pub characters: usize,
    pub typos: usize,
    pub random_pauses: usize,
}

impl RunReport {
    pub(crate) fn new(outcome: RunOutcome) -> Self {
        Self {
            outcome,
            characters: 0,
            typos: 0,
            random_pauses: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_overrides_bad() {
        assert_eq!(Mode::resolve(true, true), Mode::Perfect);
        assert_eq!(Mode::resolve(true, false), Mode::Bad);
        assert_eq!(Mode::resolve(false, false), Mode::Normal);
    }

    #[test]
    fn payload_values_are_clamped() {
        let payload = StartPayload {
            text: Some("hi".to_string()),
            wpm: Some(900.0),
            fluct: Some(-3.0),
            typo_chance: Some(150.0),
            bad_mode: true,
            perfect_mode: false,
            max_pause_sec: Some(45.5),
        };
        let req = TypingRequest::from_payload(&payload);
        assert_eq!(req.wpm, WPM_MAX);
        assert_eq!(req.fluctuation, 0.0);
        assert_eq!(req.typo_chance, 1.0);
        assert_eq!(req.mode, Mode::Bad);
        assert_eq!(req.max_pause_ms, 30_000);
    }

    #[test]
    fn payload_defaults_apply_to_missing_and_nan() {
        let payload: StartPayload =
            serde_json::from_str(r#"{"text":"a\r\nb","typoChance":12.5}"#).unwrap();
        let mut req = TypingRequest::from_payload(&payload);
        assert_eq!(req.text, "a\nb");
        assert_eq!(req.wpm, DEFAULT_WPM);
        assert_eq!(req.typo_chance, 0.125);
        assert_eq!(req.mode, Mode::Normal);

        req = TypingRequest::from_payload(&StartPayload {
            wpm: Some(f64::NAN),
            ..Default::default()
        });
        assert_eq!(req.wpm, DEFAULT_WPM);
        assert!(req.is_blank());
    }

    #[test]
    fn whitespace_only_text_is_blank() {
        assert!(TypingRequest::new(" \n\t ").is_blank());
        assert!(!TypingRequest::new(" x ").is_blank());
    }
}
