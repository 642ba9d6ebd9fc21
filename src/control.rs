//! Message-passing control surface.
//!
//! An operator panel (or the `serve` subcommand) sends [`ControlMessage`]s and
//! gets one [`ControlResponse`] back per message. Failures never tear the
//! surface down; they come back as `{ok: false, message}`.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::dispatch::{AttachedDispatch, TargetHost};
use crate::error::TypingError;
use crate::model::{StartPayload, TypingRequest};
use crate::scheduler::run_typing;
use crate::session::{SessionId, SessionRegistry};

pub const UNKNOWN_MESSAGE: &str = "Unknown message.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ControlMessage {
    GetActiveSession,
    Attach {
        #[serde(default)]
        session_id: Option<SessionId>,
    },
    Detach {
        #[serde(default)]
        session_id: Option<SessionId>,
    },
    Start {
        #[serde(default)]
        session_id: Option<SessionId>,
        #[serde(default)]
        payload: StartPayload,
    },
    Stop {
        #[serde(default)]
        session_id: Option<SessionId>,
    },
    Pause {
        #[serde(default)]
        session_id: Option<SessionId>,
    },
    Resume {
        #[serde(default)]
        session_id: Option<SessionId>,
    },
    TogglePause {
        #[serde(default)]
        session_id: Option<SessionId>,
    },
}

/// A message plus an optional caller-chosen id echoed in the response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ControlRequest {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(flatten)]
    pub message: ControlMessage,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
}

impl ControlResponse {
    pub fn ok() -> Self {
        Self {
            ok: true,
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_paused(mut self, paused: bool) -> Self {
        self.paused = Some(paused);
        self
    }

    pub fn with_id(mut self, id: Option<Value>) -> Self {
        self.id = id;
        self
    }
}

/// Counters from one [`ControlSurface::serve`] loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeSummary {
    /// Non-blank lines read.
    pub handled: usize,
    /// Most message tasks alive at once, finished-but-unreaped ones included.
    pub peak_in_flight: usize,
}

fn log_task_failure(joined: Result<(), JoinError>) {
    if let Err(err) = joined {
        warn!(error = %err, "control message task failed");
    }
}

/// Routes control messages to sessions, the scheduler and the target host.
pub struct ControlSurface {
    host: Arc<dyn TargetHost>,
    registry: Arc<SessionRegistry>,
    dispatchers: Mutex<HashMap<SessionId, Arc<AttachedDispatch>>>,
    rng: Mutex<StdRng>,
}

impl ControlSurface {
    pub fn new(host: Arc<dyn TargetHost>, registry: Arc<SessionRegistry>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            host,
            registry,
            dispatchers: Mutex::new(HashMap::new()),
            rng: Mutex::new(rng),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub async fn handle(&self, message: ControlMessage) -> ControlResponse {
        debug!(?message, "control message");
        let result = match message {
            ControlMessage::GetActiveSession => self.active_session().await,
            ControlMessage::Attach { session_id } => self.attach(session_id).await,
            ControlMessage::Detach { session_id } => self.detach(session_id).await,
            ControlMessage::Start {
                session_id,
                payload,
            } => self.start(session_id, &payload).await,
            ControlMessage::Stop { session_id } => self.stop(session_id).await,
            ControlMessage::Pause { session_id } => self.set_paused(session_id, Some(true)).await,
            ControlMessage::Resume { session_id } => self.set_paused(session_id, Some(false)).await,
            ControlMessage::TogglePause { session_id } => self.set_paused(session_id, None).await,
        };
        result.unwrap_or_else(|err| ControlResponse::failed(err.to_string()))
    }

    /// Handle one JSON message, answering unparseable input with a failure.
    pub async fn handle_json(&self, line: &str) -> ControlResponse {
        match serde_json::from_str::<ControlRequest>(line) {
            Ok(request) => self.handle(request.message).await.with_id(request.id),
            Err(err) => {
                debug!(error = %err, "rejected control message");
                let id = serde_json::from_str::<Value>(line)
                    .ok()
                    .and_then(|v| v.get("id").cloned());
                ControlResponse::failed(UNKNOWN_MESSAGE).with_id(id)
            }
        }
    }

    /// Answer JSON-lines messages from `input` until it ends or `shutdown` flips.
    ///
    /// Every line is handled in its own task so STOP and PAUSE reach a START
    /// that is still typing. Finished tasks are reaped as the loop goes.
    pub async fn serve<I>(
        self: Arc<Self>,
        input: I,
        responses: mpsc::UnboundedSender<ControlResponse>,
        mut shutdown: watch::Receiver<bool>,
    ) -> io::Result<ServeSummary>
    where
        I: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        let mut tasks = JoinSet::new();
        let mut summary = ServeSummary::default();

        loop {
            let line = tokio::select! {
                line = lines.next_line() => line?,
                Some(joined) = tasks.join_next() => {
                    log_task_failure(joined);
                    continue;
                }
                _ = shutdown.changed() => break,
            };
            let Some(line) = line else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }

            let surface = self.clone();
            let responses = responses.clone();
            tasks.spawn(async move {
                let response = surface.handle_json(&line).await;
                let _ = responses.send(response);
            });
            summary.handled += 1;
            summary.peak_in_flight = summary.peak_in_flight.max(tasks.len());
        }

        while let Some(joined) = tasks.join_next().await {
            log_task_failure(joined);
        }
        Ok(summary)
    }

    async fn resolve(&self, session_id: Option<SessionId>) -> Result<SessionId, TypingError> {
        match session_id {
            Some(id) => Ok(id),
            None => self.host.active_target().await,
        }
    }

    fn dispatcher(&self, id: &SessionId) -> Option<Arc<AttachedDispatch>> {
        let dispatchers = self.dispatchers.lock().unwrap_or_else(PoisonError::into_inner);
        dispatchers.get(id).cloned()
    }

    async fn active_session(&self) -> Result<ControlResponse, TypingError> {
        let id = self.host.active_target().await?;
        let flags = self.registry.get(&id).snapshot();
        Ok(ControlResponse {
            session_id: Some(id),
            attached: Some(flags.attached),
            running: Some(flags.running),
            paused: Some(flags.paused),
            ..ControlResponse::ok()
        })
    }

    async fn attach(&self, session_id: Option<SessionId>) -> Result<ControlResponse, TypingError> {
        let id = self.resolve(session_id).await?;
        let session = self.registry.get(&id);
        if session.is_attached() && self.dispatcher(&id).is_some() {
            return Ok(ControlResponse::ok());
        }

        let dispatch = Arc::new(AttachedDispatch::new(self.host.attach(&id).await?));
        self.dispatchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), dispatch);
        session.attach();
        info!(session = %id, "attached");
        Ok(ControlResponse::ok())
    }

    async fn detach(&self, session_id: Option<SessionId>) -> Result<ControlResponse, TypingError> {
        let id = self.resolve(session_id).await?;
        let dispatch = self
            .dispatchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if let Some(dispatch) = dispatch {
            dispatch.revoke();
        }
        self.host.detach(&id).await;
        self.registry.get(&id).detach();
        info!(session = %id, "detached");
        Ok(ControlResponse::ok())
    }

    async fn start(
        &self,
        session_id: Option<SessionId>,
        payload: &StartPayload,
    ) -> Result<ControlResponse, TypingError> {
        let id = self.resolve(session_id).await?;
        let session = self.registry.get(&id);
        let dispatch = match self.dispatcher(&id) {
            Some(dispatch) if session.is_attached() => dispatch,
            _ => return Err(TypingError::NotAttached),
        };

        // A fresh start always runs immediately.
        if !session.is_running() {
            session.resume();
        }

        let request = TypingRequest::from_payload(payload);
        let seed: u64 = self.rng.lock().unwrap_or_else(PoisonError::into_inner).gen();
        let mut rng = StdRng::seed_from_u64(seed);

        let report = run_typing(&session, dispatch.as_ref(), &request, &mut rng).await?;
        Ok(ControlResponse::ok().with_message(report.outcome.message()))
    }

    async fn stop(&self, session_id: Option<SessionId>) -> Result<ControlResponse, TypingError> {
        let id = self.resolve(session_id).await?;
        self.registry.get(&id).request_stop();
        Ok(ControlResponse::ok())
    }

    /// `Some(v)` sets the pause flag, `None` toggles it.
    async fn set_paused(
        &self,
        session_id: Option<SessionId>,
        paused: Option<bool>,
    ) -> Result<ControlResponse, TypingError> {
        let id = self.resolve(session_id).await?;
        let session = self.registry.get(&id);
        let paused = match paused {
            Some(true) => {
                session.pause();
                true
            }
            Some(false) => {
                session.resume();
                false
            }
            None => session.toggle_pause(),
        };
        Ok(ControlResponse::ok().with_paused(paused))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn messages_parse_from_panel_json() {
        let msg: ControlRequest = serde_json::from_value(json!({
            "id": 7,
            "type": "START",
            "sessionId": "doc",
            "payload": {"text": "hi", "wpm": 90, "badMode": true, "typoChance": 5}
        }))
        .unwrap();
        assert_eq!(msg.id, Some(json!(7)));
        assert_eq!(
            msg.message,
            ControlMessage::Start {
                session_id: Some(SessionId::from("doc")),
                payload: StartPayload {
                    text: Some("hi".to_string()),
                    wpm: Some(90.0),
                    typo_chance: Some(5.0),
                    bad_mode: true,
                    ..Default::default()
                },
            }
        );

        let msg: ControlMessage = serde_json::from_value(json!({"type": "TOGGLE_PAUSE"})).unwrap();
        assert_eq!(msg, ControlMessage::TogglePause { session_id: None });

        let msg: ControlMessage =
            serde_json::from_value(json!({"type": "GET_ACTIVE_SESSION"})).unwrap();
        assert_eq!(msg, ControlMessage::GetActiveSession);
    }

    #[test]
    fn responses_omit_unset_fields() {
        let value = serde_json::to_value(ControlResponse::ok().with_paused(false)).unwrap();
        assert_eq!(value, json!({"ok": true, "paused": false}));

        let value = serde_json::to_value(ControlResponse::failed("Already running.")).unwrap();
        assert_eq!(value, json!({"ok": false, "message": "Already running."}));
    }
}
