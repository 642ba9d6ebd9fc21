//! Humanized typing loop.
//!
//! One run walks the request text character by character. Each character goes
//! through the same checkpoints, in order:
//!
//! 1. stop check
//! 2. boundary pause before the character, then a stop check
//! 3. delay computation
//! 4. emission, possibly as a typo followed by its repair
//! 5. boundary pause after the character, then a stop check
//! 6. random distraction pause, then a stop check
//! 7. the per-character delay
//!
//! Stop and pause are flags read at these checkpoints; nothing is preempted.

use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::dispatch::InputDispatch;
use crate::error::TypingError;
use crate::keyboard::key_event_for_char;
use crate::model::{ControlKey, RunOutcome, RunReport, TypingRequest};
use crate::pause::{pause_after, pause_before, random_pause_ms, sleep_interruptible};
use crate::session::Session;
use crate::timing::char_delay_ms;
use crate::typo::maybe_typo;

/// Clears `running` however the run ends, including when its future is dropped.
struct RunGuard<'a> {
    session: &'a Session,
    epoch: u64,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.session.end_run(self.epoch);
    }
}

async fn emit_char(dispatch: &dyn InputDispatch, c: char) -> Result<(), TypingError> {
    dispatch.send(&key_event_for_char(c)).await?;
    Ok(())
}

/// Type `request.text` into `dispatch` on behalf of `session`.
///
/// Fails before emitting anything if the session is not attached or is already
/// running. A requested stop is not an error: the run ends with
/// [`RunOutcome::Stopped`]. A dispatch failure aborts the run immediately.
pub async fn run_typing<R: Rng + Send>(
    session: &Session,
    dispatch: &dyn InputDispatch,
    request: &TypingRequest,
    rng: &mut R,
) -> Result<RunReport, TypingError> {
    if !session.is_attached() {
        return Err(TypingError::NotAttached);
    }
    let epoch = session.begin_run().ok_or(TypingError::AlreadyRunning)?;
    let _guard = RunGuard { session, epoch };

    if request.is_blank() {
        return Ok(RunReport::new(RunOutcome::NoText));
    }

    info!(
        chars = request.text.chars().count(),
        wpm = request.wpm,
        mode = ?request.mode,
        "typing started"
    );

    let result = type_text(session, dispatch, request, rng).await;
    match &result {
        Ok(report) => info!(
            outcome = report.outcome.message(),
            characters = report.characters,
            typos = report.typos,
            "typing finished"
        ),
        Err(err) => warn!(error = %err, "typing aborted"),
    }
    result
}

async fn type_text<R: Rng + Send>(
    session: &Session,
    dispatch: &dyn InputDispatch,
    request: &TypingRequest,
    rng: &mut R,
) -> Result<RunReport, TypingError> {
    let text: Vec<char> = request.text.chars().collect();
    let mut report = RunReport::new(RunOutcome::Completed);
    let stopped = |mut report: RunReport| -> Result<RunReport, TypingError> {
        report.outcome = RunOutcome::Stopped;
        Ok(report)
    };

    for (i, &c) in text.iter().enumerate() {
        if session.stop_requested() {
            return stopped(report);
        }

        pause_before(session, &text, i).await;
        if session.stop_requested() {
            return stopped(report);
        }

        let delay_ms = char_delay_ms(request.wpm, request.fluctuation, request.mode, c, rng);

        match maybe_typo(request.mode, c, request.typo_chance, rng) {
            None => emit_char(dispatch, c).await?,
            Some(typo) => {
                debug!(index = i, intended = %c, wrong = %typo.wrong, "typo");
                report.typos += 1;
                emit_char(dispatch, typo.wrong).await?;

                sleep(Duration::from_millis(typo.notice_ms)).await;
                if session.stop_requested() {
                    return stopped(report);
                }

                dispatch.press_key(ControlKey::Backspace).await?;
                sleep(Duration::from_millis(typo.fix_ms)).await;
                if session.stop_requested() {
                    return stopped(report);
                }

                emit_char(dispatch, c).await?;
            }
        }
        report.characters += 1;

        pause_after(session, c).await;
        if session.stop_requested() {
            return stopped(report);
        }

        if let Some(pause_ms) = random_pause_ms(request.mode, request.max_pause_ms, c, rng) {
            debug!(index = i, pause_ms, "random pause");
            report.random_pauses += 1;
            sleep_interruptible(session, pause_ms).await;
            if session.stop_requested() {
                return stopped(report);
            }
        }

        sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(report)
}
