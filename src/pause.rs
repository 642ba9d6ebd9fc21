use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;

use crate::model::Mode;
use crate::session::Session;

/// How often a paused session re-checks its flags.
pub const PAUSE_POLL_MS: u64 = 80;

/// Random pauses shorter than this are skipped.
pub const MIN_RANDOM_PAUSE_MS: u64 = 30;

const RANDOM_PAUSE_EXPONENT: f64 = 0.55;
const STOP_POLL_MS: u64 = 50;

/// A pause may start before character `index` only at the start of a word.
pub fn is_boundary_before(text: &[char], index: usize) -> bool {
    index == 0 || text.get(index - 1).is_some_and(|c| c.is_whitespace())
}

async fn wait_while_paused(session: &Session) {
    while session.is_paused() && !session.stop_requested() {
        sleep(Duration::from_millis(PAUSE_POLL_MS)).await;
    }
}

/// Hold before emitting `text[index]` if paused at a word boundary.
pub async fn pause_before(session: &Session, text: &[char], index: usize) {
    if session.is_paused() && is_boundary_before(text, index) {
        wait_while_paused(session).await;
    }
}

/// Hold after emitting `c` if paused and `c` ended a word.
pub async fn pause_after(session: &Session, c: char) {
    if session.is_paused() && c.is_whitespace() {
        wait_while_paused(session).await;
    }
}

/// Decide whether a distraction pause follows `c`, and for how long.
pub fn random_pause_ms(mode: Mode, max_pause_ms: u64, c: char, rng: &mut impl Rng) -> Option<u64> {
    if mode != Mode::Bad || max_pause_ms == 0 {
        return None;
    }

    let p = if c.is_whitespace() { 0.08 } else { 0.025 };
    if rng.gen::<f64>() >= p {
        return None;
    }

    let ms = (rng.gen::<f64>().powf(RANDOM_PAUSE_EXPONENT) * max_pause_ms as f64).round() as u64;
    (ms >= MIN_RANDOM_PAUSE_MS).then_some(ms)
}

/// Sleep for `ms` in short slices, returning early once `stopped` reports true.
pub async fn sleep_until_stopped(ms: u64, stopped: impl Fn() -> bool) {
    let mut remaining = ms;
    while remaining > 0 {
        if stopped() {
            return;
        }
        let step = remaining.min(STOP_POLL_MS);
        sleep(Duration::from_millis(step)).await;
        remaining -= step;
    }
}

/// Sleep for `ms`, returning early once a stop is requested on `session`.
pub async fn sleep_interruptible(session: &Session, ms: u64) {
    sleep_until_stopped(ms, || session.stop_requested()).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn boundaries_follow_whitespace() {
        let text = chars("ab cd\nef");
        assert!(is_boundary_before(&text, 0));
        assert!(!is_boundary_before(&text, 1));
        assert!(!is_boundary_before(&text, 2));
        assert!(is_boundary_before(&text, 3));
        assert!(is_boundary_before(&text, 6));
        assert!(!is_boundary_before(&text, 7));
    }

    #[test]
    fn random_pauses_only_in_bad_mode_with_budget() {
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..1000 {
            assert_eq!(random_pause_ms(Mode::Normal, 10_000, ' ', &mut rng), None);
            assert_eq!(random_pause_ms(Mode::Perfect, 10_000, ' ', &mut rng), None);
            assert_eq!(random_pause_ms(Mode::Bad, 0, ' ', &mut rng), None);
        }
    }

    #[test]
    fn random_pauses_respect_budget_and_floor() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut fired = 0;
        for _ in 0..5000 {
            if let Some(ms) = random_pause_ms(Mode::Bad, 2000, ' ', &mut rng) {
                assert!((MIN_RANDOM_PAUSE_MS..=2000).contains(&ms));
                fired += 1;
            }
        }
        // 8% of 5000 is 400.
        assert!((250..=550).contains(&fired), "fired {fired}");
    }

    #[test]
    fn tiny_budgets_never_pause() {
        let mut rng = StdRng::seed_from_u64(8);
        for _ in 0..5000 {
            assert_eq!(random_pause_ms(Mode::Bad, 29, ' ', &mut rng), None);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn interruptible_sleep_returns_soon_after_stop() {
        let session = Arc::new(Session::default());
        let stopper = session.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(120)).await;
            stopper.request_stop();
        });

        let started = Instant::now();
        sleep_interruptible(&session, 30_000).await;
        assert!(started.elapsed() <= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_until_stopped_polls_the_predicate() {
        let stop = Arc::new(AtomicBool::new(false));
        let setter = stop.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(70)).await;
            setter.store(true, Ordering::SeqCst);
        });

        let started = Instant::now();
        sleep_until_stopped(5_000, || stop.load(Ordering::SeqCst)).await;
        let elapsed = started.elapsed().as_millis();
        assert!((100..=103).contains(&elapsed), "stopped after {elapsed} ms");

        let started = Instant::now();
        sleep_until_stopped(130, || false).await;
        let elapsed = started.elapsed().as_millis();
        assert!((130..=133).contains(&elapsed), "slept {elapsed} ms");
    }

    #[tokio::test(start_paused = true)]
    async fn pause_before_waits_for_resume() {
        let session = Arc::new(Session::default());
        session.pause();
        let resumer = session.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(3)).await;
            resumer.resume();
        });

        let started = Instant::now();
        pause_before(&session, &chars("ab"), 0).await;
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_mid_word_does_not_block() {
        let session = Session::default();
        session.pause();

        let started = Instant::now();
        pause_before(&session, &chars("ab"), 1).await;
        pause_after(&session, 'b').await;
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
