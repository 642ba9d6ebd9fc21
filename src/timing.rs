use rand::Rng;

use crate::model::Mode;

/// Bounds for the per-character speed once fluctuation is applied.
pub const EFFECTIVE_WPM_MIN: f64 = 5.0;
pub const EFFECTIVE_WPM_MAX: f64 = 260.0;

pub const DELAY_MS_MIN: i64 = 5;
pub const DELAY_MS_MAX: i64 = 2000;

/// Average word length used to turn words per minute into characters.
const CHARS_PER_WORD: f64 = 5.0;

fn effective_wpm(wpm: f64, fluctuation: f64, mode: Mode, rng: &mut impl Rng) -> f64 {
    if fluctuation <= 0.0 {
        return wpm;
    }
    let spread = match mode {
        Mode::Bad => fluctuation,
        Mode::Normal => fluctuation * 0.25,
        Mode::Perfect => return wpm,
    };
    // Subnormal fluctuations can round the spread down to zero.
    if spread <= 0.0 {
        return wpm;
    }
    (wpm + rng.gen_range(-spread..spread)).clamp(EFFECTIVE_WPM_MIN, EFFECTIVE_WPM_MAX)
}

fn hesitation_ms(mode: Mode, c: char, rng: &mut impl Rng) -> i64 {
    match mode {
        Mode::Bad => {
            let mut extra = 0;
            if rng.gen_bool(0.05) {
                extra += rng.gen_range(80..=350);
            }
            if c.is_whitespace() && rng.gen_bool(0.12) {
                extra += rng.gen_range(250..=1200);
            }
            extra
        }
        Mode::Perfect => rng.gen_range(-5..=10),
        Mode::Normal => {
            let mut extra = 0;
            if rng.gen_bool(0.02) {
                extra += rng.gen_range(60..=220);
            }
            extra + rng.gen_range(-10..=25)
        }
    }
}

/// Milliseconds to wait after emitting `c`, always within `[5, 2000]`.
pub fn char_delay_ms(wpm: f64, fluctuation: f64, mode: Mode, c: char, rng: &mut impl Rng) -> u64 {
    let wpm = effective_wpm(wpm, fluctuation, mode, rng);
    let base = (60_000.0 / (wpm * CHARS_PER_WORD)).round() as i64;
    let delay = base + hesitation_ms(mode, c, rng);
    delay.clamp(DELAY_MS_MIN, DELAY_MS_MAX) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn delay_stays_in_bounds_across_the_input_range() {
        let mut rng = StdRng::seed_from_u64(42);
        for mode in [Mode::Normal, Mode::Bad, Mode::Perfect] {
            for wpm in (5..=240).step_by(5) {
                for fluctuation in (0..=160).step_by(20) {
                    for c in ['a', ' ', '\n'] {
                        let ms = char_delay_ms(wpm as f64, fluctuation as f64, mode, c, &mut rng);
                        assert!((5..=2000).contains(&ms), "{mode:?} {wpm} {fluctuation}: {ms}");
                    }
                }
            }
        }
    }

    #[test]
    fn perfect_mode_only_jitters() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..500 {
            let ms = char_delay_ms(60.0, 160.0, Mode::Perfect, ' ', &mut rng);
            assert!((195..=210).contains(&ms), "got {ms}");
        }
    }

    #[test]
    fn normal_mode_without_fluctuation_is_near_base() {
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..500 {
            let ms = char_delay_ms(120.0, 0.0, Mode::Normal, 'x', &mut rng);
            assert!((90..=100 + 25 + 220).contains(&ms), "got {ms}");
        }
    }

    #[test]
    fn vanishing_fluctuation_keeps_the_requested_speed() {
        let mut rng = StdRng::seed_from_u64(4);
        for mode in [Mode::Normal, Mode::Bad] {
            assert_eq!(effective_wpm(60.0, 5e-324, mode, &mut rng), 60.0);
            let ms = char_delay_ms(60.0, f64::MIN_POSITIVE, mode, 'h', &mut rng);
            assert!((5..=2000).contains(&ms), "got {ms}");
        }
    }

    #[test]
    fn slowest_speed_hits_the_upper_clamp() {
        let mut rng = StdRng::seed_from_u64(11);
        // 5 wpm is 2400 ms per character before clamping.
        assert_eq!(char_delay_ms(5.0, 0.0, Mode::Perfect, 'a', &mut rng), 2000);
    }

    #[test]
    fn same_seed_same_delays() {
        let draw = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..50)
                .map(|_| char_delay_ms(80.0, 40.0, Mode::Bad, ' ', &mut rng))
                .collect::<Vec<_>>()
        };
        assert_eq!(draw(5), draw(5));
    }
}
