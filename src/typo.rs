use rand::Rng;

use crate::keyboard::neighbor_key;
use crate::model::Mode;

/// A deliberate mistake and the timing of its repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Typo {
    pub wrong: char,
    /// Wait after the wrong character, before the backspace.
    pub notice_ms: u64,
    /// Wait after the backspace, before the intended character.
    pub fix_ms: u64,
}

/// Decide whether typing `c` goes wrong first.
///
/// Only ASCII letters in bad mode are eligible; one uniform draw is compared
/// against `typo_chance`.
pub fn maybe_typo(mode: Mode, c: char, typo_chance: f64, rng: &mut impl Rng) -> Option<Typo> {
    if mode != Mode::Bad || !c.is_ascii_alphabetic() {
        return None;
    }
    if rng.gen::<f64>() >= typo_chance {
        return None;
    }

    Some(Typo {
        wrong: neighbor_key(c, rng),
        notice_ms: rng.gen_range(120..=520),
        fix_ms: rng.gen_range(40..=140),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn only_bad_mode_letters_are_eligible() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(maybe_typo(Mode::Perfect, 'a', 1.0, &mut rng), None);
        assert_eq!(maybe_typo(Mode::Normal, 'a', 1.0, &mut rng), None);
        assert_eq!(maybe_typo(Mode::Bad, '4', 1.0, &mut rng), None);
        assert_eq!(maybe_typo(Mode::Bad, ' ', 1.0, &mut rng), None);
        assert!(maybe_typo(Mode::Bad, 'a', 1.0, &mut rng).is_some());
    }

    #[test]
    fn zero_chance_never_fires() {
        let mut rng = StdRng::seed_from_u64(12);
        for _ in 0..1000 {
            assert_eq!(maybe_typo(Mode::Bad, 'q', 0.0, &mut rng), None);
        }
    }

    #[test]
    fn repair_waits_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..500 {
            let typo = maybe_typo(Mode::Bad, 'T', 1.0, &mut rng).unwrap();
            assert!(typo.wrong.is_ascii_uppercase());
            assert_ne!(typo.wrong, 'T');
            assert!((120..=520).contains(&typo.notice_ms));
            assert!((40..=140).contains(&typo.fix_ms));
        }
    }
}
