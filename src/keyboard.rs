use rand::Rng;

use crate::model::{ControlKey, KeyEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyStroke {
    pub keycode: u32,
    pub shift: bool,
}

// Linux evdev keycodes (see linux/input-event-codes.h)
pub const KEY_BACKSPACE: u32 = 14;
pub const KEY_TAB: u32 = 15;
pub const KEY_ENTER: u32 = 28;
pub const KEY_LEFTCTRL: u32 = 29;
pub const KEY_A: u32 = 30;
pub const KEY_LEFTSHIFT: u32 = 42;
pub const KEY_RIGHTSHIFT: u32 = 54;
pub const KEY_LEFTALT: u32 = 56;
pub const KEY_SPACE: u32 = 57;
pub const KEY_RIGHTCTRL: u32 = 97;
pub const KEY_RIGHTALT: u32 = 100;

/// US-QWERTY printable keys: (evdev keycode, unshifted, shifted).
const US_QWERTY: &[(u32, char, char)] = &[
    (41, '`', '~'),
    (2, '1', '!'),
    (3, '2', '@'),
    (4, '3', '#'),
    (5, '4', '$'),
    (6, '5', '%'),
    (7, '6', '^'),
    (8, '7', '&'),
    (9, '8', '*'),
    (10, '9', '('),
    (11, '0', ')'),
    (12, '-', '_'),
    (13, '=', '+'),
    (16, 'q', 'Q'),
    (17, 'w', 'W'),
    (18, 'e', 'E'),
    (19, 'r', 'R'),
    (20, 't', 'T'),
    (21, 'y', 'Y'),
    (22, 'u', 'U'),
    (23, 'i', 'I'),
    (24, 'o', 'O'),
    (25, 'p', 'P'),
    (26, '[', '{'),
    (27, ']', '}'),
    (43, '\\', '|'),
    (30, 'a', 'A'),
    (31, 's', 'S'),
    (32, 'd', 'D'),
    (33, 'f', 'F'),
    (34, 'g', 'G'),
    (35, 'h', 'H'),
    (36, 'j', 'J'),
    (37, 'k', 'K'),
    (38, 'l', 'L'),
    (39, ';', ':'),
    (40, '\'', '"'),
    (44, 'z', 'Z'),
    (45, 'x', 'X'),
    (46, 'c', 'C'),
    (47, 'v', 'V'),
    (48, 'b', 'B'),
    (49, 'n', 'N'),
    (50, 'm', 'M'),
    (51, ',', '<'),
    (52, '.', '>'),
    (53, '/', '?'),
];

pub fn keystroke_for_char(c: char) -> Option<KeyStroke> {
    if c == ' ' {
        return Some(KeyStroke {
            keycode: KEY_SPACE,
            shift: false,
        });
    }
    US_QWERTY.iter().find_map(|&(keycode, plain, shifted)| {
        if c == plain {
            Some(KeyStroke {
                keycode,
                shift: false,
            })
        } else if c == shifted {
            Some(KeyStroke {
                keycode,
                shift: true,
            })
        } else {
            None
        }
    })
}

pub fn keycode_for_control(key: ControlKey) -> u32 {
    match key {
        ControlKey::Enter => KEY_ENTER,
        ControlKey::Tab => KEY_TAB,
        ControlKey::Backspace => KEY_BACKSPACE,
    }
}

/// Newline and tab get their dedicated keys; everything else is inserted as text.
pub fn key_event_for_char(c: char) -> KeyEvent {
    match c {
        '\n' => KeyEvent::Press {
            key: ControlKey::Enter,
        },
        '\t' => KeyEvent::Press {
            key: ControlKey::Tab,
        },
        _ => KeyEvent::Insert {
            text: c.to_string(),
        },
    }
}

/// Substitute used when a character has no neighbors in the table.
pub const FALLBACK_NEIGHBOR: char = 'e';

fn qwerty_neighbors(lower: char) -> &'static [char] {
    match lower {
        'a' => &['s', 'q', 'w', 'z'],
        'b' => &['v', 'g', 'h', 'n'],
        'c' => &['x', 'd', 'f', 'v'],
        'd' => &['s', 'e', 'r', 'f', 'c', 'x'],
        'e' => &['w', 's', 'd', 'r'],
        'f' => &['d', 'r', 't', 'g', 'v', 'c'],
        'g' => &['f', 't', 'y', 'h', 'b', 'v'],
        'h' => &['g', 'y', 'u', 'j', 'n', 'b'],
        'i' => &['u', 'j', 'k', 'o'],
        'j' => &['h', 'u', 'i', 'k', 'm', 'n'],
        'k' => &['j', 'i', 'o', 'l', 'm'],
        'l' => &['k', 'o', 'p'],
        'm' => &['n', 'j', 'k'],
        'n' => &['b', 'h', 'j', 'm'],
        'o' => &['i', 'k', 'l', 'p'],
        'p' => &['o', 'l'],
        'q' => &['w', 'a'],
        'r' => &['e', 'd', 'f', 't'],
        's' => &['a', 'w', 'e', 'd', 'x', 'z'],
        't' => &['r', 'f', 'g', 'y'],
        'u' => &['y', 'h', 'j', 'i'],
        'v' => &['c', 'f', 'g', 'b'],
        'w' => &['q', 'a', 's', 'e'],
        'x' => &['z', 's', 'd', 'c'],
        'y' => &['t', 'g', 'h', 'u'],
        'z' => &['a', 's', 'x'],
        _ => &[],
    }
}

/// Pick a physically adjacent key, keeping the case of `c`.
pub fn neighbor_key(c: char, rng: &mut impl Rng) -> char {
    let lower = c.to_ascii_lowercase();
    let neighbors = qwerty_neighbors(lower);
    if neighbors.is_empty() {
        return FALLBACK_NEIGHBOR;
    }

    let chosen = neighbors[rng.gen_range(0..neighbors.len())];
    if c == lower {
        chosen
    } else {
        chosen.to_ascii_uppercase()
    }
}
