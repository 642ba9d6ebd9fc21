use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ConnectionExt as _, GetInputFocusReply};
use x11rb::protocol::xtest::ConnectionExt as _;
use x11rb::protocol::{xproto, xtest};
use x11rb::rust_connection::RustConnection;

use crate::dispatch::{InputDispatch, TargetHost};
use crate::error::{DispatchError, TypingError};
use crate::keyboard::{
    keycode_for_control, keystroke_for_char, KEY_LEFTALT, KEY_LEFTCTRL, KEY_LEFTSHIFT,
    KEY_RIGHTALT, KEY_RIGHTCTRL, KEY_RIGHTSHIFT,
};
use crate::model::ControlKey;
use crate::session::SessionId;

const TARGET_PREFIX: &str = "x11:";

// X11 special focus value: the focused window follows the pointer.
const POINTER_ROOT: xproto::Window = 1;

// Released on attach and detach so a run never starts or ends with one held.
const COMMON_MODIFIER_KEYCODES: [u32; 6] = [
    KEY_LEFTSHIFT,
    KEY_RIGHTSHIFT,
    KEY_LEFTCTRL,
    KEY_RIGHTCTRL,
    KEY_LEFTALT,
    KEY_RIGHTALT,
];

fn evdev_to_x11_keycode(evdev_keycode: u32) -> Result<u8> {
    // On most Linux Xorg setups, X11 keycodes are evdev + 8.
    let x11 = evdev_keycode
        .checked_add(8)
        .ok_or_else(|| anyhow!("evdev keycode overflow"))?;
    u8::try_from(x11).map_err(|_| anyhow!("evdev keycode {evdev_keycode} out of range for X11"))
}

fn rejected(err: anyhow::Error) -> DispatchError {
    DispatchError::rejected(format!("{err:#}"))
}

fn query_xtest(conn: &impl Connection) -> Result<()> {
    let ext = conn
        .extension_information(xtest::X11_EXTENSION_NAME)
        .context("failed to query X11 extension info")?;

    if ext.is_none() {
        return Err(anyhow!(
            "X11 backend requires the XTEST extension (not present on this X server)"
        ));
    }

    let _ = conn
        .xtest_get_version(2, 2)
        .ok()
        .and_then(|cookie| cookie.reply().ok());

    Ok(())
}

fn get_focus(conn: &impl Connection) -> Result<GetInputFocusReply> {
    conn.get_input_focus()
        .context("failed to request input focus")?
        .reply()
        .context("failed to read input focus reply")
}

fn keysym_for_keycode(conn: &impl Connection, keycode: u8, index: usize) -> Result<xproto::Keysym> {
    let reply = conn
        .get_keyboard_mapping(keycode, 1)
        .context("failed to request keyboard mapping")?
        .reply()
        .context("failed to read keyboard mapping")?;

    if reply.keysyms_per_keycode == 0 {
        return Err(anyhow!("X server returned 0 keysyms per keycode"));
    }

    Ok(reply
        .keysyms
        .get(index)
        .copied()
        .unwrap_or(x11rb::NO_SYMBOL))
}

fn validate_us_keymap(conn: &impl Connection) -> Result<()> {
    // For Latin-1, X11 keysyms match the character code.
    let checks = [('a', 'A'), ('q', 'Q'), ('1', '!'), ('-', '_'), ('\'', '"'), ('[', '{')];

    for (plain, shifted) in checks {
        let stroke =
            keystroke_for_char(plain).ok_or_else(|| anyhow!("no keystroke for {plain:?}"))?;
        let keycode = evdev_to_x11_keycode(stroke.keycode)?;
        let got0 = keysym_for_keycode(conn, keycode, 0)?;
        let got1 = keysym_for_keycode(conn, keycode, 1)?;

        if got0 == x11rb::NO_SYMBOL || got1 == x11rb::NO_SYMBOL {
            return Err(anyhow!(
                "X11 keymap returned NoSymbol for keycode {keycode} ({got0:#x}/{got1:#x}); this backend assumes X11 keycodes are evdev+8"
            ));
        }
        if got0 != plain as u32 || got1 != shifted as u32 {
            return Err(anyhow!(
                "X11 backend requires a US keyboard layout, but keycode {keycode} maps to {got0:#x}/{got1:#x}. Try `setxkbmap us`."
            ));
        }
    }

    Ok(())
}

fn xtest_key(conn: &impl Connection, root: xproto::Window, keycode: u8, pressed: bool) -> Result<()> {
    let type_ = if pressed {
        xproto::KEY_PRESS_EVENT
    } else {
        xproto::KEY_RELEASE_EVENT
    };
    conn.xtest_fake_input(type_, keycode, x11rb::CURRENT_TIME, root, 0, 0, 0)
        .context("failed to send XTEST fake input")?;
    Ok(())
}

fn reset_common_modifiers_best_effort(conn: &impl Connection, root: xproto::Window) {
    for keycode in COMMON_MODIFIER_KEYCODES {
        if let Ok(code) = evdev_to_x11_keycode(keycode) {
            let _ = xtest_key(conn, root, code, false);
        }
    }
    let _ = conn.flush();
}

fn target_for_window(window: xproto::Window) -> SessionId {
    SessionId::new(format!("{TARGET_PREFIX}{window:#x}"))
}

fn window_for_target(target: &SessionId) -> Option<xproto::Window> {
    let hex = target.as_str().strip_prefix(TARGET_PREFIX)?;
    xproto::Window::from_str_radix(hex.trim_start_matches("0x"), 16).ok()
}

/// The focused X11 window is the target document.
pub struct X11Host {
    conn: Arc<RustConnection>,
    root: xproto::Window,
}

impl X11Host {
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).context("failed to connect to X11")?;
        query_xtest(&conn)?;
        validate_us_keymap(&conn)?;

        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .map(|screen| screen.root)
            .ok_or_else(|| anyhow!("invalid X11 screen index"))?;

        Ok(Self {
            conn: Arc::new(conn),
            root,
        })
    }
}

#[async_trait]
impl TargetHost for X11Host {
    async fn active_target(&self) -> Result<SessionId, TypingError> {
        let focus = get_focus(self.conn.as_ref()).map_err(rejected)?;
        if focus.focus == x11rb::NONE || focus.focus == POINTER_ROOT {
            return Err(TypingError::NoActiveTarget);
        }
        Ok(target_for_window(focus.focus))
    }

    async fn attach(&self, target: &SessionId) -> Result<Arc<dyn InputDispatch>, DispatchError> {
        let window = window_for_target(target)
            .ok_or_else(|| DispatchError::rejected(format!("{target} is not an X11 window")))?;

        // X11 has no per-client modifier state; start from a neutral one.
        reset_common_modifiers_best_effort(self.conn.as_ref(), self.root);
        info!(%target, "attached to X11 window");

        Ok(Arc::new(X11Dispatch {
            conn: self.conn.clone(),
            root: self.root,
            window,
        }))
    }

    async fn detach(&self, target: &SessionId) {
        reset_common_modifiers_best_effort(self.conn.as_ref(), self.root);
        debug!(%target, "detached from X11 window");
    }
}

pub struct X11Dispatch {
    conn: Arc<RustConnection>,
    root: xproto::Window,
    window: xproto::Window,
}

impl X11Dispatch {
    fn ensure_focus(&self) -> Result<(), DispatchError> {
        let focus = get_focus(self.conn.as_ref()).map_err(rejected)?;
        if focus.focus != self.window {
            return Err(DispatchError::rejected(
                "Target window no longer has input focus.",
            ));
        }
        Ok(())
    }

    fn tap(&self, evdev_keycode: u32, shift: bool) -> Result<()> {
        let conn = self.conn.as_ref();
        let keycode = evdev_to_x11_keycode(evdev_keycode)?;
        let shift_code = evdev_to_x11_keycode(KEY_LEFTSHIFT)?;

        if shift {
            xtest_key(conn, self.root, shift_code, true)?;
        }
        xtest_key(conn, self.root, keycode, true)?;
        xtest_key(conn, self.root, keycode, false)?;
        if shift {
            xtest_key(conn, self.root, shift_code, false)?;
        }
        conn.flush().context("failed to flush X11 connection")?;
        Ok(())
    }
}

#[async_trait]
impl InputDispatch for X11Dispatch {
    async fn press_key(&self, key: ControlKey) -> Result<(), DispatchError> {
        self.ensure_focus()?;
        self.tap(keycode_for_control(key), false).map_err(rejected)
    }

    async fn insert_text(&self, text: &str) -> Result<(), DispatchError> {
        self.ensure_focus()?;
        for c in text.chars() {
            let stroke = keystroke_for_char(c).ok_or(DispatchError::Unsupported(c))?;
            self.tap(stroke.keycode, stroke.shift).map_err(rejected)?;
        }
        Ok(())
    }
}
