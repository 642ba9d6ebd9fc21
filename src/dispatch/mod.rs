pub mod console;

#[cfg(feature = "x11")]
pub mod x11;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::error::{DispatchError, TypingError};
use crate::model::{ControlKey, KeyEvent};
use crate::session::SessionId;

/// Synthesizes input events into one target document.
#[async_trait]
pub trait InputDispatch: Send + Sync {
    /// Press and release a control key.
    async fn press_key(&self, key: ControlKey) -> Result<(), DispatchError>;

    /// Insert printable text as typed input.
    async fn insert_text(&self, text: &str) -> Result<(), DispatchError>;

    async fn send(&self, event: &KeyEvent) -> Result<(), DispatchError> {
        match event {
            KeyEvent::Press { key } => self.press_key(*key).await,
            KeyEvent::Insert { text } => self.insert_text(text).await,
        }
    }
}

/// Finds target documents and grants permission to send them input.
#[async_trait]
pub trait TargetHost: Send + Sync {
    /// The document the operator is currently looking at.
    async fn active_target(&self) -> Result<SessionId, TypingError>;

    async fn attach(&self, target: &SessionId) -> Result<Arc<dyn InputDispatch>, DispatchError>;

    async fn detach(&self, target: &SessionId);
}

/// A dispatcher that stops working once its session is detached.
pub struct AttachedDispatch {
    inner: Arc<dyn InputDispatch>,
    revoked: AtomicBool,
}

impl AttachedDispatch {
    pub fn new(inner: Arc<dyn InputDispatch>) -> Self {
        Self {
            inner,
            revoked: AtomicBool::new(false),
        }
    }

    pub fn revoke(&self) {
        self.revoked.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), DispatchError> {
        if self.revoked.load(Ordering::SeqCst) {
            Err(DispatchError::Detached)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl InputDispatch for AttachedDispatch {
    async fn press_key(&self, key: ControlKey) -> Result<(), DispatchError> {
        self.check()?;
        self.inner.press_key(key).await
    }

    async fn insert_text(&self, text: &str) -> Result<(), DispatchError> {
        self.check()?;
        self.inner.insert_text(text).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchBackend {
    Auto,
    Console,
    X11,
}

fn env_is_set(name: &str) -> bool {
    std::env::var_os(name)
        .map(|v| !v.is_empty())
        .unwrap_or(false)
}

fn require_supported_backend(
    #[allow(unused_variables)] selected: DispatchBackend,
    resolved: DispatchBackend,
) -> Result<()> {
    match resolved {
        DispatchBackend::Console => Ok(()),
        DispatchBackend::X11 => {
            #[cfg(feature = "x11")]
            {
                Ok(())
            }

            #[cfg(not(feature = "x11"))]
            {
                let how = match selected {
                    DispatchBackend::Auto => "detected",
                    _ => "requested",
                };
                Err(anyhow!(
                    "X11 backend {how} but is disabled in this build. (Rebuild with `--features x11`.)"
                ))
            }
        }
        DispatchBackend::Auto => {
            let hint = if cfg!(feature = "x11") {
                "Try `--backend x11` or `--backend console`."
            } else {
                "Try `--backend console` for a dry run."
            };
            Err(anyhow!(
                "No supported input backend detected (DISPLAY is not set). {hint}"
            ))
        }
    }
}

pub fn resolve_backend(requested: DispatchBackend) -> Result<DispatchBackend> {
    let resolved = match requested {
        DispatchBackend::Auto if env_is_set("DISPLAY") => DispatchBackend::X11,
        other => other,
    };

    require_supported_backend(requested, resolved)?;
    Ok(resolved)
}

/// Build the host for a resolved backend.
pub fn open_host(backend: DispatchBackend, trace: bool) -> Result<Arc<dyn TargetHost>> {
    match resolve_backend(backend)? {
        DispatchBackend::Console => Ok(Arc::new(console::ConsoleHost::new(trace))),
        DispatchBackend::X11 => {
            #[cfg(feature = "x11")]
            {
                Ok(Arc::new(x11::X11Host::connect()?))
            }

            #[cfg(not(feature = "x11"))]
            {
                Err(anyhow!(
                    "X11 backend is disabled in this build (rebuild with `--features x11`)."
                ))
            }
        }
        DispatchBackend::Auto => Err(anyhow!("no backend resolved")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::EditorSim;

    #[tokio::test]
    async fn revoked_dispatch_rejects_everything() {
        let sim = Arc::new(EditorSim::new());
        let attached = AttachedDispatch::new(sim.clone());

        attached.insert_text("a").await.unwrap();
        attached.revoke();
        assert_eq!(
            attached.insert_text("b").await,
            Err(DispatchError::Detached)
        );
        assert_eq!(
            attached.press_key(ControlKey::Enter).await,
            Err(DispatchError::Detached)
        );
        assert_eq!(sim.text(), "a");
    }

    #[test]
    fn console_is_always_available() {
        assert_eq!(
            resolve_backend(DispatchBackend::Console).unwrap(),
            DispatchBackend::Console
        );
    }
}
