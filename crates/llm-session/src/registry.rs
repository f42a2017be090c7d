use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use llm_session_core::{ConversationLedger, ProgressSink, StopSignal};
use llm_session_engine::EngineFactory;
use llm_session_metrics::{GenerationMetrics, ImageMetrics, MetricsCollector};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::session::{Session, SessionKind, SessionOptions};

/// Opaque reference to a session owned by a [`SessionRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionHandle(u64);

impl SessionHandle {
    /// Never issued by a registry; always reports `SessionNotReady`.
    pub const NULL: Self = Self(0);

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    /// A call was in flight; the session is released once it returns.
    Deferred,
}

struct LiveSession {
    id: String,
    kind: SessionKind,
    stop: Option<StopSignal>,
    session: Mutex<Option<Session>>,
    release_requested: AtomicBool,
}

enum Slot {
    Live(Arc<LiveSession>),
    Released,
}

/// Owns every open session and hands out handles to them.
///
/// Each handle serves one call at a time; a second concurrent call fails
/// with `SessionBusy` instead of waiting. Released handles are tombstoned.
pub struct SessionRegistry {
    factory: Arc<dyn EngineFactory>,
    config: SessionConfig,
    metrics: MetricsCollector,
    slots: DashMap<SessionHandle, Slot>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new(factory: Arc<dyn EngineFactory>, config: SessionConfig) -> Self {
        let metrics = MetricsCollector::new(config.metrics_retention);
        Self {
            factory,
            config,
            metrics,
            slots: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn create(&self, options: SessionOptions) -> Result<SessionHandle> {
        let session = Session::create(
            self.factory.as_ref(),
            options,
            &self.config,
            Some(self.metrics.clone()),
        )?;

        let stop = match &session {
            Session::Text(text) => Some(text.stop_signal()),
            Session::Image(_) => None,
        };
        let live = LiveSession {
            id: session.id().to_string(),
            kind: session.kind(),
            stop,
            session: Mutex::new(Some(session)),
            release_requested: AtomicBool::new(false),
        };

        let handle = SessionHandle(self.next_id.fetch_add(1, Ordering::SeqCst));
        log::info!("[{}] Registered {} session as {}", live.id, live.kind, handle);
        self.slots.insert(handle, Slot::Live(Arc::new(live)));
        Ok(handle)
    }

    pub fn submit(
        &self,
        handle: SessionHandle,
        input: &str,
        keep_history: bool,
        sink: &mut dyn ProgressSink,
    ) -> Result<GenerationMetrics> {
        self.with_session(handle, |session| {
            session.as_text_mut()?.submit(input, keep_history, sink)
        })
    }

    pub fn reset(&self, handle: SessionHandle) -> Result<()> {
        self.with_session(handle, |session| session.as_text_mut()?.reset())
    }

    pub fn set_history<S: AsRef<str>>(
        &self,
        handle: SessionHandle,
        history: &[S],
        reasoning_session: bool,
    ) -> Result<()> {
        self.with_session(handle, |session| {
            session
                .as_text_mut()?
                .set_history(history, reasoning_session)
        })
    }

    pub fn run_image(
        &self,
        handle: SessionHandle,
        prompt: &str,
        output_path: &Path,
        sink: &mut dyn ProgressSink,
    ) -> Result<ImageMetrics> {
        self.with_session(handle, |session| {
            session.as_image_mut()?.run(prompt, output_path, sink)
        })
    }

    /// Asks an in-flight submission to stop after its current decode step.
    pub fn stop(&self, handle: SessionHandle) -> Result<()> {
        let live = self.live(handle)?;
        match &live.stop {
            Some(stop) => {
                log::debug!("[{}] Stop requested", live.id);
                stop.request();
                Ok(())
            }
            None => Err(SessionError::WrongSessionKind {
                expected: SessionKind::Text,
                actual: live.kind,
            }),
        }
    }

    /// Snapshot of a text session's ledger.
    pub fn ledger(&self, handle: SessionHandle) -> Result<ConversationLedger> {
        self.with_session(handle, |session| Ok(session.as_text_mut()?.ledger().clone()))
    }

    pub fn kind(&self, handle: SessionHandle) -> Result<SessionKind> {
        Ok(self.live(handle)?.kind)
    }

    pub fn session_id(&self, handle: SessionHandle) -> Result<String> {
        Ok(self.live(handle)?.id.clone())
    }

    pub fn live_sessions(&self) -> usize {
        self.slots
            .iter()
            .filter(|entry| matches!(entry.value(), Slot::Live(_)))
            .count()
    }

    /// Destroys the session behind `handle`. If a call is in flight the
    /// release happens when it returns. Releasing twice fails with
    /// `SessionReleased`.
    pub fn release(&self, handle: SessionHandle, is_image: bool) -> Result<ReleaseOutcome> {
        let live = self.live(handle)?;
        let expected = SessionKind::from_image_flag(is_image);
        if live.kind != expected {
            return Err(SessionError::WrongSessionKind {
                expected,
                actual: live.kind,
            });
        }

        if live.release_requested.swap(true, Ordering::SeqCst) {
            return Err(SessionError::SessionReleased);
        }
        if let Some(stop) = &live.stop {
            stop.request();
        }

        if self.finalize_release(handle, &live) {
            Ok(ReleaseOutcome::Released)
        } else {
            log::info!("[{}] Release deferred until the active call returns", live.id);
            Ok(ReleaseOutcome::Deferred)
        }
    }

    fn live(&self, handle: SessionHandle) -> Result<Arc<LiveSession>> {
        match self.slots.get(&handle).as_deref() {
            None => Err(SessionError::SessionNotReady),
            Some(Slot::Released) => Err(SessionError::SessionReleased),
            Some(Slot::Live(live)) => Ok(Arc::clone(live)),
        }
    }

    fn with_session<T>(
        &self,
        handle: SessionHandle,
        op: impl FnOnce(&mut Session) -> Result<T>,
    ) -> Result<T> {
        let live = self.live(handle)?;
        if live.release_requested.load(Ordering::SeqCst) {
            return Err(SessionError::SessionReleased);
        }

        let result = {
            let mut guard = match try_lock_session(&live) {
                Some(guard) => guard,
                None => return Err(SessionError::SessionBusy),
            };
            match guard.as_mut() {
                Some(session) => op(session),
                None => Err(SessionError::SessionReleased),
            }
        };

        if live.release_requested.load(Ordering::SeqCst) {
            self.finalize_release(handle, &live);
        }
        result
    }

    /// Drops the session and tombstones its handle. Returns false when
    /// another call still holds the session.
    fn finalize_release(&self, handle: SessionHandle, live: &LiveSession) -> bool {
        let Some(mut guard) = try_lock_session(live) else {
            return false;
        };
        if let Some(session) = guard.take() {
            drop(session);
            self.slots.insert(handle, Slot::Released);
            log::info!("[{}] Released {} session {}", live.id, live.kind, handle);
        }
        true
    }
}

fn try_lock_session(live: &LiveSession) -> Option<MutexGuard<'_, Option<Session>>> {
    match live.session.try_lock() {
        Ok(guard) => Some(guard),
        Err(TryLockError::WouldBlock) => None,
        Err(TryLockError::Poisoned(poisoned)) => {
            log::warn!("[{}] Recovering session after a panicked call", live.id);
            Some(poisoned.into_inner())
        }
    }
}
