use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use llm_session_core::{ConversationLedger, ProgressSink};
use llm_session_metrics::{GenerationMetrics, ImageMetrics};

use crate::error::{Result, SessionError};
use crate::events::{ChannelSink, SessionEvent};
use crate::registry::{ReleaseOutcome, SessionHandle, SessionRegistry};
use crate::session::{SessionKind, SessionOptions};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Caller-side view of one registered session.
///
/// Clones share the handle and the keep-history setting.
#[derive(Clone)]
pub struct ChatSession {
    id: String,
    registry: Arc<SessionRegistry>,
    handle: SessionHandle,
    kind: SessionKind,
    keep_history: Arc<AtomicBool>,
}

impl ChatSession {
    pub fn open(registry: Arc<SessionRegistry>, options: SessionOptions) -> Result<Self> {
        let kind = options.kind;
        let handle = registry.create(options)?;
        let id = registry.session_id(handle)?;
        Ok(Self {
            id,
            registry,
            handle,
            kind,
            keep_history: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn keep_history(&self) -> bool {
        self.keep_history.load(Ordering::SeqCst)
    }

    pub fn set_keep_history(&self, keep_history: bool) {
        self.keep_history.store(keep_history, Ordering::SeqCst);
    }

    pub fn generate(&self, input: &str, sink: &mut dyn ProgressSink) -> Result<GenerationMetrics> {
        self.registry
            .submit(self.handle, input, self.keep_history(), sink)
    }

    pub fn generate_image(
        &self,
        prompt: &str,
        output_path: &Path,
        sink: &mut dyn ProgressSink,
    ) -> Result<ImageMetrics> {
        self.registry.run_image(self.handle, prompt, output_path, sink)
    }

    /// Runs a submission on the blocking pool and streams its events.
    ///
    /// The receiver yields tokens in order, then `EndOfTurn` if the model
    /// finished its turn, then a terminal `Complete` or `Error`. Must be
    /// called from within a Tokio runtime.
    pub fn submit_streaming(
        &self,
        input: impl Into<String>,
    ) -> (
        mpsc::Receiver<SessionEvent>,
        JoinHandle<Result<GenerationMetrics>>,
    ) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let session = self.clone();
        let input = input.into();

        let task = tokio::task::spawn_blocking(move || {
            let mut sink = ChannelSink::new(tx, session.id.clone());
            let result = session.generate(&input, &mut sink);
            match &result {
                Ok(metrics) => sink.send(SessionEvent::Complete { metrics: *metrics }),
                Err(error) => sink.send(SessionEvent::Error {
                    message: error.to_string(),
                }),
            }
            result
        });
        (rx, task)
    }

    /// Image counterpart of [`submit_streaming`](Self::submit_streaming).
    pub fn generate_image_streaming(
        &self,
        prompt: impl Into<String>,
        output_path: impl Into<PathBuf>,
    ) -> (mpsc::Receiver<SessionEvent>, JoinHandle<Result<ImageMetrics>>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let session = self.clone();
        let prompt = prompt.into();
        let output_path = output_path.into();

        let task = tokio::task::spawn_blocking(move || {
            let mut sink = ChannelSink::new(tx, session.id.clone());
            let result = session.generate_image(&prompt, &output_path, &mut sink);
            match &result {
                Ok(metrics) => sink.send(SessionEvent::ImageComplete { metrics: *metrics }),
                Err(error) => sink.send(SessionEvent::Error {
                    message: error.to_string(),
                }),
            }
            result
        });
        (rx, task)
    }

    pub fn reset(&self) -> Result<()> {
        self.registry.reset(self.handle)
    }

    pub fn set_history<S: AsRef<str>>(&self, history: &[S], reasoning_session: bool) -> Result<()> {
        self.registry
            .set_history(self.handle, history, reasoning_session)
    }

    pub fn ledger(&self) -> Result<ConversationLedger> {
        self.registry.ledger(self.handle)
    }

    pub fn stop(&self) -> Result<()> {
        self.registry.stop(self.handle)
    }

    /// Releases the session. Safe to call more than once from different
    /// clones; later calls report `SessionReleased`.
    pub fn release(&self) -> Result<ReleaseOutcome> {
        let outcome = self
            .registry
            .release(self.handle, self.kind == SessionKind::Image);
        if let Err(SessionError::SessionReleased) = &outcome {
            log::debug!("[{}] Session already released", self.id);
        }
        outcome
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .field("kind", &self.kind)
            .field("keep_history", &self.keep_history())
            .finish()
    }
}
