use chrono::Utc;
use uuid::Uuid;

use llm_session_core::{ConversationLedger, ProgressSink, StopSignal};
use llm_session_engine::{EngineFactory, LlmEngine};
use llm_session_loop::{run_generation, GenerationOutcome};
use llm_session_metrics::{GenerationMetrics, MetricsCollector, SubmissionStatus};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::session::SessionOptions;
use crate::tmp_dir::configure_tmp_path;

/// A loaded text engine together with the conversation it is serving.
pub struct TextSession {
    id: String,
    engine: Box<dyn LlmEngine>,
    ledger: ConversationLedger,
    stop: StopSignal,
    config: SessionConfig,
    metrics: Option<MetricsCollector>,
    last_outcome: Option<GenerationOutcome>,
}

impl std::fmt::Debug for TextSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextSession")
            .field("id", &self.id)
            .field("turns", &self.ledger.len())
            .finish_non_exhaustive()
    }
}

impl TextSession {
    /// Builds and loads a text session. The model path must already have
    /// been validated. A failed load drops the engine before returning.
    pub fn create(
        factory: &dyn EngineFactory,
        options: SessionOptions,
        config: &SessionConfig,
        metrics: Option<MetricsCollector>,
    ) -> Result<Self> {
        let id = Uuid::new_v4().to_string();
        log::info!(
            "[{}] Creating text session for {}",
            id,
            options.model_dir.display()
        );

        let mut engine = factory
            .create_text_engine(&options.model_dir)
            .ok_or_else(|| SessionError::EngineConstructionFailed(options.model_dir.clone()))?;

        if options.use_tmp_path.unwrap_or(config.use_tmp_path) {
            configure_tmp_path(&id, engine.as_mut(), &options.model_dir, config);
        }

        let ledger = ConversationLedger::with_history(config.system_prompt.clone(), &options.history);
        log::debug!(
            "[{}] Ledger seeded with {} history entries",
            id,
            options.history.len()
        );

        if let Err(error) = engine.load() {
            log::error!("[{}] Model load failed: {}", id, error);
            return Err(SessionError::ModelLoadFailed(error));
        }
        log::info!("[{}] Model loaded", id);

        Ok(Self {
            id,
            engine,
            ledger,
            stop: StopSignal::new(),
            config: config.clone(),
            metrics,
            last_outcome: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn ledger(&self) -> &ConversationLedger {
        &self.ledger
    }

    /// Shared handle to the stop flag consulted between decode steps.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn last_outcome(&self) -> Option<&GenerationOutcome> {
        self.last_outcome.as_ref()
    }

    /// Appends `input` as a user turn and generates a reply, streaming text
    /// units to `sink`. With `keep_history` false the ledger is first cut
    /// back to the system prompt.
    pub fn submit(
        &mut self,
        input: &str,
        keep_history: bool,
        sink: &mut dyn ProgressSink,
    ) -> Result<GenerationMetrics> {
        self.stop.reset();
        if !keep_history {
            self.ledger.truncate_to_system();
        }
        self.ledger.push_user(input);

        let started_at = Utc::now();
        let result = run_generation(
            &self.id,
            self.engine.as_mut(),
            &mut self.ledger,
            sink,
            &self.stop,
            &self.config.generation,
        );

        match result {
            Ok(outcome) => {
                let metrics = GenerationMetrics::from(outcome.state);
                metrics.log(&self.id);
                if let Some(collector) = &self.metrics {
                    collector.submission_completed(
                        self.id.clone(),
                        started_at,
                        SubmissionStatus::from(outcome.stop_reason),
                        metrics,
                    );
                }
                self.last_outcome = Some(outcome);
                Ok(metrics)
            }
            Err(error) => {
                log::error!("[{}] Generation failed: {}", self.id, error);
                if let Some(collector) = &self.metrics {
                    collector.submission_failed(self.id.clone(), started_at, error.to_string());
                }
                self.last_outcome = None;
                Err(SessionError::EngineRuntime(error))
            }
        }
    }

    /// Cuts the ledger back to the system prompt and resets the engine.
    pub fn reset(&mut self) -> Result<()> {
        log::debug!("[{}] Resetting session", self.id);
        self.ledger.truncate_to_system();
        self.last_outcome = None;
        self.engine.reset()?;
        Ok(())
    }

    /// Resets the engine, then replaces the ledger with `history`. The ledger
    /// is left untouched if the engine reset fails. `reasoning_session` is
    /// recorded in the log only.
    pub fn set_history<S: AsRef<str>>(
        &mut self,
        history: &[S],
        reasoning_session: bool,
    ) -> Result<()> {
        log::debug!(
            "[{}] Replacing history with {} entries (reasoning session: {})",
            self.id,
            history.len(),
            reasoning_session
        );
        if let Err(error) = self.engine.reset() {
            log::error!("[{}] Engine reset failed: {}", self.id, error);
            return Err(SessionError::EngineRuntime(error));
        }
        self.ledger.rebuild(history);
        self.last_outcome = None;
        Ok(())
    }
}

impl Drop for TextSession {
    fn drop(&mut self) {
        log::debug!("[{}] Releasing text engine", self.id);
    }
}

#[cfg(test)]
mod tests {
    use llm_session_core::{NullSink, Role};
    use llm_session_engine::{ReplayEngineFactory, ReplayScript};

    use super::*;

    fn open(factory: &ReplayEngineFactory, history: &[&str]) -> (tempfile::TempDir, TextSession) {
        let dir = tempfile::tempdir().unwrap();
        let options = SessionOptions::text(dir.path())
            .with_tmp_path(false)
            .with_history(history.iter().copied());
        let session = TextSession::create(factory, options, &SessionConfig::default(), None).unwrap();
        (dir, session)
    }

    #[test]
    fn history_roles_alternate_from_user() {
        let factory = ReplayEngineFactory::with_script(ReplayScript::from_text_chunks(["ok"]));
        let (_dir, session) = open(&factory, &["q1", "a1", "q2"]);

        let roles: Vec<Role> = session.ledger().turns().iter().map(|turn| turn.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
    }

    #[test]
    fn submit_without_history_leaves_three_turns() {
        let factory = ReplayEngineFactory::with_script(ReplayScript::from_text_chunks(["fine"]));
        let (_dir, mut session) = open(&factory, &["q1", "a1", "q2", "a2"]);

        let metrics = session.submit("how are you", false, &mut NullSink).unwrap();
        assert_eq!(metrics.decode_len, 2);
        assert_eq!(session.ledger().len(), 3);
        assert_eq!(session.ledger().turns()[1].content, "how are you");
        assert_eq!(session.ledger().turns()[2].content, "fine");
    }

    #[test]
    fn reset_truncates_and_resets_engine() {
        let factory = ReplayEngineFactory::with_script(ReplayScript::from_text_chunks(["ok"]));
        let (_dir, mut session) = open(&factory, &["q1", "a1"]);
        session.reset().unwrap();

        assert_eq!(session.ledger().len(), 1);
        assert_eq!(factory.probe().lock().unwrap().resets, 1);
    }

    #[test]
    fn stop_flag_is_cleared_by_submit() {
        let factory = ReplayEngineFactory::with_script(ReplayScript::from_text_chunks(["ok"]));
        let (_dir, mut session) = open(&factory, &[]);
        session.stop_signal().request();

        session.submit("hi", true, &mut NullSink).unwrap();
        assert_eq!(session.ledger().len(), 3);
    }
}
