use serde::{Deserialize, Serialize};

use llm_session_core::{ConversationLedger, ProgressSink, StopSignal};
use llm_session_engine::{EngineError, GenerationState, LlmEngine};

use crate::config::GenerationConfig;
use crate::stream::ProgressBridge;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The engine wrote the end-of-turn marker.
    EndMarker,
    /// The progress sink or another holder of the stop signal asked to stop.
    Cancelled,
    /// The token ceiling was reached.
    TokenLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopped(StopReason),
}

impl LoopState {
    fn next(
        stop_requested: bool,
        marker_seen: bool,
        generated: i64,
        steps: usize,
        max_new_tokens: i64,
    ) -> Self {
        if stop_requested {
            if marker_seen {
                Self::Stopped(StopReason::EndMarker)
            } else {
                Self::Stopped(StopReason::Cancelled)
            }
        } else if generated >= max_new_tokens || steps as i64 >= max_new_tokens {
            Self::Stopped(StopReason::TokenLimit)
        } else {
            Self::Running
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOutcome {
    pub state: GenerationState,
    /// Decode steps issued after prefill.
    pub steps: usize,
    pub stop_reason: StopReason,
    /// Response appended to the ledger, if the end marker was seen.
    pub response: Option<String>,
    /// Text forwarded to the progress sink.
    pub streamed: String,
}

/// Prefills the ledger and decodes one token at a time until the stop
/// signal is raised or the token ceiling is reached.
///
/// A response finalized by the end marker is appended to `ledger` as an
/// assistant turn before this returns. Engine errors abort the pass.
pub fn run_generation(
    session_id: &str,
    engine: &mut dyn LlmEngine,
    ledger: &mut ConversationLedger,
    sink: &mut dyn ProgressSink,
    stop: &StopSignal,
    config: &GenerationConfig,
) -> Result<GenerationOutcome> {
    ledger.log_entries(session_id);

    let mut bridge = ProgressBridge::new(sink, &config.end_marker, stop.clone());
    let mut response = None;

    log::debug!("[{}] Starting model response generation", session_id);
    engine.response(
        ledger.turns(),
        &mut bridge,
        &config.end_marker,
        config.format_version,
    )?;
    append_completed(session_id, &mut bridge, ledger, &mut response);

    let mut steps = 0usize;
    let stop_reason = loop {
        let state = LoopState::next(
            stop.is_requested(),
            bridge.marker_seen(),
            engine.state().gen_seq_len,
            steps,
            config.max_new_tokens,
        );
        if let LoopState::Stopped(reason) = state {
            break reason;
        }

        engine.generate(1, &mut bridge)?;
        steps += 1;
        append_completed(session_id, &mut bridge, ledger, &mut response);

        if config.log_interval > 0 && steps % config.log_interval == 0 {
            log::debug!(
                "[{}] Generated {} tokens so far",
                session_id,
                engine.state().gen_seq_len
            );
        }
    };

    if bridge.pending_bytes() > 0 {
        log::debug!(
            "[{}] {} trailing bytes never completed a character",
            session_id,
            bridge.pending_bytes()
        );
    }
    log::debug!(
        "[{}] Generation complete after {} steps ({:?})",
        session_id,
        steps,
        stop_reason
    );

    Ok(GenerationOutcome {
        state: engine.state(),
        steps,
        stop_reason,
        response,
        streamed: bridge.partial_response().to_string(),
    })
}

fn append_completed(
    session_id: &str,
    bridge: &mut ProgressBridge<'_>,
    ledger: &mut ConversationLedger,
    response: &mut Option<String>,
) {
    if let Some(text) = bridge.take_completed() {
        log::debug!(
            "[{}] Appending assistant turn ({} bytes)",
            session_id,
            text.len()
        );
        ledger.push_assistant(text.clone());
        *response = Some(text);
    }
}

#[cfg(test)]
mod tests {
    use llm_session_core::{NullSink, Role, Turn};
    use llm_session_engine::{OutputSink, ReplayEngine, ReplayScript};

    use super::*;

    fn ledger_with_question() -> ConversationLedger {
        let mut ledger = ConversationLedger::new("sys");
        ledger.push_user("hi");
        ledger
    }

    #[test]
    fn marker_stops_loop_and_appends_assistant_turn() {
        let mut engine = ReplayEngine::new(ReplayScript::from_text_chunks(["Hello", " world"]));
        let mut ledger = ledger_with_question();
        let mut units: Vec<Option<String>> = Vec::new();
        let mut sink = |unit: Option<&str>| {
            units.push(unit.map(str::to_string));
            false
        };

        let outcome = run_generation(
            "s1",
            &mut engine,
            &mut ledger,
            &mut sink,
            &StopSignal::new(),
            &GenerationConfig::default(),
        )
        .unwrap();

        assert_eq!(outcome.stop_reason, StopReason::EndMarker);
        assert_eq!(outcome.response.as_deref(), Some("Hello world"));
        assert_eq!(outcome.steps, 2);
        assert_eq!(
            units,
            vec![Some("Hello".to_string()), Some(" world".to_string()), None]
        );
        assert_eq!(ledger.last(), Some(&Turn::assistant("Hello world")));
        assert_eq!(ledger.len(), 3);
    }

    #[test]
    fn always_continuing_sink_is_bounded_by_token_ceiling() {
        let mut engine = ReplayEngine::new(ReplayScript::from_text_chunks(["x"]).repeating());
        let mut ledger = ledger_with_question();

        let outcome = run_generation(
            "s2",
            &mut engine,
            &mut ledger,
            &mut NullSink,
            &StopSignal::new(),
            &GenerationConfig::default(),
        )
        .unwrap();

        assert_eq!(outcome.stop_reason, StopReason::TokenLimit);
        assert_eq!(outcome.state.gen_seq_len, 512);
        assert!(outcome.steps <= 512);
        assert_eq!(outcome.response, None);
        assert_eq!(ledger.len(), 2);
    }

    struct SilentEngine {
        steps: usize,
    }

    impl LlmEngine for SilentEngine {
        fn load(&mut self) -> Result<()> {
            Ok(())
        }

        fn set_config(&mut self, _config: &str) -> Result<()> {
            Ok(())
        }

        fn response(
            &mut self,
            _turns: &[Turn],
            _sink: &mut dyn OutputSink,
            _end_marker: &str,
            _format_version: u32,
        ) -> Result<()> {
            Ok(())
        }

        fn generate(&mut self, steps: usize, _sink: &mut dyn OutputSink) -> Result<()> {
            self.steps += steps;
            Ok(())
        }

        fn state(&self) -> GenerationState {
            GenerationState::default()
        }

        fn reset(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn step_ceiling_holds_when_engine_counter_never_advances() {
        let mut engine = SilentEngine { steps: 0 };
        let mut ledger = ledger_with_question();
        let config = GenerationConfig {
            max_new_tokens: 16,
            ..Default::default()
        };

        let outcome = run_generation(
            "s3",
            &mut engine,
            &mut ledger,
            &mut NullSink,
            &StopSignal::new(),
            &config,
        )
        .unwrap();

        assert_eq!(outcome.stop_reason, StopReason::TokenLimit);
        assert_eq!(outcome.steps, 16);
        assert_eq!(engine.steps, 16);
    }

    #[test]
    fn sink_stop_on_first_unit_cancels_without_assistant_turn() {
        let mut engine = ReplayEngine::new(ReplayScript::from_text_chunks(["a", "b", "c"]));
        let mut ledger = ledger_with_question();
        let mut sink = |_: Option<&str>| true;

        let outcome = run_generation(
            "s4",
            &mut engine,
            &mut ledger,
            &mut sink,
            &StopSignal::new(),
            &GenerationConfig::default(),
        )
        .unwrap();

        assert_eq!(outcome.stop_reason, StopReason::Cancelled);
        assert_eq!(outcome.steps, 0);
        assert_eq!(outcome.streamed, "a");
        assert!(ledger.turns().iter().all(|turn| turn.role != Role::Assistant));
    }

    #[test]
    fn engine_failure_propagates() {
        let mut engine = ReplayEngine::new(
            ReplayScript::from_text_chunks(["a", "b", "c"]).failing_at_token(2),
        );
        let mut ledger = ledger_with_question();

        let result = run_generation(
            "s5",
            &mut engine,
            &mut ledger,
            &mut NullSink,
            &StopSignal::new(),
            &GenerationConfig::default(),
        );

        assert!(matches!(result, Err(EngineError::Runtime(_))));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn stop_reason_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&StopReason::TokenLimit).unwrap(),
            r#""token_limit""#
        );
    }
}
