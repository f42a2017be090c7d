//! Deterministic engines that play back a scripted output stream.
//!
//! Used by tests and by the command-line harness. A model directory is
//! served by the replay factory when it contains a `replay.json` script.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use llm_session_core::Turn;

use crate::engine::{EngineFactory, ImageEngine, LlmEngine, OutputSink};
use crate::error::{EngineError, Result};
use crate::state::GenerationState;

pub const REPLAY_SCRIPT_FILE: &str = "replay.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ReplayChunk {
    Text(String),
    Bytes(Vec<u8>),
}

impl ReplayChunk {
    fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Bytes(bytes) => bytes,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplayScript {
    /// Output written one chunk per decode step, the first during prefill.
    pub chunks: Vec<ReplayChunk>,
    /// Keep writing the last chunk instead of finishing with the end marker.
    #[serde(default)]
    pub repeat: bool,
    #[serde(default)]
    pub fail_load: Option<String>,
    #[serde(default)]
    pub fail_reset: Option<String>,
    /// Fail the decode step that would produce token number `n` (0-based).
    #[serde(default)]
    pub fail_at_token: Option<i64>,
    #[serde(default = "default_image_steps")]
    pub image_steps: u32,
}

fn default_image_steps() -> u32 {
    10
}

impl ReplayScript {
    pub fn from_text_chunks<S: Into<String>>(chunks: impl IntoIterator<Item = S>) -> Self {
        Self {
            chunks: chunks
                .into_iter()
                .map(|chunk| ReplayChunk::Text(chunk.into()))
                .collect(),
            image_steps: default_image_steps(),
            ..Default::default()
        }
    }

    pub fn from_byte_chunks(chunks: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into_iter().map(ReplayChunk::Bytes).collect(),
            image_steps: default_image_steps(),
            ..Default::default()
        }
    }

    pub fn repeating(mut self) -> Self {
        self.repeat = true;
        self
    }

    pub fn failing_load(mut self, message: impl Into<String>) -> Self {
        self.fail_load = Some(message.into());
        self
    }

    pub fn failing_reset(mut self, message: impl Into<String>) -> Self {
        self.fail_reset = Some(message.into());
        self
    }

    pub fn failing_at_token(mut self, token: i64) -> Self {
        self.fail_at_token = Some(token);
        self
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Calls observed by replay engines, shared with whoever holds the probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayLog {
    pub loads: usize,
    pub resets: usize,
    pub responses: usize,
    pub generate_calls: usize,
    pub configs: Vec<String>,
    pub last_prompt: Vec<Turn>,
    pub image_runs: usize,
}

pub type ReplayProbe = Arc<Mutex<ReplayLog>>;

fn record(probe: &ReplayProbe, update: impl FnOnce(&mut ReplayLog)) {
    if let Ok(mut log) = probe.lock() {
        update(&mut log);
    }
}

pub struct ReplayEngine {
    script: ReplayScript,
    probe: ReplayProbe,
    state: GenerationState,
    cursor: usize,
    end_marker: String,
    finished: bool,
}

impl ReplayEngine {
    pub fn new(script: ReplayScript) -> Self {
        Self::with_probe(script, ReplayProbe::default())
    }

    pub fn with_probe(script: ReplayScript, probe: ReplayProbe) -> Self {
        Self {
            script,
            probe,
            state: GenerationState::default(),
            cursor: 0,
            end_marker: String::new(),
            finished: false,
        }
    }

    pub fn probe(&self) -> ReplayProbe {
        Arc::clone(&self.probe)
    }

    fn step(&mut self, sink: &mut dyn OutputSink) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        if self.script.fail_at_token == Some(self.state.gen_seq_len) {
            return Err(EngineError::Runtime(format!(
                "replay failure at token {}",
                self.state.gen_seq_len
            )));
        }

        if let Some(chunk) = self.script.chunks.get(self.cursor) {
            sink.write(chunk.as_bytes());
            self.cursor += 1;
        } else if self.script.repeat && !self.script.chunks.is_empty() {
            let last = self.script.chunks.len() - 1;
            sink.write(self.script.chunks[last].as_bytes());
        } else {
            sink.write(self.end_marker.as_bytes());
            self.finished = true;
        }
        self.state.gen_seq_len += 1;
        Ok(())
    }
}

impl LlmEngine for ReplayEngine {
    fn load(&mut self) -> Result<()> {
        record(&self.probe, |log| log.loads += 1);
        match &self.script.fail_load {
            Some(message) => Err(EngineError::Load(message.clone())),
            None => Ok(()),
        }
    }

    fn set_config(&mut self, config: &str) -> Result<()> {
        serde_json::from_str::<serde_json::Value>(config)
            .map_err(|error| EngineError::Config(error.to_string()))?;
        record(&self.probe, |log| log.configs.push(config.to_string()));
        Ok(())
    }

    fn response(
        &mut self,
        turns: &[Turn],
        sink: &mut dyn OutputSink,
        end_marker: &str,
        _format_version: u32,
    ) -> Result<()> {
        let started = Instant::now();
        record(&self.probe, |log| {
            log.responses += 1;
            log.last_prompt = turns.to_vec();
        });

        self.end_marker = end_marker.to_string();
        self.cursor = 0;
        self.finished = false;
        self.state.gen_seq_len = 0;
        self.state.decode_us = 0;
        self.state.prompt_len = turns
            .iter()
            .map(|turn| turn.content.split_whitespace().count() as i64)
            .sum();

        self.step(sink)?;
        self.state.prefill_us = started.elapsed().as_micros() as i64;
        Ok(())
    }

    fn generate(&mut self, steps: usize, sink: &mut dyn OutputSink) -> Result<()> {
        let started = Instant::now();
        record(&self.probe, |log| log.generate_calls += 1);
        for _ in 0..steps {
            self.step(sink)?;
        }
        self.state.decode_us += started.elapsed().as_micros() as i64;
        Ok(())
    }

    fn state(&self) -> GenerationState {
        self.state
    }

    fn reset(&mut self) -> Result<()> {
        if let Some(message) = &self.script.fail_reset {
            return Err(EngineError::Runtime(message.clone()));
        }
        record(&self.probe, |log| log.resets += 1);
        self.state = GenerationState::default();
        self.cursor = 0;
        self.finished = false;
        Ok(())
    }
}

pub struct ReplayImageEngine {
    steps: u32,
    probe: ReplayProbe,
}

impl ReplayImageEngine {
    pub fn new(steps: u32, probe: ReplayProbe) -> Self {
        Self {
            steps: steps.max(1),
            probe,
        }
    }
}

impl ImageEngine for ReplayImageEngine {
    fn run(
        &mut self,
        prompt: &str,
        output_path: &Path,
        on_progress: &mut dyn FnMut(u32),
    ) -> Result<()> {
        record(&self.probe, |log| log.image_runs += 1);
        for step in 1..=self.steps {
            on_progress(step * 100 / self.steps);
        }
        std::fs::write(output_path, prompt.as_bytes())?;
        Ok(())
    }
}

/// Serves replay engines. A fixed script, when set, takes precedence over
/// `replay.json` lookups.
#[derive(Default)]
pub struct ReplayEngineFactory {
    script: Option<ReplayScript>,
    probe: ReplayProbe,
    constructions: AtomicUsize,
}

impl ReplayEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(script: ReplayScript) -> Self {
        Self {
            script: Some(script),
            ..Self::default()
        }
    }

    pub fn probe(&self) -> ReplayProbe {
        Arc::clone(&self.probe)
    }

    /// Number of engine construction attempts, text and image.
    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }

    fn resolve_script(&self, model_dir: &Path) -> Result<ReplayScript> {
        if let Some(script) = &self.script {
            return Ok(script.clone());
        }
        let path = if model_dir.is_dir() {
            model_dir.join(REPLAY_SCRIPT_FILE)
        } else {
            model_dir.to_path_buf()
        };
        ReplayScript::load(&path)
    }
}

impl EngineFactory for ReplayEngineFactory {
    fn create_text_engine(&self, model_dir: &Path) -> Option<Box<dyn LlmEngine>> {
        self.constructions.fetch_add(1, Ordering::SeqCst);
        match self.resolve_script(model_dir) {
            Ok(script) => Some(Box::new(ReplayEngine::with_probe(script, self.probe()))),
            Err(error) => {
                log::warn!(
                    "No replay script for {}: {}",
                    model_dir.display(),
                    error
                );
                None
            }
        }
    }

    fn create_image_engine(&self, model_dir: &Path) -> Result<Box<dyn ImageEngine>> {
        self.constructions.fetch_add(1, Ordering::SeqCst);
        let steps = self
            .resolve_script(model_dir)
            .map(|script| script.image_steps)
            .unwrap_or_else(|_| default_image_steps());
        Ok(Box::new(ReplayImageEngine::new(steps, self.probe())))
    }
}
