use std::path::Path;

use llm_session_core::Turn;

use crate::error::Result;
use crate::state::GenerationState;

/// Destination for raw bytes produced by the engine.
///
/// Bytes arrive in production order and may split multi-byte characters
/// across calls.
pub trait OutputSink {
    fn write(&mut self, bytes: &[u8]);
}

impl OutputSink for Vec<u8> {
    fn write(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

/// A loaded text generation engine.
///
/// All calls block until the engine returns. The sink is passed to every
/// producing call instead of being retained by the engine.
pub trait LlmEngine: Send {
    /// Loads weights. Called once after construction.
    fn load(&mut self) -> Result<()>;

    /// Applies an engine-specific JSON configuration string.
    fn set_config(&mut self, config: &str) -> Result<()>;

    /// Prefills the prompt built from `turns` and writes the first output.
    /// `end_marker` is written to the sink when the model finishes its turn.
    fn response(
        &mut self,
        turns: &[Turn],
        sink: &mut dyn OutputSink,
        end_marker: &str,
        format_version: u32,
    ) -> Result<()>;

    /// Advances decoding by `steps` tokens.
    fn generate(&mut self, steps: usize, sink: &mut dyn OutputSink) -> Result<()>;

    fn state(&self) -> GenerationState;

    /// Clears the engine's own conversational state (KV cache, counters).
    fn reset(&mut self) -> Result<()>;
}

/// A loaded image generation engine.
pub trait ImageEngine: Send {
    fn run(
        &mut self,
        prompt: &str,
        output_path: &Path,
        on_progress: &mut dyn FnMut(u32),
    ) -> Result<()>;
}

/// Constructs engines for a model directory.
pub trait EngineFactory: Send + Sync {
    /// Returns `None` when the engine cannot be constructed for `model_dir`.
    fn create_text_engine(&self, model_dir: &Path) -> Option<Box<dyn LlmEngine>>;

    fn create_image_engine(&self, model_dir: &Path) -> Result<Box<dyn ImageEngine>>;
}
