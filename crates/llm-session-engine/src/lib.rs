pub mod engine;
pub mod error;
pub mod replay;
pub mod state;

pub use engine::{EngineFactory, ImageEngine, LlmEngine, OutputSink};
pub use error::{EngineError, Result};
pub use replay::{
    ReplayEngine, ReplayEngineFactory, ReplayImageEngine, ReplayScript, REPLAY_SCRIPT_FILE,
};
pub use state::GenerationState;
