pub mod config;
pub mod runner;
pub mod stream;

pub use config::GenerationConfig;
pub use runner::{run_generation, GenerationOutcome, LoopState, StopReason};
pub use stream::{ProgressBridge, TextUnit, Utf8Reassembler};
