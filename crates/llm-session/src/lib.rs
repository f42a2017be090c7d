pub mod chat;
pub mod config;
pub mod error;
pub mod events;
pub mod image;
pub mod registry;
pub mod session;
pub mod text;
pub mod tmp_dir;

pub use chat::ChatSession;
pub use config::SessionConfig;
pub use error::{Result, SessionError};
pub use events::{ChannelSink, SessionEvent};
pub use image::ImageSession;
pub use registry::{ReleaseOutcome, SessionHandle, SessionRegistry};
pub use session::{Session, SessionKind, SessionOptions};
pub use text::TextSession;

pub use llm_session_core::{ConversationLedger, NullSink, ProgressSink, Role, StopSignal, Turn};
pub use llm_session_engine::{EngineFactory, ImageEngine, LlmEngine};
pub use llm_session_metrics::{GenerationMetrics, ImageMetrics, MetricsCollector};
