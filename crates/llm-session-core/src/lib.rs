pub mod conversation;
pub mod progress;
pub mod stop;

pub use conversation::{ConversationLedger, Role, Turn, DEFAULT_SYSTEM_PROMPT};
pub use progress::{NullSink, ProgressSink};
pub use stop::StopSignal;
