pub mod ledger;
pub mod turn;

pub use ledger::{ConversationLedger, DEFAULT_SYSTEM_PROMPT};
pub use turn::{Role, Turn};
