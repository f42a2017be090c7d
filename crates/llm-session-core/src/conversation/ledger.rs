use serde::{Deserialize, Serialize};

use super::turn::{Role, Turn};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant in a mobile app designed for visually impaired users. Responses will be read aloud using text-to-speech, so keep them short, clear, and easy to understand. Avoid unnecessary details or long sentences. Be direct and helpful, using everyday language.";

/// Ordered turn history handed to the engine as prompt context.
///
/// The first turn is always the system turn. Everything after it is
/// appended in submission order; the ledger does not enforce strict
/// user/assistant alternation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "RawLedger")]
pub struct ConversationLedger {
    turns: Vec<Turn>,
}

#[derive(Deserialize)]
struct RawLedger {
    turns: Vec<Turn>,
}

impl TryFrom<RawLedger> for ConversationLedger {
    type Error = String;

    fn try_from(raw: RawLedger) -> Result<Self, Self::Error> {
        match raw.turns.first() {
            Some(turn) if turn.role == Role::System => Ok(Self { turns: raw.turns }),
            Some(turn) => Err(format!(
                "conversation ledger must start with a system turn, found {}",
                turn.role.as_str()
            )),
            None => Err("conversation ledger must start with a system turn".to_string()),
        }
    }
}

impl ConversationLedger {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::system(system_prompt)],
        }
    }

    /// Builds a ledger from the system prompt followed by prior history,
    /// assigning roles with [`Role::for_history_index`].
    pub fn with_history<S: AsRef<str>>(system_prompt: impl Into<String>, history: &[S]) -> Self {
        let mut ledger = Self::new(system_prompt);
        ledger.rebuild(history);
        ledger
    }

    /// Replaces everything after the system turn with `history`.
    pub fn rebuild<S: AsRef<str>>(&mut self, history: &[S]) {
        self.truncate_to_system();
        self.turns.extend(
            history
                .iter()
                .enumerate()
                .map(|(index, content)| Turn::new(Role::for_history_index(index), content.as_ref())),
        );
        log::debug!(
            "Rebuilt conversation ledger from {} history entries, {} turns total",
            history.len(),
            self.turns.len()
        );
    }

    pub fn truncate_to_system(&mut self) {
        self.turns.truncate(1);
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::assistant(content));
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn system_prompt(&self) -> &str {
        &self.turns[0].content
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// True when the ledger holds nothing but the system turn.
    pub fn is_empty(&self) -> bool {
        self.turns.len() <= 1
    }

    /// Total content bytes across all turns.
    pub fn byte_len(&self) -> usize {
        self.turns.iter().map(|turn| turn.content.len()).sum()
    }

    pub fn log_entries(&self, session_id: &str) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }
        log::debug!(
            "[{}] Current conversation history ({} entries):",
            session_id,
            self.turns.len()
        );
        for (index, turn) in self.turns.iter().enumerate() {
            log::debug!(
                "[{}] Entry {}: [{}] '{}'",
                session_id,
                index,
                turn.role.as_str(),
                turn.content
            );
        }
    }
}

impl Default for ConversationLedger {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ledger_holds_only_system_turn() {
        let ledger = ConversationLedger::new("be brief");
        assert_eq!(ledger.len(), 1);
        assert!(ledger.is_empty());
        assert_eq!(ledger.turns()[0], Turn::system("be brief"));
        assert_eq!(ledger.system_prompt(), "be brief");
    }

    #[test]
    fn with_history_alternates_roles_after_system() {
        let ledger = ConversationLedger::with_history("sys", &["q1", "a1", "q2"]);
        assert_eq!(
            ledger.turns(),
            &[
                Turn::system("sys"),
                Turn::user("q1"),
                Turn::assistant("a1"),
                Turn::user("q2"),
            ]
        );
    }

    #[test]
    fn truncate_keeps_system_turn() {
        let mut ledger = ConversationLedger::with_history("sys", &["q1", "a1"]);
        ledger.push_user("q2");
        ledger.truncate_to_system();
        assert_eq!(ledger.turns(), &[Turn::system("sys")]);
    }

    #[test]
    fn rebuild_replaces_previous_history() {
        let mut ledger = ConversationLedger::with_history("sys", &["old question", "old answer"]);
        ledger.rebuild(&["new question"]);
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.last(), Some(&Turn::user("new question")));
        assert_eq!(ledger.system_prompt(), "sys");
    }

    #[test]
    fn byte_len_counts_all_content() {
        let mut ledger = ConversationLedger::new("ab");
        ledger.push_user("cde");
        ledger.push_assistant("é");
        assert_eq!(ledger.byte_len(), 2 + 3 + 2);
    }

    #[test]
    fn deserializing_requires_leading_system_turn() {
        let ledger: ConversationLedger = serde_json::from_str(
            r#"{"turns":[{"role":"system","content":"sys"},{"role":"user","content":"hi"}]}"#,
        )
        .unwrap();
        assert_eq!(ledger.system_prompt(), "sys");
        assert_eq!(ledger.len(), 2);

        assert!(serde_json::from_str::<ConversationLedger>(r#"{"turns":[]}"#).is_err());
        assert!(serde_json::from_str::<ConversationLedger>(
            r#"{"turns":[{"role":"user","content":"hi"}]}"#
        )
        .is_err());
    }

    #[test]
    fn serialized_ledger_reads_back() {
        let mut ledger = ConversationLedger::new("sys");
        ledger.push_user("q");
        let json = serde_json::to_string(&ledger).unwrap();
        assert_eq!(serde_json::from_str::<ConversationLedger>(&json).unwrap(), ledger);
    }

    #[test]
    fn default_uses_built_in_prompt() {
        assert_eq!(
            ConversationLedger::default().system_prompt(),
            DEFAULT_SYSTEM_PROMPT
        );
    }
}
