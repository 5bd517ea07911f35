//! Ordered turn history owned by one session.

use model_transport::{Message, Role};

/// Append-only message history plus the replaceable workspace summary.
///
/// A turn is opened with [`ConversationState::begin_turn`] and either kept
/// with [`ConversationState::commit_turn`] or rolled back with
/// [`ConversationState::discard_turn`], which restores the history to the
/// exact value it had before the turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationState {
    messages: Vec<Message>,
    workspace_summary: String,
    turn_start: Option<usize>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn history(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn workspace_summary(&self) -> &str {
        &self.workspace_summary
    }

    pub fn set_workspace_summary(&mut self, summary: impl Into<String>) {
        self.workspace_summary = summary.into();
    }

    pub fn turn_open(&self) -> bool {
        self.turn_start.is_some()
    }

    /// Marks the current end of history as the rollback point.
    pub fn begin_turn(&mut self) {
        self.turn_start = Some(self.messages.len());
    }

    pub fn commit_turn(&mut self) {
        self.turn_start = None;
    }

    /// Drops everything appended since [`ConversationState::begin_turn`].
    pub fn discard_turn(&mut self) {
        if let Some(start) = self.turn_start.take() {
            self.messages.truncate(start);
        }
    }

    /// Messages appended in the open turn, or an empty slice.
    pub fn current_turn(&self) -> &[Message] {
        match self.turn_start {
            Some(start) => &self.messages[start..],
            None => &[],
        }
    }

    pub fn count_role(&self, role: Role) -> usize {
        self.messages
            .iter()
            .filter(|message| message.role == role)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use model_transport::ToolResult;

    use super::*;

    #[test]
    fn discard_restores_history_by_value() {
        let mut state = ConversationState::new();
        state.append(Message::user("hello"));
        state.append(Message::assistant("hi"));
        let before = state.history().to_vec();

        state.begin_turn();
        state.append(Message::user("read it"));
        state.append(Message::assistant_with_tool_calls("", Vec::new()));
        state.append(Message::tool(&ToolResult::success("c1", "read_file", "{}")));
        assert_eq!(state.current_turn().len(), 3);
        state.discard_turn();

        assert_eq!(state.history(), before.as_slice());
        assert!(!state.turn_open());
    }

    #[test]
    fn commit_keeps_turn_messages() {
        let mut state = ConversationState::new();
        state.begin_turn();
        state.append(Message::user("q"));
        state.append(Message::assistant("a"));
        state.commit_turn();
        state.discard_turn();

        assert_eq!(state.len(), 2);
        assert_eq!(state.count_role(Role::User), 1);
        assert!(state.current_turn().is_empty());
    }

    #[test]
    fn summary_is_replaced_not_appended() {
        let mut state = ConversationState::new();
        state.set_workspace_summary("first");
        state.set_workspace_summary("second");
        assert_eq!(state.workspace_summary(), "second");
        assert!(state.is_empty());
    }
}
