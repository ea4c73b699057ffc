//! Ordered conversation log with controlled mutation

use std::sync::{Mutex, MutexGuard, PoisonError};

use super::message::{AssistantMessage, Message, ToolResult};
use crate::{Error, Result};

/// Selects which entries `ConversationStore::history` returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryFilter {
    /// Keep the in-progress status entry
    pub include_ephemeral: bool,
    /// Keep tool results and the assistant messages that requested them
    pub include_tool: bool,
}

impl HistoryFilter {
    /// Everything, as displayed
    pub const ALL: Self = Self {
        include_ephemeral: true,
        include_tool: true,
    };

    /// First completion call of a turn: plain dialogue only
    pub const DIALOGUE: Self = Self {
        include_ephemeral: false,
        include_tool: false,
    };

    /// Follow-up call after a tool ran: dialogue plus tool exchanges
    pub const WITH_TOOLS: Self = Self {
        include_ephemeral: false,
        include_tool: true,
    };

    fn keeps(self, message: &Message) -> bool {
        match message {
            Message::Ephemeral { .. } => self.include_ephemeral,
            Message::Tool(_) | Message::Assistant(AssistantMessage::WithToolCalls { .. }) => {
                self.include_tool
            }
            _ => true,
        }
    }
}

/// Conversation log
///
/// Append-only apart from the single ephemeral slot, which is updated in
/// place and removed once the recording it describes resolves.
#[derive(Debug, Default)]
pub struct ConversationStore {
    messages: Mutex<Vec<Message>>,
}

impl ConversationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Message>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a permanent message and return its index
    ///
    /// # Errors
    ///
    /// Returns `Error::Conversation` if the message is ephemeral, if a user
    /// message arrives before the greeting, or if a tool result does not
    /// answer a call of the preceding assistant message
    pub fn append(&self, message: Message) -> Result<usize> {
        let mut messages = self.lock();
        check_append(&messages, &message)?;
        messages.push(message);
        Ok(messages.len() - 1)
    }

    /// Append an assistant tool request together with its results
    ///
    /// Both land under one lock, so nothing appended concurrently can come
    /// between a call and its result. Returns the index of the last result.
    ///
    /// # Errors
    ///
    /// Returns `Error::Conversation` if `request` carries no tool calls or
    /// a result answers none of them; nothing is appended in that case
    pub fn append_tool_exchange(&self, request: Message, results: Vec<ToolResult>) -> Result<usize> {
        if request.tool_calls().is_empty() {
            return Err(Error::Conversation(
                "tool exchange needs an assistant message with tool calls".to_string(),
            ));
        }
        if let Some(orphan) = results
            .iter()
            .find(|r| !request.tool_calls().iter().any(|c| c.id == r.tool_call_id))
        {
            return Err(Error::Conversation(format!(
                "tool result {} does not answer the preceding assistant message",
                orphan.tool_call_id
            )));
        }

        let mut messages = self.lock();
        check_append(&messages, &request)?;
        messages.push(request);
        messages.extend(results.into_iter().map(Message::tool));
        Ok(messages.len() - 1)
    }

    /// Set or regenerate the greeting
    ///
    /// Only succeeds while the greeting is (or would be) the sole permanent
    /// message. Returns whether the greeting was written.
    pub fn set_greeting(&self, content: &str) -> bool {
        let mut messages = self.lock();
        let permanent: Vec<usize> = messages
            .iter()
            .enumerate()
            .filter(|(_, m)| !m.is_ephemeral())
            .map(|(i, _)| i)
            .collect();

        match permanent.as_slice() {
            [] => {
                messages.insert(0, Message::assistant(content));
                true
            }
            [only] if matches!(messages[*only], Message::Assistant(AssistantMessage::Plain { .. })) => {
                messages[*only] = Message::assistant(content);
                true
            }
            _ => false,
        }
    }

    /// Write the ephemeral status entry, in place when it already exists
    pub fn replace_ephemeral(&self, content: impl Into<String>) {
        let content = content.into();
        let mut messages = self.lock();

        if let Some(slot) = messages.iter_mut().find(|m| m.is_ephemeral()) {
            *slot = Message::Ephemeral { content };
        } else {
            messages.push(Message::Ephemeral { content });
        }
    }

    /// Remove the ephemeral entry, returning whether one existed
    pub fn remove_ephemeral(&self) -> bool {
        let mut messages = self.lock();
        let before = messages.len();
        messages.retain(|m| !m.is_ephemeral());
        messages.len() != before
    }

    /// Current ephemeral text, if any
    #[must_use]
    pub fn ephemeral(&self) -> Option<String> {
        self.lock().iter().find_map(|m| match m {
            Message::Ephemeral { content } => Some(content.clone()),
            _ => None,
        })
    }

    /// Messages passing `filter`, in chronological order
    #[must_use]
    pub fn history(&self, filter: HistoryFilter) -> Vec<Message> {
        self.lock()
            .iter()
            .filter(|m| filter.keeps(m))
            .cloned()
            .collect()
    }

    /// Full copy of the log
    #[must_use]
    pub fn snapshot(&self) -> Vec<Message> {
        self.history(HistoryFilter::ALL)
    }

    /// Number of entries, ephemeral included
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Validate `message` against the log it would be appended to
fn check_append(messages: &[Message], message: &Message) -> Result<()> {
    match message {
        Message::Ephemeral { .. } => Err(Error::Conversation(
            "ephemeral entries go through replace_ephemeral".to_string(),
        )),
        Message::User { .. } if !messages.iter().any(|m| !m.is_ephemeral()) => Err(
            Error::Conversation("greeting must precede user input".to_string()),
        ),
        Message::Tool(result) => {
            // Earlier results of the same assistant message may sit in between
            let answers_preceding = messages
                .iter()
                .rev()
                .find(|m| !m.is_ephemeral() && !matches!(m, Message::Tool(_)))
                .is_some_and(|m| m.tool_calls().iter().any(|c| c.id == result.tool_call_id));

            if answers_preceding {
                Ok(())
            } else {
                Err(Error::Conversation(format!(
                    "tool result {} does not answer the preceding assistant message",
                    result.tool_call_id
                )))
            }
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ToolCall;

    fn greeted() -> ConversationStore {
        let store = ConversationStore::new();
        assert!(store.set_greeting("Hello!"));
        store
    }

    fn call(id: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: "trackOrder".to_string(),
            arguments: serde_json::json!({"orderId": "o1"}),
        }
    }

    #[test]
    fn user_input_requires_greeting() {
        let store = ConversationStore::new();
        assert!(store.append(Message::user("hi")).is_err());
        store.set_greeting("Welcome");
        assert_eq!(store.append(Message::user("hi")).unwrap(), 1);
    }

    #[test]
    fn greeting_regenerates_only_while_alone() {
        let store = greeted();
        assert!(store.set_greeting("Hello Asha!"));
        assert_eq!(store.snapshot(), vec![Message::assistant("Hello Asha!")]);

        store.append(Message::user("prices?")).unwrap();
        assert!(!store.set_greeting("Hello again"));
        assert_eq!(store.snapshot()[0], Message::assistant("Hello Asha!"));
    }

    #[test]
    fn ephemeral_slot_updates_in_place() {
        let store = greeted();
        store.replace_ephemeral("Listening... 1s");
        store.append(Message::user("typed meanwhile")).unwrap();
        store.replace_ephemeral("Listening... 2s");

        let all = store.snapshot();
        assert_eq!(all.len(), 3);
        assert_eq!(all.iter().filter(|m| m.is_ephemeral()).count(), 1);
        assert_eq!(all[1].content(), Some("Listening... 2s"));

        assert!(store.remove_ephemeral());
        assert!(!store.remove_ephemeral());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn ephemeral_cannot_be_appended() {
        let store = greeted();
        let err = store.append(Message::Ephemeral {
            content: "x".to_string(),
        });
        assert!(err.is_err());
    }

    #[test]
    fn tool_result_must_answer_preceding_call() {
        let store = greeted();
        store.append(Message::user("where is my order")).unwrap();

        let orphan = ToolResult {
            tool_call_id: "call_9".to_string(),
            payload: serde_json::json!({"success": true}),
        };
        assert!(store.append(Message::tool(orphan.clone())).is_err());

        store
            .append(Message::assistant_tool_calls(None, vec![call("call_1")]))
            .unwrap();
        assert!(store.append(Message::tool(orphan)).is_err());

        let answer = ToolResult {
            tool_call_id: "call_1".to_string(),
            payload: serde_json::json!({"success": true}),
        };
        assert!(store.append(Message::tool(answer)).is_ok());
    }

    #[test]
    fn history_filters_tool_exchanges() {
        let store = greeted();
        store.append(Message::user("track o1")).unwrap();
        store
            .append(Message::assistant_tool_calls(None, vec![call("call_1")]))
            .unwrap();
        store
            .append(Message::tool(ToolResult {
                tool_call_id: "call_1".to_string(),
                payload: serde_json::json!({"success": true, "status": "shipped"}),
            }))
            .unwrap();
        store.append(Message::assistant("It shipped.")).unwrap();
        store.replace_ephemeral("Transcribing...");

        assert_eq!(store.history(HistoryFilter::ALL).len(), 6);
        assert_eq!(store.history(HistoryFilter::WITH_TOOLS).len(), 5);

        let dialogue = store.history(HistoryFilter::DIALOGUE);
        assert_eq!(
            dialogue,
            vec![
                Message::assistant("Hello!"),
                Message::user("track o1"),
                Message::assistant("It shipped."),
            ]
        );
    }

    #[test]
    fn tool_exchange_lands_together() {
        let store = greeted();
        store.append(Message::user("track o1")).unwrap();
        store.replace_ephemeral("Transcribing...");

        let index = store
            .append_tool_exchange(
                Message::assistant_tool_calls(None, vec![call("call_1")]),
                vec![ToolResult {
                    tool_call_id: "call_1".to_string(),
                    payload: serde_json::json!({"success": true}),
                }],
            )
            .unwrap();
        assert_eq!(index, 4);

        let all = store.snapshot();
        assert!(all[2].is_ephemeral());
        assert_eq!(all[3].tool_calls()[0].id, "call_1");
        assert!(matches!(&all[4], Message::Tool(r) if r.tool_call_id == "call_1"));
        assert_eq!(store.ephemeral().as_deref(), Some("Transcribing..."));
    }

    #[test]
    fn mismatched_tool_exchange_appends_nothing() {
        let store = greeted();
        let stray = ToolResult {
            tool_call_id: "call_2".to_string(),
            payload: serde_json::json!({"success": false}),
        };

        assert!(
            store
                .append_tool_exchange(
                    Message::assistant_tool_calls(None, vec![call("call_1")]),
                    vec![stray.clone()],
                )
                .is_err()
        );
        assert!(
            store
                .append_tool_exchange(Message::assistant("plain"), vec![stray])
                .is_err()
        );
        assert_eq!(store.len(), 1);
        assert_eq!(store.ephemeral(), None);
    }
}
