use crate::models::chat::{ChatMessage, ChatRole};

/// Flattened history handed to the prompt assembler, plus what the caller
/// needs to know about how it was built.
#[derive(Debug, Clone)]
pub struct HistoryWindow {
    pub text: String,
    pub messages_count: usize,
    pub truncated: bool,
}

impl HistoryWindow {
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            messages_count: 0,
            truncated: false,
        }
    }
}

/// One user message and the assistant reply that followed it. Windowing
/// always operates on whole turns so role alignment survives truncation.
struct Turn<'a> {
    user: &'a ChatMessage,
    assistant: Option<&'a ChatMessage>,
}

fn turns(messages: &[ChatMessage]) -> Vec<Turn<'_>> {
    let mut turns = Vec::new();
    let mut iter = messages.iter().peekable();
    while let Some(msg) = iter.next() {
        if msg.role != ChatRole::User {
            continue;
        }
        let assistant = match iter.peek() {
            Some(next) if next.role == ChatRole::Assistant => iter.next(),
            _ => None,
        };
        turns.push(Turn {
            user: msg,
            assistant,
        });
    }
    turns
}

fn render(selected: &[&Turn<'_>]) -> (String, usize) {
    let mut text = String::new();
    let mut count = 0;
    for turn in selected {
        text.push_str("User: ");
        text.push_str(&turn.user.content);
        text.push('\n');
        count += 1;
        if let Some(assistant) = turn.assistant {
            text.push_str("Assistant: ");
            text.push_str(&assistant.content);
            text.push('\n');
            count += 1;
        }
    }
    (text.trim_end().to_string(), count)
}

/// Last `history_turns` turns flattened as role-tagged blocks under a hard
/// character budget. When the budget is exceeded the oldest whole turns are
/// dropped first.
pub fn build_window(
    messages: &[ChatMessage],
    history_turns: usize,
    max_chars: usize,
) -> HistoryWindow {
    if history_turns == 0 || messages.is_empty() {
        return HistoryWindow::empty();
    }

    let all_turns = turns(messages);
    let start = all_turns.len().saturating_sub(history_turns);
    let mut selected: Vec<&Turn<'_>> = all_turns[start..].iter().collect();

    let (mut text, mut count) = render(&selected);
    let mut truncated = false;
    while text.chars().count() > max_chars && !selected.is_empty() {
        truncated = true;
        selected.remove(0);
        let rendered = render(&selected);
        text = rendered.0;
        count = rendered.1;
    }

    HistoryWindow {
        text,
        messages_count: count,
        truncated,
    }
}

/// Retrieval query for a chat turn: the new message plus a short trailing
/// summary of prior user turns, newest first, capped at 200 chars.
pub fn augment_query(message: &str, messages: &[ChatMessage]) -> String {
    const SUMMARY_BUDGET: usize = 200;

    let mut summary = String::new();
    for msg in messages.iter().rev() {
        if msg.role != ChatRole::User {
            continue;
        }
        let candidate_len = summary.chars().count() + msg.content.chars().count() + 1;
        if candidate_len > SUMMARY_BUDGET {
            break;
        }
        if summary.is_empty() {
            summary = msg.content.clone();
        } else {
            summary = format!("{} {}", msg.content, summary);
        }
    }

    if summary.is_empty() {
        message.to_string()
    } else {
        format!("{} {}", message, summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn_pair(user: &str, assistant: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::user(user.to_string()),
            ChatMessage::assistant(assistant.to_string(), Vec::new(), Vec::new()),
        ]
    }

    #[test]
    fn window_keeps_last_n_turns() {
        let mut messages = Vec::new();
        for i in 0..5 {
            messages.extend(turn_pair(&format!("question {}", i), &format!("answer {}", i)));
        }

        let window = build_window(&messages, 3, 10_000);
        assert_eq!(window.messages_count, 6);
        assert!(!window.truncated);
        assert!(!window.text.contains("question 1"));
        assert!(window.text.contains("question 2"));
        assert!(window.text.contains("answer 4"));
    }

    #[test]
    fn budget_drops_oldest_whole_turns() {
        let mut messages = Vec::new();
        messages.extend(turn_pair(&"x".repeat(300), &"y".repeat(300)));
        messages.extend(turn_pair("short question", "short answer"));

        let window = build_window(&messages, 3, 100);
        assert!(window.truncated);
        assert_eq!(window.messages_count, 2);
        assert!(window.text.starts_with("User: short question"));
        assert!(window.text.contains("Assistant: short answer"));
    }

    #[test]
    fn window_within_budget_is_not_truncated() {
        let messages = turn_pair("Summarize chapter 2", "Chapter 2 covers rivers.");
        let window = build_window(&messages, 3, 8000);
        assert!(!window.truncated);
        assert_eq!(window.messages_count, 2);
    }

    #[test]
    fn blocks_alternate_roles() {
        let messages = turn_pair("q1", "a1");
        let window = build_window(&messages, 3, 8000);
        assert_eq!(window.text, "User: q1\nAssistant: a1");
    }

    #[test]
    fn empty_history_yields_empty_window() {
        let window = build_window(&[], 3, 8000);
        assert_eq!(window.messages_count, 0);
        assert!(window.text.is_empty());
    }

    #[test]
    fn augmented_query_includes_prior_user_turns() {
        let mut messages = turn_pair("Summarize chapter 2", "Chapter 2 covers rivers.");
        messages.push(ChatMessage::user("ignored trailing user turn".to_string()));
        let query = augment_query("What did it say about deltas?", &messages[..2]);
        assert!(query.starts_with("What did it say about deltas?"));
        assert!(query.contains("Summarize chapter 2"));
    }

    #[test]
    fn augmented_summary_respects_char_cap() {
        let mut messages = Vec::new();
        for i in 0..10 {
            messages.extend(turn_pair(&format!("a fairly long user question number {}", i), "ok"));
        }
        let query = augment_query("follow-up", &messages);
        let summary_len = query.chars().count() - "follow-up ".chars().count();
        assert!(summary_len <= 200, "summary was {} chars", summary_len);
    }
}
