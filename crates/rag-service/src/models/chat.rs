use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::generation::GeneratedSection;
use super::retrieval::{CoverageDescriptor, SourceRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub sources_used: Vec<SourceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sections: Option<Vec<GeneratedSection>>,
}

impl ChatMessage {
    pub fn user(content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: ChatRole::User,
            content,
            timestamp: Utc::now(),
            sources_used: Vec::new(),
            sections: None,
        }
    }

    pub fn assistant(
        content: String,
        sources_used: Vec<SourceRef>,
        sections: Vec<GeneratedSection>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: ChatRole::Assistant,
            content,
            timestamp: Utc::now(),
            sources_used,
            sections: Some(sections),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_ids: Option<Vec<Uuid>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cumulative_coverage: Option<CoverageDescriptor>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(document_ids: Option<Vec<Uuid>>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: String::new(),
            messages: Vec::new(),
            document_ids,
            cumulative_coverage: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Chunk ids every assistant turn has cited so far, first appearance
    /// order, no duplicates. The cumulative coverage union is derived from
    /// messages rather than stored separately.
    pub fn seen_chunk_ids(&self) -> Vec<Uuid> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for msg in &self.messages {
            for src in &msg.sources_used {
                if seen.insert(src.chunk_id) {
                    out.push(src.chunk_id);
                }
            }
        }
        out
    }

    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            id: self.id,
            title: self.title.clone(),
            updated_at: self.updated_at,
            message_count: self.messages.len(),
        }
    }
}

/// Entry stored in conversations/index.json for O(1) listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub title: String,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
}
