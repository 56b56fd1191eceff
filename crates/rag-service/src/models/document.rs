use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Pdf,
    Docx,
    Txt,
}

impl DocumentType {
    pub fn from_filename(filename: &str) -> Option<Self> {
        let ext = filename.rsplit('.').next()?.to_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" | "doc" => Some(Self::Docx),
            "txt" | "md" => Some(Self::Txt),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Ready,
    Failed,
}

impl DocumentStatus {
    /// Status moves forward only: pending -> processing -> {ready, failed}.
    pub fn can_transition_to(self, next: DocumentStatus) -> bool {
        use DocumentStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Pending, Failed) | (Processing, Ready) | (Processing, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    pub filename: String,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub status: DocumentStatus,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Document {
    pub fn new(title: String, filename: String, doc_type: DocumentType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title,
            filename,
            doc_type,
            status: DocumentStatus::Pending,
            chunk_count: 0,
            created_at: now,
            updated_at: now,
            error_message: None,
        }
    }

    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            id: self.id,
            title: self.title.clone(),
            filename: self.filename.clone(),
            doc_type: self.doc_type,
            status: self.status,
            chunk_count: self.chunk_count,
            updated_at: self.updated_at,
        }
    }
}

/// Entry stored in documents/index.json for O(1) listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: Uuid,
    pub title: String,
    pub filename: String,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub status: DocumentStatus,
    pub chunk_count: usize,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Intro,
    Middle,
    Conclusion,
}

impl Region {
    /// Region by ordinal tertile. Integer arithmetic keeps the boundary
    /// deterministic for any chunk count.
    pub fn of(ordinal: usize, total: usize) -> Self {
        if total == 0 || ordinal * 3 < total {
            Self::Intro
        } else if ordinal * 3 < total * 2 {
            Self::Middle
        } else {
            Self::Conclusion
        }
    }

    pub const ALL: [Region; 3] = [Region::Intro, Region::Middle, Region::Conclusion];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Intro => "intro",
            Self::Middle => "middle",
            Self::Conclusion => "conclusion",
        }
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub ordinal: usize,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_title: Option<String>,
    pub region: Region,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_tertiles_for_thirty_chunks() {
        let total = 30;
        assert_eq!(Region::of(0, total), Region::Intro);
        assert_eq!(Region::of(9, total), Region::Intro);
        assert_eq!(Region::of(10, total), Region::Middle);
        assert_eq!(Region::of(19, total), Region::Middle);
        assert_eq!(Region::of(20, total), Region::Conclusion);
        assert_eq!(Region::of(29, total), Region::Conclusion);
    }

    #[test]
    fn region_tertiles_for_uneven_counts() {
        // N=7: intro = ordinals 0..2, middle = 3..4, conclusion = 5..6
        assert_eq!(Region::of(2, 7), Region::Intro);
        assert_eq!(Region::of(3, 7), Region::Middle);
        assert_eq!(Region::of(4, 7), Region::Middle);
        assert_eq!(Region::of(5, 7), Region::Conclusion);
        // Single chunk document is all intro
        assert_eq!(Region::of(0, 1), Region::Intro);
    }

    #[test]
    fn status_transitions_forward_only() {
        use DocumentStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Ready));
        assert!(Processing.can_transition_to(Failed));
        assert!(!Ready.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Ready));
        assert!(!Processing.can_transition_to(Pending));
    }

    #[test]
    fn document_type_from_filename() {
        assert_eq!(DocumentType::from_filename("a.PDF"), Some(DocumentType::Pdf));
        assert_eq!(DocumentType::from_filename("b.docx"), Some(DocumentType::Docx));
        assert_eq!(DocumentType::from_filename("c.txt"), Some(DocumentType::Txt));
        assert_eq!(DocumentType::from_filename("d.xlsx"), None);
    }
}
