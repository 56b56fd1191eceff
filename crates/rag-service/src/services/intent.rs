use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::models::generation::{Intent, IntentClassification, SummaryScope};

/// Cues that mark a prompt as asking for analysis or summarization. Checked
/// before the writing cues so "write a summary" lands on analysis.
const ANALYSIS_CUES: &[&str] = &[
    "summariz",
    "overview",
    "main points",
    "key takeaways",
    "of this document",
    "write a summary",
];

const WRITING_CUES: &[&str] = &["write", "draft", "create", "compose", "report", "letter"];

const INTERROGATIVES: &[&str] = &[
    "what", "when", "where", "who", "why", "how", "is", "are", "does", "can",
];

static FOCUS_ABOUT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:about|regarding)\s+(.+?)(?:[.?!,]|$)").expect("focus regex")
});

static FOCUS_SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bthe\s+([\w][\w\s-]*?)\s+section\b").expect("section regex")
});

pub struct IntentClassifier;

impl IntentClassifier {
    /// Deterministic classification: first matching rule wins, confidence
    /// grows with the number of supporting cues.
    pub fn classify(prompt: &str) -> IntentClassification {
        let lower = prompt.to_lowercase();

        let analysis_hits: Vec<&str> = ANALYSIS_CUES
            .iter()
            .copied()
            .filter(|cue| lower.contains(cue))
            .collect();

        if !analysis_hits.is_empty() {
            let confidence = (0.70 + 0.20 * (analysis_hits.len() as f32 - 1.0)).min(1.0);
            let (summary_scope, focus_topic) = summary_scope(prompt);
            debug!("Intent ANALYSIS via cue(s) {:?}", analysis_hits);
            return IntentClassification {
                intent: Intent::Analysis,
                confidence,
                reasoning: format!("analysis cue(s): {}", analysis_hits.join(", ")),
                suggested_retrieval: Intent::Analysis.suggested_retrieval(),
                summary_scope,
                focus_topic,
            };
        }

        if let Some(interrogative) = leading_interrogative(&lower) {
            let has_question_mark = prompt.contains('?');
            let short = word_count(prompt) <= 15;
            if has_question_mark || short {
                let confidence = if has_question_mark { 0.85 } else { 0.70 };
                debug!("Intent QA via interrogative '{}'", interrogative);
                return IntentClassification {
                    intent: Intent::Qa,
                    confidence,
                    reasoning: format!("question opener \"{}\"", interrogative),
                    suggested_retrieval: Intent::Qa.suggested_retrieval(),
                    summary_scope: SummaryScope::NotApplicable,
                    focus_topic: None,
                };
            }
        }

        let writing_hits: Vec<&str> = WRITING_CUES
            .iter()
            .copied()
            .filter(|cue| contains_word(&lower, cue))
            .collect();

        let (confidence, reasoning) = if writing_hits.is_empty() {
            (0.50, "no strong cues; defaulting to writing".to_string())
        } else {
            let confidence = (0.70 + 0.10 * (writing_hits.len() as f32 - 1.0)).min(0.95);
            (confidence, format!("writing cue(s): {}", writing_hits.join(", ")))
        };

        debug!("Intent WRITING ({})", reasoning);
        IntentClassification {
            intent: Intent::Writing,
            confidence,
            reasoning,
            suggested_retrieval: Intent::Writing.suggested_retrieval(),
            summary_scope: SummaryScope::NotApplicable,
            focus_topic: None,
        }
    }

    /// Classification with a caller-supplied override. The override replaces
    /// the intent and its retrieval strategy; scope is still derived from
    /// the prompt text.
    pub fn classify_with_override(prompt: &str, override_intent: Option<Intent>) -> IntentClassification {
        let base = Self::classify(prompt);
        let Some(intent) = override_intent else {
            return base;
        };
        if intent == base.intent {
            return base;
        }

        let (summary_scope, focus_topic) = if intent == Intent::Analysis {
            summary_scope(prompt)
        } else {
            (SummaryScope::NotApplicable, None)
        };

        IntentClassification {
            intent,
            confidence: 1.0,
            reasoning: "intent override supplied by caller".to_string(),
            suggested_retrieval: intent.suggested_retrieval(),
            summary_scope,
            focus_topic,
        }
    }
}

/// A focused analysis names its topic ("about X", "regarding X",
/// "the X section"); anything else is a broad pass over the corpus.
fn summary_scope(prompt: &str) -> (SummaryScope, Option<String>) {
    if let Some(caps) = FOCUS_SECTION.captures(prompt) {
        let topic = caps[1].trim().to_string();
        if !topic.is_empty() {
            return (SummaryScope::Focused, Some(topic));
        }
    }
    if let Some(caps) = FOCUS_ABOUT.captures(prompt) {
        let topic = caps[1].trim().to_string();
        if !topic.is_empty() && topic.to_lowercase() != "this document" {
            return (SummaryScope::Focused, Some(topic));
        }
    }
    (SummaryScope::Broad, None)
}

fn leading_interrogative(lower: &str) -> Option<&'static str> {
    let first = lower
        .split_whitespace()
        .next()?
        .trim_matches(|c: char| !c.is_alphanumeric());
    INTERROGATIVES.iter().copied().find(|w| *w == first)
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn contains_word(haystack: &str, word: &str) -> bool {
    haystack
        .split(|c: char| !c.is_alphanumeric())
        .any(|w| w == word)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::retrieval::RetrievalStrategy;

    #[test]
    fn summarize_is_analysis_with_diverse_retrieval() {
        let c = IntentClassifier::classify("Summarize this document");
        assert_eq!(c.intent, Intent::Analysis);
        assert_eq!(c.suggested_retrieval, RetrievalStrategy::Diverse);
        assert_eq!(c.summary_scope, SummaryScope::Broad);
    }

    #[test]
    fn write_a_summary_is_analysis_not_writing() {
        let c = IntentClassifier::classify("Please write a summary of the findings");
        assert_eq!(c.intent, Intent::Analysis);
    }

    #[test]
    fn short_question_is_qa() {
        let c = IntentClassifier::classify("What is data feminism?");
        assert_eq!(c.intent, Intent::Qa);
        assert_eq!(c.suggested_retrieval, RetrievalStrategy::Similarity);
        assert!(c.confidence > 0.80);
        assert_eq!(c.summary_scope, SummaryScope::NotApplicable);
    }

    #[test]
    fn question_without_mark_still_qa_when_short() {
        let c = IntentClassifier::classify("how does the billing pipeline work");
        assert_eq!(c.intent, Intent::Qa);
        assert!((c.confidence - 0.70).abs() < 1e-6);
    }

    #[test]
    fn long_statement_starting_with_interrogative_is_not_qa() {
        let prompt = "What I would like you to do today is draft a long and detailed \
                      report covering every department budget line for the next year";
        let c = IntentClassifier::classify(prompt);
        assert_eq!(c.intent, Intent::Writing);
    }

    #[test]
    fn draft_request_is_writing() {
        let c = IntentClassifier::classify("Draft a letter to the supplier terminating the contract");
        assert_eq!(c.intent, Intent::Writing);
        assert_eq!(c.suggested_retrieval, RetrievalStrategy::Similarity);
    }

    #[test]
    fn ambiguous_prompt_falls_through_to_writing() {
        let c = IntentClassifier::classify("the second quarter results");
        assert_eq!(c.intent, Intent::Writing);
        assert!(c.confidence <= 0.50);
    }

    #[test]
    fn focused_scope_extracts_topic_from_about() {
        let c = IntentClassifier::classify("Summarize the chapter about supply chains");
        assert_eq!(c.intent, Intent::Analysis);
        assert_eq!(c.summary_scope, SummaryScope::Focused);
        assert_eq!(c.focus_topic.as_deref(), Some("supply chains"));
    }

    #[test]
    fn focused_scope_extracts_topic_from_section_phrase() {
        let c = IntentClassifier::classify("Give me an overview of the methodology section");
        assert_eq!(c.intent, Intent::Analysis);
        assert_eq!(c.summary_scope, SummaryScope::Focused);
        assert_eq!(c.focus_topic.as_deref(), Some("methodology"));
    }

    #[test]
    fn multiple_analysis_cues_raise_confidence() {
        let single = IntentClassifier::classify("Summarize the report");
        let double = IntentClassifier::classify("Summarize the main points of this document");
        assert!(double.confidence > single.confidence);
        assert!(double.confidence <= 1.0);
    }

    #[test]
    fn classification_is_deterministic() {
        let a = IntentClassifier::classify("What are the key risks?");
        let b = IntentClassifier::classify("What are the key risks?");
        assert_eq!(a.intent, b.intent);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.summary_scope, b.summary_scope);
    }
}
