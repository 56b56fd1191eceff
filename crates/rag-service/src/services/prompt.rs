use std::fmt::Write;

use crate::models::generation::{Intent, IntentClassification, SummaryScope};
use crate::models::retrieval::{CoverageDescriptor, SourceRef};

/// Headings the analysis templates require and the validator splits on.
pub const ANALYSIS_SECTIONS: [&str; 5] = [
    "Observations",
    "Synthesized Patterns",
    "Contradictions",
    "Questions Raised",
    "Blind Spots",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTemplate {
    Analysis,
    ExploratorySummary,
    FocusedSummary,
    CoverageAware,
}

impl PromptTemplate {
    pub fn is_analysis(self) -> bool {
        !matches!(self, Self::CoverageAware)
    }
}

#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub template: PromptTemplate,
    pub system_prompt: String,
    pub user_prompt: String,
}

pub struct PromptAssembler;

impl PromptAssembler {
    /// Build the system/user prompt pair for one generation. Sources are
    /// injected as numbered blocks; the system prompt states the measured
    /// coverage verbatim so the model knows its own limits.
    pub fn assemble(
        classification: &IntentClassification,
        user_request: &str,
        sources: &[SourceRef],
        coverage: &CoverageDescriptor,
        history: Option<&str>,
    ) -> AssembledPrompt {
        let template = select_template(classification);
        let system_prompt = build_system_prompt(template, sources.len(), coverage);
        let user_prompt = build_user_prompt(template, classification, user_request, sources, history);
        AssembledPrompt {
            template,
            system_prompt,
            user_prompt,
        }
    }
}

fn select_template(classification: &IntentClassification) -> PromptTemplate {
    match classification.intent {
        Intent::Analysis => match classification.summary_scope {
            SummaryScope::Focused => PromptTemplate::FocusedSummary,
            SummaryScope::Broad => PromptTemplate::ExploratorySummary,
            SummaryScope::NotApplicable => PromptTemplate::Analysis,
        },
        Intent::Qa | Intent::Writing => PromptTemplate::CoverageAware,
    }
}

fn build_system_prompt(
    template: PromptTemplate,
    source_count: usize,
    coverage: &CoverageDescriptor,
) -> String {
    let mut out = String::new();

    out.push_str(
        "You are a careful assistant that answers strictly from the document \
         excerpts provided to you.\n\n",
    );

    let _ = writeln!(
        out,
        "You are seeing ~{:.0}% of the document.",
        coverage.coverage_percentage
    );
    let _ = writeln!(out, "{}", coverage.coverage_summary);
    if !coverage.blind_spots.is_empty() {
        let _ = writeln!(out, "Regions not sampled: {}.", coverage.blind_spots.join("; "));
    }
    out.push('\n');

    if source_count > 0 {
        let _ = writeln!(
            out,
            "Every non-trivial claim must carry an inline citation of the form \
             [Source N] where N is between 1 and {}. Never cite a source number \
             outside that range and never invent sources.",
            source_count
        );
    } else {
        out.push_str(
            "No document excerpts are available for this request. State explicitly \
             that you cannot answer from the documents; do not fabricate content \
             or citations.\n",
        );
    }

    if template.is_analysis() {
        out.push('\n');
        out.push_str("Structure your response under exactly these five headings:\n");
        for heading in ANALYSIS_SECTIONS {
            let _ = writeln!(out, "## {}", heading);
        }
        out.push_str(
            "Under Blind Spots, restate which parts of the material you did not \
             see, based on the coverage information above.\n",
        );
    }

    out
}

fn build_user_prompt(
    template: PromptTemplate,
    classification: &IntentClassification,
    user_request: &str,
    sources: &[SourceRef],
    history: Option<&str>,
) -> String {
    let mut out = String::new();

    if let Some(history) = history {
        if !history.is_empty() {
            out.push_str("Conversation so far:\n");
            out.push_str(history);
            out.push_str("\n\n");
        }
    }

    if !sources.is_empty() {
        out.push_str("Document excerpts:\n\n");
        for (i, source) in sources.iter().enumerate() {
            let _ = write!(out, "[Source {}] {}", i + 1, source.metadata.title);
            if let Some(page) = source.metadata.page {
                let _ = write!(out, " (page {})", page);
            }
            out.push('\n');
            out.push_str(&source.excerpt);
            out.push_str("\n\n");
        }
    }

    match template {
        PromptTemplate::ExploratorySummary => {
            out.push_str(
                "Give a broad overview of the sampled material and suggest focus \
                 areas that would reward a closer read.\n\n",
            );
        }
        PromptTemplate::FocusedSummary => {
            if let Some(topic) = &classification.focus_topic {
                let _ = writeln!(
                    out,
                    "Synthesize everything the excerpts say about \"{}\" in depth.\n",
                    topic
                );
            }
        }
        PromptTemplate::Analysis | PromptTemplate::CoverageAware => {}
    }

    out.push_str("Request: ");
    out.push_str(user_request);
    out
}
