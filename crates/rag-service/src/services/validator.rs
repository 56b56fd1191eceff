use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use uuid::Uuid;

use crate::models::generation::{Confidence, GeneratedSection};
use crate::models::retrieval::SourceRef;

use super::prompt::{PromptTemplate, ANALYSIS_SECTIONS};

static CITATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\[Source\s+(\d+)\]").expect("citation regex"));

static HEDGING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(may|might|possibly|unclear|not certain)\b").expect("hedging regex")
});

static HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    let names = ANALYSIS_SECTIONS.join("|");
    Regex::new(&format!(
        r"(?m)^\s*(?:#+\s*|\*\*)?({})(?:\*\*)?\s*:?\s*$",
        names
    ))
    .expect("heading regex")
});

/// The only component allowed to set `sources`, `confidence` and `warnings`
/// on generated output. Model text goes in, validated sections come out.
pub struct Validator;

impl Validator {
    pub fn validate(
        raw_output: &str,
        sources: &[SourceRef],
        template: PromptTemplate,
    ) -> Vec<GeneratedSection> {
        let parts: Vec<(Option<String>, String)> = if template.is_analysis() {
            split_sections(raw_output)
        } else {
            vec![(None, raw_output.to_string())]
        };

        parts
            .into_iter()
            .map(|(title, content)| validate_section(title, &content, sources))
            .collect()
    }
}

/// Split analysis output on the five required headings. Output that ignored
/// the structure contract comes back as one untitled section.
fn split_sections(raw: &str) -> Vec<(Option<String>, String)> {
    let matches: Vec<(usize, usize, String)> = HEADING_RE
        .captures_iter(raw)
        .map(|caps| {
            let whole = caps.get(0).expect("match");
            (whole.start(), whole.end(), caps[1].to_string())
        })
        .collect();

    if matches.is_empty() {
        return vec![(None, raw.trim().to_string())];
    }

    let mut sections = Vec::with_capacity(matches.len() + 1);

    let preamble = raw[..matches[0].0].trim();
    if !preamble.is_empty() {
        sections.push((None, preamble.to_string()));
    }

    for (i, (_, end, title)) in matches.iter().enumerate() {
        let content_end = matches.get(i + 1).map(|m| m.0).unwrap_or(raw.len());
        let content = raw[*end..content_end].trim();
        sections.push((Some(title.clone()), content.to_string()));
    }

    sections
}

fn validate_section(
    title: Option<String>,
    content: &str,
    sources: &[SourceRef],
) -> GeneratedSection {
    let k = sources.len();
    let mut removed = 0usize;
    let mut retained: Vec<usize> = Vec::new();

    let sanitized = CITATION_RE
        .replace_all(content, |caps: &Captures| {
            let n: usize = caps[1].parse().unwrap_or(0);
            if n >= 1 && n <= k {
                if !retained.contains(&n) {
                    retained.push(n);
                }
                caps[0].to_string()
            } else {
                removed += 1;
                String::new()
            }
        })
        .to_string();

    // Attribution: cited sources in first-appearance order, one entry per
    // chunk even when several citation numbers resolve to it.
    let mut section_sources: Vec<SourceRef> = Vec::new();
    for n in &retained {
        let source = &sources[n - 1];
        if !section_sources.iter().any(|s| s.chunk_id == source.chunk_id) {
            section_sources.push(source.clone());
        }
    }

    let citation_count = retained.len();
    let hedging = HEDGING_RE.is_match(&sanitized);

    let confidence = if citation_count >= 3 {
        Confidence::High
    } else if citation_count == 0 {
        Confidence::Unknown
    } else if hedging {
        Confidence::Low
    } else {
        Confidence::Medium
    };

    let mut warnings = Vec::new();
    if k == 0 {
        warnings.push("no_sources: no document excerpts were available for this generation".to_string());
    }
    if removed > 0 {
        warnings.push(format!(
            "invalid_citations_removed: {} citation(s) referenced sources outside [1..{}]",
            removed, k
        ));
    }
    if citation_count == 0 && k > 0 {
        warnings.push("zero_citations: the response cites none of the provided sources".to_string());
    }

    GeneratedSection {
        id: Uuid::new_v4(),
        title,
        content: sanitized.trim().to_string(),
        sources: section_sources,
        confidence,
        warnings,
        is_user_edited: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::document::Region;
    use crate::models::retrieval::SourceMetadata;

    fn sources(n: usize) -> Vec<SourceRef> {
        (0..n)
            .map(|i| SourceRef {
                document_id: Uuid::new_v4(),
                chunk_id: Uuid::new_v4(),
                excerpt: format!("excerpt {}", i),
                relevance_score: 0.8,
                metadata: SourceMetadata {
                    title: format!("Doc {}", i),
                    filename: format!("doc{}.txt", i),
                    page: None,
                    section_title: None,
                    region: Region::Middle,
                },
            })
            .collect()
    }

    #[test]
    fn out_of_range_citation_is_stripped_with_warning() {
        let srcs = sources(2);
        let raw = "The claim holds [Source 1] and also [Source 99] elsewhere.";
        let sections = Validator::validate(raw, &srcs, PromptTemplate::CoverageAware);

        assert_eq!(sections.len(), 1);
        let section = &sections[0];
        assert!(!section.content.contains("[Source 99]"));
        assert!(section.content.contains("[Source 1]"));
        assert!(section
            .warnings
            .iter()
            .any(|w| w.starts_with("invalid_citations_removed")));
        // One remaining citation grades medium
        assert_eq!(section.confidence, Confidence::Medium);
        assert_eq!(section.sources.len(), 1);
    }

    #[test]
    fn three_distinct_citations_grade_high() {
        let srcs = sources(4);
        let raw = "A [Source 1]. B [Source 2]. C [Source 3]. A again [Source 1].";
        let sections = Validator::validate(raw, &srcs, PromptTemplate::CoverageAware);
        assert_eq!(sections[0].confidence, Confidence::High);
        assert_eq!(sections[0].sources.len(), 3);
    }

    #[test]
    fn hedging_downgrades_medium_to_low_but_not_high() {
        let srcs = sources(4);

        let hedged = "It may be the case that X [Source 1].";
        let sections = Validator::validate(hedged, &srcs, PromptTemplate::CoverageAware);
        assert_eq!(sections[0].confidence, Confidence::Low);

        let hedged_high =
            "It may be that X [Source 1], Y [Source 2], and Z [Source 3] all apply.";
        let sections = Validator::validate(hedged_high, &srcs, PromptTemplate::CoverageAware);
        assert_eq!(sections[0].confidence, Confidence::High);
    }

    #[test]
    fn zero_citations_with_sources_is_unknown_with_warning() {
        let srcs = sources(3);
        let sections =
            Validator::validate("No citations anywhere.", &srcs, PromptTemplate::CoverageAware);
        assert_eq!(sections[0].confidence, Confidence::Unknown);
        assert!(sections[0]
            .warnings
            .iter()
            .any(|w| w.starts_with("zero_citations")));
    }

    #[test]
    fn no_sources_forces_unknown_and_warning() {
        let raw = "Cannot answer from the documents. [Source 1]";
        let sections = Validator::validate(raw, &[], PromptTemplate::CoverageAware);
        let section = &sections[0];
        assert_eq!(section.confidence, Confidence::Unknown);
        assert!(section.sources.is_empty());
        assert!(!section.content.contains("[Source"));
        assert!(section.warnings.iter().any(|w| w.starts_with("no_sources")));
    }

    #[test]
    fn analysis_output_splits_on_five_headings() {
        let srcs = sources(3);
        let raw = "\
## Observations
First things first [Source 1].

## Synthesized Patterns
A pattern emerges [Source 2] [Source 3].

## Contradictions
None found.

## Questions Raised
What about Y [Source 1]?

## Blind Spots
The conclusion was not sampled.
";
        let sections = Validator::validate(raw, &srcs, PromptTemplate::ExploratorySummary);
        assert_eq!(sections.len(), 5);
        assert_eq!(sections[0].title.as_deref(), Some("Observations"));
        assert_eq!(sections[4].title.as_deref(), Some("Blind Spots"));
        assert_eq!(sections[1].sources.len(), 2);
        assert_eq!(sections[2].confidence, Confidence::Unknown);
    }

    #[test]
    fn unstructured_analysis_output_falls_back_to_single_section() {
        let srcs = sources(1);
        let sections = Validator::validate(
            "The model ignored the headings [Source 1].",
            &srcs,
            PromptTemplate::Analysis,
        );
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].title, None);
    }

    #[test]
    fn remaining_citations_always_resolve() {
        let srcs = sources(2);
        let raw = "[Source 0] [Source 1] [Source 2] [Source 3] [Source 10]";
        let sections = Validator::validate(raw, &srcs, PromptTemplate::CoverageAware);
        let re = Regex::new(r"\[Source\s+(\d+)\]").unwrap();
        for caps in re.captures_iter(&sections[0].content) {
            let n: usize = caps[1].parse().unwrap();
            assert!(n >= 1 && n <= sections[0].sources.len());
        }
        assert_eq!(sections[0].sources.len(), 2);
    }

    #[test]
    fn sections_and_warnings_always_present() {
        for raw in ["", "plain text", "cited [Source 1]"] {
            for srcs in [sources(0), sources(1)] {
                let sections = Validator::validate(raw, &srcs, PromptTemplate::CoverageAware);
                assert_eq!(sections.len(), 1);
                // Fields exist and are owned vectors, never absent
                let _ = &sections[0].sources;
                let _ = &sections[0].warnings;
            }
        }
    }
}
