use askama::Template;

use crate::models::NormalizedCitation;

pub const NO_CITATIONS_NOTICE: &str = "No citations were found for this answer.";

const PANEL_PREVIEW_CHARS: usize = 80;

/// First `max_chars` chars of `text`, with `...` appended when truncated.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Last path segment of a source URI, for compact display.
pub fn source_file_name(source: &str) -> &str {
    match source.rsplit('/').next() {
        Some(name) if !name.is_empty() => name,
        _ => source,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlight {
    pub before: String,
    pub marked: String,
    pub after: String,
}

/// Splits `answer` around the char range `[start, end)`.
///
/// Offsets come from the generation service unchecked, so negative, inverted
/// or out-of-range spans yield `None` and the caller shows no highlight.
pub fn highlight_span(answer: &str, start: i64, end: i64) -> Option<Highlight> {
    if start < 0 || end < start {
        return None;
    }
    let start = usize::try_from(start).ok()?;
    let end = usize::try_from(end).ok()?;
    if end > answer.chars().count() {
        return None;
    }

    let byte_offset = |char_idx: usize| {
        answer
            .char_indices()
            .nth(char_idx)
            .map(|(idx, _)| idx)
            .unwrap_or(answer.len())
    };
    let (start_byte, end_byte) = (byte_offset(start), byte_offset(end));

    Some(Highlight {
        before: answer[..start_byte].to_string(),
        marked: answer[start_byte..end_byte].to_string(),
        after: answer[end_byte..].to_string(),
    })
}

pub struct ReferenceView {
    pub ordinal: usize,
    pub source: String,
    pub file_name: String,
    pub content: String,
}

pub struct CitationView {
    pub index: usize,
    pub preview: String,
    pub cited_text: String,
    pub span_start: i64,
    pub span_end: i64,
    pub highlight: Option<Highlight>,
    pub references: Vec<ReferenceView>,
}

/// Collapsible citation list shown under an answer.
#[derive(Template)]
#[template(path = "citations.html")]
pub struct CitationPanel {
    pub citations: Vec<CitationView>,
    pub notice: &'static str,
}

impl CitationPanel {
    pub fn new(answer_text: &str, citations: &[NormalizedCitation]) -> Self {
        let citations = citations
            .iter()
            .map(|citation| CitationView {
                index: citation.citation_index,
                preview: preview(&citation.cited_text, PANEL_PREVIEW_CHARS),
                cited_text: citation.cited_text.clone(),
                span_start: citation.span_start,
                span_end: citation.span_end,
                highlight: highlight_span(answer_text, citation.span_start, citation.span_end),
                references: citation
                    .references
                    .iter()
                    .enumerate()
                    .map(|(idx, reference)| ReferenceView {
                        ordinal: idx + 1,
                        source: reference.source.clone(),
                        file_name: source_file_name(&reference.source).to_string(),
                        content: reference.content.clone(),
                    })
                    .collect(),
            })
            .collect();

        Self {
            citations,
            notice: NO_CITATIONS_NOTICE,
        }
    }
}
