//! Citation reconciliation.
//!
//! Turns the raw `citations` list of a generation result into ordered,
//! UI-ready [`NormalizedCitation`]s and a deduplicated source list. Every
//! function here is pure; diagnostics go through an optional
//! [`CitationObserver`] and never influence the output.

use std::collections::HashSet;

use serde_json::Value;

use crate::models::{GenerationResult, NormalizedCitation, RawCitation, RawReference, Reference};
use crate::render::preview;

pub const SOURCE_URI_METADATA_KEY: &str = "x-amz-bedrock-kb-source-uri";

/// Placeholder label some producers emit in place of a real locator.
pub const UNKNOWN_SOURCE: &str = "unknown source";

const CITED_TEXT_PREVIEW_CHARS: usize = 200;
const CONTENT_PREVIEW_CHARS: usize = 150;

type SourceExtractor = fn(&RawReference) -> Option<&str>;

// Tried in order; the first non-empty value wins.
const SOURCE_EXTRACTORS: [SourceExtractor; 2] = [metadata_source_uri, location_source_uri];

fn metadata_source_uri(reference: &RawReference) -> Option<&str> {
    reference
        .metadata
        .get(SOURCE_URI_METADATA_KEY)
        .and_then(Value::as_str)
}

fn location_source_uri(reference: &RawReference) -> Option<&str> {
    reference
        .location
        .as_ref()?
        .s3_location
        .as_ref()?
        .uri
        .as_deref()
}

/// Hooks for observing reconciliation. All methods default to no-ops.
pub trait CitationObserver {
    fn citation_started(
        &self,
        _raw_position: usize,
        _span_start: i64,
        _span_end: i64,
        _cited_text: &str,
        _reference_count: usize,
    ) {
    }

    fn reference_resolved(
        &self,
        _raw_position: usize,
        _reference_position: usize,
        _source: Option<&str>,
        _content: &str,
    ) {
    }

    fn citation_dropped(&self, _raw_position: usize) {}

    fn reconciled(&self, _raw_count: usize, _emitted_count: usize) {}
}

pub struct NoopObserver;

impl CitationObserver for NoopObserver {}

/// Emits `tracing` events with text previews for each step.
pub struct TracingObserver;

impl CitationObserver for TracingObserver {
    fn citation_started(
        &self,
        raw_position: usize,
        span_start: i64,
        span_end: i64,
        cited_text: &str,
        reference_count: usize,
    ) {
        tracing::debug!(
            raw_position,
            span_start,
            span_end,
            reference_count,
            cited_text = %preview(cited_text, CITED_TEXT_PREVIEW_CHARS),
            "processing citation"
        );
    }

    fn reference_resolved(
        &self,
        raw_position: usize,
        reference_position: usize,
        source: Option<&str>,
        content: &str,
    ) {
        tracing::debug!(
            raw_position,
            reference_position,
            source = source.unwrap_or(UNKNOWN_SOURCE),
            content = %preview(content, CONTENT_PREVIEW_CHARS),
            "retrieved reference"
        );
    }

    fn citation_dropped(&self, raw_position: usize) {
        tracing::debug!(raw_position, "citation has no usable reference, dropping");
    }

    fn reconciled(&self, raw_count: usize, emitted_count: usize) {
        tracing::info!(raw_count, emitted_count, "reconciled citations");
    }
}

/// Resolves the source identifier of a reference, metadata override first.
///
/// Empty values and the [`UNKNOWN_SOURCE`] placeholder fall through to the
/// next extractor. Returns `None` when no extractor yields a usable value.
pub fn resolve_source(reference: &RawReference) -> Option<&str> {
    SOURCE_EXTRACTORS
        .iter()
        .filter_map(|extract| extract(reference))
        .find(|source| !source.is_empty() && *source != UNKNOWN_SOURCE)
}

pub fn resolve_reference(reference: &RawReference) -> Option<Reference> {
    let source = resolve_source(reference)?;
    let content = reference.content_text();
    if content.is_empty() {
        return None;
    }

    Some(Reference {
        source: source.to_string(),
        content: content.to_string(),
    })
}

/// Builds the normalized citation for one raw span, or `None` when none of
/// its references is usable.
///
/// `answer_chars` is the char count of the full answer and is the default
/// span end.
pub fn aggregate_span(
    citation: &RawCitation,
    citation_index: usize,
    answer_chars: i64,
) -> Option<NormalizedCitation> {
    aggregate_observed(citation, citation_index, answer_chars, 0, &NoopObserver)
}

fn aggregate_observed(
    citation: &RawCitation,
    citation_index: usize,
    answer_chars: i64,
    raw_position: usize,
    observer: &dyn CitationObserver,
) -> Option<NormalizedCitation> {
    let cited_text = citation.cited_text();
    let span_start = citation.span_start().unwrap_or(0);
    let span_end = citation.span_end().unwrap_or(answer_chars);

    observer.citation_started(
        raw_position,
        span_start,
        span_end,
        cited_text,
        citation.retrieved_references.len(),
    );

    let references: Vec<Reference> = citation
        .retrieved_references
        .iter()
        .enumerate()
        .filter_map(|(reference_position, reference)| {
            observer.reference_resolved(
                raw_position,
                reference_position,
                resolve_source(reference),
                reference.content_text(),
            );
            resolve_reference(reference)
        })
        .collect();

    if references.is_empty() {
        return None;
    }

    Some(NormalizedCitation {
        citation_index,
        cited_text: cited_text.to_string(),
        span_start,
        span_end,
        references,
    })
}

/// Reconciles every raw citation of `result`, logging through `tracing`.
pub fn reconcile(result: &GenerationResult) -> Vec<NormalizedCitation> {
    reconcile_with(result, &TracingObserver)
}

/// Reconciles in raw order. Indices are dense over the emitted citations, so a
/// dropped span does not consume one.
pub fn reconcile_with(
    result: &GenerationResult,
    observer: &dyn CitationObserver,
) -> Vec<NormalizedCitation> {
    let answer_chars = result.answer_text().chars().count() as i64;
    let mut citations = Vec::new();

    for (raw_position, raw) in result.citations.iter().enumerate() {
        let next_index = citations.len() + 1;
        match aggregate_observed(raw, next_index, answer_chars, raw_position, observer) {
            Some(citation) => citations.push(citation),
            None => observer.citation_dropped(raw_position),
        }
    }

    observer.reconciled(result.citations.len(), citations.len());
    citations
}

/// Unique sources across all citations, in first-seen order.
pub fn collate_sources(citations: &[NormalizedCitation]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut sources = Vec::new();

    for reference in citations.iter().flat_map(|citation| &citation.references) {
        if seen.insert(reference.source.as_str()) {
            sources.push(reference.source.clone());
        }
    }

    sources
}
