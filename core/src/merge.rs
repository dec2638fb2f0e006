//! Combines rule flags into disjoint highlight spans.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{rules::Flag, token::Token, Category, Severity};

/// A finalized highlight region over the original text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub categories: BTreeSet<Category>,
    pub severity: Severity,
}

impl Span {
    fn from_flag(flag: &Flag) -> Self {
        Self {
            start: flag.start,
            end: flag.end,
            categories: BTreeSet::from([flag.category]),
            severity: flag.severity,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Merges flags into sorted, pairwise-disjoint spans aligned to `tokens`.
///
/// Flags are snapped outward to token boundaries, sorted (start ascending,
/// longer first) and swept. Flags sharing at least one byte join the same
/// span. The output does not depend on the input order.
pub fn merge(flags: &[Flag], tokens: &[Token<'_>]) -> Vec<Span> {
    let mut snapped: Vec<Flag> = flags
        .iter()
        .filter_map(|flag| snap(flag, tokens))
        .collect();
    snapped.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| b.end.cmp(&a.end))
            .then_with(|| a.category.cmp(&b.category))
            .then_with(|| a.severity.cmp(&b.severity))
    });

    let mut spans: Vec<Span> = Vec::new();
    for flag in &snapped {
        match spans.last_mut() {
            Some(span) if flag.start < span.end => {
                span.end = span.end.max(flag.end);
                span.categories.insert(flag.category);
                span.severity = span.severity.max(flag.severity);
            }
            _ => spans.push(Span::from_flag(flag)),
        }
    }
    spans
}

fn snap(flag: &Flag, tokens: &[Token<'_>]) -> Option<Flag> {
    let text_end = tokens.last().map_or(0, |t| t.end);
    let start = flag.start.min(text_end);
    let end = flag.end.min(text_end);
    if start >= end {
        return None;
    }
    let first = tokens.partition_point(|t| t.start <= start).saturating_sub(1);
    let last = tokens.partition_point(|t| t.start < end).saturating_sub(1);
    Some(Flag {
        start: tokens[first].start.min(start),
        end: tokens[last].end.max(end),
        ..*flag
    })
}
