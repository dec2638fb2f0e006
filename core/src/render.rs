//! Escaped, whitespace-preserving rendering of annotated text.

use html_escape::{decode_html_entities, encode_double_quoted_attribute, encode_text};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::merge::Span;

const CLOSE_MARKER: &str = "</span>";

static MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</?span(?:\s[^>]*)?>").expect("static regex"));

/// Renders `text` with every span wrapped in a highlight marker.
///
/// Literal text is HTML-escaped, whitespace and line breaks pass through
/// untouched. Spans must be sorted and disjoint (as produced by
/// [`crate::merge::merge`]); spans that overlap an earlier one or do not fall
/// on char boundaries are skipped rather than breaking the output.
pub fn render(text: &str, spans: &[Span]) -> String {
    let mut out = String::with_capacity(text.len() + spans.len() * 128);
    let mut cursor = 0usize;

    for span in spans {
        let start = span.start.max(cursor);
        let end = span.end.min(text.len());
        if start >= end {
            continue;
        }
        let (Some(before), Some(inner)) = (text.get(cursor..start), text.get(start..end)) else {
            continue;
        };
        out.push_str(&encode_text(before));
        push_open_marker(&mut out, span);
        out.push_str(&encode_text(inner));
        out.push_str(CLOSE_MARKER);
        cursor = end;
    }

    out.push_str(&encode_text(&text[cursor..]));
    out
}

fn push_open_marker(out: &mut String, span: &Span) {
    let names: Vec<String> = span.categories.iter().map(|c| c.to_string()).collect();
    let labels: Vec<&str> = span.categories.iter().map(|c| c.label()).collect();
    let names = names.join(" ");
    let title = format!("{} ({})", labels.join("・"), span.severity.label());
    out.push_str(&format!(
        r#"<span class="repeat {names} severity-{severity}" data-categories="{names}" data-severity="{severity}" title="{title}">"#,
        severity = span.severity,
        title = encode_double_quoted_attribute(&title),
    ));
}

/// Removes highlight markers and decodes entities, returning the text that
/// was passed to [`render`].
pub fn strip_markers(markup: &str) -> String {
    let plain = MARKER_RE.replace_all(markup, "");
    decode_html_entities(&*plain).into_owned()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::{Category, Severity};

    fn span(start: usize, end: usize, categories: &[Category], severity: Severity) -> Span {
        Span {
            start,
            end,
            categories: categories.iter().copied().collect::<BTreeSet<_>>(),
            severity,
        }
    }

    #[test]
    fn empty_text_renders_empty() {
        assert_eq!(render("", &[]), "");
    }

    #[test]
    fn escapes_markup_characters() {
        assert_eq!(render("a < b & c > d", &[]), "a &lt; b &amp; c &gt; d");
    }

    #[test]
    fn keeps_whitespace_verbatim() {
        let text = "一行目\n\n\n　二行目\t終わり\r\n";
        assert_eq!(render(text, &[]), text);
    }

    #[test]
    fn wraps_spans_with_markers() {
        let text = "猫が好き。猫が好き。";
        let spans = [
            span(0, 12, &[Category::PhraseRepeat], Severity::Warning),
            span(15, 27, &[Category::PhraseRepeat], Severity::Warning),
        ];
        let html = render(text, &spans);
        assert_eq!(html.matches("<span").count(), 2);
        assert_eq!(html.matches(CLOSE_MARKER).count(), 2);
        assert!(html.contains(r#"data-categories="phrase-repeat""#));
        assert!(html.contains(r#"data-severity="warning""#));
        assert!(html.contains(">猫が好き</span>。"));
    }

    #[test]
    fn lists_every_category_in_the_marker() {
        let html = render(
            "猫猫",
            &[span(
                0,
                6,
                &[Category::WordRepeat, Category::PhraseRepeat],
                Severity::Error,
            )],
        );
        assert!(html.contains(r#"class="repeat word-repeat phrase-repeat severity-error""#));
    }

    #[test]
    fn escapes_inside_spans() {
        let html = render(
            "<b>",
            &[span(0, 3, &[Category::WordRepeat], Severity::Info)],
        );
        assert!(html.contains(">&lt;b&gt;</span>"));
    }

    #[test]
    fn skips_spans_off_char_boundaries() {
        let text = "猫だ";
        let html = render(text, &[span(1, 3, &[Category::WordRepeat], Severity::Info)]);
        assert_eq!(html, text);
    }

    #[test]
    fn strip_markers_inverts_render() {
        let text = "&amp; <猫>\n猫 \"quoted\" 'x'";
        let spans = [
            span(7, 12, &[Category::WordRepeat], Severity::Info),
            span(12, 15, &[Category::WordRepeat], Severity::Info),
        ];
        let html = render(text, &spans);
        assert!(html.contains("<span"));
        assert_eq!(strip_markers(&html), text);
    }
}
