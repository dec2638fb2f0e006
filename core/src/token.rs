//! Script-aware tokenizer.
//!
//! Splits text into position-addressable tokens whose concatenation is the
//! original input. Segmentation of unspaced scripts is a heuristic: runs of
//! the same script class form one token, so a hiragana run keeps particles
//! and okurigana together (`るのだ`) and a kanji compound stays whole.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::LintError;

/// Whether a token carries text or layout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TokenKind {
    Content,
    Whitespace,
}

/// Script class of a token, decided by the first char of each grapheme.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[serde(rename_all = "kebab-case")]
pub enum ScriptClass {
    Alphanumeric,
    Han,
    Hiragana,
    Katakana,
    Hangul,
    /// Punctuation, brackets, emoji and anything else without a script.
    Symbol,
    /// A registered user word, kept whole across script boundaries.
    Lexicon,
    Whitespace,
}

impl ScriptClass {
    /// Classes whose adjacent graphemes join into one token.
    fn forms_runs(self) -> bool {
        !matches!(self, ScriptClass::Symbol | ScriptClass::Lexicon)
    }

    pub fn is_lexical(self) -> bool {
        !matches!(self, ScriptClass::Symbol | ScriptClass::Whitespace)
    }
}

impl std::fmt::Display for ScriptClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ScriptClass::Alphanumeric => "alphanumeric",
            ScriptClass::Han => "han",
            ScriptClass::Hiragana => "hiragana",
            ScriptClass::Katakana => "katakana",
            ScriptClass::Hangul => "hangul",
            ScriptClass::Symbol => "symbol",
            ScriptClass::Lexicon => "lexicon",
            ScriptClass::Whitespace => "whitespace",
        };
        f.write_str(name)
    }
}

/// One addressable unit of the input. Offsets are UTF-8 byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub start: usize,
    pub end: usize,
    pub text: &'a str,
    pub kind: TokenKind,
    pub class: ScriptClass,
}

impl Token<'_> {
    pub fn is_whitespace(&self) -> bool {
        self.kind == TokenKind::Whitespace
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Tokenizer with an optional lexicon of user words.
#[derive(Debug, Clone, Default)]
pub struct Tokenizer {
    lexicon: Option<AhoCorasick>,
}

impl Tokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers words that must stay single tokens, e.g. proper nouns such
    /// as `東京タワー` that would otherwise split at the script change.
    pub fn with_user_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words: Vec<String> = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_string())
            .filter(|w| !w.is_empty())
            .collect();
        let lexicon = if words.is_empty() {
            None
        } else {
            Some(
                AhoCorasickBuilder::new()
                    .match_kind(MatchKind::LeftmostLongest)
                    .build(&words),
            )
        };
        Self { lexicon }
    }

    pub fn tokenize<'a>(&self, text: &'a str) -> Vec<Token<'a>> {
        let hits: Vec<(usize, usize)> = match &self.lexicon {
            Some(matcher) => matcher
                .find_iter(text.as_bytes())
                .map(|m| (m.start(), m.end()))
                .collect(),
            None => Vec::new(),
        };
        let mut hits = hits.into_iter().peekable();

        let mut tokens = Vec::new();
        let mut pending: Option<Pending> = None;
        let mut skip_until = 0usize;

        for (idx, grapheme) in text.grapheme_indices(true) {
            let end = idx + grapheme.len();
            if idx < skip_until {
                if let Some(run) = pending.as_mut() {
                    run.end = end;
                }
                continue;
            }
            // Hits that begin inside a grapheme cluster cannot be honoured.
            while hits.peek().is_some_and(|&(start, _)| start < idx) {
                hits.next();
            }
            if let Some(&(start, hit_end)) = hits.peek() {
                if start == idx {
                    hits.next();
                    flush(text, &mut pending, &mut tokens);
                    pending = Some(Pending {
                        start: idx,
                        end,
                        class: ScriptClass::Lexicon,
                    });
                    skip_until = hit_end;
                    continue;
                }
            }

            let class = classify(grapheme);
            match pending.as_mut() {
                Some(run) if continues_run(run.class, class, grapheme) => run.end = end,
                _ => {
                    flush(text, &mut pending, &mut tokens);
                    pending = Some(Pending {
                        start: idx,
                        end,
                        class,
                    });
                }
            }
        }
        flush(text, &mut pending, &mut tokens);
        tokens
    }

    /// Tokenizes raw bytes, rejecting input that is not valid UTF-8.
    pub fn tokenize_bytes<'a>(&self, bytes: &'a [u8]) -> Result<Vec<Token<'a>>, LintError> {
        let text = decode_utf8(bytes)?;
        Ok(self.tokenize(text))
    }
}

/// Tokenizes with no user lexicon.
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    Tokenizer::new().tokenize(text)
}

/// Tokenizes raw bytes with no user lexicon.
pub fn tokenize_bytes(bytes: &[u8]) -> Result<Vec<Token<'_>>, LintError> {
    Tokenizer::new().tokenize_bytes(bytes)
}

/// Borrows `bytes` as text, reporting the first invalid byte offset.
pub fn decode_utf8(bytes: &[u8]) -> Result<&str, LintError> {
    std::str::from_utf8(bytes).map_err(|e| LintError::InvalidInput {
        offset: e.valid_up_to(),
    })
}

struct Pending {
    start: usize,
    end: usize,
    class: ScriptClass,
}

fn flush<'a>(text: &'a str, pending: &mut Option<Pending>, tokens: &mut Vec<Token<'a>>) {
    if let Some(run) = pending.take() {
        let kind = if run.class == ScriptClass::Whitespace {
            TokenKind::Whitespace
        } else {
            TokenKind::Content
        };
        tokens.push(Token {
            start: run.start,
            end: run.end,
            text: &text[run.start..run.end],
            kind,
            class: run.class,
        });
    }
}

fn continues_run(previous: ScriptClass, class: ScriptClass, grapheme: &str) -> bool {
    if previous == class {
        return class.forms_runs();
    }
    // The prolonged sound mark is shared by both kana scripts.
    grapheme == "ー" && matches!(previous, ScriptClass::Hiragana | ScriptClass::Katakana)
}

/// Classifies a grapheme cluster by its first char.
pub fn classify(grapheme: &str) -> ScriptClass {
    let Some(ch) = grapheme.chars().next() else {
        return ScriptClass::Symbol;
    };
    if ch.is_whitespace() {
        return ScriptClass::Whitespace;
    }
    match ch as u32 {
        0x3041..=0x309F => ScriptClass::Hiragana,
        // Katakana middle dot is punctuation.
        0x30FB => ScriptClass::Symbol,
        0x30A1..=0x30FF | 0x31F0..=0x31FF | 0xFF66..=0xFF9F => ScriptClass::Katakana,
        0x3005..=0x3007
        | 0x3400..=0x4DBF
        | 0x4E00..=0x9FFF
        | 0xF900..=0xFAFF
        | 0x20000..=0x3134F => ScriptClass::Han,
        0x1100..=0x11FF | 0x3130..=0x318F | 0xAC00..=0xD7AF => ScriptClass::Hangul,
        _ if ch.is_alphanumeric() => ScriptClass::Alphanumeric,
        _ => ScriptClass::Symbol,
    }
}
