//! Repetition detectors.
//!
//! Every rule reads the same immutable [`Document`] and returns its own flag
//! list, so rules can run in any order without changing the merged result.

use std::{
    collections::{hash_map::DefaultHasher, BTreeMap, HashMap, HashSet},
    hash::{Hash, Hasher},
    ops::Range,
};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    token::{ScriptClass, Token},
    Category, Config, LintError, RuleToggles, Severity,
};

/// Ruby readings in web-novel markup, e.g. `漢字《かんじ》`.
static RUBY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"《[^《》\n]*》").expect("static regex"));

/// A candidate repetition finding produced by one rule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Flag {
    pub start: usize,
    pub end: usize,
    pub category: Category,
    pub severity: Severity,
}

/// The closed set of repetition detectors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[serde(rename_all = "kebab-case")]
pub enum Rule {
    WordRepeat,
    PhraseRepeat,
    EndingRepeat,
}

impl Rule {
    pub const ALL: [Rule; 3] = [Rule::WordRepeat, Rule::PhraseRepeat, Rule::EndingRepeat];

    pub fn category(self) -> Category {
        match self {
            Rule::WordRepeat => Category::WordRepeat,
            Rule::PhraseRepeat => Category::PhraseRepeat,
            Rule::EndingRepeat => Category::EndingRepeat,
        }
    }

    pub fn is_enabled(self, toggles: &RuleToggles) -> bool {
        match self {
            Rule::WordRepeat => toggles.word_repeat,
            Rule::PhraseRepeat => toggles.phrase_repeat,
            Rule::EndingRepeat => toggles.ending_repeat,
        }
    }

    pub fn detect(self, document: &Document<'_>, config: &Config) -> Vec<Flag> {
        let flags = match self {
            Rule::WordRepeat => detect_word_repeat(document, config),
            Rule::PhraseRepeat => detect_phrase_repeat(document, config),
            Rule::EndingRepeat => detect_ending_repeat(document, config),
        };
        log::trace!("{self}: {} flags", flags.len());
        flags
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.category().fmt(f)
    }
}

/// Configuration pieces compiled once per linter.
#[derive(Debug, Clone)]
pub struct Filters {
    ignore_words: HashSet<String>,
    ignore_patterns: Vec<Regex>,
    skip_ruby: bool,
    terminators: Vec<char>,
}

impl Filters {
    pub fn compile(config: &Config) -> Result<Self, LintError> {
        let ignore_words = config
            .ignore_words
            .iter()
            .map(|w| config.normalize.apply(w.trim()))
            .filter(|w| !w.is_empty())
            .collect();

        let mut ignore_patterns = Vec::new();
        for pattern in &config.ignore_patterns {
            let pattern = pattern.trim();
            if pattern.is_empty() {
                continue;
            }
            let regex = Regex::new(pattern).map_err(|e| {
                LintError::InvalidConfig(format!("invalid ignore pattern `{pattern}`: {e}"))
            })?;
            ignore_patterns.push(regex);
        }

        Ok(Self {
            ignore_words,
            ignore_patterns,
            skip_ruby: config.skip_ruby,
            terminators: config.sentence_terminators.chars().collect(),
        })
    }

    fn masked_ranges(&self, text: &str) -> Vec<(usize, usize)> {
        let mut ranges = Vec::new();
        if self.skip_ruby {
            ranges.extend(RUBY_RE.find_iter(text).map(|m| (m.start(), m.end())));
        }
        for regex in &self.ignore_patterns {
            ranges.extend(
                regex
                    .find_iter(text)
                    .filter(|m| m.start() < m.end())
                    .map(|m| (m.start(), m.end())),
            );
        }
        ranges.sort_unstable();
        ranges
    }

    fn is_terminator(&self, ch: char) -> bool {
        self.terminators.contains(&ch)
    }
}

/// A lexical content token with its comparison key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexeme {
    /// Index into [`Document::tokens`].
    pub token: usize,
    /// Position among the non-whitespace tokens, punctuation included.
    pub ordinal: usize,
    pub key: String,
    pub sentence: usize,
    /// Eligible for the word-repeat rule.
    pub is_word: bool,
}

/// A sentence as a byte range plus the lexemes it contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence {
    pub start: usize,
    pub end: usize,
    pub lexemes: Range<usize>,
    pub terminated: bool,
}

/// Shared read-only view of one analysed text.
#[derive(Debug, Clone)]
pub struct Document<'t> {
    text: &'t str,
    tokens: Vec<Token<'t>>,
    lexemes: Vec<Lexeme>,
    sentences: Vec<Sentence>,
}

struct OpenSentence {
    start: usize,
    end: usize,
    first_lexeme: usize,
}

impl<'t> Document<'t> {
    pub fn new(text: &'t str, tokens: Vec<Token<'t>>, config: &Config, filters: &Filters) -> Self {
        let masked = mask_tokens(&tokens, &filters.masked_ranges(text));
        let mut lexemes = Vec::new();
        let mut sentences = Vec::new();
        let mut open: Option<OpenSentence> = None;
        let mut closing = false;
        let mut content_seen = 0usize;

        for (idx, token) in tokens.iter().enumerate() {
            let ordinal = content_seen;
            if !token.is_whitespace() {
                content_seen += 1;
            }
            if closing {
                let extends = token.class == ScriptClass::Symbol
                    && (is_closer(token.text) || terminal_char(token, filters).is_some());
                if extends {
                    if let Some(current) = open.as_mut() {
                        current.end = token.end;
                    }
                    continue;
                }
                close_sentence(&mut open, &mut sentences, lexemes.len(), true);
                closing = false;
            }
            if token.is_whitespace() {
                continue;
            }

            let current = open.get_or_insert(OpenSentence {
                start: token.start,
                end: token.end,
                first_lexeme: lexemes.len(),
            });
            current.end = token.end;

            if token.class.is_lexical() && !masked[idx] {
                let key = config.normalize.apply(token.text);
                let is_word = config.word_classes.contains(&token.class)
                    && key.chars().count() >= config.min_word_chars
                    && !filters.ignore_words.contains(&key);
                lexemes.push(Lexeme {
                    token: idx,
                    ordinal,
                    key,
                    sentence: sentences.len(),
                    is_word,
                });
            } else if is_sentence_end(&tokens, idx, filters) {
                closing = true;
            }
        }
        close_sentence(&mut open, &mut sentences, lexemes.len(), closing);

        Self {
            text,
            tokens,
            lexemes,
            sentences,
        }
    }

    pub fn text(&self) -> &'t str {
        self.text
    }

    pub fn tokens(&self) -> &[Token<'t>] {
        &self.tokens
    }

    pub fn lexemes(&self) -> &[Lexeme] {
        &self.lexemes
    }

    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    fn ordinals(&self) -> Vec<usize> {
        self.lexemes.iter().map(|l| l.ordinal).collect()
    }

    /// Byte range covered by `len` lexemes starting at lexeme `first`.
    fn lexeme_span(&self, first: usize, len: usize) -> (usize, usize) {
        let start = self.tokens[self.lexemes[first].token].start;
        let end = self.tokens[self.lexemes[first + len - 1].token].end;
        (start, end)
    }

    /// Ending pattern of a sentence: the last `count` lexemes, with a
    /// trailing hiragana run cut down to its sentence-final part.
    ///
    /// Sentences without a terminator (the tail of the text) have no ending.
    fn ending(&self, sentence: &Sentence, count: usize) -> Option<String> {
        if sentence.lexemes.is_empty() || !sentence.terminated {
            return None;
        }
        let from = sentence
            .lexemes
            .end
            .saturating_sub(count.max(1))
            .max(sentence.lexemes.start);
        let last = sentence.lexemes.end - 1;
        let keys: Vec<&str> = self.lexemes[from..sentence.lexemes.end]
            .iter()
            .enumerate()
            .map(|(offset, l)| {
                let token = &self.tokens[l.token];
                if from + offset == last && token.class == ScriptClass::Hiragana {
                    sentence_final(&l.key)
                } else {
                    l.key.as_str()
                }
            })
            .collect();
        Some(keys.join(" "))
    }
}

/// Common sentence-final auxiliaries, longest first.
const SENTENCE_FINALS: &[&str] = &[
    "でしょう",
    "ましょう",
    "のでした",
    "でした",
    "ました",
    "ません",
    "だった",
    "だろう",
    "のです",
    "のだ",
    "んだ",
    "です",
    "ます",
];

/// Cuts a hiragana run such as `ぐのだ` or `かだ` down to the part that ends
/// the sentence (`のだ`, `だ`). Unknown runs keep their final char.
fn sentence_final(run: &str) -> &str {
    if let Some(suffix) = SENTENCE_FINALS.iter().copied().find(|s| run.ends_with(s)) {
        return &run[run.len() - suffix.len()..];
    }
    match run.char_indices().last() {
        Some((idx, _)) => &run[idx..],
        None => run,
    }
}

fn close_sentence(
    open: &mut Option<OpenSentence>,
    sentences: &mut Vec<Sentence>,
    lexeme_count: usize,
    terminated: bool,
) {
    if let Some(current) = open.take() {
        sentences.push(Sentence {
            start: current.start,
            end: current.end,
            lexemes: current.first_lexeme..lexeme_count,
            terminated,
        });
    }
}

fn mask_tokens(tokens: &[Token<'_>], ranges: &[(usize, usize)]) -> Vec<bool> {
    let mut masked = vec![false; tokens.len()];
    for &(start, end) in ranges {
        let first = tokens.partition_point(|t| t.end <= start);
        for (idx, token) in tokens.iter().enumerate().skip(first) {
            if token.start >= end {
                break;
            }
            masked[idx] = true;
        }
    }
    masked
}

fn terminal_char(token: &Token<'_>, filters: &Filters) -> Option<char> {
    let mut chars = token.text.chars();
    let ch = chars.next()?;
    if chars.next().is_some() || !filters.is_terminator(ch) {
        return None;
    }
    Some(ch)
}

/// ASCII terminators only count before whitespace, a closer, another
/// terminator or the end of text, so `3.14` stays one sentence.
fn is_sentence_end(tokens: &[Token<'_>], idx: usize, filters: &Filters) -> bool {
    let token = &tokens[idx];
    if token.class != ScriptClass::Symbol {
        return false;
    }
    let Some(ch) = terminal_char(token, filters) else {
        return false;
    };
    if !ch.is_ascii() {
        return true;
    }
    match tokens.get(idx + 1) {
        None => true,
        Some(next) => {
            next.is_whitespace()
                || (next.class == ScriptClass::Symbol
                    && (is_closer(next.text) || terminal_char(next, filters).is_some()))
        }
    }
}

fn is_closer(text: &str) -> bool {
    matches!(
        text,
        "」" | "』"
            | "）"
            | ")"
            | "]"
            | "］"
            | "】"
            | "〕"
            | "〉"
            | "》"
            | "〟"
            | "”"
            | "’"
            | "\""
            | "'"
            | "｣"
    )
}

/// Content tokens strictly between an occurrence of `len` lexemes starting
/// at `earlier` and the one starting at `later`.
fn gap(ordinals: &[usize], earlier: usize, later: usize, len: usize) -> usize {
    ordinals[later] - ordinals[earlier + len - 1] - 1
}

/// Groups sorted occurrence positions (lexeme indices) into chains of
/// neighbours with at most `window` content tokens between them.
/// Occurrences overlapping the previous chain member are skipped.
fn chains(
    positions: &[usize],
    len: usize,
    window: usize,
    ordinals: &[usize],
) -> Vec<Vec<usize>> {
    let mut chains = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    for &pos in positions {
        match current.last() {
            Some(&last) if pos < last + len => continue,
            Some(&last) if gap(ordinals, last, pos, len) <= window => current.push(pos),
            Some(_) => {
                chains.push(std::mem::take(&mut current));
                current.push(pos);
            }
            None => current.push(pos),
        }
    }
    if !current.is_empty() {
        chains.push(current);
    }
    chains
}

fn nearest_gap(chain: &[usize], idx: usize, len: usize, ordinals: &[usize]) -> usize {
    let before = idx
        .checked_sub(1)
        .map(|prev| gap(ordinals, chain[prev], chain[idx], len));
    let after = chain
        .get(idx + 1)
        .map(|&next| gap(ordinals, chain[idx], next, len));
    match (before, after) {
        (Some(a), Some(b)) => a.min(b),
        (Some(gap), None) | (None, Some(gap)) => gap,
        (None, None) => usize::MAX,
    }
}

fn word_severity(gap: usize, window: usize) -> Severity {
    if gap == 0 {
        Severity::Error
    } else if gap <= window / 2 {
        Severity::Warning
    } else {
        Severity::Info
    }
}

fn detect_word_repeat(document: &Document<'_>, config: &Config) -> Vec<Flag> {
    let mut positions: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (pos, lexeme) in document.lexemes.iter().enumerate() {
        if lexeme.is_word {
            positions.entry(lexeme.key.as_str()).or_default().push(pos);
        }
    }

    let ordinals = document.ordinals();
    let min_members = config.min_repeat_count.max(2);
    let mut flags = Vec::new();
    for occurrences in positions.values() {
        if occurrences.len() < min_members {
            continue;
        }
        for chain in chains(occurrences, 1, config.window, &ordinals) {
            if chain.len() < min_members {
                continue;
            }
            for (idx, &pos) in chain.iter().enumerate() {
                let (start, end) = document.lexeme_span(pos, 1);
                flags.push(Flag {
                    start,
                    end,
                    category: Category::WordRepeat,
                    severity: word_severity(
                        nearest_gap(&chain, idx, 1, &ordinals),
                        config.window,
                    ),
                });
            }
        }
    }
    flags.sort_by_key(|f| (f.start, f.end));
    flags
}

struct PhraseGroup {
    first: usize,
    positions: Vec<usize>,
}

fn stable_hash64(lexemes: &[Lexeme]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for lexeme in lexemes {
        lexeme.key.hash(&mut hasher);
    }
    hasher.finish()
}

fn same_keys(a: &[Lexeme], b: &[Lexeme]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.key == y.key)
}

fn detect_phrase_repeat(document: &Document<'_>, config: &Config) -> Vec<Flag> {
    let lexemes = &document.lexemes;
    let min_len = config.min_phrase_len.max(1);
    let max_len = config.max_phrase_len.min(lexemes.len());
    if min_len > max_len {
        return Vec::new();
    }
    let window = config.effective_phrase_window();
    let ordinals = document.ordinals();
    let min_members = config.min_repeat_count.max(2);

    let mut covered = vec![false; lexemes.len()];
    let mut flags = Vec::new();

    for len in (min_len..=max_len).rev() {
        let mut buckets: HashMap<u64, Vec<PhraseGroup>> = HashMap::new();
        for start in 0..=lexemes.len() - len {
            let run = &lexemes[start..start + len];
            if run[0].sentence != run[len - 1].sentence {
                continue;
            }
            let bucket = buckets.entry(stable_hash64(run)).or_default();
            if let Some(group) = bucket
                .iter_mut()
                .find(|g| same_keys(&lexemes[g.first..g.first + len], run))
            {
                group.positions.push(start);
                continue;
            }
            bucket.push(PhraseGroup {
                first: start,
                positions: vec![start],
            });
        }

        let mut found = Vec::new();
        for group in buckets.values().flatten() {
            if group.positions.len() < min_members {
                continue;
            }
            for chain in chains(&group.positions, len, window, &ordinals) {
                if chain.len() < min_members {
                    continue;
                }
                for &start in &chain {
                    if covered[start..start + len].iter().all(|c| *c) {
                        continue;
                    }
                    found.push(start);
                }
            }
        }

        found.sort_unstable();
        let severity = if len >= 2 * min_len {
            Severity::Error
        } else {
            Severity::Warning
        };
        for start in found {
            covered[start..start + len].iter_mut().for_each(|c| *c = true);
            let (from, to) = document.lexeme_span(start, len);
            flags.push(Flag {
                start: from,
                end: to,
                category: Category::PhraseRepeat,
                severity,
            });
        }
    }

    flags.sort_by_key(|f| (f.start, f.end));
    flags
}

fn detect_ending_repeat(document: &Document<'_>, config: &Config) -> Vec<Flag> {
    let sentences = &document.sentences;
    let min_run = config.ending_run.max(2);
    let endings: Vec<Option<String>> = sentences
        .iter()
        .map(|s| document.ending(s, config.ending_tokens))
        .collect();

    let mut flags = Vec::new();
    let mut run_start = 0usize;
    for idx in 1..=endings.len() {
        let continues = idx < endings.len()
            && endings[idx].is_some()
            && endings[idx] == endings[run_start];
        if continues {
            continue;
        }
        let run_len = idx - run_start;
        if endings[run_start].is_some() && run_len >= min_run {
            let severity = if run_len >= min_run + 2 {
                Severity::Error
            } else {
                Severity::Warning
            };
            for sentence in &sentences[run_start..idx] {
                flags.push(Flag {
                    start: sentence.start,
                    end: sentence.end,
                    category: Category::EndingRepeat,
                    severity,
                });
            }
        }
        run_start = idx;
    }
    flags
}
