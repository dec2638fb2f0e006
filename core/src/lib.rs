//! repeatlint core analysis engine.
//! Flags unintentional repetition in prose (tuned for Japanese long-form
//! writing) and renders the input as escaped markup with highlighted spans.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod merge;
pub mod render;
pub mod rules;
pub mod token;

pub use merge::{merge, Span};
pub use render::{render, strip_markers};
pub use rules::{Document, Filters, Flag, Rule};
pub use token::{
    decode_utf8, tokenize, tokenize_bytes, ScriptClass, Token, TokenKind, Tokenizer,
};

/// Errors surfaced by the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LintError {
    /// The input bytes are not valid UTF-8.
    #[error("input is not valid UTF-8 (invalid byte at offset {offset})")]
    InvalidInput { offset: usize },
    /// Configuration values or patterns were rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Rule category identifiers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    WordRepeat,
    PhraseRepeat,
    EndingRepeat,
}

impl Category {
    /// Human-readable label used in marker tooltips.
    pub fn label(&self) -> &'static str {
        match self {
            Category::WordRepeat => "同じ単語の繰り返し",
            Category::PhraseRepeat => "同じ語句の繰り返し",
            Category::EndingRepeat => "文末表現の繰り返し",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Category::WordRepeat => "word-repeat",
            Category::PhraseRepeat => "phrase-repeat",
            Category::EndingRepeat => "ending-repeat",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for Category {
    type Err = LintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "word-repeat" | "word" => Ok(Category::WordRepeat),
            "phrase-repeat" | "phrase" => Ok(Category::PhraseRepeat),
            "ending-repeat" | "ending" => Ok(Category::EndingRepeat),
            other => Err(LintError::InvalidConfig(format!("unknown rule `{other}`"))),
        }
    }
}

/// Severity of a finding, ordered from least to most severe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Info => "軽度",
            Severity::Warning => "注意",
            Severity::Error => "要修正",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(name)
    }
}

/// Text normalization applied before tokens are compared.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Normalization {
    pub fold_case: bool,
    /// Map fullwidth ASCII (`ＡＢＣ１２３`) onto its halfwidth form.
    pub fold_width: bool,
}

impl Default for Normalization {
    fn default() -> Self {
        Self {
            fold_case: true,
            fold_width: true,
        }
    }
}

impl Normalization {
    pub fn apply(&self, text: &str) -> String {
        let folded: String = if self.fold_width {
            text.chars().map(fold_width_char).collect()
        } else {
            text.to_string()
        };
        if self.fold_case {
            folded.to_lowercase()
        } else {
            folded
        }
    }
}

fn fold_width_char(ch: char) -> char {
    match ch {
        '\u{FF01}'..='\u{FF5E}' => char::from_u32(ch as u32 - 0xFEE0).unwrap_or(ch),
        _ => ch,
    }
}

/// Per-rule enable switches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RuleToggles {
    pub word_repeat: bool,
    pub phrase_repeat: bool,
    pub ending_repeat: bool,
}

impl Default for RuleToggles {
    fn default() -> Self {
        Self {
            word_repeat: true,
            phrase_repeat: true,
            ending_repeat: true,
        }
    }
}

impl RuleToggles {
    pub fn set(&mut self, category: Category, enabled: bool) {
        match category {
            Category::WordRepeat => self.word_repeat = enabled,
            Category::PhraseRepeat => self.phrase_repeat = enabled,
            Category::EndingRepeat => self.ending_repeat = enabled,
        }
    }
}

/// Top-level configuration for the linter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Maximum number of content tokens between two occurrences of a word.
    pub window: usize,
    /// Separate window for phrase repeats; falls back to `window`.
    pub phrase_window: Option<usize>,
    /// Shortest phrase in lexemes. Zero is treated as one.
    pub min_phrase_len: usize,
    pub max_phrase_len: usize,
    /// Occurrences needed in a chain before anything is flagged.
    pub min_repeat_count: usize,
    /// Consecutive sentences sharing an ending needed to flag them.
    pub ending_run: usize,
    /// Trailing content tokens that make up a sentence ending (1 or 2).
    pub ending_tokens: usize,
    pub sentence_terminators: String,
    pub normalize: Normalization,
    /// Script classes treated as words by the word-repeat rule.
    pub word_classes: Vec<ScriptClass>,
    pub min_word_chars: usize,
    pub ignore_words: Vec<String>,
    /// Strings kept as single tokens, such as character names.
    pub user_words: Vec<String>,
    /// Regular expressions whose matches are excluded from every rule.
    pub ignore_patterns: Vec<String>,
    /// Exclude ruby readings written as `《かな》`.
    pub skip_ruby: bool,
    pub rules: RuleToggles,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window: 24,
            phrase_window: None,
            min_phrase_len: 3,
            max_phrase_len: 8,
            min_repeat_count: 2,
            ending_run: 3,
            ending_tokens: 1,
            sentence_terminators: "。．！？.!?".into(),
            normalize: Normalization::default(),
            word_classes: vec![
                ScriptClass::Han,
                ScriptClass::Katakana,
                ScriptClass::Alphanumeric,
                ScriptClass::Hangul,
                ScriptClass::Lexicon,
            ],
            min_word_chars: 1,
            ignore_words: Vec::new(),
            user_words: Vec::new(),
            ignore_patterns: Vec::new(),
            skip_ruby: true,
            rules: RuleToggles::default(),
        }
    }
}

const MAX_PHRASE_LEN_LIMIT: usize = 64;

impl Config {
    /// Parses a YAML document. An empty document yields the defaults.
    pub fn from_yaml_str(text: &str) -> Result<Self, LintError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(text).map_err(config_error)?;
        config.validate()?;
        Ok(config)
    }

    /// Returns a copy with a partial configuration mapping deep-merged on top.
    pub fn merged(&self, overrides: &serde_yaml::Value) -> Result<Self, LintError> {
        if overrides.is_null() {
            return Ok(self.clone());
        }
        if !overrides.is_mapping() {
            return Err(LintError::InvalidConfig(
                "configuration overrides must be a mapping".into(),
            ));
        }
        let mut base = serde_yaml::to_value(self).map_err(config_error)?;
        merge_yaml(&mut base, overrides);
        let config: Config = serde_yaml::from_value(base).map_err(config_error)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LintError> {
        if self.max_phrase_len < self.min_phrase_len {
            return Err(LintError::InvalidConfig(format!(
                "max_phrase_len ({}) is smaller than min_phrase_len ({})",
                self.max_phrase_len, self.min_phrase_len
            )));
        }
        if self.max_phrase_len > MAX_PHRASE_LEN_LIMIT {
            return Err(LintError::InvalidConfig(format!(
                "max_phrase_len must not exceed {MAX_PHRASE_LEN_LIMIT}"
            )));
        }
        if self.min_repeat_count < 2 {
            return Err(LintError::InvalidConfig(
                "min_repeat_count must be at least 2".into(),
            ));
        }
        if self.ending_run < 2 {
            return Err(LintError::InvalidConfig(
                "ending_run must be at least 2".into(),
            ));
        }
        if !(1..=2).contains(&self.ending_tokens) {
            return Err(LintError::InvalidConfig(
                "ending_tokens must be 1 or 2".into(),
            ));
        }
        Ok(())
    }

    pub fn effective_phrase_window(&self) -> usize {
        self.phrase_window.unwrap_or(self.window)
    }
}

fn config_error(err: serde_yaml::Error) -> LintError {
    LintError::InvalidConfig(err.to_string())
}

fn merge_yaml(base: &mut serde_yaml::Value, overlay: &serde_yaml::Value) {
    match (base, overlay) {
        (serde_yaml::Value::Mapping(base_map), serde_yaml::Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => merge_yaml(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Location metadata in 1-based line/column coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

pub fn byte_to_location(text: &str, byte_offset: usize) -> Location {
    let byte_offset = byte_offset.min(text.len());
    let mut line = 1;
    let mut last_newline = 0;
    for (idx, ch) in text.char_indices() {
        if idx >= byte_offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            last_newline = idx + 1;
        }
    }
    let column = text
        .get(last_newline..byte_offset)
        .map_or(0, |s| s.chars().count())
        + 1;
    Location { line, column }
}

/// Findings for one text, before rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub token_count: usize,
    pub sentence_count: usize,
    pub flags: Vec<Flag>,
    pub spans: Vec<Span>,
    pub category_counts: BTreeMap<Category, usize>,
}

impl Analysis {
    pub fn is_clean(&self) -> bool {
        self.spans.is_empty()
    }
}

/// Linter holds a validated configuration and its compiled matchers.
/// It has no interior mutability and can be shared across threads.
#[derive(Debug, Clone)]
pub struct Linter {
    config: Config,
    tokenizer: Tokenizer,
    filters: Filters,
}

impl Linter {
    pub fn new(config: Config) -> Result<Self, LintError> {
        config.validate()?;
        let tokenizer = Tokenizer::with_user_words(&config.user_words);
        let filters = Filters::compile(&config)?;
        Ok(Self {
            config,
            tokenizer,
            filters,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Builds a linter for one call with a partial configuration on top.
    pub fn with_overrides(&self, overrides: &serde_yaml::Value) -> Result<Self, LintError> {
        Self::new(self.config.merged(overrides)?)
    }

    pub fn analyze(&self, text: &str) -> Analysis {
        let tokens = self.tokenizer.tokenize(text);
        let document = Document::new(text, tokens, &self.config, &self.filters);

        let mut flags = Vec::new();
        for rule in Rule::ALL {
            if rule.is_enabled(&self.config.rules) {
                flags.extend(rule.detect(&document, &self.config));
            }
        }
        let spans = merge(&flags, document.tokens());

        let mut category_counts: BTreeMap<Category, usize> = BTreeMap::new();
        for flag in &flags {
            *category_counts.entry(flag.category).or_default() += 1;
        }

        log::debug!(
            "analyzed {} bytes: {} tokens, {} lexemes, {} sentences, {} flags, {} spans",
            text.len(),
            document.tokens().len(),
            document.lexemes().len(),
            document.sentences().len(),
            flags.len(),
            spans.len()
        );

        Analysis {
            token_count: document.tokens().len(),
            sentence_count: document.sentences().len(),
            flags,
            spans,
            category_counts,
        }
    }

    /// Returns `text` as escaped markup with repetitions highlighted.
    pub fn lint(&self, text: &str) -> String {
        let analysis = self.analyze(text);
        render(text, &analysis.spans)
    }

    pub fn lint_bytes(&self, bytes: &[u8]) -> Result<String, LintError> {
        let text = token::decode_utf8(bytes)?;
        Ok(self.lint(text))
    }

    /// Serves one boundary request.
    pub fn handle(&self, request: &LintRequest) -> LintResponse {
        let result = match &request.config {
            Some(overrides) => serde_yaml::to_value(overrides)
                .map_err(config_error)
                .and_then(|value| self.with_overrides(&value))
                .map(|linter| linter.lint(&request.text)),
            None => Ok(self.lint(&request.text)),
        };
        LintResponse::from(result)
    }
}

/// Lints `text` with the default configuration plus optional overrides.
pub fn lint(text: &str, overrides: Option<&serde_yaml::Value>) -> Result<String, LintError> {
    let config = match overrides {
        Some(value) => Config::default().merged(value)?,
        None => Config::default(),
    };
    Ok(Linter::new(config)?.lint(text))
}

/// Request shape used when the engine sits behind a process boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LintRequest {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum LintResponse {
    Markup { markup: String },
    Error { error: String },
}

impl From<Result<String, LintError>> for LintResponse {
    fn from(result: Result<String, LintError>) -> Self {
        match result {
            Ok(markup) => LintResponse::Markup { markup },
            Err(err) => LintResponse::Error {
                error: err.to_string(),
            },
        }
    }
}
