use repeatlint_core::{strip_markers, Analysis, Category, Config, Linter, RuleToggles, Severity};

fn linter_with(cfg: Config) -> Linter {
    Linter::new(cfg).unwrap()
}

fn analyze(text: &str) -> Analysis {
    linter_with(Config::default()).analyze(text)
}

fn assert_has(analysis: &Analysis, category: Category) {
    assert!(
        analysis.spans.iter().any(|s| s.categories.contains(&category)),
        "expected category {category:?}, got spans: {:#?}",
        analysis.spans
    );
}

fn assert_not(analysis: &Analysis, category: Category) {
    assert!(
        analysis.spans.iter().all(|s| !s.categories.contains(&category)),
        "expected no category {category:?}, got spans: {:#?}",
        analysis.spans
    );
}

fn covered<'t>(text: &'t str, analysis: &Analysis) -> Vec<&'t str> {
    analysis.spans.iter().map(|s| &text[s.start..s.end]).collect()
}

#[test]
fn repeated_sentence_is_a_phrase_repeat() {
    let text = "猫が好き。猫が好き。";
    let analysis = analyze(text);
    assert_has(&analysis, Category::PhraseRepeat);
    assert_eq!(covered(text, &analysis), vec!["猫が好き", "猫が好き"]);

    let html = linter_with(Config::default()).lint(text);
    assert_eq!(html.matches("<span").count(), 2);
    assert_eq!(strip_markers(&html), text);
}

#[test]
fn empty_text_produces_nothing() {
    let analysis = analyze("");
    assert!(analysis.is_clean());
    assert_eq!(analysis.token_count, 0);
    assert_eq!(linter_with(Config::default()).lint(""), "");
}

#[test]
fn three_matching_endings_are_flagged() {
    let text = "雨だ。風だ。雪だ。";
    let analysis = analyze(text);
    assert_has(&analysis, Category::EndingRepeat);
    assert_not(&analysis, Category::PhraseRepeat);
    assert_eq!(covered(text, &analysis), vec!["雨だ。", "風だ。", "雪だ。"]);
}

#[test]
fn two_matching_endings_are_not_flagged() {
    assert!(analyze("雨だ。風だ。").is_clean());
}

#[test]
fn matching_endings_after_kana_are_flagged() {
    for text in [
        "彼はまだ子供だ。それは確かだ。もう春だ。",
        "静かだ。綺麗だ。元気だ。",
        "走るのだ。泳ぐのだ。飛ぶのだ。",
    ] {
        let analysis = analyze(text);
        assert_has(&analysis, Category::EndingRepeat);
        assert_eq!(analysis.spans.len(), 3, "{text}");
    }
}

#[test]
fn unterminated_last_sentence_is_not_an_ending() {
    assert!(analyze("雨だ。風だ。雪だ").is_clean());
}

#[test]
fn phrase_scenario_holds_for_short_minimum_lengths() {
    let text = "猫が好き。猫が好き。";
    for min_phrase_len in [1, 2, 3, 4] {
        let cfg = Config {
            window: 4,
            min_phrase_len,
            ..Config::default()
        };
        let analysis = linter_with(cfg).analyze(text);
        assert_has(&analysis, Category::PhraseRepeat);
        assert_eq!(covered(text, &analysis), vec!["猫が好き", "猫が好き"]);
    }
}

#[test]
fn punctuation_between_repeats_counts_toward_the_window() {
    let cfg = Config {
        window: 1,
        rules: RuleToggles {
            word_repeat: true,
            phrase_repeat: false,
            ending_repeat: false,
        },
        ..Config::default()
    };
    let linter = linter_with(cfg);
    assert!(linter.analyze("猫、。、。、猫").is_clean());
    assert_has(&linter.analyze("猫、猫"), Category::WordRepeat);
}

#[test]
fn markup_characters_are_escaped_without_markers() {
    let html = linter_with(Config::default()).lint("価格は<100>円 & 税");
    assert_eq!(html, "価格は&lt;100&gt;円 &amp; 税");
    assert!(!html.contains("<span"));
}

#[test]
fn single_occurrences_are_never_flagged() {
    assert!(analyze("今日は晴れ。明日は雨。").is_clean());
}

#[test]
fn punctuation_only_text_degrades_gracefully() {
    let text = "……！？「」";
    let analysis = analyze(text);
    assert!(analysis.is_clean());
    assert_eq!(linter_with(Config::default()).lint(text), text);
}

#[test]
fn layout_survives_rendering() {
    let text = "猫\n\n  犬\t鳥\r\n";
    assert_eq!(linter_with(Config::default()).lint(text), text);
}

#[test]
fn adjacent_words_render_as_errors() {
    let text = "cat cat";
    let analysis = analyze(text);
    assert_has(&analysis, Category::WordRepeat);
    assert!(analysis.spans.iter().all(|s| s.severity == Severity::Error));
    let html = linter_with(Config::default()).lint(text);
    assert!(html.contains("severity-error"));
}

#[test]
fn overlapping_findings_share_one_span() {
    let text = "猫が好き。猫が好き。";
    let analysis = analyze(text);
    assert_eq!(analysis.spans.len(), 2);
    for span in &analysis.spans {
        assert!(span.categories.contains(&Category::WordRepeat));
        assert!(span.categories.contains(&Category::PhraseRepeat));
    }
}

#[test]
fn ignore_words_silence_known_names() {
    let cfg = Config {
        ignore_words: vec!["猫".into(), "好".into()],
        ..Config::default()
    };
    let analysis = linter_with(cfg).analyze("猫が好き。猫が好き。");
    assert_not(&analysis, Category::WordRepeat);
    assert_has(&analysis, Category::PhraseRepeat);
}

#[test]
fn ruby_readings_do_not_count_as_repeats() {
    let text = "猫《ネコ》が鳴いた。ネコは寝た。";
    let analysis = analyze(text);
    assert!(analysis.is_clean(), "{:#?}", analysis.spans);

    let cfg = Config {
        skip_ruby: false,
        ..Config::default()
    };
    assert_has(&linter_with(cfg).analyze(text), Category::WordRepeat);
}

#[test]
fn user_words_are_highlighted_whole() {
    let cfg = Config {
        user_words: vec!["アリス".into(), "東京タワー".into()],
        ..Config::default()
    };
    let text = "東京タワーへ行った。東京タワーは高い。";
    let analysis = linter_with(cfg).analyze(text);
    assert_eq!(covered(text, &analysis), vec!["東京タワー", "東京タワー"]);
}

#[test]
fn distant_repeats_fall_outside_the_window() {
    let cfg = Config {
        window: 3,
        ..Config::default()
    };
    let text = "猫が来た。それから雨と風と雪と霧が来た。猫は寝た。";
    let analysis = linter_with(cfg).analyze(text);
    assert_not(&analysis, Category::WordRepeat);
}
