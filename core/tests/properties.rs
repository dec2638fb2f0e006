use proptest::prelude::*;
use repeatlint_core::{
    merge, strip_markers, tokenize, Category, Config, Flag, Linter, RuleToggles, Severity,
};

const PIECES: &[&str] = &[
    "猫", "犬", "好", "雨", "が", "き", "だ", "は", "。", "、", "！", "「", "」", "ー", "カ",
    "タ", "a", "b", ".", " ", "\n", "<", ">", "&", "\"", "《", "》",
];

fn prose() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(PIECES), 0..48).prop_map(|parts| parts.concat())
}

fn category() -> impl Strategy<Value = Category> {
    prop_oneof![
        Just(Category::WordRepeat),
        Just(Category::PhraseRepeat),
        Just(Category::EndingRepeat),
    ]
}

fn severity() -> impl Strategy<Value = Severity> {
    prop_oneof![
        Just(Severity::Info),
        Just(Severity::Warning),
        Just(Severity::Error),
    ]
}

fn linter() -> Linter {
    Linter::new(Config::default()).unwrap()
}

proptest! {
    #[test]
    fn tokens_rebuild_the_input(text in prose()) {
        let rebuilt: String = tokenize(&text).iter().map(|t| t.text).collect();
        prop_assert_eq!(rebuilt, text);
    }

    #[test]
    fn stripping_markers_restores_the_input(text in prose()) {
        let html = linter().lint(&text);
        prop_assert_eq!(strip_markers(&html), text);
    }

    #[test]
    fn linting_is_deterministic(text in prose()) {
        let linter = linter();
        prop_assert_eq!(linter.lint(&text), linter.lint(&text));
    }

    #[test]
    fn spans_are_sorted_disjoint_and_aligned(text in prose()) {
        let analysis = linter().analyze(&text);
        for span in &analysis.spans {
            prop_assert!(span.start < span.end);
            prop_assert!(text.is_char_boundary(span.start));
            prop_assert!(text.is_char_boundary(span.end));
        }
        for pair in analysis.spans.windows(2) {
            prop_assert!(pair[0].end <= pair[1].start);
        }
    }

    #[test]
    fn merge_ignores_flag_order(
        text in prose(),
        raw in prop::collection::vec((0usize..160, 0usize..24, category(), severity()), 0..12),
    ) {
        let tokens = tokenize(&text);
        let mut flags: Vec<Flag> = raw
            .into_iter()
            .map(|(start, len, category, severity)| Flag {
                start,
                end: start + len,
                category,
                severity,
            })
            .collect();
        let expected = merge(&flags, &tokens);
        for pair in expected.windows(2) {
            prop_assert!(pair[0].end <= pair[1].start);
        }
        flags.reverse();
        prop_assert_eq!(merge(&flags, &tokens), expected);
    }

    #[test]
    fn flagged_words_have_a_neighbour_within_the_window(text in prose(), window in 0usize..6) {
        let cfg = Config {
            window,
            rules: RuleToggles {
                word_repeat: true,
                phrase_repeat: false,
                ending_repeat: false,
            },
            ..Config::default()
        };
        let normalize = cfg.normalize.clone();
        let analysis = Linter::new(cfg).unwrap().analyze(&text);

        let content: Vec<(usize, String)> = tokenize(&text)
            .iter()
            .filter(|t| !t.is_whitespace())
            .map(|t| (t.start, normalize.apply(t.text)))
            .collect();
        for flag in &analysis.flags {
            let ordinal = content
                .iter()
                .position(|(start, _)| *start == flag.start)
                .expect("word flags start on a token");
            let key = &content[ordinal].1;
            let has_neighbour = content.iter().enumerate().any(|(other, (_, other_key))| {
                other != ordinal && other_key == key && other.abs_diff(ordinal) - 1 <= window
            });
            prop_assert!(has_neighbour, "{key:?} has no repeat within {window} in {text:?}");
        }
    }
}
