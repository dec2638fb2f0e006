use std::{
    collections::BTreeMap,
    fs,
    io::{self, Read},
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context};
use clap::{ArgAction, Parser};
use console::style;
use globset::{Glob, GlobSet, GlobSetBuilder};
use repeatlint_core::{
    byte_to_location, decode_utf8, render, Analysis, Category, Config, LintRequest, LintResponse,
    Linter, Severity,
};
use serde::Serialize;
use serde_yaml::{Mapping, Value as YamlValue};
use walkdir::WalkDir;

const HTML_HEAD: &str = r#"<!DOCTYPE html>
<html lang="ja">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>repeatlint</title>
    <style>
        body {
            color: #ddd;
            background-color: #333;
            font-size: 16px;
            line-height: 28px;
            max-width: 584px;
            margin-left: auto;
            margin-right: auto;
        }
        h2 {
            font-size: 14px;
            color: #999;
        }
        .novel-body {
            white-space: pre-wrap;
            line-break: strict;
            padding-left: 12px;
            padding-right: 12px;
            font-family: '游明朝',YuMincho,'ヒラギノ明朝 ProN','Hiragino Mincho ProN',HiraMinProN-W3,'HG明朝B',serif;
        }
        .repeat.severity-info {
            background-color: #553;
        }
        .repeat.severity-warning {
            background-color: #735;
        }
        .repeat.severity-error {
            background-color: #933;
        }
    </style>
</head>
<body>
"#;

const HTML_FOOT: &str = "</body>\n</html>\n";

/// repeatlint CLI entry point.
#[derive(Debug, Parser)]
#[command(
    name = "repeatlint",
    about = "Highlight unintentional repetition in Japanese prose."
)]
struct Args {
    /// Path to config file (YAML). Defaults to repeatlint.yml if present.
    #[arg(long, default_value = "repeatlint.yml")]
    config: PathBuf,

    /// Emit a JSON report.
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    /// Print the annotated markup instead of a report.
    #[arg(long, action = ArgAction::SetTrue)]
    markup: bool,

    /// Write a standalone HTML page with the annotated text.
    #[arg(long, value_name = "FILE")]
    html: Option<PathBuf>,

    /// Read one JSON lint request from stdin and print the JSON response.
    #[arg(long, action = ArgAction::SetTrue)]
    request: bool,

    /// Strict mode: exit non-zero when anything is highlighted.
    #[arg(long, action = ArgAction::SetTrue)]
    strict: bool,

    /// Suppress the per-file report.
    #[arg(long, action = ArgAction::SetTrue)]
    quiet: bool,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Files or directories to lint. `-` or nothing reads stdin.
    #[arg(value_name = "PATH", num_args = 0..)]
    paths: Vec<PathBuf>,

    /// Enable only these rules (comma-separated). Implies disabling others.
    #[arg(long, value_delimiter = ',', value_name = "RULE[,RULE]")]
    only: Vec<String>,

    /// Disable rules (comma-separated).
    #[arg(long, value_delimiter = ',', value_name = "RULE[,RULE]")]
    disable: Vec<String>,

    /// Set config overrides (repeatable as key=value). Example: --set normalize.fold_case=false
    #[arg(long = "set", value_name = "KEY=VALUE")]
    sets: Vec<String>,

    /// Skip paths matching these globs.
    #[arg(long, value_name = "GLOB")]
    exclude: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Input {
    Stdin,
    File(PathBuf),
}

impl Input {
    fn name(&self) -> String {
        match self {
            Input::Stdin => "<stdin>".to_string(),
            Input::File(path) => path.to_string_lossy().replace('\\', "/"),
        }
    }

    fn read(&self) -> anyhow::Result<Vec<u8>> {
        match self {
            Input::Stdin => {
                let mut buf = Vec::new();
                io::stdin()
                    .read_to_end(&mut buf)
                    .context("Failed to read stdin")?;
                Ok(buf)
            }
            Input::File(path) => {
                fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct SpanReport {
    start: usize,
    end: usize,
    line: usize,
    column: usize,
    text: String,
    categories: Vec<Category>,
    severity: Severity,
}

#[derive(Debug, Serialize)]
struct FileResult {
    path: String,
    token_count: usize,
    sentence_count: usize,
    category_counts: BTreeMap<Category, usize>,
    spans: Vec<SpanReport>,
}

#[derive(Debug, Serialize)]
struct OutputReport {
    files: Vec<FileResult>,
    total_spans: usize,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);
    let flagged = run(args)?;
    if flagged {
        std::process::exit(1);
    }
    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

/// Returns true when the process should exit with a failure status.
fn run(args: Args) -> anyhow::Result<bool> {
    let mut cfg = load_config(&args.config)?;
    apply_rule_filters(&mut cfg, &args.only, &args.disable)?;
    let cfg = apply_overrides(cfg, &args.sets)?;
    let linter = Linter::new(cfg).context("Invalid configuration")?;

    if args.request {
        return serve_request(&linter);
    }

    let ignore = build_ignore_set(&args.exclude)?;
    let inputs = collect_inputs(&args.paths, ignore.as_ref())?;
    log::info!("linting {} input(s)", inputs.len());

    let mut file_reports = Vec::new();
    let mut pages = Vec::new();
    let mut total_spans = 0usize;

    for input in &inputs {
        let bytes = input.read()?;
        let text = decode_utf8(&bytes).with_context(|| format!("Cannot lint {}", input.name()))?;
        let analysis = linter.analyze(text);
        total_spans += analysis.spans.len();

        if args.markup {
            print!("{}", render(text, &analysis.spans));
        } else if !args.quiet && !args.json {
            print_human_report(&input.name(), text, &analysis);
        }
        if args.html.is_some() {
            pages.push((input.name(), render(text, &analysis.spans)));
        }
        file_reports.push(file_result(input.name(), text, &analysis));
    }

    if let Some(path) = &args.html {
        fs::write(path, html_page(&pages))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("wrote {}", path.display());
    }

    if args.json {
        let output = OutputReport {
            files: file_reports,
            total_spans,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if !args.quiet && !args.markup {
        println!(
            "\n{} file(s), {} highlighted span(s)",
            inputs.len(),
            total_spans
        );
    }

    Ok(args.strict && total_spans > 0)
}

fn serve_request(linter: &Linter) -> anyhow::Result<bool> {
    let bytes = Input::Stdin.read()?;
    let request: LintRequest =
        serde_json::from_slice(&bytes).context("Failed to parse lint request JSON")?;
    let response = linter.handle(&request);
    println!("{}", serde_json::to_string(&response)?);
    Ok(matches!(response, LintResponse::Error { .. }))
}

fn file_result(path: String, text: &str, analysis: &Analysis) -> FileResult {
    let spans = analysis
        .spans
        .iter()
        .map(|span| {
            let loc = byte_to_location(text, span.start);
            SpanReport {
                start: span.start,
                end: span.end,
                line: loc.line,
                column: loc.column,
                text: text[span.start..span.end].to_string(),
                categories: span.categories.iter().copied().collect(),
                severity: span.severity,
            }
        })
        .collect();
    FileResult {
        path,
        token_count: analysis.token_count,
        sentence_count: analysis.sentence_count,
        category_counts: analysis.category_counts.clone(),
        spans,
    }
}

fn print_human_report(name: &str, text: &str, analysis: &Analysis) {
    if analysis.is_clean() {
        println!("{} {}", style(name).cyan(), style("clean").green());
        return;
    }
    println!(
        "{} {} span(s)",
        style(name).cyan().bold(),
        analysis.spans.len()
    );
    for span in &analysis.spans {
        let loc = byte_to_location(text, span.start);
        let severity = match span.severity {
            Severity::Error => style(span.severity.to_string()).red().bold(),
            Severity::Warning => style(span.severity.to_string()).yellow(),
            Severity::Info => style(span.severity.to_string()).dim(),
        };
        let categories: Vec<String> = span.categories.iter().map(|c| c.to_string()).collect();
        let excerpt: String = text[span.start..span.end]
            .chars()
            .map(|c| if c.is_whitespace() { ' ' } else { c })
            .take(40)
            .collect();
        println!(
            "  {}:{} {} [{}] 「{}」",
            loc.line,
            loc.column,
            severity,
            categories.join(", "),
            excerpt
        );
    }
}

fn html_page(pages: &[(String, String)]) -> String {
    let mut out = String::from(HTML_HEAD);
    for (name, markup) in pages {
        if pages.len() > 1 {
            out.push_str(&format!(
                "<h2>{}</h2>\n",
                html_escape::encode_text(name)
            ));
        }
        out.push_str("<div class=\"novel-body\">");
        out.push_str(markup);
        out.push_str("</div>\n");
    }
    out.push_str(HTML_FOOT);
    out
}

fn build_ignore_set(patterns: &[String]) -> anyhow::Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob `{pattern}`"))?);
    }
    Ok(Some(builder.build()?))
}

fn collect_inputs(paths: &[PathBuf], ignore: Option<&GlobSet>) -> anyhow::Result<Vec<Input>> {
    if paths.is_empty() {
        return Ok(vec![Input::Stdin]);
    }
    let mut inputs = Vec::new();
    for path in paths {
        if path.as_os_str() == "-" {
            inputs.push(Input::Stdin);
        } else if path.is_dir() {
            let mut found = Vec::new();
            let mut walker = WalkDir::new(path).into_iter();
            while let Some(entry_res) = walker.next() {
                let entry = entry_res?;
                let entry_path = entry.path();
                if ignore.is_some_and(|set| set.is_match(entry_path)) {
                    if entry.file_type().is_dir() {
                        walker.skip_current_dir();
                    }
                    continue;
                }
                if entry.file_type().is_file() && is_supported(entry_path) {
                    found.push(Input::File(entry_path.to_path_buf()));
                }
            }
            found.sort();
            inputs.extend(found);
        } else if path.is_file() {
            if ignore.is_some_and(|set| set.is_match(path)) {
                continue;
            }
            inputs.push(Input::File(path.clone()));
        } else {
            return Err(anyhow!("No such file or directory: {}", path.display()));
        }
    }
    Ok(inputs)
}

fn is_supported(path: &Path) -> bool {
    match path.extension().and_then(|s| s.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "txt" | "text" | "md" | "markdown"
        ),
        None => false,
    }
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        log::debug!("{} not found, using defaults", path.display());
        return Ok(Config::default());
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    Config::from_yaml_str(&text).with_context(|| format!("Invalid config {}", path.display()))
}

fn parse_categories(names: &[String]) -> anyhow::Result<Vec<Category>> {
    names
        .iter()
        .filter(|n| !n.trim().is_empty())
        .map(|n| n.parse::<Category>().map_err(anyhow::Error::from))
        .collect()
}

fn apply_rule_filters(cfg: &mut Config, only: &[String], disable: &[String]) -> anyhow::Result<()> {
    let only = parse_categories(only)?;
    let disable = parse_categories(disable)?;
    if !only.is_empty() {
        for category in [
            Category::WordRepeat,
            Category::PhraseRepeat,
            Category::EndingRepeat,
        ] {
            cfg.rules.set(category, only.contains(&category));
        }
    }
    for category in disable {
        cfg.rules.set(category, false);
    }
    Ok(())
}

/// Folds `key.path=value` pairs into one mapping and merges it over `cfg`.
fn apply_overrides(cfg: Config, sets: &[String]) -> anyhow::Result<Config> {
    let mut overrides = Mapping::new();
    for kv in sets {
        let (key, val) = kv
            .split_once('=')
            .ok_or_else(|| anyhow!("Override `{kv}` is not KEY=VALUE"))?;
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value: YamlValue = serde_yaml::from_str(val.trim())
            .unwrap_or_else(|_| YamlValue::String(val.trim().to_string()));
        insert_path(&mut overrides, key, value);
    }
    if overrides.is_empty() {
        return Ok(cfg);
    }
    cfg.merged(&YamlValue::Mapping(overrides))
        .context("Invalid --set override")
}

fn insert_path(map: &mut Mapping, key: &str, value: YamlValue) {
    match key.split_once('.') {
        None => {
            map.insert(YamlValue::String(key.to_string()), value);
        }
        Some((head, rest)) => {
            let entry = map
                .entry(YamlValue::String(head.to_string()))
                .or_insert_with(|| YamlValue::Mapping(Mapping::new()));
            if !entry.is_mapping() {
                *entry = YamlValue::Mapping(Mapping::new());
            }
            if let YamlValue::Mapping(inner) = entry {
                insert_path(inner, rest, value);
            }
        }
    }
}
