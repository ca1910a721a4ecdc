//! Shared plumbing for the handbook binaries: logging, settings and output.
use std::fmt::Write as _;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use handbook_core::config::{has_api_key, AnswerMode, Config, Settings};
use handbook_qa::{Answer, EngineStats};

/// Install the fmt subscriber. `RUST_LOG` overrides the default `info` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

/// Load settings from `config.toml` (plus env overlays) in `dir`; relative
/// paths resolve against `dir`.
pub fn load_settings(dir: &Path) -> anyhow::Result<Settings> {
    let config = Config::load_from(dir)?;
    Ok(config.settings(dir)?)
}

pub fn render_answer(answer: &Answer) -> String {
    let mut out = answer.text.clone();
    if answer.sources.is_empty() {
        return out;
    }
    out.push_str("\n\nSources:");
    for source in &answer.sources {
        let _ = write!(out, "\n  Page {}", source.page);
        if let Some(section) = &source.section {
            let _ = write!(out, " - {section}");
        }
        let _ = write!(out, " (Relevance: {:.2})", source.score);
        for line in source.content_preview.lines().filter(|l| !l.trim().is_empty()) {
            let _ = write!(out, "\n    {}", line.trim());
        }
    }
    out
}

pub fn render_settings(settings: &Settings) -> String {
    let mut out = String::from("Current configuration:");
    for (key, value) in settings.summary() {
        let _ = write!(out, "\n  {key}: {value}");
    }
    let key_state = if has_api_key() { "set" } else { "missing" };
    let _ = write!(out, "\n  openai_api_key: {key_state}");
    out
}

pub fn render_stats(stats: &EngineStats) -> String {
    format!(
        "Questions asked: {}\nCache hits: {}\nCache misses: {}\nCached answers: {}",
        stats.questions, stats.cache_hits, stats.cache_misses, stats.cached_answers
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Ask(String),
    Mode(AnswerMode),
    Clear,
    Stats,
    Help,
    Quit,
    Empty,
}

pub const REPL_HELP: &str = "Type a question, or one of:\n  :mode <extractive|generative>  switch answer mode (aliases free|paid)\n  :clear                         clear cached answers\n  :stats                         show usage counters\n  :quit                          exit";

pub fn parse_repl_line(line: &str) -> Result<ReplCommand, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(ReplCommand::Empty);
    }
    let Some(command) = line.strip_prefix(':') else {
        return Ok(ReplCommand::Ask(line.to_string()));
    };
    let mut parts = command.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("mode"), Some(mode)) => mode.parse().map(ReplCommand::Mode).map_err(|e| e.to_string()),
        (Some("mode"), None) => Err("usage: :mode <extractive|generative>".to_string()),
        (Some("clear"), None) => Ok(ReplCommand::Clear),
        (Some("stats"), None) => Ok(ReplCommand::Stats),
        (Some("help"), None) => Ok(ReplCommand::Help),
        (Some("quit" | "exit" | "q"), None) => Ok(ReplCommand::Quit),
        _ => Err(format!("unknown command ':{command}' (try :help)")),
    }
}
