use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

use handbook_cli::{
    init_tracing, load_settings, parse_repl_line, render_answer, render_settings, render_stats, ReplCommand, REPL_HELP,
};
use handbook_core::config::{AnswerMode, Settings};
use handbook_core::error::Error;
use handbook_qa::{open_engine, QaEngine, QueryOptions};

#[derive(Parser)]
#[command(name = "handbook-qa", about = "Ask questions about the employee handbook")]
struct Cli {
    /// Directory holding config.toml; relative paths resolve against it.
    #[arg(long, global = true, env = "HANDBOOK_CONFIG_DIR", default_value = ".")]
    config_dir: PathBuf,
    /// Answer mode: extractive (free) or generative (paid).
    #[arg(long, global = true)]
    mode: Option<AnswerMode>,
    /// Number of chunks to retrieve per question.
    #[arg(long, global = true)]
    top_k: Option<usize>,
    /// Skip the answer cache.
    #[arg(long, global = true)]
    no_cache: bool,
    /// Rebuild the index from the document before answering.
    #[arg(long, global = true)]
    rebuild: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer a single question.
    Ask {
        question: Vec<String>,
        /// Print the answer and sources as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Interactive question session.
    Repl,
    /// Print the effective configuration.
    Config,
}

impl Cli {
    fn apply_overrides(&self, settings: &mut Settings) {
        if let Some(mode) = self.mode {
            settings.llm.mode = mode;
        }
        if let Some(k) = self.top_k {
            settings.retrieval.top_k = k;
        }
        if self.no_cache {
            settings.cache.enabled = false;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut settings = load_settings(&cli.config_dir)?;
    cli.apply_overrides(&mut settings);

    match &cli.command {
        Command::Config => {
            println!("{}", render_settings(&settings));
            if let Err(e) = settings.validate() {
                println!("\nConfiguration error: {e}");
            }
        }
        Command::Ask { question, json } => {
            let question = question.join(" ");
            if question.trim().is_empty() {
                anyhow::bail!("no question given");
            }
            let engine = open_engine(&settings, cli.rebuild).await?;
            let answer = engine.answer(&question, &QueryOptions::from_settings(&settings)).await.map_err(|e| {
                report_error(&e);
                e
            })?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                println!("{}", render_answer(&answer));
            }
        }
        Command::Repl => {
            let engine = open_engine(&settings, cli.rebuild).await?;
            repl(&engine, QueryOptions::from_settings(&settings)).await?;
        }
    }
    Ok(())
}

async fn repl(engine: &QaEngine, mut options: QueryOptions) -> anyhow::Result<()> {
    println!("Employee handbook Q&A ({} mode, {} chunks indexed)", options.mode, engine.index().len());
    println!("{REPL_HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else { break };
        match parse_repl_line(&line) {
            Ok(ReplCommand::Empty) => {}
            Ok(ReplCommand::Quit) => break,
            Ok(ReplCommand::Help) => println!("{REPL_HELP}"),
            Ok(ReplCommand::Clear) => {
                engine.clear_cache();
                println!("Cache cleared.");
            }
            Ok(ReplCommand::Stats) => println!("{}", render_stats(&engine.stats())),
            Ok(ReplCommand::Mode(mode)) => {
                options = options.with_mode(mode);
                println!("Mode: {mode}");
                if mode == AnswerMode::Generative && !engine.has_language_model() {
                    println!("No language model configured; set OPENAI_API_KEY to use generative mode.");
                }
            }
            Ok(ReplCommand::Ask(question)) => match engine.answer(&question, &options).await {
                Ok(answer) => println!("{}", render_answer(&answer)),
                Err(e) => report_error(&e),
            },
            Err(msg) => println!("{msg}"),
        }
    }
    Ok(())
}

fn report_error(e: &Error) {
    eprintln!("Error: {e}");
    if e.is_generation() {
        eprintln!("Hint: switch to extractive mode (--mode extractive, or :mode extractive in the REPL).");
    }
}
