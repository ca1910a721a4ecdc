use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use handbook_cli::{init_tracing, load_settings};
use handbook_embed::load_embedder;
use handbook_qa::rebuild_index;

/// Extract, chunk and embed the handbook, then persist the vector index.
#[derive(Parser)]
#[command(name = "handbook-indexer")]
struct Args {
    /// Directory holding config.toml; relative paths resolve against it.
    #[arg(long, env = "HANDBOOK_CONFIG_DIR", default_value = ".")]
    config_dir: PathBuf,
    /// Document to index instead of `document.path`.
    #[arg(long)]
    document: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();
    let mut settings = load_settings(&args.config_dir)?;
    if let Some(doc) = args.document {
        settings.document.path = doc;
    }
    settings.validate()?;

    info!(document = %settings.document.path.display(), index = %settings.index.dir.display(), "indexing handbook");
    let embedder = load_embedder(&settings.embedding)?;
    let index = rebuild_index(&settings, embedder).await?;

    println!("Indexed {} chunks from {}", index.len(), settings.document.path.display());
    println!("Index written to {} (embedder {})", settings.index.dir.display(), index.model_id());
    Ok(())
}
