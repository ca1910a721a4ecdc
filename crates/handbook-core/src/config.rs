//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (`__` separates nested keys, e.g. `APP_LLM__MODE=paid`).
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

pub const OPENAI_API_KEY_VAR: &str = "OPENAI_API_KEY";

pub struct Config {
    figment: Figment,
}

impl Config {
    /// Load `config.toml` and the `RUST_ENV` overlay from `dir`.
    pub fn load_from(dir: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment })
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    /// Extract the full typed settings. Relative paths resolve against `base`.
    pub fn settings(&self, base: &Path) -> Result<Settings> {
        let mut settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.document.path = resolve_with_base(base, settings.document.path.to_string_lossy());
        settings.index.dir = resolve_with_base(base, settings.index.dir.to_string_lossy());
        settings.embedding.model_dir = resolve_with_base(base, settings.embedding.model_dir.to_string_lossy());
        Ok(settings)
    }
}

/// Answer generation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnswerMode {
    /// Return handbook text directly; never calls a language model.
    #[default]
    #[serde(alias = "free")]
    Extractive,
    /// Summarize retrieved text with the configured language model.
    #[serde(alias = "paid")]
    Generative,
}

impl fmt::Display for AnswerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerMode::Extractive => f.write_str("extractive"),
            AnswerMode::Generative => f.write_str("generative"),
        }
    }
}

impl FromStr for AnswerMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "extractive" | "free" => Ok(AnswerMode::Extractive),
            "generative" | "paid" => Ok(AnswerMode::Generative),
            other => Err(Error::InvalidConfig(format!(
                "unknown mode '{other}' (expected extractive|free or generative|paid)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub document: DocumentSettings,
    pub index: IndexSettings,
    pub chunking: ChunkingSettings,
    pub retrieval: RetrievalSettings,
    pub cache: CacheSettings,
    pub embedding: EmbeddingSettings,
    pub llm: LlmSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentSettings {
    pub path: PathBuf,
}

impl Default for DocumentSettings {
    fn default() -> Self {
        Self { path: PathBuf::from("handbook.pdf") }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub dir: PathBuf,
    /// Upper bound on extracting, chunking and embedding the document.
    pub build_timeout_secs: u64,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self { dir: PathBuf::from("cache/vector_store/handbook"), build_timeout_secs: 1800 }
    }
}

impl IndexSettings {
    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Maximum characters per chunk for the generic splitter.
    pub chunk_size: usize,
    /// Characters shared between consecutive generic chunks.
    pub chunk_overlap: usize,
    /// Try the numbered-section strategy before the generic splitter.
    pub section_split: bool,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self { chunk_size: 1500, chunk_overlap: 100, section_split: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub timeout_secs: u64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: 3, timeout_secs: 30 }
    }
}

impl RetrievalSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    /// LRU bound on cached answers; `0` disables eviction.
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { enabled: true, max_entries: 512 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    Local,
    Fake,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub model_dir: PathBuf,
    pub max_len: usize,
    /// Dimension used by the fake provider.
    pub fake_dim: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Local,
            model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            model_dir: PathBuf::from("models/all-MiniLM-L6-v2"),
            max_len: 256,
            fake_dim: 384,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub mode: AnswerMode,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub api_base: Option<String>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            mode: AnswerMode::Extractive,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            timeout_secs: 60,
            api_base: None,
        }
    }
}

impl LlmSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunking.chunk_size must be > 0".into()));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(Error::InvalidConfig("retrieval.top_k must be > 0".into()));
        }
        if self.llm.mode == AnswerMode::Generative && !has_api_key() {
            return Err(Error::InvalidConfig(format!(
                "generative mode requires the {OPENAI_API_KEY_VAR} environment variable"
            )));
        }
        Ok(())
    }

    /// Flat key/value view of the effective settings for display.
    pub fn summary(&self) -> Vec<(&'static str, String)> {
        vec![
            ("mode", self.llm.mode.to_string()),
            ("document", self.document.path.display().to_string()),
            ("index_dir", self.index.dir.display().to_string()),
            ("index_build_timeout_secs", self.index.build_timeout_secs.to_string()),
            ("embedding_model", self.embedding.model.clone()),
            ("llm_model", self.llm.model.clone()),
            ("llm_temperature", self.llm.temperature.to_string()),
            ("chunk_size", self.chunking.chunk_size.to_string()),
            ("chunk_overlap", self.chunking.chunk_overlap.to_string()),
            ("top_k", self.retrieval.top_k.to_string()),
            ("cache_enabled", self.cache.enabled.to_string()),
            ("cache_max_entries", self.cache.max_entries.to_string()),
        ]
    }
}

pub fn has_api_key() -> bool {
    env::var(OPENAI_API_KEY_VAR).map(|k| !k.trim().is_empty()).unwrap_or(false)
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
