use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use handbook_core::config::{AnswerMode, Settings};
use handbook_core::error::{Error, Result};
use handbook_core::traits::LanguageModel;
use handbook_core::types::Source;
use handbook_vector::VectorIndex;

use crate::cache::QueryCache;
use crate::generator::{build_context, extractive_answer, format_sources, generative_answer, NOT_FOUND_ANSWER};
use crate::retriever::Retriever;

/// Per-question knobs. Built from [`Settings`] at call time so mode changes
/// apply to the next question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    pub mode: AnswerMode,
    pub top_k: usize,
    pub use_cache: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self { mode: AnswerMode::Extractive, top_k: 3, use_cache: true }
    }
}

impl QueryOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self { mode: settings.llm.mode, top_k: settings.retrieval.top_k, use_cache: settings.cache.enabled }
    }

    pub fn with_mode(mut self, mode: AnswerMode) -> Self {
        self.mode = mode;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<Source>,
}

impl Answer {
    pub fn not_found() -> Self {
        Self { text: NOT_FOUND_ANSWER.to_string(), sources: Vec::new() }
    }

    pub fn is_not_found(&self) -> bool {
        self.sources.is_empty() && self.text == NOT_FOUND_ANSWER
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub questions: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cached_answers: usize,
}

/// Question answering over one loaded index.
///
/// Query path: cache → retrieve → generate → cache. Nothing-found answers and
/// failed generations are never cached.
pub struct QaEngine {
    retriever: Retriever,
    cache: QueryCache,
    language_model: RwLock<Option<Arc<dyn LanguageModel>>>,
    llm_timeout: Duration,
    questions: AtomicU64,
}

impl QaEngine {
    pub fn new(index: Arc<VectorIndex>, settings: &Settings) -> Self {
        Self::with_parts(
            Retriever::new(index, settings.retrieval.timeout()),
            QueryCache::new(settings.cache.max_entries),
            settings.llm.timeout(),
        )
    }

    pub fn with_parts(retriever: Retriever, cache: QueryCache, llm_timeout: Duration) -> Self {
        Self {
            retriever,
            cache,
            language_model: RwLock::new(None),
            llm_timeout,
            questions: AtomicU64::new(0),
        }
    }

    /// Replace the language model used by generative mode; `None` removes it.
    pub fn install_language_model(&self, model: Option<Arc<dyn LanguageModel>>) {
        match &model {
            Some(m) => info!(model = m.model_id(), "language model installed"),
            None => info!("language model removed"),
        }
        *self.language_model.write() = model;
    }

    pub fn has_language_model(&self) -> bool {
        self.language_model.read().is_some()
    }

    pub fn index(&self) -> &Arc<VectorIndex> { self.retriever.index() }

    pub async fn answer(&self, question: &str, options: &QueryOptions) -> Result<Answer> {
        self.questions.fetch_add(1, Ordering::Relaxed);

        if options.use_cache {
            if let Some(hit) = self.cache.get(question, options.mode) {
                info!(mode = %options.mode, "answer served from cache");
                return Ok(hit);
            }
        }

        let retrieved = self.retriever.retrieve(question, options.top_k).await;
        if retrieved.is_empty() {
            warn!("no relevant chunks found");
            return Ok(Answer::not_found());
        }

        let context = build_context(&retrieved);
        let text = match options.mode {
            AnswerMode::Extractive => extractive_answer(&context),
            AnswerMode::Generative => {
                let model = self.language_model.read().clone().ok_or_else(|| {
                    Error::Generation("generative mode needs a language model; none is configured".into())
                })?;
                generative_answer(model.as_ref(), question, &context, self.llm_timeout).await?
            }
        };

        let answer = Answer { text, sources: format_sources(&retrieved) };
        if options.use_cache {
            self.cache.put(question, options.mode, answer.clone());
        }
        info!(mode = %options.mode, sources = answer.sources.len(), "question answered");
        Ok(answer)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("answer cache cleared");
    }

    pub fn stats(&self) -> EngineStats {
        let cache = self.cache.stats();
        EngineStats {
            questions: self.questions.load(Ordering::Relaxed),
            cache_hits: cache.hits,
            cache_misses: cache.misses,
            cached_answers: cache.entries,
        }
    }
}
