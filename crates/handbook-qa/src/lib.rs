#![deny(unused_imports)]

pub mod cache;
pub mod engine;
pub mod generator;
pub mod llm;
pub mod pipeline;
pub mod retriever;

pub use cache::{CacheStats, QueryCache};
pub use engine::{Answer, EngineStats, QaEngine, QueryOptions};
pub use llm::OpenAiModel;
pub use pipeline::{build_index, load_or_build, open_engine, rebuild_index, source_fingerprint};
pub use retriever::Retriever;
