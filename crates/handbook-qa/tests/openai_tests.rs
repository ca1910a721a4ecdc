use serde_json::json;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use handbook_core::config::{AnswerMode, EmbeddingProvider, Settings};
use handbook_core::traits::LanguageModel;
use handbook_embed::load_embedder;
use handbook_qa::{load_or_build, OpenAiModel, QaEngine, QueryOptions};

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
    })
}

fn model_for(server: &MockServer) -> OpenAiModel {
    OpenAiModel::new("test-key".into(), Some(format!("{}/v1", server.uri())), "gpt-4o-mini".into(), 0.3)
}

#[tokio::test]
async fn completion_text_is_returned() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({ "model": "gpt-4o-mini" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Yes. You get 15 days.")))
        .expect(1)
        .mount(&server)
        .await;

    let out = model_for(&server).complete("How many days?").await.unwrap();
    assert_eq!(out, "Yes. You get 15 days.");
}

#[tokio::test]
async fn auth_failure_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {
                "message": "Incorrect API key provided",
                "type": "invalid_request_error",
                "param": null,
                "code": "invalid_api_key"
            }
        })))
        .mount(&server)
        .await;

    let err = model_for(&server).complete("hi").await.unwrap_err();
    assert!(err.to_string().contains("Incorrect API key"), "{err}");
}

#[tokio::test]
async fn engine_generates_through_openai() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Employees get 15 days of annual leave.")))
        .expect(1)
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let doc = tmp.path().join("handbook.txt");
    fs::write(&doc, "3. Leave Policy\nEmployees get 15 days annual leave.\n").unwrap();
    let mut settings = Settings::default();
    settings.document.path = doc;
    settings.index.dir = tmp.path().join("index");
    settings.embedding.provider = EmbeddingProvider::Fake;

    let embedder = load_embedder(&settings.embedding).unwrap();
    let index = load_or_build(&settings, embedder).await.unwrap();
    let engine = QaEngine::new(Arc::new(index), &settings);
    let model: Arc<dyn LanguageModel> = Arc::new(model_for(&server));
    engine.install_language_model(Some(model));

    let options = QueryOptions::default().with_mode(AnswerMode::Generative);
    let first = engine.answer("How many vacation days do I get?", &options).await.unwrap();
    let second = engine.answer("How many vacation days do I get?", &options).await.unwrap();

    assert_eq!(first.text, "Employees get 15 days of annual leave.");
    assert_eq!(first, second);
    assert_eq!(first.sources[0].section.as_deref(), Some("3. Leave Policy"));
}
