use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use actix_web::{test, web, App};
use async_trait::async_trait;
use deliberation_core::completer::{CompletionResponse, Completer};
use deliberation_core::error::CompleterError;
use deliberation_core::types::{CompletionOptions, TokenUsage};
use deliberation_gateway::config::Config;
use deliberation_gateway::handlers;
use deliberation_gateway::state::AppState;
use serde_json::json;

/// Replies with a fixed canned response for every call, regardless of
/// prompt content. Good enough to exercise the HTTP plumbing without a
/// real model on the other end.
struct StubCompleter {
    response: String,
    calls: AtomicUsize,
}

impl StubCompleter {
    fn new(response: &str) -> Self {
        StubCompleter {
            response: response.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Completer for StubCompleter {
    async fn complete(
        &self,
        _system_prompt: &str,
        _user_prompt: &str,
        _options: CompletionOptions,
    ) -> Result<CompletionResponse, CompleterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(CompletionResponse {
            text: self.response.clone(),
            usage: TokenUsage::new(5, 5),
        })
    }
}

fn test_app_state(completer: Arc<dyn Completer>) -> web::Data<AppState> {
    web::Data::new(AppState::for_testing(Config::default(), completer))
}

#[actix_web::test]
async fn health_sentinel_returns_ok_status() {
    let state = test_app_state(Arc::new(StubCompleter::new("{}")));
    let app = test::init_service(
        App::new()
            .app_data(state)
            .route("/", web::get().to(handlers::health::health)),
    )
    .await;

    let req = test::TestRequest::get().uri("/").to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["status"], "ok");
}

#[actix_web::test]
async fn topic_tree_endpoint_returns_taxonomy_from_completer() {
    let canned = json!({
        "taxonomy": [{
            "topicName": "Pets",
            "topicShortDescription": "Pet ownership",
            "subtopics": [{"subtopicName": "Dogs", "subtopicShortDescription": "Dog-related"}]
        }]
    })
    .to_string();
    let state = test_app_state(Arc::new(StubCompleter::new(&canned)));
    let app = test::init_service(
        App::new()
            .app_data(state)
            .route("/topic_tree", web::post().to(handlers::topic_tree::topic_tree)),
    )
    .await;

    let body = json!({
        "comments": [{"id": "c1", "text": "I love my dog very much", "speaker": "alice"}],
        "llm": {"modelName": "gpt-4o-mini", "systemPrompt": "sys", "userPrompt": "usr"}
    });
    let req = test::TestRequest::post()
        .uri("/topic_tree")
        .set_json(&body)
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;

    let topics = resp["data"].as_array().expect("data should be an array");
    assert_eq!(topics.len(), 1);
    assert_eq!(topics[0]["topicName"], "Pets");
}

#[actix_web::test]
async fn claims_endpoint_rejects_without_required_fields() {
    let state = test_app_state(Arc::new(StubCompleter::new("{}")));
    let app = test::init_service(
        App::new()
            .app_data(state)
            .route("/claims", web::post().to(handlers::claims::claims)),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/claims")
        .set_json(&json!({"comments": []}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_client_error());
}

#[actix_web::test]
async fn sort_claims_tree_endpoint_rejects_unrecognized_sort_key() {
    let state = test_app_state(Arc::new(StubCompleter::new("{}")));
    let app = test::init_service(App::new().app_data(state).route(
        "/sort_claims_tree/",
        web::put().to(handlers::sort_claims_tree::sort_claims_tree),
    ))
    .await;

    let body = json!({
        "tree": {},
        "llm": {"modelName": "gpt-4o-mini", "systemPrompt": "sys", "userPrompt": "usr"},
        "sort": "notARealSortKey"
    });
    let req = test::TestRequest::put()
        .uri("/sort_claims_tree/")
        .set_json(&body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn cruxes_endpoint_handles_empty_tree_without_calling_completer() {
    let completer = Arc::new(StubCompleter::new("{}"));
    let state = test_app_state(completer.clone());
    let app = test::init_service(
        App::new()
            .app_data(state)
            .route("/cruxes", web::post().to(handlers::cruxes::cruxes)),
    )
    .await;

    let body = json!({
        "cruxTree": {},
        "llm": {"modelName": "gpt-4o-mini", "systemPrompt": "sys", "userPrompt": "usr"},
        "topics": [],
        "topK": 0
    });
    let req = test::TestRequest::post()
        .uri("/cruxes")
        .set_json(&body)
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp["cruxClaims"].as_array().unwrap().len(), 0);
    assert_eq!(completer.calls.load(Ordering::SeqCst), 0);
    // Wire format is a bare 2D array, not an object wrapping one.
    assert_eq!(resp["controversyMatrix"].as_array().unwrap().len(), 0);
}
