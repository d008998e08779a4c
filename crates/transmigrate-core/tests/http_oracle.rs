use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use transmigrate_core::domain::{TranslationContext, TARGET_LANGUAGE};
use transmigrate_core::oracle::{
    translate_with_retry, HttpOracle, OracleError, OracleFailure, RetryPolicy, TranslationOracle,
};
use transmigrate_core::rules::RuleSet;

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{}/translate", addr)
}

fn context(attempt: u32) -> TranslationContext {
    TranslationContext {
        attempt,
        source_name: "app.py".into(),
        original_source: "print('hi')\n".into(),
        target_language: TARGET_LANGUAGE.into(),
        prior_diagnostics: Vec::new(),
        rules: RuleSet::empty(),
        previous_candidate: None,
    }
}

#[tokio::test]
async fn test_files_response_and_bearer_token() {
    async fn handler(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            == Some("Bearer secret");
        if !authorized || body["source_name"] != "app.py" || body["attempt"] != 1 {
            return (StatusCode::BAD_REQUEST, Json(json!({"error": "bad request"})));
        }
        (
            StatusCode::OK,
            Json(json!({
                "files": {
                    "Cargo.toml": "[package]\nname = \"app\"\n",
                    "src/main.rs": "fn main() { println!(\"hi\"); }\n"
                },
                "model": "oracle-large",
                "usage": {"input_tokens": 1000, "output_tokens": 200, "cost_usd": 0.25}
            })),
        )
    }

    let url = serve(Router::new().route("/translate", post(handler))).await;
    let oracle = HttpOracle::new(url).expect("client").with_token("secret");

    let candidate = oracle.translate(&context(1)).await.expect("candidate");
    assert!(candidate.main_source().expect("main").contains("println!"));
    assert!(candidate.missing_files().is_empty());
    assert_eq!(candidate.usage.model.as_deref(), Some("oracle-large"));
    assert_eq!(candidate.usage.prompt_tokens, 1000);
    assert_eq!(candidate.usage.completion_tokens, 200);
    assert!((candidate.usage.cost_usd - 0.25).abs() < 1e-9);
}

#[tokio::test]
async fn test_completion_response_is_extracted() {
    async fn handler() -> Json<Value> {
        Json(json!({
            "completion": "Here you go.\n```rust\nfn main() {}\n```\n\n```toml\n[package]\nname = \"app\"\n```\n",
            "usage": {"prompt_tokens": 1000000, "completion_tokens": 0}
        }))
    }

    let url = serve(Router::new().route("/translate", post(handler))).await;
    let oracle = HttpOracle::new(url).expect("client");

    let candidate = oracle.translate(&context(1)).await.expect("candidate");
    assert_eq!(candidate.main_source(), Some("fn main() {}\n"));
    assert_eq!(
        candidate.files.get("Cargo.toml").map(String::as_str),
        Some("[package]\nname = \"app\"\n")
    );
    // No reported cost: default pricing of 3 USD per million prompt tokens.
    assert!((candidate.usage.cost_usd - 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_completion_without_manifest_is_fatal() {
    async fn handler() -> Json<Value> {
        Json(json!({"completion": "```rust\nfn main() {}\n```"}))
    }

    let url = serve(Router::new().route("/translate", post(handler))).await;
    let oracle = HttpOracle::new(url).expect("client");

    let err = oracle.translate(&context(1)).await.expect_err("fatal");
    assert!(matches!(err, OracleError::Fatal(_)));
}

#[tokio::test]
async fn test_status_classification() {
    async fn unavailable() -> (StatusCode, &'static str) {
        (StatusCode::SERVICE_UNAVAILABLE, "overloaded")
    }
    async fn unauthorized() -> (StatusCode, &'static str) {
        (StatusCode::UNAUTHORIZED, "bad token")
    }

    let url = serve(
        Router::new()
            .route("/translate", post(unavailable))
            .route("/denied", post(unauthorized)),
    )
    .await;

    let oracle = HttpOracle::new(url.clone()).expect("client");
    match oracle.translate(&context(1)).await {
        Err(OracleError::Transient(message)) => assert!(message.contains("overloaded")),
        other => panic!("expected transient error, got {:?}", other),
    }

    let denied = HttpOracle::new(url.replace("/translate", "/denied")).expect("client");
    match denied.translate(&context(1)).await {
        Err(OracleError::Fatal(message)) => assert!(message.contains("401")),
        other => panic!("expected fatal error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_service_is_transient() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let oracle = HttpOracle::new(format!("http://{}/translate", addr)).expect("client");
    let err = oracle.translate(&context(1)).await.expect_err("refused");
    assert!(matches!(err, OracleError::Transient(_)));
}

#[tokio::test]
async fn test_retry_recovers_from_overload() {
    async fn flaky(State(calls): State<Arc<AtomicU32>>) -> (StatusCode, Json<Value>) {
        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return (StatusCode::TOO_MANY_REQUESTS, Json(json!({})));
        }
        (
            StatusCode::OK,
            Json(json!({"files": {"Cargo.toml": "[package]\n", "src/main.rs": "fn main() {}\n"}})),
        )
    }

    let calls = Arc::new(AtomicU32::new(0));
    let url = serve(
        Router::new()
            .route("/translate", post(flaky))
            .with_state(Arc::clone(&calls)),
    )
    .await;
    let oracle = HttpOracle::new(url).expect("client");
    let policy = RetryPolicy {
        max_retries: 3,
        backoff_base_ms: 1,
        call_timeout_ms: 5_000,
    };

    let candidate = translate_with_retry(&oracle, &context(2), &policy)
        .await
        .expect("candidate");
    assert_eq!(candidate.usage.calls, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let always_down = RetryPolicy {
        max_retries: 0,
        ..policy
    };
    calls.store(0, Ordering::SeqCst);
    let failure = translate_with_retry(&oracle, &context(2), &always_down)
        .await
        .expect_err("single call hits 429");
    assert!(matches!(failure, OracleFailure::Unavailable { calls: 1, .. }));
}
