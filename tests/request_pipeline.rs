//! End-to-end tests of the guarded request pipeline over real sockets.

use std::time::Duration;

use request_guard::config::RateLimitPolicy;
use serde_json::{json, Value};

mod common;

fn valid_login() -> Value {
    json!({ "email": "founder@example.com", "password": "Secr3t!pass" })
}

#[tokio::test]
async fn test_auth_policy_throttles_after_limit() {
    let mut config = common::test_config().await;
    config.rate_limit.policies.insert(
        "auth".into(),
        RateLimitPolicy::new(
            15 * 60 * 1000,
            3,
            "Too many authentication attempts, please try again later.",
        ),
    );
    let (base, shutdown) = common::spawn_guard(config).await;
    let client = common::client();

    for expected_remaining in ["2", "1", "0"] {
        let res = client
            .post(format!("{base}/api/auth/login"))
            .json(&valid_login())
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        assert_eq!(res.headers()["x-ratelimit-limit"], "3");
        assert_eq!(res.headers()["x-ratelimit-remaining"], expected_remaining);
    }

    let res = client
        .post(format!("{base}/api/auth/login"))
        .json(&valid_login())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 429);
    assert_eq!(res.headers()["x-ratelimit-remaining"], "0");
    let retry_after: u64 = res.headers()["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1 && retry_after <= 15 * 60);

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Too Many Requests");
    assert_eq!(
        body["message"],
        "Too many authentication attempts, please try again later."
    );

    // Other routes only see the general policy.
    let res = client
        .get(format!("{base}/api/search?q=seed"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    shutdown.trigger();
}

#[tokio::test]
async fn test_register_reports_every_missing_field() {
    let (base, shutdown) = common::spawn_guard(common::test_config().await).await;

    let res = common::client()
        .post(format!("{base}/api/auth/register"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Validation failed");
    let messages: Vec<_> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["message"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        messages,
        [
            "\"email\" is required",
            "\"password\" is required",
            "\"role\" is required",
            "\"fullName\" is required",
        ]
    );

    shutdown.trigger();
}

#[tokio::test]
async fn test_script_payload_rejected() {
    let (base, shutdown) = common::spawn_guard(common::test_config().await).await;

    let res = common::client()
        .post(format!("{base}/api/tasks"))
        .json(&json!({ "title": "<script>alert(1)</script>" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Invalid input detected");

    shutdown.trigger();
}

#[tokio::test]
async fn test_unicode_escaped_script_payload_rejected() {
    let (base, shutdown) = common::spawn_guard(common::test_config().await).await;

    let res = common::client()
        .post(format!("{base}/api/tasks"))
        .header("content-type", "application/json")
        .body(r#"{"title":"\u003cscript\u003ealert(1)\u003c/script\u003e"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Invalid input detected");

    shutdown.trigger();
}

#[tokio::test]
async fn test_percent_encoded_query_payload_rejected() {
    let (base, shutdown) = common::spawn_guard(common::test_config().await).await;

    let res = common::client()
        .get(format!("{base}/api/search?q=%3Cscript%3Ealert(1)%3C%2Fscript%3E"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Invalid input detected");

    shutdown.trigger();
}

#[tokio::test]
async fn test_malformed_json_rejected() {
    let (base, shutdown) = common::spawn_guard(common::test_config().await).await;

    let res = common::client()
        .post(format!("{base}/api/tasks"))
        .header("content-type", "application/json")
        .body("{\"title\": ")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Invalid JSON format");

    shutdown.trigger();
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let mut config = common::test_config().await;
    config.sanitize.max_body_bytes = 64;
    let (base, shutdown) = common::spawn_guard(config).await;

    let res = common::client()
        .post(format!("{base}/api/tasks"))
        .json(&json!({ "title": "x".repeat(200) }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 413);

    shutdown.trigger();
}

#[tokio::test]
async fn test_task_escaped_and_defaulted() {
    let (base, shutdown) = common::spawn_guard(common::test_config().await).await;

    let res = common::client()
        .post(format!("{base}/api/tasks"))
        .json(&json!({ "title": "  Tom & Jerry  ", "$where": "1 == 1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(
        body["data"],
        json!({ "title": "Tom &amp; Jerry", "priority": "medium", "category": "other" })
    );

    shutdown.trigger();
}

#[tokio::test]
async fn test_document_upload_refuses_disguised_file() {
    let (base, shutdown) = common::spawn_guard(common::test_config().await).await;
    let client = common::client();

    let upload = |file: Value| {
        client
            .post(format!("{base}/api/documents"))
            .json(&json!({ "documentType": "legal", "category": "legal", "file": file }))
            .send()
    };

    let res = upload(json!({ "originalName": "term-sheet.docx", "mimeType": "application/msword", "size": 2048 }))
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["x-ratelimit-limit"], "20");

    let res = upload(json!({ "originalName": "term-sheet.pdf", "mimeType": "text/plain", "size": 2048 }))
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    let body: Value = res.json().await.unwrap();
    assert_eq!(
        body["message"],
        "File extension and MIME type mismatch. Potential security risk detected."
    );

    let res = upload(json!({ "originalName": "notes.txt", "size": 10 }))
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    let body: Value = res.json().await.unwrap();
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Invalid file type. Allowed types: pdf, doc, docx"));

    shutdown.trigger();
}

#[tokio::test]
async fn test_past_due_date_rejected() {
    let (base, shutdown) = common::spawn_guard(common::test_config().await).await;

    let res = common::client()
        .post(format!("{base}/api/tasks"))
        .json(&json!({ "title": "File taxes", "dueDate": "2001-01-01" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    let body: Value = res.json().await.unwrap();
    assert_eq!(
        body["errors"][0]["message"],
        "\"dueDate\" must be greater than or equal to \"now\""
    );

    shutdown.trigger();
}

#[tokio::test]
async fn test_search_limit_bounded() {
    let (base, shutdown) = common::spawn_guard(common::test_config().await).await;

    let res = common::client()
        .get(format!("{base}/api/search?q=fintech&limit=500"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    let body: Value = res.json().await.unwrap();
    assert_eq!(
        body["errors"][0]["message"],
        "\"limit\" must be less than or equal to 100"
    );

    shutdown.trigger();
}

#[tokio::test]
async fn test_health_and_security_headers() {
    let (base, shutdown) = common::spawn_guard(common::test_config().await).await;

    let res = common::client()
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["x-frame-options"], "DENY");
    assert_eq!(res.headers()["x-content-type-options"], "nosniff");
    assert!(res.headers().contains_key("content-security-policy"));
    assert!(!res.headers().contains_key("strict-transport-security"));
    assert!(res.headers().contains_key("x-request-id"));

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    shutdown.trigger();
}

#[tokio::test]
async fn test_graceful_shutdown_stops_listener() {
    let (base, shutdown) = common::spawn_guard(common::test_config().await).await;
    let client = common::client();

    let res = client.get(format!("{base}/health")).send().await.unwrap();
    assert_eq!(res.status(), 200);

    shutdown.trigger();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(client.get(format!("{base}/health")).send().await.is_err());
}
