//! Integration tests for the chat relay endpoint.

mod common;

use axum::http::StatusCode;
use common::{TestServer, body_bytes, chat_request, post_chat, send};
use httpmock::prelude::*;
use huzi_server::error::BAD_REQUEST_REPLY;
use huzi_server::relay::{NO_CONTENT_REPLY, echo_reply};
use serde_json::{Value, json};

fn remote_server(base_url: String) -> TestServer {
    TestServer::with_config(move |config| {
        config.provider.api_key = Some("sk-test".to_string());
        config.provider.model = Some("gpt-test".to_string());
        config.provider.base_url = base_url;
        config.provider.system_prompt = Some("You are a calm companion.".to_string());
    })
}

#[tokio::test]
async fn echo_mode_repeats_last_user_message() {
    let server = TestServer::new();

    let (status, body) = post_chat(
        &server.router,
        json!({"messages": [
            {"role": "user", "content": "first"},
            {"role": "assistant", "content": "reply"},
            {"role": "user", "content": "hi"}
        ]}),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "assistant");
    assert_eq!(body["content"], echo_reply("hi"));
    assert!(body.get("meta").is_none());
}

#[tokio::test]
async fn ephemeral_messages_are_ignored() {
    let server = TestServer::new();

    let (status, body) = post_chat(
        &server.router,
        json!({"messages": [
            {"role": "user", "content": "real question"},
            {"role": "user", "content": "typing...", "ephemeral": true}
        ]}),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], echo_reply("real question"));
}

#[tokio::test]
async fn empty_body_is_an_empty_conversation() {
    let server = TestServer::new();

    let response = send(&server.router, chat_request("", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["content"], echo_reply(""));
}

#[tokio::test]
async fn invalid_json_is_400_with_assistant_reply() {
    let server = TestServer::new();

    let response = send(&server.router, chat_request("{\"messages\": [", None)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["role"], "assistant");
    assert_eq!(body["content"], BAD_REQUEST_REPLY);
}

#[tokio::test]
async fn remote_mode_relays_provider_reply() {
    let upstream = MockServer::start();
    let mock = upstream.mock(|when, then| {
        when.method(POST)
            .path("/v1/chat/completions")
            .header("authorization", "Bearer sk-test")
            .json_body(json!({
                "model": "gpt-test",
                "messages": [
                    {"role": "system", "content": "You are a calm companion."},
                    {"role": "user", "content": "hello there"}
                ],
                "temperature": 0.7,
                "stream": false
            }));
        then.status(200).json_body(json!({
            "choices": [{"message": {"role": "assistant", "content": "General Kenobi"}}]
        }));
    });
    let server = remote_server(upstream.base_url());

    let (status, body) = post_chat(
        &server.router,
        json!({"messages": [
            {"role": "user", "content": "hello there"},
            {"role": "assistant", "content": "...", "ephemeral": true}
        ]}),
        None,
    )
    .await;

    mock.assert();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "assistant");
    assert_eq!(body["content"], "General Kenobi");
}

#[tokio::test]
async fn request_overrides_reach_the_provider() {
    let upstream = MockServer::start();
    let mock = upstream.mock(|when, then| {
        when.method(POST).json_body(json!({
            "model": "gpt-other",
            "messages": [
                {"role": "system", "content": "Answer in French."},
                {"role": "user", "content": "bonjour"}
            ],
            "temperature": 0.2,
            "stream": false
        }));
        then.status(200).json_body(json!({
            "choices": [{"message": {"content": "salut"}}]
        }));
    });
    let server = remote_server(upstream.base_url());

    let (status, body) = post_chat(
        &server.router,
        json!({
            "messages": [{"role": "user", "content": "bonjour"}],
            "systemPrompt": "Answer in French.",
            "model": "gpt-other",
            "temperature": 0.2
        }),
        None,
    )
    .await;

    mock.assert();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], "salut");
}

#[tokio::test]
async fn empty_provider_choice_uses_placeholder() {
    let upstream = MockServer::start();
    upstream.mock(|when, then| {
        when.method(POST);
        then.status(200).json_body(json!({"choices": [{"message": {"content": ""}}]}));
    });
    let server = remote_server(upstream.base_url());

    let (status, body) = post_chat(
        &server.router,
        json!({"messages": [{"role": "user", "content": "anyone?"}]}),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], NO_CONTENT_REPLY);
}

#[tokio::test]
async fn provider_failure_is_502_with_assistant_reply() {
    let upstream = MockServer::start();
    upstream.mock(|when, then| {
        when.method(POST);
        then.status(429).body("quota exceeded");
    });
    let server = remote_server(upstream.base_url());

    let (status, body) = post_chat(
        &server.router,
        json!({"messages": [{"role": "user", "content": "hi"}]}),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["role"], "assistant");
    let content = body["content"].as_str().unwrap();
    assert!(content.contains("quota exceeded"), "content was {content}");
}

#[tokio::test]
async fn positional_array_messages_are_not_forwarded() {
    let server = TestServer::new();

    let (status, body) = post_chat(
        &server.router,
        json!({"messages": [["user", "smuggled"], {"role": "user", "content": "real"}]}),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], echo_reply("real"));
}
