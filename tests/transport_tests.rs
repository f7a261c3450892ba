//! HTTP transport tests against a local mock server.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use voxrun::error::VoxError;
use voxrun::run::{RunDriver, RunLimits};
use voxrun::stream::AssistantStreamEvent;
use voxrun::tools::{MemoryStockStore, StockLookupTool, ToolRegistry};
use voxrun::transport::{
    AssistantBackend, CreateRunRequest, HttpTransport, NewMessage, ToolOutput,
};
use voxrun::util::retry::RetryPolicy;

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        multiplier: 2.0,
        jitter: false,
    }
}

fn transport(server: &MockServer) -> HttpTransport {
    HttpTransport::new(reqwest::Client::new(), server.uri(), "test-key", "assistants=v2")
        .expect("transport")
        .with_retry_policy(fast_retry(4))
}

#[tokio::test]
async fn create_thread_sends_credentials_and_beta_marker() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/threads"))
        .and(header("authorization", "Bearer test-key"))
        .and(header("openai-beta", "assistants=v2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "thread_abc",
            "object": "thread",
            "created_at": 1_700_000_000
        })))
        .expect(1)
        .mount(&server)
        .await;

    let thread = transport(&server).create_thread(&[]).await.expect("thread");

    assert_eq!(thread.id, "thread_abc");
}

#[tokio::test]
async fn rate_limited_requests_are_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/threads"))
        .respond_with(
            ResponseTemplate::new(429)
                .set_body_json(json!({"error": {"message": "Rate limit reached"}})),
        )
        .up_to_n_times(3)
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/threads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "thread_ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport(&server);
    let thread = transport.create_thread(&[]).await.expect("fourth attempt succeeds");

    assert_eq!(thread.id, "thread_ok");
    assert_eq!(transport.requests_sent(), 4);
}

#[tokio::test]
async fn persistent_rate_limit_surfaces_after_retry_budget() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/threads"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1"))
        .expect(4)
        .mount(&server)
        .await;

    let err = transport(&server).create_thread(&[]).await.unwrap_err();

    assert!(matches!(
        err,
        VoxError::RateLimited {
            retry_after_ms: Some(1_000)
        }
    ));
}

#[tokio::test]
async fn authentication_failures_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/threads"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"error": {"message": "Incorrect API key provided"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = transport(&server).create_thread(&[]).await.unwrap_err();

    assert!(matches!(err, VoxError::Authentication(msg) if msg.contains("Incorrect API key")));
}

#[tokio::test]
async fn missing_thread_maps_to_thread_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/threads/thread_gone/messages"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({"error": {"message": "No thread found with id 'thread_gone'."}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = transport(&server)
        .send_message("thread_gone", &NewMessage::user("hi"))
        .await
        .unwrap_err();

    assert!(matches!(err, VoxError::ThreadUnavailable(msg) if msg.contains("thread_gone")));
}

#[tokio::test]
async fn unexpected_payload_is_an_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/threads/thread_1/runs/run_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "run_1", "status": "paused"})))
        .expect(1)
        .mount(&server)
        .await;

    let err = transport(&server).get_run("thread_1", "run_1").await.unwrap_err();

    assert!(matches!(err, VoxError::InvalidResponse(_)));
}

#[tokio::test]
async fn messages_are_requested_newest_first() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/threads/thread_1/messages"))
        .and(query_param("order", "desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [
                {"id": "msg_2", "role": "assistant", "run_id": "run_1",
                 "content": [{"type": "text", "text": {"value": "Twelve.", "annotations": []}}]},
                {"id": "msg_1", "role": "user",
                 "content": [{"type": "image_file", "image_file": {"file_id": "f"}}]}
            ],
            "has_more": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let messages = transport(&server).list_messages("thread_1").await.expect("messages");

    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].text(), "Twelve.");
    assert_eq!(messages[1].text(), "");
}

#[tokio::test]
async fn tool_outputs_are_submitted_in_one_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/threads/thread_1/runs/run_1/submit_tool_outputs"))
        .and(body_json(json!({
            "tool_outputs": [
                {"tool_call_id": "call_a", "output": "{\"quantity\":3}"},
                {"tool_call_id": "call_b", "output": "{\"error\":\"unknown function: x\"}"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "run_1", "status": "queued"})))
        .expect(1)
        .mount(&server)
        .await;

    let outputs = [
        ToolOutput {
            tool_call_id: "call_a".to_string(),
            output: "{\"quantity\":3}".to_string(),
        },
        ToolOutput {
            tool_call_id: "call_b".to_string(),
            output: "{\"error\":\"unknown function: x\"}".to_string(),
        },
    ];
    let run = transport(&server)
        .submit_tool_outputs("thread_1", "run_1", &outputs)
        .await
        .expect("submitted");

    assert_eq!(run.id, "run_1");
}

#[tokio::test]
async fn streaming_run_decodes_server_sent_events() {
    let server = MockServer::start().await;
    let body = concat!(
        "event: thread.run.created\n",
        "data: {\"id\":\"run_1\",\"status\":\"queued\"}\n\n",
        "event: thread.message.delta\n",
        "data: {\"id\":\"msg_1\",\"delta\":{\"content\":[{\"index\":0,\"type\":\"text\",\"text\":{\"value\":\"Hi\"}}]}}\n\n",
        "event: thread.run.completed\n",
        "data: {\"id\":\"run_1\",\"status\":\"completed\"}\n\n",
        "event: done\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/threads/thread_1/runs"))
        .and(header("accept", "text/event-stream"))
        .and(body_partial_json(json!({"assistant_id": "asst_1", "stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let stream = transport(&server)
        .stream_run("thread_1", &CreateRunRequest::new("asst_1"))
        .await
        .expect("stream opens");
    let events: Vec<_> = stream.collect().await;

    assert_eq!(events.len(), 4);
    assert!(matches!(events[0], Ok(AssistantStreamEvent::RunStatus(_))));
    assert!(matches!(&events[1], Ok(AssistantStreamEvent::MessageDelta(d)) if d.text() == "Hi"));
    assert!(matches!(events[2], Ok(AssistantStreamEvent::RunCompleted(Some(_)))));
    assert!(matches!(events[3], Ok(AssistantStreamEvent::Done)));
}

#[tokio::test]
async fn polling_turn_over_http_answers_a_stock_question() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/threads/thread_1/messages"))
        .and(body_json(json!({"role": "user", "content": "How much rice is left?"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_1", "role": "user",
            "content": [{"type": "text", "text": {"value": "How much rice is left?"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/threads/thread_1/runs"))
        .and(body_partial_json(json!({
            "assistant_id": "asst_1",
            "tools": [{"type": "function", "function": {"name": "get_stock_info"}}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "run_1", "status": "queued"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/threads/thread_1/runs/run_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "run_1",
            "status": "requires_action",
            "required_action": {
                "type": "submit_tool_outputs",
                "submit_tool_outputs": {"tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "get_stock_info", "arguments": "{\"product_name\":\"Rice\"}"}
                }]}
            }
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/threads/thread_1/runs/run_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "run_1", "status": "completed"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/threads/thread_1/runs/run_1/submit_tool_outputs"))
        .and(body_partial_json(json!({"tool_outputs": [{"tool_call_id": "call_1"}]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "run_1", "status": "queued"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/threads/thread_1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "msg_2", "role": "assistant", "run_id": "run_1",
                      "content": [{"type": "text", "text": {"value": "7 bags of rice."}}]}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = MemoryStockStore::new();
    store.set("rice", 7).await;
    let tools = ToolRegistry::new().with_tool(Arc::new(StockLookupTool::new(Arc::new(store))));
    let driver = RunDriver::new(Arc::new(transport(&server)), Arc::new(tools), "asst_1").with_limits(
        RunLimits {
            poll_interval: Duration::from_millis(5),
            ..RunLimits::default()
        },
    );

    let reply = driver
        .execute_turn("thread_1", "How much rice is left?", &CancellationToken::new())
        .await
        .expect("turn completes");

    assert_eq!(reply.text, "7 bags of rice.");
    assert_eq!(reply.tool_rounds, 1);
}
