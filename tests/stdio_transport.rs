//! Tests for the newline-delimited stdio transport over in-memory pipes.

use std::sync::Arc;
use std::time::Duration;

use doc_ingestor_mcp::mcp::{demo, McpServer};
use doc_ingestor_mcp::transport::StdioTransport;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use tokio::task::JoinHandle;

struct Harness {
    input: DuplexStream,
    output: Lines<BufReader<DuplexStream>>,
    task: JoinHandle<Result<(), doc_ingestor_mcp::transport::TransportError>>,
}

fn start() -> Harness {
    let server = demo::register(
        McpServer::builder("stdio-test", "0.0.1"),
        Duration::from_millis(10),
    )
    .build();

    let (input, server_in) = tokio::io::duplex(64 * 1024);
    let (server_out, output) = tokio::io::duplex(64 * 1024);
    let task = tokio::spawn(StdioTransport::new(Arc::new(server)).run_with(
        server_in,
        server_out,
        std::future::pending::<()>(),
    ));

    Harness {
        input,
        output: BufReader::new(output).lines(),
        task,
    }
}

impl Harness {
    async fn send(&mut self, message: Value) {
        self.send_raw(&message.to_string()).await;
    }

    async fn send_raw(&mut self, line: &str) {
        self.send_bytes(line.as_bytes()).await;
    }

    async fn send_bytes(&mut self, line: &[u8]) {
        self.input.write_all(line).await.unwrap();
        self.input.write_all(b"\n").await.unwrap();
    }

    async fn recv(&mut self) -> Value {
        let line = tokio::time::timeout(Duration::from_secs(5), self.output.next_line())
            .await
            .expect("timed out waiting for output")
            .unwrap()
            .expect("output closed");
        serde_json::from_str(&line).unwrap()
    }

    async fn initialize(&mut self) {
        self.send(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-06-18",
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "1.0"}
            }
        }))
        .await;
        let response = self.recv().await;
        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["serverInfo"]["name"], "stdio-test");
    }
}

#[tokio::test]
async fn test_initialize_and_call_tool() {
    let mut harness = start();
    harness.initialize().await;

    harness
        .send(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
        .await;
    harness
        .send(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {"name": "greet", "arguments": {"name": "Ada"}}
        }))
        .await;

    let response = harness.recv().await;
    assert_eq!(response["id"], 2);
    assert_eq!(response["result"]["content"][0]["text"], "Hello, Ada!");
}

#[tokio::test]
async fn test_notifications_precede_result() {
    let mut harness = start();
    harness.initialize().await;

    harness
        .send(json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "tools/call",
            "params": {"name": "multi-greet", "arguments": {"name": "Ada"}}
        }))
        .await;

    let mut notifications = Vec::new();
    let result = loop {
        let message = harness.recv().await;
        if message.get("id").is_some() {
            break message;
        }
        assert_eq!(message["method"], "notifications/message");
        notifications.push(message["params"]["data"].as_str().unwrap().to_string());
    };

    assert_eq!(
        notifications,
        [
            "Starting multi-greet for Ada",
            "Sending first greeting to Ada",
            "Sending second greeting to Ada",
        ]
    );
    assert_eq!(result["id"], 7);
    assert_eq!(result["result"]["content"][0]["text"], "Good morning, Ada!");
}

#[tokio::test]
async fn test_malformed_lines_get_errors() {
    let mut harness = start();

    harness.send_raw("{oops").await;
    let response = harness.recv().await;
    assert_eq!(response["error"]["code"], -32700);
    assert_eq!(response["id"], Value::Null);

    harness.send_raw("[]").await;
    let response = harness.recv().await;
    assert_eq!(response["error"]["code"], -32600);
}

#[tokio::test]
async fn test_invalid_utf8_line_keeps_session() {
    let mut harness = start();
    harness.initialize().await;

    harness.send_bytes(b"\xff\xfe").await;
    let response = harness.recv().await;
    assert_eq!(response["error"]["code"], -32700);
    assert_eq!(response["id"], Value::Null);

    harness
        .send(json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}))
        .await;
    let response = harness.recv().await;
    assert_eq!(response["id"], 2);
    assert_eq!(response["result"], json!({}));
    assert!(!harness.task.is_finished());
}

#[tokio::test]
async fn test_request_before_initialize() {
    let mut harness = start();

    harness
        .send(json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}))
        .await;
    let response = harness.recv().await;
    assert_eq!(response["error"]["code"], -32000);

    harness
        .send(json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}))
        .await;
    let response = harness.recv().await;
    assert_eq!(response["id"], 2);
    assert_eq!(response["result"], json!({}));
}

#[tokio::test]
async fn test_eof_finishes_in_flight_requests() {
    let mut harness = start();
    harness.initialize().await;

    harness
        .send(json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": {"name": "multi-greet", "arguments": {"name": "Ada"}}
        }))
        .await;
    let Harness {
        input,
        mut output,
        task,
    } = harness;
    drop(input);

    let mut last = None;
    while let Ok(Some(line)) = output.next_line().await {
        last = Some(serde_json::from_str::<Value>(&line).unwrap());
    }
    let last = last.expect("no output after EOF");
    assert_eq!(last["id"], 3);
    assert_eq!(last["result"]["content"][0]["text"], "Good morning, Ada!");

    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("transport did not stop")
        .unwrap()
        .unwrap();
}
