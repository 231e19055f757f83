//! Greeting tools, example resources and the greeting prompt.

use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::resources::{PromptTemplate, StaticResource};
use super::server::McpServerBuilder;
use super::tools::{parse_args, Tool, ToolError, ToolHandler};
use crate::models::{
    CallToolResult, Content, LoggingLevel, Prompt, PromptArgument, Resource, ToolAnnotations,
};
use crate::transport::Peer;

#[derive(Debug, Deserialize)]
struct NameArgs {
    name: String,
}

/// `greet`: a plain greeting
#[derive(Debug)]
pub struct GreetHandler;

#[async_trait::async_trait]
impl ToolHandler for GreetHandler {
    async fn execute(&self, args: Value, _peer: &Peer) -> Result<CallToolResult, ToolError> {
        let args: NameArgs = parse_args(args)?;
        Ok(CallToolResult::text(format!("Hello, {}!", args.name)))
    }
}

/// `multi-greet`: three log notifications spaced by `delay`, then a greeting
#[derive(Debug)]
pub struct MultiGreetHandler {
    pub delay: Duration,
}

#[async_trait::async_trait]
impl ToolHandler for MultiGreetHandler {
    async fn execute(&self, args: Value, peer: &Peer) -> Result<CallToolResult, ToolError> {
        let args: NameArgs = parse_args(args)?;
        let name = args.name;

        notify(peer, LoggingLevel::Debug, format!("Starting multi-greet for {}", name));
        tokio::time::sleep(self.delay).await;
        notify(peer, LoggingLevel::Info, format!("Sending first greeting to {}", name));
        tokio::time::sleep(self.delay).await;
        notify(peer, LoggingLevel::Info, format!("Sending second greeting to {}", name));

        Ok(CallToolResult::text(format!("Good morning, {}!", name)))
    }
}

fn notify(peer: &Peer, level: LoggingLevel, text: String) {
    if let Err(e) = peer.log(level, text) {
        tracing::warn!("Error sending notification: {}", e);
    }
}

fn default_interval() -> u64 {
    100
}

fn default_count() -> u64 {
    50
}

#[derive(Debug, Deserialize)]
struct StreamArgs {
    #[serde(default = "default_interval")]
    interval: u64,
    #[serde(default = "default_count")]
    count: u64,
}

/// `start-notification-stream`: periodic log notifications.
///
/// A count of zero keeps going until the session closes.
#[derive(Debug)]
pub struct NotificationStreamHandler;

#[async_trait::async_trait]
impl ToolHandler for NotificationStreamHandler {
    async fn execute(&self, args: Value, peer: &Peer) -> Result<CallToolResult, ToolError> {
        let args: StreamArgs = parse_args(args)?;
        let interval = Duration::from_millis(args.interval);

        let mut counter: u64 = 0;
        while args.count == 0 || counter < args.count {
            if peer.is_closed() {
                break;
            }
            counter += 1;
            let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
            notify(
                peer,
                LoggingLevel::Info,
                format!("Periodic notification #{} at {}", counter, timestamp),
            );

            tokio::select! {
                _ = peer.closed() => {
                    tracing::debug!("Session closed after {} periodic notifications", counter);
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }

        Ok(CallToolResult::text(format!(
            "Started sending periodic notifications every {}ms",
            args.interval
        )))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListFilesArgs {
    #[serde(default)]
    include_descriptions: bool,
}

/// (uri, name, description) of the linkable example resources
const FILES: &[(&str, &str, &str)] = &[
    (
        "https://example.com/greetings/default",
        "Default Greeting",
        "A simple greeting resource",
    ),
    (
        "file:///example/file1.txt",
        "Example File 1",
        "First example file for ResourceLink demonstration",
    ),
    (
        "file:///example/file2.txt",
        "Example File 2",
        "Second example file for ResourceLink demonstration",
    ),
];

/// `list-files`: resource links framed by two text items
#[derive(Debug)]
pub struct ListFilesHandler;

#[async_trait::async_trait]
impl ToolHandler for ListFilesHandler {
    async fn execute(&self, args: Value, _peer: &Peer) -> Result<CallToolResult, ToolError> {
        let args: ListFilesArgs = parse_args(args)?;

        let mut content = vec![Content::text(
            "Here are the available files as resource links:",
        )];
        content.extend(FILES.iter().map(|(uri, name, description)| Content::ResourceLink {
            uri: uri.to_string(),
            name: name.to_string(),
            description: args.include_descriptions.then(|| description.to_string()),
            mime_type: Some("text/plain".to_string()),
        }));
        content.push(Content::text(
            "\nYou can read any of these resources using their URI.",
        ));

        Ok(CallToolResult::with_content(content))
    }
}

fn name_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": {
                "type": "string",
                "description": description
            }
        },
        "required": ["name"]
    })
}

fn text_resource(name: &str, uri: &str, title: &str, description: &str, text: &str) -> StaticResource {
    StaticResource {
        resource: Resource {
            uri: uri.to_string(),
            name: name.to_string(),
            title: Some(title.to_string()),
            description: Some(description.to_string()),
            mime_type: Some("text/plain".to_string()),
        },
        text: text.to_string(),
    }
}

/// Register the greeting tools, example resources and prompt
pub fn register(builder: McpServerBuilder, multi_greet_delay: Duration) -> McpServerBuilder {
    builder
        .tool(Tool {
            name: "greet".to_string(),
            title: Some("Greeting Tool".to_string()),
            description: "A simple greeting tool".to_string(),
            input_schema: name_schema("Name to greet"),
            annotations: None,
            handler: Arc::new(GreetHandler),
        })
        .tool(Tool {
            name: "multi-greet".to_string(),
            title: None,
            description: "A tool that sends different greetings with delays between them"
                .to_string(),
            input_schema: name_schema("Name to greet"),
            annotations: Some(ToolAnnotations {
                title: Some("Multiple Greeting Tool".to_string()),
                read_only_hint: Some(true),
                open_world_hint: Some(false),
                ..Default::default()
            }),
            handler: Arc::new(MultiGreetHandler {
                delay: multi_greet_delay,
            }),
        })
        .tool(Tool {
            name: "start-notification-stream".to_string(),
            title: None,
            description: "Starts sending periodic notifications for testing resumability"
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "interval": {
                        "type": "number",
                        "description": "Interval in milliseconds between notifications",
                        "default": 100
                    },
                    "count": {
                        "type": "number",
                        "description": "Number of notifications to send (0 for unbounded)",
                        "default": 50
                    }
                }
            }),
            annotations: None,
            handler: Arc::new(NotificationStreamHandler),
        })
        .tool(Tool {
            name: "list-files".to_string(),
            title: Some("List Files with ResourceLinks".to_string()),
            description: "Returns a list of files as ResourceLinks without embedding their content"
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "includeDescriptions": {
                        "type": "boolean",
                        "description": "Whether to include descriptions in the resource links"
                    }
                }
            }),
            annotations: None,
            handler: Arc::new(ListFilesHandler),
        })
        .prompt(PromptTemplate {
            prompt: Prompt {
                name: "greeting-template".to_string(),
                title: Some("Greeting Template".to_string()),
                description: Some("A simple greeting prompt template".to_string()),
                arguments: vec![PromptArgument {
                    name: "name".to_string(),
                    description: Some("Name to include in greeting".to_string()),
                    required: true,
                }],
            },
            template: "Please greet {name} in a friendly manner.".to_string(),
        })
        .resource(text_resource(
            "greeting-resource",
            "https://example.com/greetings/default",
            "Default Greeting",
            "A simple greeting resource",
            "Hello, world!",
        ))
        .resource(text_resource(
            "example-file-1",
            "file:///example/file1.txt",
            "Example File 1",
            "First example file for ResourceLink demonstration",
            "This is the content of file 1",
        ))
        .resource(text_resource(
            "example-file-2",
            "file:///example/file2.txt",
            "Example File 2",
            "Second example file for ResourceLink demonstration",
            "This is the content of file 2",
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JsonRpcMessage;
    use crate::transport::{SessionChannel, StreamKey};

    fn attached_peer() -> (Arc<SessionChannel>, Peer, tokio::sync::mpsc::UnboundedReceiver<crate::transport::ServerEvent>) {
        let channel = Arc::new(SessionChannel::new(64));
        let (rx, _) = channel.attach_standalone(None).unwrap();
        let peer = Peer::new(channel.clone(), StreamKey::Standalone);
        (channel, peer, rx)
    }

    fn log_text(message: &JsonRpcMessage) -> String {
        match message {
            JsonRpcMessage::Notification(n) => n.params.as_ref().unwrap()["data"]
                .as_str()
                .unwrap()
                .to_string(),
            other => panic!("Expected notification, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_greet() {
        let (_, peer, _rx) = attached_peer();
        let result = GreetHandler
            .execute(json!({"name": "Ada"}), &peer)
            .await
            .unwrap();
        assert_eq!(result, CallToolResult::text("Hello, Ada!"));
    }

    #[tokio::test]
    async fn test_greet_requires_name() {
        let (_, peer, _rx) = attached_peer();
        let err = GreetHandler.execute(json!({}), &peer).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_multi_greet_notifies_in_order() {
        let (_, peer, mut rx) = attached_peer();
        let handler = MultiGreetHandler {
            delay: Duration::from_millis(1),
        };
        let result = handler.execute(json!({"name": "Ada"}), &peer).await.unwrap();
        assert_eq!(result, CallToolResult::text("Good morning, Ada!"));

        let texts: Vec<String> = (0..3)
            .map(|_| log_text(&rx.try_recv().unwrap().message))
            .collect();
        assert_eq!(
            texts,
            vec![
                "Starting multi-greet for Ada",
                "Sending first greeting to Ada",
                "Sending second greeting to Ada"
            ]
        );
    }

    #[tokio::test]
    async fn test_notification_stream_counts() {
        let (_, peer, mut rx) = attached_peer();
        let result = NotificationStreamHandler
            .execute(json!({"interval": 1, "count": 3}), &peer)
            .await
            .unwrap();
        assert_eq!(
            result,
            CallToolResult::text("Started sending periodic notifications every 1ms")
        );

        for n in 1..=3 {
            let text = log_text(&rx.try_recv().unwrap().message);
            assert!(text.starts_with(&format!("Periodic notification #{} at ", n)));
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unbounded_stream_stops_on_close() {
        let (channel, peer, _rx) = attached_peer();
        let task = tokio::spawn(async move {
            NotificationStreamHandler
                .execute(json!({"interval": 5, "count": 0}), &peer)
                .await
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        channel.close();

        let result = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("loop did not stop")
            .unwrap()
            .unwrap();
        assert_eq!(
            result,
            CallToolResult::text("Started sending periodic notifications every 5ms")
        );
    }

    #[tokio::test]
    async fn test_list_files() {
        let (_, peer, _rx) = attached_peer();
        let result = ListFilesHandler
            .execute(json!({"includeDescriptions": true}), &peer)
            .await
            .unwrap();
        assert_eq!(result.content.len(), 5);
        match &result.content[1] {
            Content::ResourceLink { uri, description, .. } => {
                assert_eq!(uri, "https://example.com/greetings/default");
                assert_eq!(description.as_deref(), Some("A simple greeting resource"));
            }
            other => panic!("Expected resource link, got {:?}", other),
        }

        let result = ListFilesHandler.execute(json!({}), &peer).await.unwrap();
        assert!(matches!(
            &result.content[2],
            Content::ResourceLink { description: None, .. }
        ));
    }
}
