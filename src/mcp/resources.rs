//! Static resources and prompt templates.

use serde_json::{Map, Value};

use super::tools::ToolError;
use crate::models::{
    Content, GetPromptResult, Prompt, PromptMessage, ReadResourceResult, Resource,
    ResourceContents, Role,
};

/// A resource whose body is fixed text
#[derive(Debug, Clone)]
pub struct StaticResource {
    pub resource: Resource,
    pub text: String,
}

/// Resources in registration order
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    resources: Vec<StaticResource>,
}

impl ResourceRegistry {
    /// Register a resource; a later registration of the same URI wins
    pub fn register(&mut self, resource: StaticResource) {
        self.resources
            .retain(|existing| existing.resource.uri != resource.resource.uri);
        self.resources.push(resource);
    }

    pub fn list(&self) -> Vec<Resource> {
        self.resources.iter().map(|r| r.resource.clone()).collect()
    }

    pub fn read(&self, uri: &str) -> Option<ReadResourceResult> {
        self.resources
            .iter()
            .find(|r| r.resource.uri == uri)
            .map(|r| ReadResourceResult {
                contents: vec![ResourceContents {
                    uri: r.resource.uri.clone(),
                    mime_type: r.resource.mime_type.clone(),
                    text: r.text.clone(),
                }],
            })
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// A prompt rendered by substituting `{argument}` placeholders
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub prompt: Prompt,
    pub template: String,
}

impl PromptTemplate {
    /// Render the template as a single user message
    pub fn render(&self, arguments: &Map<String, Value>) -> Result<GetPromptResult, ToolError> {
        let mut text = self.template.clone();
        for argument in &self.prompt.arguments {
            let value = match arguments.get(&argument.name) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None if argument.required => {
                    return Err(ToolError::InvalidArguments(format!(
                        "missing required argument '{}'",
                        argument.name
                    )))
                }
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            text = text.replace(&format!("{{{}}}", argument.name), &value);
        }

        Ok(GetPromptResult {
            description: self.prompt.description.clone(),
            messages: vec![PromptMessage {
                role: Role::User,
                content: Content::text(text),
            }],
        })
    }
}

/// Prompts in registration order
#[derive(Debug, Clone, Default)]
pub struct PromptRegistry {
    prompts: Vec<PromptTemplate>,
}

impl PromptRegistry {
    pub fn register(&mut self, prompt: PromptTemplate) {
        self.prompts
            .retain(|existing| existing.prompt.name != prompt.prompt.name);
        self.prompts.push(prompt);
    }

    pub fn list(&self) -> Vec<Prompt> {
        self.prompts.iter().map(|p| p.prompt.clone()).collect()
    }

    pub fn get(&self, name: &str, arguments: &Map<String, Value>) -> Result<GetPromptResult, ToolError> {
        self.prompts
            .iter()
            .find(|p| p.prompt.name == name)
            .ok_or_else(|| ToolError::NotFound(format!("prompt '{}'", name)))?
            .render(arguments)
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }
}
