//! Tool dispatch for the conversation loop.
//!
//! The operation set is small and fixed by the axe server contract, so
//! dispatch is a closed enum rather than anything dynamic. Failures at this
//! layer are values ([`ToolError`]) that get handed back into the
//! conversation as tool results; they never abort the loop.

use anyhow::Result;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::axe::AxeServer;
use crate::contrast;

/// A tool-level failure. Serialized as `{"error": "..."}` and fed back to
/// the model like any other tool result.
#[derive(Debug, Clone, Serialize)]
pub struct ToolError {
    pub error: String,
}

impl ToolError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }

    pub fn into_value(self) -> Value {
        json!({ "error": self.error })
    }
}

/// The closed set of operations the model may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    TestHtmlAccessibility,
    CheckColorContrast,
    GetAccessibilityRules,
}

impl ToolKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "test_html_accessibility" => Some(Self::TestHtmlAccessibility),
            "check_color_contrast" => Some(Self::CheckColorContrast),
            "get_accessibility_rules" => Some(Self::GetAccessibilityRules),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::TestHtmlAccessibility => "test_html_accessibility",
            Self::CheckColorContrast => "check_color_contrast",
            Self::GetAccessibilityRules => "get_accessibility_rules",
        }
    }
}

/// Schema for one callable operation, sent to the LLM with every request.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: ToolKind::TestHtmlAccessibility.name().to_string(),
            description: "Run the axe accessibility test suite against an HTML string and return the violations found".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "html": {
                        "type": "string",
                        "description": "The full HTML document to test"
                    },
                    "tags": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "WCAG tags to test against (default: [\"wcag2aa\"])"
                    }
                },
                "required": ["html"]
            }),
        },
        ToolDefinition {
            name: ToolKind::CheckColorContrast.name().to_string(),
            description: "Check the WCAG contrast ratio between a foreground and a background color".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "foreground": {
                        "type": "string",
                        "description": "Foreground color as a 6-digit hex value (e.g. '#1a2b3c')"
                    },
                    "background": {
                        "type": "string",
                        "description": "Background color as a 6-digit hex value"
                    },
                    "fontSize": {
                        "type": "number",
                        "description": "Font size in pixels (default: 16)"
                    },
                    "isBold": {
                        "type": "boolean",
                        "description": "Whether the text is bold (default: false)"
                    }
                },
                "required": ["foreground", "background"]
            }),
        },
        ToolDefinition {
            name: ToolKind::GetAccessibilityRules.name().to_string(),
            description: "List the accessibility rules the axe server knows for the given WCAG tags".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "tags": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "WCAG tags to filter rules by (default: [\"wcag2aa\"])"
                    }
                }
            }),
        },
    ]
}

/// Seam between the conversation loop and tool execution, so tests can
/// drive the loop with a scripted executor.
#[allow(async_fn_in_trait)]
pub trait ToolExecutor {
    async fn execute(&mut self, name: &str, arguments: &Value) -> Result<Value, ToolError>;
}

/// Executes tool calls against a running [`AxeServer`].
pub struct AxeToolInvoker {
    server: AxeServer,
}

impl AxeToolInvoker {
    pub fn new(server: AxeServer) -> Self {
        Self { server }
    }

    /// Give the server handle back so the owning scope can shut it down.
    pub fn into_server(self) -> AxeServer {
        self.server
    }

    async fn test_html(&mut self, args: &Value) -> Result<Value, ToolError> {
        let html = args
            .get("html")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::new("missing 'html' argument"))?;
        let tags = tags_or_default(args);

        self.server
            .call("test_html_string", json!({ "html": html, "tags": tags }))
            .await
            .map_err(|e| ToolError::new(format!("accessibility test failed: {:#}", e)))
    }

    async fn check_contrast(&mut self, args: &Value) -> Result<Value, ToolError> {
        let foreground = args
            .get("foreground")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::new("missing 'foreground' argument"))?
            .to_string();
        let background = args
            .get("background")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::new("missing 'background' argument"))?
            .to_string();
        let font_size = args.get("fontSize").and_then(Value::as_f64).unwrap_or(16.0);
        let is_bold = args.get("isBold").and_then(Value::as_bool).unwrap_or(false);

        let params = json!({
            "foreground": foreground,
            "background": background,
            "fontSize": font_size,
            "isBold": is_bold,
        });
        match self.server.call("check_color_contrast", params).await {
            Ok(result) => Ok(result),
            Err(e) => {
                // Best-effort path: the contrast math is simple enough to
                // answer locally when the server cannot.
                warn!("contrast check via axe server failed, computing locally: {:#}", e);
                let result = contrast::contrast_ratio(&foreground, &background);
                serde_json::to_value(result)
                    .map_err(|e| ToolError::new(format!("contrast fallback failed: {}", e)))
            }
        }
    }

    async fn get_rules(&mut self, args: &Value) -> Result<Value, ToolError> {
        let tags = tags_or_default(args);
        self.server
            .call("get_rules", json!({ "tags": tags }))
            .await
            .map_err(|e| ToolError::new(format!("rules lookup failed: {:#}", e)))
    }
}

impl ToolExecutor for AxeToolInvoker {
    async fn execute(&mut self, name: &str, arguments: &Value) -> Result<Value, ToolError> {
        match ToolKind::from_name(name) {
            Some(ToolKind::TestHtmlAccessibility) => self.test_html(arguments).await,
            Some(ToolKind::CheckColorContrast) => self.check_contrast(arguments).await,
            Some(ToolKind::GetAccessibilityRules) => self.get_rules(arguments).await,
            None => Err(ToolError::new(format!("unknown tool: {}", name))),
        }
    }
}

fn tags_or_default(args: &Value) -> Vec<String> {
    args.get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .filter(|tags| !tags.is_empty())
        .unwrap_or_else(|| vec!["wcag2aa".to_string()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_kind_round_trip() {
        for kind in [
            ToolKind::TestHtmlAccessibility,
            ToolKind::CheckColorContrast,
            ToolKind::GetAccessibilityRules,
        ] {
            assert_eq!(ToolKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ToolKind::from_name("delete_everything"), None);
    }

    #[test]
    fn test_definitions_cover_every_kind() {
        let names: Vec<String> = tool_definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names.len(), 3);
        for name in &names {
            assert!(ToolKind::from_name(name).is_some(), "schema for unknown tool {}", name);
        }
    }

    #[test]
    fn test_tags_default() {
        assert_eq!(tags_or_default(&json!({})), vec!["wcag2aa"]);
        assert_eq!(tags_or_default(&json!({ "tags": [] })), vec!["wcag2aa"]);
        assert_eq!(
            tags_or_default(&json!({ "tags": ["wcag21aaa", "best-practice"] })),
            vec!["wcag21aaa", "best-practice"]
        );
    }

    #[test]
    fn test_tool_error_shape() {
        let value = ToolError::new("boom").into_value();
        assert_eq!(value, json!({ "error": "boom" }));
    }
}
