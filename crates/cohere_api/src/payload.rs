use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Request payload for the v2 chat endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohereChatRequest {
    pub model: String,
    pub messages: Vec<CohereMessage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
    /// Default: true.
    #[serde(default = "default_true")]
    pub stream: bool,
}

fn default_true() -> bool {
    true
}

impl CohereChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<CohereMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            stream: true,
        }
    }

    pub fn with_tools(mut self, tools: Vec<Value>) -> Self {
        self.tools = tools;
        self
    }
}

/// One chat message, tagged by `role`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum CohereMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_plan: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<CohereToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: Value,
    },
}

impl CohereMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    /// Assistant message. Turns that only requested tools carry the text as
    /// `tool_plan` since the API rejects content next to tool calls.
    pub fn assistant(content: impl Into<String>, tool_calls: Vec<CohereToolCall>) -> Self {
        let content = content.into();
        let text = (!content.is_empty()).then_some(content);
        if tool_calls.is_empty() {
            Self::Assistant {
                content: text,
                tool_plan: None,
                tool_calls,
            }
        } else {
            Self::Assistant {
                content: None,
                tool_plan: text,
                tool_calls,
            }
        }
    }

    /// Tool result wrapped as a single document.
    pub fn tool_result(tool_call_id: impl Into<String>, data: impl Into<String>) -> Self {
        Self::Tool {
            tool_call_id: tool_call_id.into(),
            content: json!([{
                "type": "document",
                "document": { "data": data.into() }
            }]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohereToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: CohereFunctionCall,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohereFunctionCall {
    pub name: String,
    /// JSON-encoded argument object.
    pub arguments: String,
}

impl CohereToolCall {
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: "function".to_string(),
            function: CohereFunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// Build a function tool declaration.
pub fn tool_definition(name: &str, description: Option<&str>, parameters: &Value) -> Value {
    let mut function = json!({
        "name": name,
        "parameters": parameters,
    });
    if let Some(description) = description {
        function["description"] = Value::String(description.to_string());
    }
    json!({
        "type": "function",
        "function": function,
    })
}
