//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are what let the agent act outside the conversation: check a
//! server's health, run a remote command, look something up in a database.
//! Each tool declares an [`ArgSchema`]; [`Tool::run`] validates arguments
//! against it before any tool logic executes.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ToolError;

/// JSON type an argument must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgKind {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
    Any,
}

impl ArgKind {
    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::Any => true,
        }
    }

    fn json_type(&self) -> Option<&'static str> {
        match self {
            Self::String => Some("string"),
            Self::Integer => Some("integer"),
            Self::Number => Some("number"),
            Self::Boolean => Some("boolean"),
            Self::Object => Some("object"),
            Self::Array => Some("array"),
            Self::Any => None,
        }
    }
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.json_type().unwrap_or("any"))
    }
}

/// One declared argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgSpec {
    pub name: String,
    pub kind: ArgKind,
    pub description: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// Declared arguments of a tool, in declaration order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArgSchema {
    args: Vec<ArgSpec>,
}

impl ArgSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required argument.
    pub fn required(mut self, name: &str, kind: ArgKind, description: &str) -> Self {
        self.args.push(ArgSpec {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required: true,
            default: None,
        });
        self
    }

    /// Add an optional argument with no default.
    pub fn optional(mut self, name: &str, kind: ArgKind, description: &str) -> Self {
        self.args.push(ArgSpec {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required: false,
            default: None,
        });
        self
    }

    /// Add an optional argument that is filled with `default` when absent.
    pub fn with_default(
        mut self,
        name: &str,
        kind: ArgKind,
        description: &str,
        default: impl Into<Value>,
    ) -> Self {
        self.args.push(ArgSpec {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required: false,
            default: Some(default.into()),
        });
        self
    }

    pub fn args(&self) -> &[ArgSpec] {
        &self.args
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Check `args` against the schema and fill in defaults.
    ///
    /// `null` is accepted as an empty object. Unknown keys are rejected.
    pub fn validate(&self, args: &Value) -> Result<Map<String, Value>, ToolError> {
        let mut obj = match args {
            Value::Null => Map::new(),
            Value::Object(m) => m.clone(),
            other => {
                return Err(ToolError::Validation(format!(
                    "arguments must be an object, got {}",
                    json_kind_name(other)
                )));
            }
        };

        if let Some(unknown) = obj.keys().find(|k| !self.args.iter().any(|a| &a.name == *k)) {
            return Err(ToolError::Validation(format!("unexpected field '{unknown}'")));
        }

        for spec in &self.args {
            match obj.get(&spec.name) {
                Some(value) if !value.is_null() => {
                    if !spec.kind.matches(value) {
                        return Err(ToolError::Validation(format!(
                            "field '{}' must be {}, got {}",
                            spec.name,
                            spec.kind,
                            json_kind_name(value)
                        )));
                    }
                }
                _ => {
                    if let Some(default) = &spec.default {
                        obj.insert(spec.name.clone(), default.clone());
                    } else if spec.required {
                        return Err(ToolError::Validation(format!(
                            "missing field '{}'",
                            spec.name
                        )));
                    } else {
                        obj.remove(&spec.name);
                    }
                }
            }
        }

        Ok(obj)
    }

    /// JSON Schema for the model-facing tool definition.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for spec in &self.args {
            let mut prop = Map::new();
            if let Some(t) = spec.kind.json_type() {
                prop.insert("type".into(), json!(t));
            }
            prop.insert("description".into(), json!(spec.description));
            if let Some(d) = &spec.default {
                prop.insert("default".into(), d.clone());
            }
            properties.insert(spec.name.clone(), Value::Object(prop));
            if spec.required {
                required.push(json!(spec.name));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

fn json_kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The outcome of a tool invocation.
///
/// `data` is present iff `success`; `error` is present iff not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl ToolResult {
    pub fn success(data: impl Into<Value>) -> Self {
        Self {
            success: true,
            data: Some(data.into()),
            error: None,
            metadata: Map::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl From<ToolError> for ToolResult {
    fn from(err: ToolError) -> Self {
        Self::failure(err.to_string())
    }
}

impl fmt::Display for ToolResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.success {
            match &self.data {
                Some(Value::String(s)) => write!(f, "Success: {s}"),
                Some(v) => write!(f, "Success: {v}"),
                None => f.write_str("Success"),
            }
        } else {
            write!(f, "Error: {}", self.error.as_deref().unwrap_or("unknown error"))
        }
    }
}

/// Model-facing description of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments
    pub parameters: Value,
}

/// The core Tool trait.
///
/// Implementors provide [`Tool::execute`]; callers go through [`Tool::run`],
/// which validates first and never calls `execute` with invalid arguments.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name (e.g., "get_system_status").
    fn name(&self) -> &str;

    /// What the tool does, shown to the model.
    fn description(&self) -> &str;

    fn schema(&self) -> &ArgSchema;

    /// Tool logic. `args` has already been validated and defaulted.
    async fn execute(&self, args: Map<String, Value>) -> ToolResult;

    /// Validate `args` then execute.
    async fn run(&self, args: Value) -> ToolResult {
        match self.schema().validate(&args) {
            Ok(valid) => self.execute(valid).await,
            Err(err) => {
                tracing::debug!(tool = %self.name(), error = %err, "Rejected tool arguments");
                err.into()
            }
        }
    }

    fn definition(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.schema().to_json_schema(),
        }
    }
}

type Handler = dyn Fn(Map<String, Value>) -> BoxFuture<'static, Result<Value, String>> + Send + Sync;

/// A tool built from a plain async function.
pub struct FnTool {
    name: String,
    description: String,
    schema: ArgSchema,
    handler: Box<Handler>,
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn schema(&self) -> &ArgSchema {
        &self.schema
    }

    async fn execute(&self, args: Map<String, Value>) -> ToolResult {
        match (self.handler)(args).await {
            Ok(data) => ToolResult::success(data),
            Err(error) => ToolResult::failure(error),
        }
    }
}

/// Build a [`Tool`] from a name, description, schema and async handler.
///
/// ```ignore
/// let echo = tool_fn("echo", "Echo text back", ArgSchema::new()
///     .required("text", ArgKind::String, "Text to echo"),
///     |args| async move { Ok(args["text"].clone()) });
/// ```
pub fn tool_fn<F, Fut>(name: &str, description: &str, schema: ArgSchema, handler: F) -> FnTool
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Value, String>> + Send + 'static,
{
    FnTool {
        name: name.to_string(),
        description: description.to_string(),
        schema,
        handler: Box::new(move |args| Box::pin(handler(args))),
    }
}

/// A registry of available tools, kept in registration order.
///
/// Read-mostly after startup; share it as `Arc<ToolRegistry>`.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name in place.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if let Some(&pos) = self.index.get(&name) {
            tracing::debug!(tool = %name, "Replacing registered tool");
            self.tools[pos] = tool;
        } else {
            self.index.insert(name, self.tools.len());
            self.tools.push(tool);
        }
    }

    /// Remove a tool by name. Returns whether it was registered.
    pub fn unregister(&mut self, name: &str) -> bool {
        let Some(pos) = self.index.remove(name) else {
            return false;
        };
        self.tools.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        true
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Tool>, ToolError> {
        self.index
            .get(name)
            .map(|&pos| Arc::clone(&self.tools[pos]))
            .ok_or_else(|| ToolError::NotFound {
                name: name.to_string(),
                available: self.names(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Registered tool names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    /// Definitions for the model, in registration order.
    pub fn schema_export(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry").field("tools", &self.names()).finish()
    }
}
