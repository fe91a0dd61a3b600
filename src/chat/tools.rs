//! Externally supplied callable capabilities and the tool advertisement
//! schema sent to the generation API.
use anyhow::{Error, Result, anyhow, bail};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// A custom function the model can call. The handler receives the
/// decoded argument object and returns a string or any JSON-serializable
/// value; the driver stringifies it into the function-call output entry.
#[async_trait]
pub trait FunctionTool: Send + Sync {
    fn name(&self) -> String;
    fn description(&self) -> String;
    /// JSON Schema for the argument object.
    fn parameters(&self) -> Value;
    async fn call(&self, args: Value) -> Result<Value, Error>;
}

pub type BoxedFunctionTool = Box<dyn FunctionTool>;

/// The set of custom functions advertised for one chat session. Names
/// are unique; dispatching to an unregistered name is a contract
/// violation, not a recoverable condition.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<BoxedFunctionTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: BoxedFunctionTool) -> Result<()> {
        if self.tools.iter().any(|t| t.name() == tool.name()) {
            bail!("Tool is already registered: {}", tool.name());
        }
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&dyn FunctionTool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
            .ok_or_else(|| anyhow!("Received tool call that doesn't exist: {}", name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn FunctionTool> {
        self.tools.iter().map(|t| t.as_ref())
    }
}

/// One entry of the tool list advertised to the generation API.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolSpec {
    Function {
        name: String,
        description: String,
        parameters: Value,
    },
    FileSearch {
        vector_store_ids: Vec<String>,
    },
    CodeInterpreter {
        container: String,
    },
    WebSearch,
    ImageGeneration {
        partial_images: u8,
    },
    Mcp {
        server_label: String,
        server_url: String,
        require_approval: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        headers: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        allowed_tools: Option<Vec<String>>,
    },
}

impl ToolSpec {
    pub fn function(tool: &dyn FunctionTool) -> Self {
        Self::Function {
            name: tool.name(),
            description: tool.description(),
            parameters: tool.parameters(),
        }
    }
}

/// A remote MCP server to advertise as a tool.
#[derive(Clone, Debug)]
pub struct McpServer {
    pub server_label: String,
    pub server_url: String,
    pub require_approval: String,
    pub headers: Option<Value>,
    pub allowed_tools: Option<Vec<String>>,
}

impl From<McpServer> for ToolSpec {
    fn from(server: McpServer) -> Self {
        ToolSpec::Mcp {
            server_label: server.server_label,
            server_url: server.server_url,
            require_approval: server.require_approval,
            headers: server.headers,
            allowed_tools: server.allowed_tools,
        }
    }
}
