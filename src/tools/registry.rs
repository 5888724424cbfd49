//! Tool registry - manages and dispatches tool calls
//!
//! Central hub for registering tools and routing tool calls to handlers.
//! Built once at startup and shared read-only across sessions.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::core::{Config, Message, Result, ToolCall, ToolDefinition};
use crate::tools::booking::{BookAppointmentTool, BookingStore};
use crate::tools::disease::DiseaseInfoTool;
use crate::tools::doctors::DoctorDirectoryTool;
use crate::tools::hospitals::NearbyHospitalsTool;
use crate::tools::math::EvaluateExpressionTool;
use crate::tools::web::WebSearchTool;

/// A capability the model can invoke by name
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model uses to call the tool
    fn name(&self) -> &str;

    /// Tells the model when to use the tool
    fn description(&self) -> &str;

    /// JSON Schema of the accepted arguments
    fn parameters(&self) -> serde_json::Value;

    /// Run the tool; errors become tool-role error messages
    async fn invoke(&self, args: serde_json::Value) -> Result<String>;

    /// Schema sent to the model
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(self.name(), self.description(), self.parameters())
    }
}

/// Registry of available tools
pub struct ToolRegistry {
    /// Tools indexed by name
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Registration order, so schemas are sent deterministically
    order: Vec<String>,
    /// Upper bound for one invocation
    timeout: Duration,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Create a registry with the built-in healthcare tools
    pub fn with_defaults(config: &Config) -> Result<Self> {
        let mut registry = Self::new().with_timeout(config.agent.tool_timeout());

        registry.register(EvaluateExpressionTool::new());
        registry.register(WebSearchTool::from_config(config)?);
        registry.register(DiseaseInfoTool::from_config(config)?);
        registry.register(NearbyHospitalsTool::from_config(config)?);
        registry.register(DoctorDirectoryTool::new(config.tools.doctors.clone()));
        registry.register(BookAppointmentTool::new(BookingStore::new(
            config.tools.booking_file.clone(),
        )));

        Ok(registry)
    }

    /// Set the per-invocation timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    /// Register a tool from Arc
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Get all tool definitions, in registration order
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.definition())
            .collect()
    }

    /// Registered tool names
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool call, always producing a tool-role message with the call's id
    pub async fn execute(&self, call: &ToolCall) -> Message {
        let Some(tool) = self.get(&call.name) else {
            warn!(tool = %call.name, call_id = %call.id, "unknown tool requested");
            return Message::tool(
                &call.id,
                &call.name,
                format!("Error: unknown tool '{}'", call.name),
            );
        };

        debug!(tool = %call.name, call_id = %call.id, "invoking tool");

        let content =
            match tokio::time::timeout(self.timeout, tool.invoke(call.arguments.clone())).await {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => {
                    warn!(tool = %call.name, error = %e, "tool failed");
                    format!("Error: {}", e)
                }
                Err(_) => {
                    warn!(tool = %call.name, "tool timed out");
                    format!(
                        "Error: tool '{}' timed out after {}s",
                        call.name,
                        self.timeout.as_secs()
                    )
                }
            };

        Message::tool(&call.id, &call.name, content)
    }

    /// Resolve calls one at a time, in the order received
    pub async fn execute_all(&self, calls: &[ToolCall]) -> Vec<Message> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.execute(call).await);
        }
        results
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
