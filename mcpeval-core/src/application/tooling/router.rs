use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::error::ToolInvokeError;
use super::interface::{ConnectionState, ToolConnection};
use crate::domain::ToolDescriptor;

/// A tool dropped from the table because an earlier server already owns its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowedTool {
    pub name: String,
    pub kept_owner: String,
    pub dropped_owner: String,
}

/// Read-only map from tool name to the connection that serves it.
///
/// Built once in server order, then tool order within each server. On a name
/// collision the first registration wins and later ones are recorded in
/// [`ToolRouter::shadowed`].
pub struct ToolRouter {
    routes: HashMap<String, Arc<dyn ToolConnection>>,
    descriptors: Vec<ToolDescriptor>,
    shadowed: Vec<ShadowedTool>,
}

impl ToolRouter {
    pub fn build(connections: &[Arc<dyn ToolConnection>]) -> Self {
        let mut routes: HashMap<String, Arc<dyn ToolConnection>> = HashMap::new();
        let mut descriptors = Vec::new();
        let mut shadowed = Vec::new();

        for connection in connections {
            if connection.state() != ConnectionState::Ready {
                debug!(
                    server = connection.id(),
                    state = ?connection.state(),
                    "skipping connection that is not ready"
                );
                continue;
            }
            for tool in connection.tools() {
                if let Some(existing) = routes.get(&tool.name) {
                    warn!(
                        tool = %tool.name,
                        kept = existing.id(),
                        dropped = connection.id(),
                        "duplicate tool name; keeping the first registration"
                    );
                    shadowed.push(ShadowedTool {
                        name: tool.name.clone(),
                        kept_owner: existing.id().to_string(),
                        dropped_owner: connection.id().to_string(),
                    });
                    continue;
                }
                routes.insert(tool.name.clone(), Arc::clone(connection));
                descriptors.push(ToolDescriptor {
                    owner: connection.id().to_string(),
                    ..tool.clone()
                });
            }
        }

        Self {
            routes,
            descriptors,
            shadowed,
        }
    }

    /// Merged tool list in registration order, one entry per routable name.
    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    pub fn owner(&self, name: &str) -> Option<&str> {
        self.routes.get(name).map(|connection| connection.id())
    }

    pub fn shadowed(&self) -> &[ShadowedTool] {
        &self.shadowed
    }

    pub fn contains(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub async fn invoke(
        &self,
        name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> Result<String, ToolInvokeError> {
        let connection = self
            .routes
            .get(name)
            .ok_or_else(|| ToolInvokeError::UnknownTool {
                tool: name.to_string(),
            })?;
        connection.call_tool(name, arguments, timeout).await
    }
}
