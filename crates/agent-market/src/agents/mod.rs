//! Analyst agents of the crew
//!
//! An [`AnalystAgent`] is a [`ToolAgent`] configured from a [`AnalystRole`]:
//! the role's persona becomes the system prompt and only the role's tools
//! are registered.

pub mod roles;

pub use roles::{AnalystRole, ROLES};

use agent_core::{Agent, Context, Result as AgentResult};
use agent_runtime::{AgentRuntime, ToolAgent};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::instrument;

use crate::error::Result;
use crate::prompts::PromptLibrary;
use crate::tools::MarketToolbox;

/// Tool-using agent playing one analyst role
pub struct AnalystAgent {
    role: &'static AnalystRole,
    inner: ToolAgent,
}

impl AnalystAgent {
    pub fn new(
        runtime: &AgentRuntime,
        prompts: &PromptLibrary,
        toolbox: &MarketToolbox,
        role: &'static AnalystRole,
    ) -> Result<Self> {
        let system = prompts.render_system(role)?;
        let registry = Arc::new(toolbox.registry_for(role.tools));
        let inner = runtime.create_tool_agent(runtime.executor_config(system), role.role, registry);
        Ok(Self { role, inner })
    }

    pub fn role(&self) -> &'static AnalystRole {
        self.role
    }

    /// Names of the tools this analyst may call
    pub fn tool_names(&self) -> Vec<String> {
        self.inner.executor().tools().names()
    }
}

#[async_trait]
impl Agent for AnalystAgent {
    #[instrument(skip(self, input, context), fields(stage = self.role.stage_id))]
    async fn process(&self, input: String, context: &mut Context) -> AgentResult<String> {
        self.inner.process(input, context).await
    }

    fn name(&self) -> &str {
        self.role.role
    }
}
