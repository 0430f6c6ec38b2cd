//! Agent registry.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::info;

use conductor_core::{AgentId, CapabilitySet, EngineError, EngineResult};
use conductor_tasks::{Agent, AgentStatus};

/// Registry of worker identities.
///
/// Registration fixes an agent's capability set; status updates are
/// informational only and never gate assignment.
pub trait AgentRegistry: Send + Sync {
    fn register(&self, name: String, capabilities: CapabilitySet) -> EngineResult<Agent>;
    fn get(&self, id: AgentId) -> EngineResult<Agent>;
    fn set_status(&self, id: AgentId, status: AgentStatus) -> EngineResult<Agent>;
    fn list(&self) -> Vec<Agent>;
}

/// In-memory agent registry.
#[derive(Debug, Default)]
pub struct InMemoryAgentRegistry {
    agents: RwLock<HashMap<AgentId, Agent>>,
}

impl InMemoryAgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AgentRegistry for InMemoryAgentRegistry {
    fn register(&self, name: String, capabilities: CapabilitySet) -> EngineResult<Agent> {
        if name.trim().is_empty() {
            return Err(EngineError::validation("agent name must not be empty"));
        }
        let agent = Agent::register(name, capabilities);
        info!(agent_id = %agent.id, name = %agent.name, "agent registered");
        self.agents
            .write()
            .unwrap()
            .insert(agent.id, agent.clone());
        Ok(agent)
    }

    fn get(&self, id: AgentId) -> EngineResult<Agent> {
        self.agents
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(EngineError::NotFound)
    }

    fn set_status(&self, id: AgentId, status: AgentStatus) -> EngineResult<Agent> {
        let mut agents = self.agents.write().unwrap();
        let agent = agents.get_mut(&id).ok_or(EngineError::NotFound)?;
        agent.status = status;
        Ok(agent.clone())
    }

    fn list(&self) -> Vec<Agent> {
        let mut all: Vec<Agent> = self.agents.read().unwrap().values().cloned().collect();
        all.sort_by(|a, b| a.registered_at.cmp(&b.registered_at));
        all
    }
}
