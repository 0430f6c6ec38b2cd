//! Agent identity and registration contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use conductor_core::{AgentId, CapabilitySet};

/// Informational worker state.
///
/// Reported by agents for the dashboard; assignment never gates on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Active,
    Busy,
    Offline,
    Error,
}

/// A worker identity with declared capability tags.
///
/// Capabilities are an immutable contract advertised at registration; they
/// are used only for eligibility matching, never enforced beyond it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub capabilities: CapabilitySet,
    pub status: AgentStatus,
    pub registered_at: DateTime<Utc>,
}

impl Agent {
    pub fn register(name: impl Into<String>, capabilities: CapabilitySet) -> Self {
        Self {
            id: AgentId::new(),
            name: name.into(),
            capabilities,
            status: AgentStatus::Idle,
            registered_at: Utc::now(),
        }
    }
}
