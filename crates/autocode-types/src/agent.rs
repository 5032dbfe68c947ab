//! Agent persona as seen by work contexts.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The parts of an agent a work context needs to provision its workspace.
///
/// Agents themselves are managed elsewhere; callers pass the resolved profile
/// in when creating a context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: Uuid,
    /// Persona text written into research workspaces.
    #[serde(default)]
    pub identity: String,
    /// Rules prepended to every project identity file.
    #[serde(default)]
    pub global_rules: String,
}

/// The authenticated caller that owns contexts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub user_id: Uuid,
    pub username: String,
}
