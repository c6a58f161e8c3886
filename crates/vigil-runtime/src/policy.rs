//! Presence policy
//!
//! Pure decision function from a presence edge plus the session's
//! connection facts to the action the orchestrator should take. Timers and
//! side effects live in the orchestrator.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use vigil_core::{Presence, SessionConnectionState};

/// Reconnect only after the session has been down longer than this
pub const DEFAULT_RECONNECT_AFTER: Duration = Duration::from_secs(15 * 60);

/// How long the face must stay away before the session is dropped
pub const DEFAULT_DISAPPEAR_GRACE: Duration = Duration::from_secs(60);

/// Opening prompt sent after the user context
pub const DEFAULT_GREETING: &str = "Hello! Let's get started.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    #[serde(with = "crate::config::duration_str")]
    pub reconnect_after: Duration,
    #[serde(with = "crate::config::duration_str")]
    pub disappear_grace: Duration,
    /// Refuse a manual session start while the microphone is off
    pub require_microphone: bool,
    pub greeting: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        PolicyConfig {
            reconnect_after: DEFAULT_RECONNECT_AFTER,
            disappear_grace: DEFAULT_DISAPPEAR_GRACE,
            require_microphone: true,
            greeting: DEFAULT_GREETING.to_string(),
        }
    }
}

/// A change of presence into present or absent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceEdge {
    Appeared,
    Disappeared,
}

impl PresenceEdge {
    /// Edge for a presence change, `None` when nothing changed or the new
    /// presence is unknown
    pub fn between(prev: Presence, next: Presence) -> Option<Self> {
        if prev == next {
            return None;
        }
        match next {
            Presence::Present => Some(PresenceEdge::Appeared),
            Presence::Absent => Some(PresenceEdge::Disappeared),
            Presence::Unknown => None,
        }
    }
}

/// Session facts the decision depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionFacts {
    pub started: bool,
    pub connection: SessionConnectionState,
    pub disconnected_for: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyAction {
    Ignore,
    Connect,
    ScheduleDisconnect,
    CancelDisconnect,
}

#[derive(Debug, Clone)]
pub struct PresencePolicy {
    reconnect_after: Duration,
}

impl PresencePolicy {
    pub fn new(config: &PolicyConfig) -> Self {
        PresencePolicy {
            reconnect_after: config.reconnect_after,
        }
    }

    pub fn decide(&self, edge: PresenceEdge, facts: SessionFacts) -> PolicyAction {
        if !facts.started {
            return PolicyAction::Ignore;
        }

        match edge {
            PresenceEdge::Appeared => match facts.connection {
                SessionConnectionState::Idle | SessionConnectionState::Disconnected
                    if facts.disconnected_for > self.reconnect_after =>
                {
                    PolicyAction::Connect
                }
                _ => PolicyAction::CancelDisconnect,
            },
            PresenceEdge::Disappeared => {
                if facts.connection.is_connected() {
                    PolicyAction::ScheduleDisconnect
                } else {
                    PolicyAction::Ignore
                }
            }
        }
    }
}

impl Default for PresencePolicy {
    fn default() -> Self {
        Self::new(&PolicyConfig::default())
    }
}
