//! Per-connection state the coordinator keeps for its own decisions.
//!
//! The host remains the owner of the task queue and the player; this only
//! records what the coordinator has learned and decided about a session.

use crate::host::ConfigTask;
use crate::recursion_guard;
use log::{debug, info};
use shared::{Phase, SessionId};
use std::collections::HashMap;
use std::fmt::Write;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub display_name: String,
    /// Resolved once at accept time and never changed afterwards
    is_bridged: bool,
    phase: Phase,
    /// Set when the session enters `Configuring`
    pub config_started_at: Option<Instant>,
    /// Whether the one graceful completion round already ran
    pub graceful_attempted: bool,
}

impl Session {
    pub fn new(id: SessionId, display_name: impl Into<String>, is_bridged: bool) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            is_bridged,
            phase: Phase::Configuring,
            config_started_at: None,
            graceful_attempted: false,
        }
    }

    pub fn is_bridged(&self) -> bool {
        self.is_bridged
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Moves the phase forward. Returns false for a backward or repeated move.
    pub fn advance(&mut self, next: Phase) -> bool {
        if !self.phase.can_advance_to(next) {
            return false;
        }
        debug!("Session {} phase {:?} -> {:?}", self.id, self.phase, next);
        self.phase = next;
        true
    }

    /// Time since the session entered configuration.
    pub fn configuring_for(&self) -> Option<Duration> {
        self.config_started_at.map(|started| started.elapsed())
    }

    /// Diagnostic description, bounded against runaway nesting.
    pub fn describe(&self, bound: usize) -> String {
        recursion_guard::guarded(bound, "Session", self.id, || {
            format!(
                "Session {{ id: {}, name: {:?}, bridged: {}, phase: {:?} }}",
                self.id, self.display_name, self.is_bridged, self.phase
            )
        })
    }
}

/// Joins task descriptions for logging under the concatenation depth bound.
pub fn describe_tasks(tasks: &[ConfigTask], bound: usize) -> String {
    recursion_guard::guarded(bound, "ConfigTasks", tasks.len(), || {
        let mut text = String::from("[");
        for (index, task) in tasks.iter().enumerate() {
            if index > 0 {
                text.push_str(", ");
            }
            let _ = write!(text, "#{} {}", task.id, task.kind);
        }
        text.push(']');
        text
    })
}

/// All sessions the coordinator currently tracks, keyed by session id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking a session. A reconnect with the same id replaces the old entry.
    pub fn insert(&mut self, session: Session) {
        info!(
            "Tracking session {} ({}, bridged: {})",
            session.id,
            session.display_name,
            session.is_bridged()
        );
        self.sessions.insert(session.id, session);
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        self.sessions.remove(&id)
    }

    pub fn is_bridged(&self, id: SessionId) -> bool {
        self.get(id).map(Session::is_bridged).unwrap_or(false)
    }

    pub fn bridged_count(&self) -> usize {
        self.sessions.values().filter(|s| s.is_bridged()).count()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
