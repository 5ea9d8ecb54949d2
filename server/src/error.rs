//! Typed failures for every boundary the coordinator crosses.

use crate::coordinator::CompletionStrategy;
use shared::SessionId;
use std::fmt;
use thiserror::Error;

/// Failure of a single call into the host server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// The host version does not expose this operation
    #[error("host does not support `{operation}`")]
    Unsupported { operation: &'static str },

    /// The session is no longer known to the host
    #[error("session {0} is not known to the host")]
    SessionGone(SessionId),

    /// The host refused the operation in its current state
    #[error("host rejected `{operation}`: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },
}

/// Failure of a bridge registry lookup. Never surfaced past the detector.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("bridge registry unavailable: {0}")]
    Unavailable(String),

    #[error("bridge registry lookup exceeded {0} ms")]
    TimedOut(u64),
}

/// One failed attempt within a completion round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyFailure {
    pub strategy: CompletionStrategy,
    pub cause: StrategyFailureCause,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyFailureCause {
    Host(HostError),
    /// The host accepted the call but the client has not confirmed it
    Unconfirmed,
}

impl fmt::Display for StrategyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            StrategyFailureCause::Host(err) => write!(f, "{}: {}", self.strategy, err),
            StrategyFailureCause::Unconfirmed => write!(f, "{}: unconfirmed", self.strategy),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    /// Every strategy of the round failed
    #[error("all completion strategies failed for {session}: {}", join_failures(.failures))]
    Exhausted {
        session: SessionId,
        failures: Vec<StrategyFailure>,
    },
}

fn join_failures(failures: &[StrategyFailure]) -> String {
    failures
        .iter()
        .map(|failure| failure.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}
