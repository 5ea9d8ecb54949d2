//! Work handed from timer tasks back to the tick thread.
//!
//! Timers never touch session or world state themselves; they post a job
//! here and the tick loop runs it against the host.

use shared::SessionId;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickJob {
    WatchdogExpired { session_id: SessionId, generation: u64 },
    SpawnFollowup { session_id: SessionId, stage: usize },
    ForcedRespawn { session_id: SessionId },
}

impl TickJob {
    pub fn session_id(&self) -> SessionId {
        match self {
            TickJob::WatchdogExpired { session_id, .. }
            | TickJob::SpawnFollowup { session_id, .. }
            | TickJob::ForcedRespawn { session_id } => *session_id,
        }
    }
}

pub type TickSender = mpsc::UnboundedSender<TickJob>;
pub type TickReceiver = mpsc::UnboundedReceiver<TickJob>;

/// Queue from timer tasks to the tick loop.
pub fn tick_channel() -> (TickSender, TickReceiver) {
    mpsc::unbounded_channel()
}

/// Takes every job queued so far without waiting.
pub fn drain(receiver: &mut TickReceiver) -> Vec<TickJob> {
    let mut jobs = Vec::new();
    while let Ok(job) = receiver.try_recv() {
        jobs.push(job);
    }
    jobs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_takes_everything_queued() {
        let (tx, mut rx) = tick_channel();
        tx.send(TickJob::ForcedRespawn {
            session_id: SessionId(1),
        })
        .unwrap();
        tx.send(TickJob::SpawnFollowup {
            session_id: SessionId(2),
            stage: 0,
        })
        .unwrap();

        let jobs = drain(&mut rx);
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[1].session_id(), SessionId(2));
        assert!(drain(&mut rx).is_empty());
    }
}
