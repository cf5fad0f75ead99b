use crate::error::PollError;
use crate::poller::PollOutcome;
use crate::snapshot::Snapshot;

/// What the consumer currently holds: never a snapshot and an error at once.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum PollState {
    #[default]
    Loading,
    Ready(Snapshot),
    Failed(PollError),
}

impl PollState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollState::Loading => "loading",
            PollState::Ready(_) => "ready",
            PollState::Failed(_) => "error",
        }
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            PollState::Ready(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&PollError> {
        match self {
            PollState::Failed(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// First failure after a snapshot or after startup.
    Lost,
    Recovered,
}

#[derive(Debug, Clone, Default)]
pub struct DashboardState {
    pub started_at_unix: i64,
    pub last_update_unix: i64,
    pub last_success_unix: Option<i64>,
    pub current: PollState,
    pub successful_polls: u64,
    pub failed_polls: u64,
    pub consecutive_failures: u32,
}

impl DashboardState {
    pub fn new(now_unix: i64) -> Self {
        Self {
            started_at_unix: now_unix,
            ..Self::default()
        }
    }

    /// Replaces the current state with the outcome of a poll cycle.
    pub fn apply(&mut self, outcome: PollOutcome, now_unix: i64) -> Option<Transition> {
        let was_failed = matches!(self.current, PollState::Failed(_));
        self.last_update_unix = now_unix;

        match outcome {
            Ok(snapshot) => {
                self.successful_polls = self.successful_polls.saturating_add(1);
                self.consecutive_failures = 0;
                self.last_success_unix = Some(now_unix);
                self.current = PollState::Ready(snapshot);
                was_failed.then_some(Transition::Recovered)
            }
            Err(err) => {
                self.failed_polls = self.failed_polls.saturating_add(1);
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.current = PollState::Failed(err);
                (!was_failed).then_some(Transition::Lost)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PollErrorKind;

    #[test]
    fn starts_loading() {
        let state = DashboardState::new(100);
        assert_eq!(state.current, PollState::Loading);
        assert_eq!(state.current.as_str(), "loading");
        assert_eq!(state.started_at_unix, 100);
        assert!(state.current.snapshot().is_none());
        assert!(state.current.error().is_none());
    }

    #[test]
    fn error_replaces_snapshot_and_back() {
        let mut state = DashboardState::new(0);

        assert_eq!(state.apply(Ok(Snapshot::placeholder()), 1), None);
        assert!(state.current.snapshot().is_some());
        assert_eq!(state.last_success_unix, Some(1));

        let transition = state.apply(Err(PollError::network("connection refused")), 2);
        assert_eq!(transition, Some(Transition::Lost));
        assert!(state.current.snapshot().is_none());
        assert_eq!(state.current.error().map(|e| e.kind), Some(PollErrorKind::Network));
        assert_eq!(state.last_success_unix, Some(1));

        assert_eq!(state.apply(Err(PollError::network("connection refused")), 3), None);
        assert_eq!(state.consecutive_failures, 2);

        let transition = state.apply(Ok(Snapshot::placeholder()), 4);
        assert_eq!(transition, Some(Transition::Recovered));
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.successful_polls, 2);
        assert_eq!(state.failed_polls, 2);
        assert_eq!(state.last_update_unix, 4);
        assert!(state.current.error().is_none());
    }

    #[test]
    fn first_failure_from_loading_is_lost() {
        let mut state = DashboardState::new(0);
        let transition = state.apply(Err(PollError::http_status(500, "status 500")), 1);
        assert_eq!(transition, Some(Transition::Lost));
        assert_eq!(state.current.as_str(), "error");
    }
}
