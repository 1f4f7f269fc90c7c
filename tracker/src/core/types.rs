//! Shared deterministic types for the tracking core.

use serde::{Deserialize, Serialize};

/// Lifecycle state of one tracked action invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingState {
    Idle,
    Started,
    RealResumed,
    FakeResumed,
    Suspended,
    Finished,
}

impl TrackingState {
    pub fn as_str(self) -> &'static str {
        match self {
            TrackingState::Idle => "idle",
            TrackingState::Started => "started",
            TrackingState::RealResumed => "real_resumed",
            TrackingState::FakeResumed => "fake_resumed",
            TrackingState::Suspended => "suspended",
            TrackingState::Finished => "finished",
        }
    }

    /// Transitions the lifecycle driver may take.
    ///
    /// `Suspended` is only reachable from a resumed state. A fake-resumed
    /// invocation must be suspended before it can be really resumed.
    pub fn can_transition_to(self, next: TrackingState) -> bool {
        use TrackingState::{FakeResumed, Finished, Idle, RealResumed, Started, Suspended};
        matches!(
            (self, next),
            (Idle, Started)
                | (Started, RealResumed | Finished)
                | (RealResumed, Suspended)
                | (FakeResumed, Suspended)
                | (Suspended, RealResumed | FakeResumed | Finished)
        )
    }
}

/// Private per-invocation record kept in the step-chain's data bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingData {
    pub start_accepted: bool,
    pub state: TrackingState,
}

/// Shallow patch merged into [`TrackingData`]; `None` fields are left alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackingPatch {
    pub start_accepted: Option<bool>,
    pub state: Option<TrackingState>,
}

impl TrackingPatch {
    /// Patch written when the acceptance filter admits a spawn or sync step.
    pub fn accepted() -> Self {
        Self {
            start_accepted: Some(true),
            state: Some(TrackingState::Idle),
        }
    }

    pub fn state(state: TrackingState) -> Self {
        Self {
            start_accepted: None,
            state: Some(state),
        }
    }

    pub fn apply(self, data: &mut TrackingData) {
        if let Some(start_accepted) = self.start_accepted {
            data.start_accepted = start_accepted;
        }
        if let Some(state) = self.state {
            data.state = state;
        }
    }

    /// Data created from scratch when nothing was stored yet.
    pub fn into_data(self) -> TrackingData {
        TrackingData {
            start_accepted: self.start_accepted.unwrap_or(false),
            state: self.state.unwrap_or(TrackingState::Idle),
        }
    }
}

/// How a tracked invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionTrackingResult {
    Return,
    Throw,
}

impl ActionTrackingResult {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionTrackingResult::Return => "return",
            ActionTrackingResult::Throw => "throw",
        }
    }
}
