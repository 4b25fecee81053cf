use serde::Serialize;

use crate::home::StateKey;

/// One successfully applied device command: what the caller gets back
/// per device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceApplyResult {
    pub device_id: String,
    pub preset_id: String,
    pub state_key: StateKey,
    pub response: serde_json::Value,
}

/// Why a pair was not dispatched or did not apply. All variants are
/// terminal for the pair; none affects sibling pairs.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Device is outside the requested region.
    FilteredOut,
    /// Mapping references a device the directory does not know.
    UnresolvedDevice,
    /// Mapping references a preset the directory does not know.
    UnresolvedPreset,
    /// Device and preset resolved but do not combine into a command.
    InvalidBinding(String),
    /// The stored state key already matches the target; no call needed.
    AlreadyApplied,
    /// Dispatch was attempted and failed.
    Failed(String),
}

#[derive(Debug, Clone)]
pub enum PairOutcome {
    Applied(DeviceApplyResult),
    Skipped {
        device_id: String,
        preset_id: String,
        reason: SkipReason,
    },
}

#[derive(Debug, Clone)]
pub struct SceneRun {
    pub scene_id: String,
    pub outcomes: Vec<PairOutcome>,
}

impl SceneRun {
    pub fn applied(&self) -> Vec<&DeviceApplyResult> {
        self.outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                PairOutcome::Applied(result) => Some(result),
                PairOutcome::Skipped { .. } => None,
            })
            .collect()
    }

    pub fn into_applied(self) -> Vec<DeviceApplyResult> {
        self.outcomes
            .into_iter()
            .filter_map(|outcome| match outcome {
                PairOutcome::Applied(result) => Some(result),
                PairOutcome::Skipped { .. } => None,
            })
            .collect()
    }

    pub fn skip_reason(&self, device_id: &str) -> Option<&SkipReason> {
        self.outcomes.iter().find_map(|outcome| match outcome {
            PairOutcome::Skipped {
                device_id: skipped,
                reason,
                ..
            } if skipped == device_id => Some(reason),
            _ => None,
        })
    }
}
