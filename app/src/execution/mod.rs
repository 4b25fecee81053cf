mod outcome;
mod service;


pub use outcome::{DeviceApplyResult, PairOutcome, SceneRun, SkipReason};
pub use service::{ExecuteError, ExecutionService};
