//! QA Council Pipeline
//!
//! Sequences the six stages over one leased workspace:
//! - Executes Acquire, Inspect, Generate, Run, Repair and Publish in fixed order
//! - Skips Repair unless Run reported failing tests
//! - Derives the three-way overall status and aggregates the report

pub mod cancel;
pub mod coordinator;
pub mod executor;
pub mod gate;
pub mod options;
pub mod transition;

// Re-export key types
pub use cancel::{CancelHandle, Cancellation};
pub use coordinator::{PipelineCoordinator, PipelineTarget};
pub use executor::{StageContext, StageExecutor};
pub use gate::{GateVerdict, StatusGate};
pub use options::PipelineOptions;
pub use transition::{after, repair_guard, RepairDecision, Transition};
