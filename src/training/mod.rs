mod diagnostics;
mod orchestrator;
mod schedule;
mod state;

pub use diagnostics::{write_snapshot, TestSamples};
pub use orchestrator::TrainingOrchestrator;
pub use schedule::{Phase, PhaseStep, PushPolicy, Schedule, StepTotals};
pub use state::TrainingState;
