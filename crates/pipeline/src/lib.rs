//! Job orchestration.
//!
//! [`JobOrchestrator`] owns the lifecycle of every job: it allocates the
//! workspace, persists each status transition, runs validation and the
//! separation engine in a background unit, publishes finished artifacts and
//! schedules workspace cleanup. [`results`] maps a completed record back to
//! servable artifact locations.

pub mod input;
pub mod orchestrator;
pub mod probe;
pub mod results;
pub mod settings;

pub use input::JobInput;
pub use orchestrator::{JobOrchestrator, OrchestratorDeps};
pub use probe::{FfprobeProbe, MediaProbe};
pub use results::{resolve, ArtifactLocation};
pub use settings::OrchestratorSettings;
