//! Transformation runner.
//!
//! [`SeparationEngine`] is the seam between the orchestrator and the
//! external stem separation model. [`DemucsEngine`] runs demucs as a child
//! process, forwards its raw output through the per-invocation
//! [`OutputSink`] and verifies the produced artifact set. The runner never
//! touches the status store; progress interpretation happens in the caller.

pub mod demucs;
pub mod engine;
pub mod error;
pub mod subprocess;

pub use audioforma_core::progress::OutputStream;
pub use demucs::{DemucsConfig, DemucsEngine};
pub use engine::{OutputSink, SeparationEngine, SeparationOutput, SeparationRequest};
pub use error::SeparatorError;
