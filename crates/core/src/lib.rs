//! Audioforma domain core.
//!
//! Pure domain logic shared by every other crate: job identity and the job
//! state machine, the progress parser, per-job workspace management, the
//! artifact set, the input duration policy and ffprobe helpers. Nothing in
//! here talks to the status store or the HTTP layer.

pub mod artifacts;
pub mod error;
pub mod ffmpeg;
pub mod job;
pub mod job_events;
pub mod progress;
pub mod types;
pub mod validation;
pub mod workspace;
