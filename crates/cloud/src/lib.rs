//! Durable blob storage for finished artifacts.
//!
//! When configured, the orchestrator uploads every artifact of a completed
//! job through a [`BlobStore`] and records the returned public URLs instead
//! of local `/files/...` paths. [`SupabaseStorage`] talks to the Supabase
//! Storage REST API.

pub mod error;
pub mod provider;
pub mod supabase;

pub use error::CloudError;
pub use provider::BlobStore;
pub use supabase::{SupabaseConfig, SupabaseStorage};
