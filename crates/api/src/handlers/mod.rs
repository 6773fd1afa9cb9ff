pub mod files;
pub mod jobs;
