/// Domain error taxonomy shared across the workspace.
///
/// `Validation` is user-correctable input, `Resource` covers workspace
/// collisions and filesystem failures, `Transformation` carries the cause of
/// an engine failure or incomplete output.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Transformation failed: {0}")]
    Transformation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for an unknown job id.
    pub fn job_not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity: "Job",
            id: id.to_string(),
        }
    }
}
