use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// A sync was requested for a project that is not managed by the build tool.
    #[error("Attempt to sync non-{build_system} project.")]
    Configuration { build_system: String },

    #[error("invalid target expression `{expression}`: {reason}")]
    InvalidTargetExpression {
        expression: String,
        reason: &'static str,
    },

    /// The project was closed before the request ran.
    #[error("sync coordinator shut down before the request completed")]
    CoordinatorShutdown,
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
