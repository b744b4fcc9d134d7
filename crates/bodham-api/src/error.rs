use bodham_gateway::GatewayError;
use bodham_sync::SyncError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Rejected locally before any request, e.g. blank content.
    #[error("Invalid input: {0}")]
    Invalid(String),

    /// The signed-in user lacks the role or ownership for this action.
    /// Advisory only; the server enforces the real rule.
    #[error("Not allowed: {0}")]
    Forbidden(String),
}

impl ApiError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    pub(crate) fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Sync(e) => e.user_message(),
            Self::Gateway(e) => e.user_message(),
            Self::Invalid(msg) | Self::Forbidden(msg) => msg.clone(),
        }
    }
}
