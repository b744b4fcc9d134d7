use bodham_gateway::GatewayError;

use crate::mutation::MutationKind;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The same (id, kind) pair already has a request outstanding.
    #[error("A {kind} for '{id}' is already in flight")]
    MutationInFlight { id: String, kind: MutationKind },

    /// The server rejected the change; local state was rolled back.
    #[error("{kind} for '{id}' failed and was rolled back: {source}")]
    MutationFailed {
        id: String,
        kind: MutationKind,
        #[source]
        source: GatewayError,
    },

    #[error("No entity '{id}' in this collection")]
    UnknownEntity { id: String },
}

impl SyncError {
    /// Text suitable for a toast after a failed action.
    pub fn user_message(&self) -> String {
        match self {
            Self::Gateway(e) | Self::MutationFailed { source: e, .. } => e.user_message(),
            Self::MutationInFlight { .. } => "Still working on your last change".to_string(),
            Self::UnknownEntity { .. } => "That item is no longer available".to_string(),
        }
    }
}
