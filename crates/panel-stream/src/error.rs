use thiserror::Error;

use crate::identity::ResolveError;

/// Errors a view gets back from the session controller. All of them are
/// raised before any connection is attempted; transport failures are never
/// returned here, they show up as the `Errored` state.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("a {identity} session is already {state}; stop it before starting another")]
    AlreadyActive { identity: String, state: String },
    #[error("the log category cannot change while a stream is live; stop it first")]
    CategoryLocked,
    #[error("the selected site cannot change while a session is live; stop it first")]
    ResourceLocked,
    #[error("log categories only apply to log views")]
    NotLogView,
    #[error("view has been unmounted")]
    Unmounted,
}

impl SessionError {
    /// Rejections the user caused and can correct; worth showing inline.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            SessionError::Resolve(_)
                | SessionError::AlreadyActive { .. }
                | SessionError::CategoryLocked
                | SessionError::ResourceLocked
                | SessionError::NotLogView
        )
    }
}
