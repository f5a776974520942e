use db::DbErr;
use thiserror::Error;
use validator::ValidationErrors;

/// Coarse classification of an [`AttendanceError`], for callers that map
/// errors onto responses without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authorization,
    StateConflict,
    NotFound,
    Concurrency,
    Storage,
}

#[derive(Debug, Error)]
pub enum AttendanceError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Requested status is the same as the current status")]
    SameStatus,

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("A correction cannot be reviewed by the member who requested it")]
    SelfApprovalNotAllowed,

    #[error("Member is already checked in")]
    AlreadyCheckedIn,

    #[error("Member is not checked in")]
    NotCheckedIn,

    #[error("A correction request is already pending")]
    CorrectionAlreadyPending,

    #[error("There is no pending correction request")]
    NoPendingCorrection,

    #[error("Attendance not found for session {session_id} and member {member_id}")]
    AttendanceNotFound { session_id: i64, member_id: i64 },

    #[error("Concurrent modification: expected version {expected}, found {actual}")]
    ConcurrencyConflict { expected: i64, actual: i64 },

    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AttendanceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::SameStatus => ErrorKind::Validation,
            Self::NotAuthorized(_) | Self::SelfApprovalNotAllowed => ErrorKind::Authorization,
            Self::AlreadyCheckedIn
            | Self::NotCheckedIn
            | Self::CorrectionAlreadyPending
            | Self::NoPendingCorrection => ErrorKind::StateConflict,
            Self::AttendanceNotFound { .. } => ErrorKind::NotFound,
            Self::ConcurrencyConflict { .. } => ErrorKind::Concurrency,
            Self::Database(_) | Self::Serialization(_) => ErrorKind::Storage,
        }
    }
}

impl From<ValidationErrors> for AttendanceError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(common::format_validation_errors(&errors))
    }
}
