use thiserror::Error;

/// Coarse classification the UI uses to choose how a failure is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The user must grant access again before retrying.
    PermissionDenied,
    /// The user backed out; not an error and nothing is shown.
    SelectionCancelled,
    /// Network-level failure; the user may capture again.
    Transport,
    /// The service answered with a non-success status; shown as "try again".
    Service,
    /// The service answered with something we cannot interpret. Logged as a defect.
    Protocol,
    /// A local precondition was violated before anything left the device.
    Precondition,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("selection cancelled")]
    SelectionCancelled,
    #[error("capture device failed: {0}")]
    Device(String),
    #[error("failed to read capture: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CaptureError::PermissionDenied => FailureKind::PermissionDenied,
            CaptureError::SelectionCancelled => FailureKind::SelectionCancelled,
            CaptureError::Device(_) | CaptureError::Io(_) => FailureKind::Transport,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("image has no data")]
    EmptyImage,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("analysis service returned status {status_code}")]
    Service { status_code: u16 },
    #[error("malformed analysis response: {0}")]
    Protocol(String),
}

impl AnalysisError {
    pub fn kind(&self) -> FailureKind {
        match self {
            AnalysisError::EmptyImage => FailureKind::Precondition,
            AnalysisError::Transport(_) => FailureKind::Transport,
            AnalysisError::Service { .. } => FailureKind::Service,
            AnalysisError::Protocol(_) => FailureKind::Protocol,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("companion service returned status {status_code}")]
    Service { status_code: u16 },
    #[error("malformed companion response: {0}")]
    Protocol(String),
}

impl ChatError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ChatError::EmptyMessage => FailureKind::Precondition,
            ChatError::Transport(_) => FailureKind::Transport,
            ChatError::Service { .. } => FailureKind::Service,
            ChatError::Protocol(_) => FailureKind::Protocol,
        }
    }
}

/// A UI trigger arrived in a phase that does not accept it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot {action} while {phase}")]
pub struct TransitionError {
    pub action: &'static str,
    pub phase: &'static str,
}

/// Shared mapping from a `reqwest` failure onto a transport description.
pub(crate) fn describe_transport(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}
