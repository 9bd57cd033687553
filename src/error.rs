use std::fmt;

use serde::Serialize;

use crate::assembly::{AssemblyError, PlacementError, StepError};
use crate::cutlist::{ValidationError, ValidationIssue};
use crate::logic::LogicError;
use crate::remote::RemoteError;
use crate::session::{DisconnectCause, SessionError, SessionKind};

/// Structured error type for tool calls. Serialized with a stable `code` so
/// HTTP and CLI clients can match on it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "code", content = "detail")]
pub enum AppError {
    NotFound { what: String },
    UnknownCommand { name: String },
    ValidationError { message: String },
    InvalidCutList { issues: Vec<ValidationIssue> },
    Disconnected {
        kind: SessionKind,
        cause: DisconnectCause,
        message: String,
    },
    RemoteError { message: String },
    TimelineExists { name: String },
    RippleSafetyViolation { shot_id: String },
    LogicError { message: String },
    IoError { message: String },
    SettingsSaveError { message: String },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::NotFound { what } => write!(f, "{what} not found"),
            AppError::UnknownCommand { name } => write!(f, "Unknown command: {name}"),
            AppError::ValidationError { message } => write!(f, "{message}"),
            AppError::InvalidCutList { issues } => {
                write!(f, "Invalid cut list ({} issue(s))", issues.len())?;
                for issue in issues {
                    write!(f, "\n  {issue}")?;
                }
                Ok(())
            }
            AppError::Disconnected {
                kind,
                cause,
                message,
            } => write!(f, "{kind} unavailable ({cause}): {message}"),
            AppError::RemoteError { message } => write!(f, "Remote call failed: {message}"),
            AppError::TimelineExists { name } => {
                write!(f, "A timeline named \"{name}\" already exists")
            }
            AppError::RippleSafetyViolation { shot_id } => write!(
                f,
                "Refusing to insert a composition for {shot_id} after clips were placed"
            ),
            AppError::LogicError { message } => write!(f, "Logic profile error: {message}"),
            AppError::IoError { message } => write!(f, "I/O error: {message}"),
            AppError::SettingsSaveError { message } => {
                write!(f, "Failed to save settings: {message}")
            }
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::IoError {
            message: e.to_string(),
        }
    }
}

impl From<RemoteError> for AppError {
    fn from(e: RemoteError) -> Self {
        AppError::RemoteError {
            message: e.to_string(),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Disconnected {
                kind,
                cause,
                detail,
            } => AppError::Disconnected {
                kind,
                cause,
                message: detail,
            },
            SessionError::Remote(remote) => remote.into(),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        AppError::InvalidCutList { issues: e.issues }
    }
}

impl From<AssemblyError> for AppError {
    fn from(e: AssemblyError) -> Self {
        match e {
            AssemblyError::Session(session) => session.into(),
            AssemblyError::TimelineExists(name) => AppError::TimelineExists { name },
            AssemblyError::RippleSafetyViolation { shot_id } => {
                AppError::RippleSafetyViolation { shot_id }
            }
            other @ (AssemblyError::TimelineCreation(_) | AssemblyError::TimelineDeletion(_)) => {
                AppError::RemoteError {
                    message: other.to_string(),
                }
            }
        }
    }
}

impl From<PlacementError> for AppError {
    fn from(e: PlacementError) -> Self {
        match &e {
            PlacementError::MediaNotFound { name } => AppError::NotFound {
                what: format!("Media item \"{name}\""),
            },
            PlacementError::AmbiguousMedia { .. } | PlacementError::NoFileName => {
                AppError::ValidationError {
                    message: e.to_string(),
                }
            }
            PlacementError::Rejected { .. } | PlacementError::Remote { .. } => {
                AppError::RemoteError {
                    message: e.to_string(),
                }
            }
        }
    }
}

impl From<StepError> for AppError {
    fn from(e: StepError) -> Self {
        match e {
            StepError::Row(placement) => placement.into(),
            StepError::Link(session) => session.into(),
        }
    }
}

impl From<LogicError> for AppError {
    fn from(e: LogicError) -> Self {
        AppError::LogicError {
            message: e.to_string(),
        }
    }
}

impl From<AppError> for String {
    fn from(e: AppError) -> String {
        e.to_string()
    }
}

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::ValidationError { message: s }
    }
}

impl From<&str> for AppError {
    fn from(s: &str) -> Self {
        AppError::ValidationError {
            message: s.to_string(),
        }
    }
}
