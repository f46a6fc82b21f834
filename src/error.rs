//! Error taxonomy.
//!
//! Optional enrichment stages (location, geocoding, watermark, completion
//! fetch) produce errors that callers absorb and log. Mandatory stages
//! (validation, final submit) surface [`ValidationError`] and
//! [`SubmitError`] to the caller with enough detail for a user-facing
//! message.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::models::{RecordId, TaskId};

/// A draft or edit the user has to correct. Raised before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no task selected")]
    NoTask,
    #[error("no item selected")]
    NoItem,
    #[error("missing price")]
    MissingPrice,
    #[error("invalid price: {0:?}")]
    InvalidPrice(String),
    #[error("missing store name")]
    MissingStoreName,
    #[error("at least one photo is required")]
    NoPhotos,
    #[error("record {0} can only be changed on the day it was created")]
    EditWindowClosed(RecordId),
}

impl ValidationError {
    /// The UI should send the user back to the task picker rather than
    /// highlight a form field.
    pub fn redirects_to_task_picker(&self) -> bool {
        matches!(self, ValidationError::NoTask)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocationError {
    #[error("location unavailable: {0}")]
    Unavailable(String),
    #[error("location permission denied")]
    PermissionDenied,
    #[error("location timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeocodeError {
    #[error("reverse geocoding failed: {0}")]
    Failed(String),
    #[error("reverse geocoding timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum WatermarkError {
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to encode watermarked image: {0}")]
    Encode(#[source] image::ImageError),
    #[error("watermark output: {0}")]
    Io(#[from] std::io::Error),
    #[error("watermark backend unavailable: {0}")]
    Backend(String),
}

/// The camera or gallery could not produce an image. Cancellation is not
/// an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("camera failed: {0}")]
    Camera(String),
    #[error("gallery failed: {0}")]
    Gallery(String),
}

/// Failure of a call to the remote service, as seen by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("session expired, please log in again")]
    Unauthorized,
    #[error("unexpected response: {0}")]
    Protocol(String),
}

/// Failure to upload one photo. Callers drop the photo and continue.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload network error: {0}")]
    Network(String),
    #[error("upload rejected with status {status}")]
    Server { status: u16 },
    #[error("malformed upload response: {0}")]
    Protocol(String),
    #[error("cannot read {path}: {source}")]
    LocalFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<TransportError> for UploadError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Network(msg) => UploadError::Network(msg),
            TransportError::Status { status, .. } => UploadError::Server { status },
            TransportError::Unauthorized => UploadError::Server { status: 401 },
            TransportError::Protocol(msg) => UploadError::Protocol(msg),
        }
    }
}

/// Outcome of a failed submission. The draft is preserved in every case.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("record could not be saved: {0}")]
    Transport(#[from] TransportError),
    #[error("submission {0} was abandoned; result discarded")]
    Abandoned(Uuid),
}

impl SubmitError {
    /// Whether resubmitting the unchanged draft could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SubmitError::Validation(_) | SubmitError::Abandoned(_) => false,
            SubmitError::Transport(TransportError::Unauthorized) => false,
            SubmitError::Transport(_) => true,
        }
    }
}

/// Completion state for a task could not be fetched. Non-fatal: the task
/// is shown with zeroed progress.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconciliationError {
    #[error("completion for task {task_id} unavailable: {source}")]
    Fetch {
        task_id: TaskId,
        #[source]
        source: TransportError,
    },
    #[error("completion for task {expected} answered with task {actual}")]
    Mismatch { expected: TaskId, actual: TaskId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_failures_are_retryable() {
        assert!(SubmitError::Transport(TransportError::Network("reset".into())).is_retryable());
        assert!(SubmitError::Transport(TransportError::Status {
            status: 502,
            message: "bad gateway".into()
        })
        .is_retryable());
        assert!(!SubmitError::Transport(TransportError::Unauthorized).is_retryable());
        assert!(!SubmitError::Validation(ValidationError::MissingPrice).is_retryable());
        assert!(!SubmitError::Abandoned(Uuid::new_v4()).is_retryable());
    }

    #[test]
    fn transport_maps_onto_upload_classes() {
        assert!(matches!(
            UploadError::from(TransportError::Status {
                status: 413,
                message: String::new()
            }),
            UploadError::Server { status: 413 }
        ));
        assert!(matches!(
            UploadError::from(TransportError::Protocol("no url".into())),
            UploadError::Protocol(_)
        ));
    }

    #[test]
    fn missing_price_message() {
        assert_eq!(ValidationError::MissingPrice.to_string(), "missing price");
        assert!(ValidationError::NoTask.redirects_to_task_picker());
        assert!(!ValidationError::NoItem.redirects_to_task_picker());
    }
}
