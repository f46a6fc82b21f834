//! Capabilities injected into the survey core.
//!
//! The core never talks to a network, device, or credential store directly.
//! Each component receives only the capabilities it needs:
//!
//! ```text
//! ┌────────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  TaskSource    │   │  RecordSink  │   │  UploadSink  │
//! │ tasks+progress │   │ CRUD records │   │ photo bytes  │
//! └───────┬────────┘   └──────┬───────┘   └──────┬───────┘
//!         ▼                   ▼                  ▼
//!    reconcile           submit/records       uploader
//!
//! ┌────────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  GeoProvider   │   │CameraProvider│   │ SessionStore │
//! └───────┬────────┘   └──────┬───────┘   └──────┬───────┘
//!         ▼                   ▼                  ▼
//!        geo               capture             client
//! ```
//!
//! [`crate::client::HttpApi`] implements the three remote capabilities
//! against the survey backend; tests substitute in-memory fakes.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::{CaptureError, GeocodeError, LocationError, TransportError};
use crate::models::{
    CompletionSnapshot, Coordinates, Record, RecordId, RecordPayload, RecordUpdate, SurveyorId,
    Task, TaskId,
};

// ═══════════════════════════════════════════════════════════════════════
// Remote capabilities
// ═══════════════════════════════════════════════════════════════════════

/// Read access to assigned tasks and per-surveyor completion counts.
#[async_trait]
pub trait TaskSource: Send + Sync {
    /// All tasks scheduled for `date`, items included.
    async fn fetch_tasks_for_date(&self, date: NaiveDate) -> Result<Vec<Task>, TransportError>;

    /// Record counts per item of `task_id` for one surveyor.
    async fn fetch_completion(
        &self,
        task_id: TaskId,
        surveyor_id: SurveyorId,
    ) -> Result<CompletionSnapshot, TransportError>;
}

/// Write access to survey records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Creates a record and returns its server id.
    async fn create_record(&self, payload: &RecordPayload) -> Result<RecordId, TransportError>;

    async fn update_record(&self, id: RecordId, update: &RecordUpdate)
        -> Result<(), TransportError>;

    async fn delete_record(&self, id: RecordId) -> Result<(), TransportError>;

    /// Records of one surveyor, optionally restricted to a creation date.
    async fn list_records(
        &self,
        surveyor_id: SurveyorId,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Record>, TransportError>;
}

/// Stores a file and hands back a server reference to it.
#[async_trait]
pub trait UploadSink: Send + Sync {
    async fn upload_file(&self, bytes: Vec<u8>, filename: &str) -> Result<String, TransportError>;
}

// ═══════════════════════════════════════════════════════════════════════
// Device capabilities
// ═══════════════════════════════════════════════════════════════════════

/// Device geolocation plus reverse geocoding.
///
/// Implementations may block for a long time; [`crate::geo::GeoLocator`]
/// bounds every call with a timeout.
#[async_trait]
pub trait GeoProvider: Send + Sync {
    async fn current_coordinates(&self) -> Result<Coordinates, LocationError>;

    /// Human-readable address for a coordinate pair.
    async fn reverse_geocode(&self, coordinates: Coordinates) -> Result<String, GeocodeError>;
}

/// Result of asking the camera for a single shot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraShot {
    Captured(PathBuf),
    Cancelled,
}

/// Camera and photo gallery.
#[async_trait]
pub trait CameraProvider: Send + Sync {
    /// Takes one photo, rear camera where selectable.
    async fn capture_photo(&self) -> Result<CameraShot, CaptureError>;

    /// Lets the user pick existing images. An empty list means nothing
    /// was picked.
    async fn pick_from_gallery(&self) -> Result<Vec<PathBuf>, CaptureError>;
}

// ═══════════════════════════════════════════════════════════════════════
// Session
// ═══════════════════════════════════════════════════════════════════════

/// Credentials of the logged-in surveyor.
pub trait SessionStore: Send + Sync {
    /// Bearer token, if logged in.
    fn token(&self) -> Option<String>;

    /// Called when the server rejects the token. Clears credentials; the
    /// UI is expected to start the login flow.
    fn on_unauthorized(&self);
}
