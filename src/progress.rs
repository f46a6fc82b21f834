//! Submission progress reporting.
//!
//! Reports what a submission is doing so the surveyor sees photos going up
//! one by one. Events arrive in order and upload counters only increase,
//! because uploads are sequential. Output goes to **stderr** so stdout
//! remains parseable for scripts.

use std::io::Write;

use crate::models::RecordId;

/// A single progress event for a submission.
#[derive(Clone, Debug, PartialEq)]
pub enum SubmitProgressEvent {
    Validating,
    /// Uploading photo `n` (1-based) of `total`.
    UploadingPhoto { n: usize, total: usize },
    /// Photo `n` failed to upload and will not be attached.
    PhotoDropped {
        n: usize,
        total: usize,
        reason: String,
    },
    Submitting { photos: usize },
    Done { record_id: RecordId },
}

/// Reports submission progress.
pub trait SubmitProgressReporter: Send + Sync {
    fn report(&self, event: SubmitProgressEvent);
}

/// Human-friendly progress on stderr: "submit  uploading photo 2 / 3".
pub struct StderrProgress;

impl SubmitProgressReporter for StderrProgress {
    fn report(&self, event: SubmitProgressEvent) {
        let line = match &event {
            SubmitProgressEvent::Validating => "submit  validating...\n".to_string(),
            SubmitProgressEvent::UploadingPhoto { n, total } => {
                format!("submit  uploading photo {} / {}\n", n, total)
            }
            SubmitProgressEvent::PhotoDropped { n, total, reason } => {
                format!("submit  photo {} / {} skipped: {}\n", n, total, reason)
            }
            SubmitProgressEvent::Submitting { photos } => {
                format!("submit  saving record with {} photo(s)\n", photos)
            }
            SubmitProgressEvent::Done { record_id } => {
                format!("submit  saved record {}\n", record_id)
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl SubmitProgressReporter for JsonProgress {
    fn report(&self, event: SubmitProgressEvent) {
        let obj = progress_json(&event);
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

fn progress_json(event: &SubmitProgressEvent) -> serde_json::Value {
    match event {
        SubmitProgressEvent::Validating => serde_json::json!({
            "event": "progress",
            "phase": "validating"
        }),
        SubmitProgressEvent::UploadingPhoto { n, total } => serde_json::json!({
            "event": "progress",
            "phase": "uploading",
            "n": n,
            "total": total
        }),
        SubmitProgressEvent::PhotoDropped { n, total, reason } => serde_json::json!({
            "event": "photo_dropped",
            "n": n,
            "total": total,
            "reason": reason
        }),
        SubmitProgressEvent::Submitting { photos } => serde_json::json!({
            "event": "progress",
            "phase": "submitting",
            "photos": photos
        }),
        SubmitProgressEvent::Done { record_id } => serde_json::json!({
            "event": "done",
            "record_id": record_id
        }),
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl SubmitProgressReporter for NoProgress {
    fn report(&self, _event: SubmitProgressEvent) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn SubmitProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
