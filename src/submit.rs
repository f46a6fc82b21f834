//! Survey record submission.
//!
//! A submission moves through
//! `Validating → UploadingPhotos → Submitting → Done | Failed`.
//!
//! - **Validating** checks the draft in a fixed order so the first
//!   reported problem is deterministic. Nothing touches the network until
//!   the draft is valid.
//! - **UploadingPhotos** uploads one photo at a time. A photo that fails is
//!   dropped and logged; this stage never fails the submission.
//! - **Submitting** creates the record with whatever URLs were collected.
//!
//! The draft is never consumed or cleared: on failure it is still there to
//! edit or retry, and on success the caller decides whether to
//! [`reset_for_next_item`](crate::models::DraftRecord::reset_for_next_item).
//! The only change a submission makes is recording each photo's
//! `uploaded_url`, so a retry reuses those URLs instead of uploading again.
//!
//! Each call runs under a submission id registered in a
//! [`SubmissionRegistry`]. [`submit`](SurveyRecordSubmitter::submit) picks
//! one itself; callers that need to abandon a single submission take an id
//! from [`SubmissionRegistry::begin`] and use
//! [`submit_as`](SurveyRecordSubmitter::submit_as). Abandoned calls still
//! finish, but their results are discarded.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::error::{SubmitError, ValidationError};
use crate::models::{DraftRecord, ItemId, RecordId, RecordPayload, SurveyorId, TaskId};
use crate::progress::{NoProgress, SubmitProgressEvent, SubmitProgressReporter};
use crate::traits::RecordSink;
use crate::uploader::EvidenceUploader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStage {
    Idle,
    Validating,
    UploadingPhotos,
    Submitting,
    Done,
    Failed,
}

/// The parts of a draft that validation guarantees are present.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedDraft {
    pub task_id: TaskId,
    pub item_id: ItemId,
    pub price: f64,
    pub store_name: String,
}

/// Checks, in order: task, item, price present, price numeric, store name,
/// photos.
pub fn validate(draft: &DraftRecord) -> Result<ValidatedDraft, ValidationError> {
    let task_id = draft.task_id.ok_or(ValidationError::NoTask)?;
    let item_id = draft
        .selected_item
        .as_ref()
        .map(|item| item.id)
        .ok_or(ValidationError::NoItem)?;
    let price = parse_price(&draft.price)?;
    let store_name = draft.store_name.trim();
    if store_name.is_empty() {
        return Err(ValidationError::MissingStoreName);
    }
    if draft.photos.is_empty() {
        return Err(ValidationError::NoPhotos);
    }
    Ok(ValidatedDraft {
        task_id,
        item_id,
        price,
        store_name: store_name.to_string(),
    })
}

/// Parses a typed price. Blank is "missing"; anything that is not a
/// finite positive number is "invalid".
pub fn parse_price(raw: &str) -> Result<f64, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingPrice);
    }
    match trimmed.parse::<f64>() {
        Ok(price) if price.is_finite() && price > 0.0 => Ok(price),
        _ => Err(ValidationError::InvalidPrice(trimmed.to_string())),
    }
}

/// Trimmed text, or `None` when nothing was entered.
pub fn optional_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub fn build_payload(
    validated: &ValidatedDraft,
    draft: &DraftRecord,
    surveyor_id: SurveyorId,
    photos: Vec<String>,
) -> RecordPayload {
    RecordPayload {
        item_id: validated.item_id,
        surveyor_id,
        store_name: validated.store_name.clone(),
        store_address: optional_text(&draft.store_address),
        price: validated.price,
        promotion_info: optional_text(&draft.promotion_info),
        remark: optional_text(&draft.remark),
        latitude: draft.coordinates.map(|c| c.latitude),
        longitude: draft.coordinates.map(|c| c.longitude),
        photos,
    }
}

/// Live submission ids. Cloning shares the set.
#[derive(Clone, Default)]
pub struct SubmissionRegistry {
    live: Arc<Mutex<HashSet<Uuid>>>,
}

impl SubmissionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new live submission id.
    pub fn begin(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().insert(id);
        id
    }

    fn finish(&self, id: Uuid) {
        self.lock().remove(&id);
    }

    pub fn is_live(&self, id: Uuid) -> bool {
        self.lock().contains(&id)
    }

    pub fn abandon(&self, id: Uuid) {
        if self.lock().remove(&id) {
            tracing::info!(submission = %id, "submission abandoned");
        }
    }

    /// Abandons every in-flight submission, e.g. when the form is closed.
    pub fn abandon_all(&self) {
        let mut live = self.lock();
        for id in live.drain() {
            tracing::info!(submission = %id, "submission abandoned");
        }
    }

    pub fn live_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<Uuid>> {
        self.live.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitReceipt {
    pub submission_id: Uuid,
    pub task_id: TaskId,
    pub record_id: RecordId,
    pub photo_urls: Vec<String>,
    pub dropped_photos: usize,
}

pub struct SurveyRecordSubmitter {
    records: Arc<dyn RecordSink>,
    uploader: EvidenceUploader,
    surveyor_id: SurveyorId,
    registry: SubmissionRegistry,
    reporter: Box<dyn SubmitProgressReporter>,
    stage: Mutex<SubmitStage>,
}

impl SurveyRecordSubmitter {
    pub fn new(
        records: Arc<dyn RecordSink>,
        uploader: EvidenceUploader,
        surveyor_id: SurveyorId,
    ) -> Self {
        Self {
            records,
            uploader,
            surveyor_id,
            registry: SubmissionRegistry::new(),
            reporter: Box::new(NoProgress),
            stage: Mutex::new(SubmitStage::Idle),
        }
    }

    pub fn with_reporter(mut self, reporter: Box<dyn SubmitProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_registry(mut self, registry: SubmissionRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &SubmissionRegistry {
        &self.registry
    }

    /// Stage of the most recent (or current) submission.
    pub fn stage(&self) -> SubmitStage {
        *self.stage.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enter(&self, stage: SubmitStage) {
        tracing::debug!(?stage, "submit stage");
        *self.stage.lock().unwrap_or_else(|e| e.into_inner()) = stage;
    }

    pub async fn submit(&self, draft: &mut DraftRecord) -> Result<SubmitReceipt, SubmitError> {
        let id = self.registry.begin();
        self.submit_as(id, draft).await
    }

    /// Submits under `id`, which should come from
    /// [`SubmissionRegistry::begin`] on this submitter's registry. An id
    /// that is no longer live is rejected as abandoned before any upload.
    pub async fn submit_as(
        &self,
        id: Uuid,
        draft: &mut DraftRecord,
    ) -> Result<SubmitReceipt, SubmitError> {
        self.enter(SubmitStage::Validating);
        self.reporter.report(SubmitProgressEvent::Validating);
        let validated = match validate(draft) {
            Ok(v) => v,
            Err(e) => {
                self.registry.finish(id);
                self.enter(SubmitStage::Failed);
                return Err(e.into());
            }
        };

        let result = if self.registry.is_live(id) {
            self.run(id, &validated, draft).await
        } else {
            Err(SubmitError::Abandoned(id))
        };
        self.registry.finish(id);
        self.enter(if result.is_ok() {
            SubmitStage::Done
        } else {
            SubmitStage::Failed
        });
        result
    }

    async fn run(
        &self,
        id: Uuid,
        validated: &ValidatedDraft,
        draft: &mut DraftRecord,
    ) -> Result<SubmitReceipt, SubmitError> {
        self.enter(SubmitStage::UploadingPhotos);
        let total = draft.photos.len();
        let mut urls = Vec::with_capacity(total);
        for (i, photo) in draft.photos.iter_mut().enumerate() {
            let n = i + 1;
            self.reporter
                .report(SubmitProgressEvent::UploadingPhoto { n, total });
            if let Some(url) = &photo.uploaded_url {
                tracing::debug!(submission = %id, url = %url, "photo already uploaded");
                urls.push(url.clone());
                continue;
            }
            match self.uploader.upload(photo).await {
                Ok(url) => {
                    photo.uploaded_url = Some(url.clone());
                    urls.push(url);
                }
                Err(e) => {
                    tracing::warn!(
                        submission = %id,
                        photo = %photo.local_path.display(),
                        error = %e,
                        "photo dropped from submission"
                    );
                    self.reporter.report(SubmitProgressEvent::PhotoDropped {
                        n,
                        total,
                        reason: e.to_string(),
                    });
                }
            }
            if !self.registry.is_live(id) {
                return Err(SubmitError::Abandoned(id));
            }
        }
        let dropped_photos = total - urls.len();

        self.enter(SubmitStage::Submitting);
        self.reporter
            .report(SubmitProgressEvent::Submitting { photos: urls.len() });
        let payload = build_payload(validated, draft, self.surveyor_id, urls);
        let record_id = self.records.create_record(&payload).await?;

        if !self.registry.is_live(id) {
            tracing::warn!(
                submission = %id,
                record_id,
                "record saved after submission was abandoned; result discarded"
            );
            return Err(SubmitError::Abandoned(id));
        }

        tracing::info!(
            submission = %id,
            record_id,
            photos = payload.photos.len(),
            dropped = dropped_photos,
            "record submitted"
        );
        self.reporter.report(SubmitProgressEvent::Done { record_id });

        Ok(SubmitReceipt {
            submission_id: id,
            task_id: validated.task_id,
            record_id,
            photo_urls: payload.photos,
            dropped_photos,
        })
    }
}
