//! Core data models used throughout the survey client.
//!
//! Server-sourced catalog types ([`Task`], [`TaskItem`]) are read-only on the
//! client. Completion state lives in a separate [`CompletionSnapshot`] and is
//! joined onto the catalog by [`crate::reconcile`], never written back into
//! these structs.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

pub type TaskId = i64;
pub type ItemId = i64;
pub type SurveyorId = i64;
pub type RecordId = i64;

/// A WGS84-ish coordinate pair as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Active,
    Completed,
    Cancelled,
}

/// A unit of assigned survey work for one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub date: NaiveDate,
    pub status: TaskStatus,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub items: Vec<TaskItem>,
}

/// One product within a task. Catalog data only; progress is derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskItem {
    pub id: ItemId,
    pub product_name: String,
    pub category: String,
    #[serde(default, rename = "product_spec")]
    pub spec: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
}

/// Per-surveyor record counts for one task, as fetched from the server.
///
/// Transient: superseded wholesale on every refresh.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompletionSnapshot {
    pub task_id: TaskId,
    pub surveyor_id: SurveyorId,
    pub per_item_counts: HashMap<ItemId, u32>,
    pub completed_item_count: usize,
    pub total_record_count: u32,
}

/// A photo on its way from camera to server.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoAsset {
    /// File that will be uploaded. Points at the raw capture when
    /// watermarking did not succeed.
    pub local_path: PathBuf,
    pub watermarked: bool,
    pub uploaded_url: Option<String>,
}

impl PhotoAsset {
    pub fn raw(local_path: PathBuf) -> Self {
        Self {
            local_path,
            watermarked: false,
            uploaded_url: None,
        }
    }
}

/// An in-progress observation, edited by the surveyor before submission.
///
/// Free-text fields hold exactly what was typed; trimming and
/// empty-to-null conversion happen when the payload is built.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DraftRecord {
    pub task_id: Option<TaskId>,
    pub selected_item: Option<TaskItem>,
    pub store_name: String,
    pub store_address: String,
    pub price: String,
    pub promotion_info: String,
    pub remark: String,
    pub coordinates: Option<Coordinates>,
    pub photos: Vec<PhotoAsset>,
}

impl DraftRecord {
    pub fn for_task(task_id: TaskId) -> Self {
        Self {
            task_id: Some(task_id),
            ..Default::default()
        }
    }

    /// Clears item-specific fields after a successful save so the next
    /// item at the same store can be entered quickly. Store name, address
    /// and coordinates are kept, as is the task.
    pub fn reset_for_next_item(&mut self) {
        self.selected_item = None;
        self.price.clear();
        self.promotion_info.clear();
        self.remark.clear();
        self.photos.clear();
    }
}

/// Body of a record creation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordPayload {
    pub item_id: ItemId,
    pub surveyor_id: SurveyorId,
    pub store_name: String,
    pub store_address: Option<String>,
    pub price: f64,
    pub promotion_info: Option<String>,
    pub remark: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub photos: Vec<String>,
}

/// Partial update of an existing record. Unset fields are not sent.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RecordUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion_info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl RecordUpdate {
    pub fn is_empty(&self) -> bool {
        self == &RecordUpdate::default()
    }
}

/// A submitted observation as listed by the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub item_id: ItemId,
    pub surveyor_id: SurveyorId,
    pub store_name: String,
    #[serde(default)]
    pub store_address: Option<String>,
    pub price: f64,
    #[serde(default)]
    pub promotion_info: Option<String>,
    #[serde(default)]
    pub remark: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub photo_path: Option<String>,
    #[serde(default)]
    pub photos: Option<Vec<String>>,
    pub created_at: NaiveDateTime,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}
