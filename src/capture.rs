//! Photo capture pipeline: locate → shoot → watermark → queue.
//!
//! Every stage before the queue degrades instead of failing: no location
//! fix means no coordinate line, and a watermark failure keeps the raw
//! image (`watermarked = false`). Only a broken camera is reported, and a
//! cancelled shot simply produces nothing.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Local;
use uuid::Uuid;

use crate::error::{CaptureError, WatermarkError};
use crate::geo::GeoLocator;
use crate::models::{Coordinates, PhotoAsset};
use crate::traits::{CameraProvider, CameraShot};
use crate::watermark::{
    format_timestamp, WatermarkRenderer, WatermarkStamp, DEFAULT_TIMESTAMP_FORMAT,
};

pub struct PhotoCapturePipeline {
    camera: Arc<dyn CameraProvider>,
    locator: GeoLocator,
    renderer: Arc<dyn WatermarkRenderer>,
    output_dir: PathBuf,
    timestamp_format: String,
    photos: Vec<PhotoAsset>,
}

impl PhotoCapturePipeline {
    pub fn new(
        camera: Arc<dyn CameraProvider>,
        locator: GeoLocator,
        renderer: Arc<dyn WatermarkRenderer>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            camera,
            locator,
            renderer,
            output_dir: output_dir.into(),
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
            photos: Vec::new(),
        }
    }

    pub fn with_timestamp_format(mut self, format: impl Into<String>) -> Self {
        self.timestamp_format = format.into();
        self
    }

    /// Takes one photo and appends it to the queue.
    ///
    /// `current` is used as-is when the caller already has a fix;
    /// otherwise the locator is asked with its bounded wait.
    /// `location_label` is the resolved store address, if any. Without one
    /// the coordinates are reverse-geocoded, and the coordinate string is
    /// used when that fails or times out.
    ///
    /// Returns `Ok(None)` when the user cancels the camera.
    pub async fn capture(
        &mut self,
        current: Option<Coordinates>,
        location_label: Option<&str>,
    ) -> Result<Option<PhotoAsset>, CaptureError> {
        let coordinates = match current {
            Some(c) => Some(c),
            None => self.locator.locate_or_none().await,
        };

        let raw = match self.camera.capture_photo().await? {
            CameraShot::Captured(path) => path,
            CameraShot::Cancelled => {
                tracing::debug!("camera cancelled");
                return Ok(None);
            }
        };

        let label = self.resolve_label(coordinates, location_label).await;
        let asset = self.watermark(raw, coordinates, label).await;
        self.photos.push(asset.clone());
        Ok(Some(asset))
    }

    /// Appends gallery picks in pick order, watermarked like captures.
    /// Returns how many were added.
    pub async fn import_from_gallery(
        &mut self,
        current: Option<Coordinates>,
        location_label: Option<&str>,
    ) -> Result<usize, CaptureError> {
        let picked = self.camera.pick_from_gallery().await?;
        if picked.is_empty() {
            return Ok(0);
        }
        let coordinates = match current {
            Some(c) => Some(c),
            None => self.locator.locate_or_none().await,
        };
        let label = self.resolve_label(coordinates, location_label).await;
        for raw in &picked {
            let asset = self
                .watermark(raw.clone(), coordinates, label.clone())
                .await;
            self.photos.push(asset);
        }
        Ok(picked.len())
    }

    async fn resolve_label(
        &self,
        coordinates: Option<Coordinates>,
        location_label: Option<&str>,
    ) -> Option<String> {
        if let Some(label) = location_label.map(str::trim).filter(|l| !l.is_empty()) {
            return Some(label.to_string());
        }
        match coordinates {
            Some(c) => Some(self.locator.label_for(c).await),
            None => None,
        }
    }

    async fn watermark(
        &self,
        raw: PathBuf,
        coordinates: Option<Coordinates>,
        label: Option<String>,
    ) -> PhotoAsset {
        let stamp = WatermarkStamp {
            timestamp: format_timestamp(&Local::now(), &self.timestamp_format),
            location_label: label,
            coordinates,
        };
        let dest = watermarked_path(&self.output_dir, &raw);

        let renderer = Arc::clone(&self.renderer);
        let (src, out) = (raw.clone(), dest.clone());
        let rendered = tokio::task::spawn_blocking(move || renderer.render(&src, &out, &stamp))
            .await
            .unwrap_or_else(|e| Err(WatermarkError::Backend(e.to_string())));

        match rendered {
            Ok(()) => PhotoAsset {
                local_path: dest,
                watermarked: true,
                uploaded_url: None,
            },
            Err(e) => {
                tracing::warn!(photo = %raw.display(), error = %e, "watermark failed; keeping original");
                PhotoAsset::raw(raw)
            }
        }
    }

    pub fn photos(&self) -> &[PhotoAsset] {
        &self.photos
    }

    pub fn preview(&self, index: usize) -> Option<&PhotoAsset> {
        self.photos.get(index)
    }

    /// Removes a queued photo, keeping the order of the rest.
    pub fn remove(&mut self, index: usize) -> Option<PhotoAsset> {
        if index < self.photos.len() {
            Some(self.photos.remove(index))
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.photos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.photos.is_empty()
    }

    /// Hands the queue over to a draft, leaving the pipeline empty.
    pub fn take_photos(&mut self) -> Vec<PhotoAsset> {
        std::mem::take(&mut self.photos)
    }
}

/// `<output_dir>/<stem>_<id>_wm.jpg`, unique per render so captures that
/// share a file stem never overwrite each other.
fn watermarked_path(output_dir: &Path, raw: &Path) -> PathBuf {
    let stem = raw
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "photo".to_string());
    let id = Uuid::new_v4().simple().to_string();
    output_dir.join(format!("{}_{}_wm.jpg", stem, &id[..12]))
}

/// The paths that exist, in order. Missing ones are logged and skipped so
/// one bad path does not sink a whole batch.
pub fn existing_photos(paths: &[PathBuf]) -> Vec<PathBuf> {
    paths
        .iter()
        .filter(|path| {
            let found = path.is_file();
            if !found {
                tracing::warn!(photo = %path.display(), "photo not found; skipping");
            }
            found
        })
        .cloned()
        .collect()
}

/// Camera backed by files already on disk: each shot takes the next queued
/// path, and an empty queue behaves like the user backing out.
pub struct FileCamera {
    shots: Mutex<VecDeque<PathBuf>>,
    gallery: Vec<PathBuf>,
}

impl FileCamera {
    pub fn new(shots: Vec<PathBuf>) -> Self {
        Self {
            shots: Mutex::new(shots.into()),
            gallery: Vec::new(),
        }
    }

    pub fn with_gallery(mut self, gallery: Vec<PathBuf>) -> Self {
        self.gallery = gallery;
        self
    }
}

#[async_trait]
impl CameraProvider for FileCamera {
    async fn capture_photo(&self) -> Result<CameraShot, CaptureError> {
        let next = self
            .shots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next {
            Some(path) if path.is_file() => Ok(CameraShot::Captured(path)),
            Some(path) => Err(CaptureError::Camera(format!(
                "no such file: {}",
                path.display()
            ))),
            None => Ok(CameraShot::Cancelled),
        }
    }

    async fn pick_from_gallery(&self) -> Result<Vec<PathBuf>, CaptureError> {
        if let Some(missing) = self.gallery.iter().find(|p| !p.is_file()) {
            return Err(CaptureError::Gallery(format!(
                "no such file: {}",
                missing.display()
            )));
        }
        Ok(self.gallery.clone())
    }
}
