use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::{Coordinates, SurveyorId};
use crate::watermark::{is_valid_timestamp_format, DEFAULT_TIMESTAMP_FORMAT};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub watermark: WatermarkConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}
fn default_upload_timeout_secs() -> u64 {
    30
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SessionConfig {
    #[serde(default)]
    pub surveyor_id: Option<SurveyorId>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocationConfig {
    #[serde(default = "default_location_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_location_timeout_secs")]
    pub geocode_timeout_secs: u64,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            geocode_timeout_secs: 5,
            latitude: None,
            longitude: None,
        }
    }
}

fn default_location_timeout_secs() -> u64 {
    5
}

impl LocationConfig {
    /// Fixed position configured for devices without a GPS fix.
    pub fn fixed_coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(Coordinates::new(lat, lng)),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatermarkConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
    /// Glyph pixel scale; 0 derives it from the image width.
    #[serde(default)]
    pub scale: u32,
    #[serde(default = "default_padding")]
    pub padding: u32,
    #[serde(default = "default_opacity")]
    pub opacity: u8,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timestamp_format: default_timestamp_format(),
            scale: 0,
            padding: 12,
            opacity: 150,
            jpeg_quality: 90,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_timestamp_format() -> String {
    DEFAULT_TIMESTAMP_FORMAT.to_string()
}
fn default_padding() -> u32 {
    12
}
fn default_opacity() -> u8 {
    150
}
fn default_jpeg_quality() -> u8 {
    90
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./photos")
}

impl Config {
    /// Config pointing at a local backend with every optional section at
    /// its default.
    pub fn minimal() -> Self {
        Self {
            api: ApiConfig {
                base_url: "http://127.0.0.1:8000".to_string(),
                timeout_secs: default_timeout_secs(),
                upload_timeout_secs: default_upload_timeout_secs(),
            },
            session: SessionConfig::default(),
            location: LocationConfig::default(),
            watermark: WatermarkConfig::default(),
            capture: CaptureConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate api
    let base = config.api.base_url.trim();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        anyhow::bail!(
            "api.base_url must start with http:// or https:// (got '{}')",
            config.api.base_url
        );
    }
    if config.api.timeout_secs == 0 {
        anyhow::bail!("api.timeout_secs must be > 0");
    }
    if config.api.upload_timeout_secs == 0 {
        anyhow::bail!("api.upload_timeout_secs must be > 0");
    }

    // Validate location
    if config.location.timeout_secs == 0 {
        anyhow::bail!("location.timeout_secs must be > 0");
    }
    if config.location.geocode_timeout_secs == 0 {
        anyhow::bail!("location.geocode_timeout_secs must be > 0");
    }
    if config.location.latitude.is_some() != config.location.longitude.is_some() {
        anyhow::bail!("location.latitude and location.longitude must be set together");
    }
    if let Some(lat) = config.location.latitude {
        if !(-90.0..=90.0).contains(&lat) {
            anyhow::bail!("location.latitude must be in [-90, 90]");
        }
    }
    if let Some(lng) = config.location.longitude {
        if !(-180.0..=180.0).contains(&lng) {
            anyhow::bail!("location.longitude must be in [-180, 180]");
        }
    }

    // Validate watermark
    if !(1..=100).contains(&config.watermark.jpeg_quality) {
        anyhow::bail!("watermark.jpeg_quality must be in [1, 100]");
    }
    if !is_valid_timestamp_format(&config.watermark.timestamp_format) {
        anyhow::bail!(
            "watermark.timestamp_format is not a valid strftime format (got '{}')",
            config.watermark.timestamp_format
        );
    }

    Ok(())
}
