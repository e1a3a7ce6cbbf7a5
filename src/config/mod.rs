//! Configuration module for syncrec-rs
//!
//! This module handles application configuration including:
//! - Device parameters (serial line, camera index and resolution)
//! - Acquisition timing (stream frequencies, watchdog, join bound, tolerance)
//! - Playback display rate
//! - Output location for recordings
//!
//! # App Data Location
//!
//! Configuration and recordings default to the platform-appropriate location:
//! - **Linux**: `~/.local/share/dev.hxyulin.syncrec-rs/`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.syncrec-rs/`
//! - **Windows**: `%APPDATA%\dev.hxyulin.syncrec-rs\`
//!
//! # Files
//!
//! - `config.toml` - Application configuration
//! - `recordings/` - Default directory for saved recordings
//!
//! # Example
//!
//! ```ignore
//! use syncrec_rs::config::AppConfig;
//!
//! let mut config = AppConfig::load_or_default(AppConfig::default_path());
//! config.acquisition.imu_frequency_hz = 400.0;
//! config.validate()?;
//! config.save(AppConfig::default_path().unwrap())?;
//! ```

use crate::error::{Result, SyncRecError};
use crate::types::{FrameGeometry, IMU_FIELD_LABELS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for data directories
pub const APP_ID: &str = "dev.hxyulin.syncrec-rs";

/// Config filename
pub const CONFIG_FILE: &str = "config.toml";

/// Recordings subdirectory
pub const RECORDINGS_DIR: &str = "recordings";

/// Default inertial sampling rate in Hz
pub const DEFAULT_IMU_FREQUENCY_HZ: f64 = 200.0;

/// Default camera rate in frames per second
pub const DEFAULT_CAMERA_FREQUENCY_HZ: f64 = 30.0;

/// Default recording length in seconds
pub const DEFAULT_DURATION_SECS: f64 = 15.0;

/// Default playback display refresh rate in Hz
pub const DEFAULT_DISPLAY_HZ: f64 = 60.0;

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir().ok_or_else(|| {
        SyncRecError::Config("Could not determine app data directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            SyncRecError::Config(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

// ==================== Device Config ====================

/// Parameters handed to the device provider when a session opens its devices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Serial port of the IMU (e.g. `/dev/ttyACM0`, `COM3`)
    pub serial_port: String,

    /// Serial baud rate
    pub baud_rate: u32,

    /// Upper bound for a single blocking device read in milliseconds
    pub read_timeout_ms: u64,

    /// Number of numeric fields per IMU record
    pub imu_fields: usize,

    /// Camera index as understood by the capture backend
    pub camera_index: u32,

    /// Frame width in pixels
    pub frame_width: u32,

    /// Frame height in pixels
    pub frame_height: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            serial_port: "/dev/ttyACM0".to_string(),
            baud_rate: 115_200,
            read_timeout_ms: 1000,
            imu_fields: IMU_FIELD_LABELS.len(),
            camera_index: 0,
            frame_width: 640,
            frame_height: 480,
        }
    }
}

impl DeviceConfig {
    /// Frame geometry implied by this configuration (BGR8)
    pub fn frame_geometry(&self) -> FrameGeometry {
        FrameGeometry::new(self.frame_width, self.frame_height, 3)
    }

    /// Read timeout as a Duration
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

// ==================== Acquisition Config ====================

/// Timing and buffering parameters of a recording session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Devices to open
    pub devices: DeviceConfig,

    /// Target inertial sampling rate in Hz
    pub imu_frequency_hz: f64,

    /// Target camera rate in Hz
    pub camera_frequency_hz: f64,

    /// Default recording length in seconds (used by the CLI)
    pub duration_secs: f64,

    /// A producer with no successful sample for this long aborts (0 = disabled)
    pub stale_timeout_ms: u64,

    /// Join bound on stop, in multiples of the slower stream's interval
    pub join_timeout_intervals: u32,

    /// Allowed relative deviation of the sample count from `frequency × duration`
    pub jitter_tolerance: f64,

    /// Entries per buffer chunk
    pub chunk_capacity: usize,

    /// Capacity of the producer-to-collector channel
    pub channel_capacity: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            devices: DeviceConfig::default(),
            imu_frequency_hz: DEFAULT_IMU_FREQUENCY_HZ,
            camera_frequency_hz: DEFAULT_CAMERA_FREQUENCY_HZ,
            duration_secs: DEFAULT_DURATION_SECS,
            stale_timeout_ms: 2000,
            join_timeout_intervals: 5,
            jitter_tolerance: 0.1,
            chunk_capacity: 1024,
            channel_capacity: 4096,
        }
    }
}

impl AcquisitionConfig {
    /// Interval between IMU samples
    pub fn imu_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.imu_frequency_hz)
    }

    /// Interval between camera frames
    pub fn camera_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.camera_frequency_hz)
    }

    /// Bound on waiting for both producers after stop is requested
    pub fn join_timeout(&self) -> Duration {
        let slowest = self.imu_interval().max(self.camera_interval());
        slowest * self.join_timeout_intervals.max(1)
    }

    /// Watchdog timeout, if enabled
    pub fn stale_timeout(&self) -> Option<Duration> {
        (self.stale_timeout_ms > 0).then(|| Duration::from_millis(self.stale_timeout_ms))
    }

    /// Default recording length
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs.max(0.0))
    }

    /// Check the configuration for values the session cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(self.imu_frequency_hz.is_finite() && self.imu_frequency_hz > 0.0) {
            return Err(SyncRecError::Config(format!(
                "IMU frequency must be positive, got {}",
                self.imu_frequency_hz
            )));
        }
        if !(self.camera_frequency_hz.is_finite() && self.camera_frequency_hz > 0.0) {
            return Err(SyncRecError::Config(format!(
                "Camera frequency must be positive, got {}",
                self.camera_frequency_hz
            )));
        }
        if !(0.0..1.0).contains(&self.jitter_tolerance) {
            return Err(SyncRecError::Config(format!(
                "Jitter tolerance must be in [0, 1), got {}",
                self.jitter_tolerance
            )));
        }
        if self.devices.imu_fields == 0 {
            return Err(SyncRecError::Config(
                "IMU records need at least one field".to_string(),
            ));
        }
        if self.devices.frame_width == 0 || self.devices.frame_height == 0 {
            return Err(SyncRecError::Config(format!(
                "Invalid frame size {}x{}",
                self.devices.frame_width, self.devices.frame_height
            )));
        }
        if self.chunk_capacity == 0 || self.channel_capacity == 0 {
            return Err(SyncRecError::Config(
                "Buffer capacities must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ==================== Playback Config ====================

/// Playback settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Fixed redraw rate of the renderer in Hz
    pub display_hz: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            display_hz: DEFAULT_DISPLAY_HZ,
        }
    }
}

impl PlaybackConfig {
    /// Interval between fixed display ticks (never faster than 1 kHz, never slower than 1 Hz)
    pub fn tick_interval(&self) -> Duration {
        let hz = if self.display_hz.is_finite() {
            self.display_hz.clamp(1.0, 1000.0)
        } else {
            DEFAULT_DISPLAY_HZ
        };
        Duration::from_secs_f64(1.0 / hz)
    }
}

// ==================== Output Config ====================

/// Where finished recordings are written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output directory (defaults to the app data recordings directory)
    pub data_dir: Option<PathBuf>,

    /// Task name used as the recording file prefix
    pub task_name: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            task_name: "recording".to_string(),
        }
    }
}

impl OutputConfig {
    /// Resolve the output directory
    pub fn resolve_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(ensure_app_data_dir()?.join(RECORDINGS_DIR)),
        }
    }
}

// ==================== App Config ====================

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Acquisition settings
    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    /// Playback settings
    #[serde(default)]
    pub playback: PlaybackConfig,

    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,
}

impl AppConfig {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        app_data_dir().map(|p| p.join(CONFIG_FILE))
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SyncRecError::Config(format!("Failed to read config {:?}: {}", path, e))
        })?;

        let config: AppConfig = toml::from_str(&content).map_err(|e| {
            SyncRecError::Config(format!("Failed to parse config {:?}: {}", path, e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, returning defaults on any error
    pub fn load_or_default(path: Option<impl AsRef<Path>>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save configuration as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SyncRecError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| SyncRecError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            SyncRecError::Config(format!("Failed to write config {:?}: {}", path, e))
        })
    }

    /// Validate all sections
    pub fn validate(&self) -> Result<()> {
        self.acquisition.validate()?;
        if !(self.playback.display_hz.is_finite() && self.playback.display_hz > 0.0) {
            return Err(SyncRecError::Config(format!(
                "Display rate must be positive, got {}",
                self.playback.display_hz
            )));
        }
        Ok(())
    }
}
