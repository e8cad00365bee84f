//! Repository trait definitions
//!
//! The scheduling core only ever *reads* cameras, timelapses, and settings;
//! writes belong to the external data layer. These traits are the narrow
//! seams that layer must implement. The database-backed versions live in
//! the host application, while [`crate::repositories::memory`] provides
//! in-memory versions for tests and the demo daemon.

use async_trait::async_trait;

use crate::errors::RepositoryResult;
use crate::models::{Camera, Timelapse};

/// Read access to camera records
#[async_trait]
pub trait CameraRepository: Send + Sync {
    /// Find a camera by its ID
    ///
    /// # Returns
    ///
    /// * `Ok(Some(Camera))` - Camera found
    /// * `Ok(None)` - No camera with that ID
    /// * `Err(RepositoryError)` - Backend failure
    async fn get_camera_by_id(&self, id: i64) -> RepositoryResult<Option<Camera>>;
}

/// Read access to timelapse records
#[async_trait]
pub trait TimelapseRepository: Send + Sync {
    /// Find a timelapse by its ID
    async fn get_timelapse_by_id(&self, id: i64) -> RepositoryResult<Option<Timelapse>>;

    /// All timelapses currently in a capturing state (`running` or `active`)
    ///
    /// This is the set the scheduler reconciles its recurring jobs against.
    async fn get_running_timelapses(&self) -> RepositoryResult<Vec<Timelapse>>;
}

/// String-keyed runtime settings
///
/// Deployments override timing defaults through this; the core resolves the
/// values once into typed settings at startup. Missing keys mean "use the
/// config default" and are not an error.
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    /// Look up a setting value by key
    ///
    /// # Returns
    ///
    /// * `Ok(Some(String))` - Value as stored (unparsed)
    /// * `Ok(None)` - Key not set
    /// * `Err(RepositoryError)` - Backend failure
    async fn get_setting(&self, key: &str) -> RepositoryResult<Option<String>>;
}

/// Well-known settings keys consumed by the timing core
pub mod setting_keys {
    pub const MIN_CAPTURE_INTERVAL: &str = "min_capture_interval_seconds";
    pub const MAX_CAPTURE_INTERVAL: &str = "max_capture_interval_seconds";
    pub const GRACE_PERIOD: &str = "capture_grace_period_seconds";
    pub const TIMEZONE: &str = "timezone";
}
