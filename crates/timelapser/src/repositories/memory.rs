//! In-memory repository implementations
//!
//! Used by the test suite and the demo daemon (which seeds them from a TOML
//! file at startup). A production deployment implements the same traits over
//! its real database.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::errors::RepositoryResult;
use crate::models::{Camera, Timelapse};
use crate::repositories::traits::{CameraRepository, SettingsProvider, TimelapseRepository};

/// Camera records held in a `RwLock`ed map
#[derive(Default)]
pub struct InMemoryCameraRepository {
    cameras: RwLock<HashMap<i64, Camera>>,
}

impl InMemoryCameraRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a camera record
    pub async fn upsert(&self, camera: Camera) {
        self.cameras.write().await.insert(camera.id, camera);
    }

    /// Record a completed capture, as the data layer would after storing an image
    pub async fn set_last_capture(&self, camera_id: i64, at: DateTime<Utc>) {
        if let Some(camera) = self.cameras.write().await.get_mut(&camera_id) {
            camera.last_capture_at = Some(at);
        }
    }
}

#[async_trait]
impl CameraRepository for InMemoryCameraRepository {
    async fn get_camera_by_id(&self, id: i64) -> RepositoryResult<Option<Camera>> {
        Ok(self.cameras.read().await.get(&id).cloned())
    }
}

/// Timelapse records held in a `RwLock`ed map
#[derive(Default)]
pub struct InMemoryTimelapseRepository {
    timelapses: RwLock<HashMap<i64, Timelapse>>,
}

impl InMemoryTimelapseRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a timelapse record
    pub async fn upsert(&self, timelapse: Timelapse) {
        self.timelapses
            .write()
            .await
            .insert(timelapse.id, timelapse);
    }

    /// Remove a timelapse record
    pub async fn remove(&self, id: i64) {
        self.timelapses.write().await.remove(&id);
    }
}

#[async_trait]
impl TimelapseRepository for InMemoryTimelapseRepository {
    async fn get_timelapse_by_id(&self, id: i64) -> RepositoryResult<Option<Timelapse>> {
        Ok(self.timelapses.read().await.get(&id).cloned())
    }

    async fn get_running_timelapses(&self) -> RepositoryResult<Vec<Timelapse>> {
        let mut running: Vec<Timelapse> = self
            .timelapses
            .read()
            .await
            .values()
            .filter(|t| t.status.is_capturing())
            .cloned()
            .collect();
        // Stable output keeps reconciliation logs readable
        running.sort_by_key(|t| t.id);
        Ok(running)
    }
}

/// String-keyed settings held in a `RwLock`ed map
#[derive(Default)]
pub struct InMemorySettingsProvider {
    settings: RwLock<HashMap<String, String>>,
}

impl InMemorySettingsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key, as an operator would through the host application
    pub async fn set(&self, key: &str, value: &str) {
        self.settings
            .write()
            .await
            .insert(key.to_string(), value.to_string());
    }
}

#[async_trait]
impl SettingsProvider for InMemorySettingsProvider {
    async fn get_setting(&self, key: &str) -> RepositoryResult<Option<String>> {
        Ok(self.settings.read().await.get(key).cloned())
    }
}
