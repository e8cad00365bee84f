//! Data access seams for the scheduling core
//!
//! The core consumes cameras, timelapses, and settings through the narrow
//! read-only traits in [`traits`]; [`memory`] supplies the in-memory
//! implementations used by tests and the demo daemon.

pub mod memory;
pub mod traits;

pub use traits::{CameraRepository, SettingsProvider, TimelapseRepository, setting_keys};
