//! Utility modules for the timelapser scheduling core
//!
//! This module contains reusable utilities that can be used
//! across different parts of the system.

pub mod jitter;
pub mod time;
