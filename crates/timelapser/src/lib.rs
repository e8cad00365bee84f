//! Capture scheduling and timing core for self-hosted timelapse camera rigs
//!
//! The crate decides *when* things happen: when each timelapse's next frame
//! is due, whether a capture may proceed right now, and which processing
//! jobs follow a completed capture. Image acquisition, encoding, and
//! storage live in the host application; this crate hands it an ordered,
//! deduplicated job queue and a single scheduling authority to command.

pub mod config;
pub mod errors;
pub mod models;
pub mod repositories;
pub mod scheduling;
pub mod utils;
