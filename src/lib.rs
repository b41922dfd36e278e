//! neo-lidar - Rust bindings for the libneo LiDAR driver library
//!
//! The native library owns the device protocol; this crate wraps its C ABI
//! in a scoped [`DeviceSession`], a lazy [`ScanStream`] and plain `Result`
//! errors.
//!
//! ## Features
//!
//! - `libneo`: link the installed `libneo` and expose [`native::LibNeo`]
//! - `mock` (default): [`native::MockNeo`], an in-process fake for
//!   hardware-free runs and tests

pub mod config;
pub mod device;
pub mod error;
pub mod native;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use device::{DeviceSession, ScanStream, ScanWorker};
pub use error::{Error, Result};
pub use types::{Sample, Scan};
