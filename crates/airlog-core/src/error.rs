//! Error types shared across the control core

use thiserror_no_std::Error;

/// Failures reported by the durable-storage collaborator.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    #[error("file not found")]
    NotFound,
    #[error("storage I/O failed")]
    Io,
    #[error("storage is full")]
    Full,
    #[error("invalid file name")]
    InvalidName,
}

/// Failures reported by the sensor-fusion engine.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionError {
    /// Engine returned a negative status code.
    #[error("fusion engine status {0}")]
    Status(i32),
    /// A calibration blob was refused by the engine.
    #[error("calibration state rejected")]
    Rejected,
    /// The engine has no internal state to hand out yet.
    #[error("fusion engine not ready")]
    NotReady,
}

/// Errors that can escape [`crate::app::App`].
///
/// Only a failed fusion-engine initialization is fatal; everything else is
/// absorbed inside the control loop.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppError {
    #[error("fusion engine initialization failed: {0}")]
    FusionInit(FusionError),
}
