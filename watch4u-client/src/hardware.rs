//! Desk hardware access: the NFC radio and the camera.
//!
//! Each device supports one session at a time. A session is a scoped
//! guard; dropping it releases the device for the next claimant.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::state_machine::state::{CapturedImage, TagSerial};

/// Errors surfaced by the desk peripherals.
#[derive(Debug)]
pub enum HardwareError {
    /// The device is already held by another session.
    Busy,
    ReadFailed(String),
}

impl std::fmt::Display for HardwareError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HardwareError::Busy => write!(f, "device is busy with another session"),
            HardwareError::ReadFailed(details) => write!(f, "device read failed: {}", details),
        }
    }
}

impl std::error::Error for HardwareError {}

/// Handle to the NFC radio. Clones share the same underlying device.
#[derive(Clone, Default)]
pub struct NfcRadio {
    slot: Arc<Mutex<()>>,
}

impl NfcRadio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the radio for exclusive use.
    pub fn try_begin_session(&self) -> Result<RadioSession, HardwareError> {
        let guard = self
            .slot
            .clone()
            .try_lock_owned()
            .map_err(|_| HardwareError::Busy)?;
        Ok(RadioSession { _guard: guard })
    }
}

/// Exclusive access to the radio; dropping it releases the device.
pub struct RadioSession {
    _guard: OwnedMutexGuard<()>,
}

/// Handle to the camera. Clones share the same underlying device.
#[derive(Clone, Default)]
pub struct Camera {
    slot: Arc<Mutex<()>>,
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the camera for exclusive use.
    pub fn try_begin_session(&self) -> Result<CameraSession, HardwareError> {
        let guard = self
            .slot
            .clone()
            .try_lock_owned()
            .map_err(|_| HardwareError::Busy)?;
        Ok(CameraSession { _guard: guard })
    }
}

/// Exclusive access to the camera; dropping it releases the device.
pub struct CameraSession {
    _guard: OwnedMutexGuard<()>,
}

/// Reads one tag serial from the radio.
#[async_trait]
pub trait NfcTagReader: Send + Sync {
    async fn read_tag(&self, session: &RadioSession) -> Result<TagSerial, HardwareError>;
}

/// Captures one image from the camera.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn capture(&self, session: &CameraSession) -> Result<CapturedImage, HardwareError>;
}
