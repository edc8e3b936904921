//! Module de capture audio
//!
//! Une [`CaptureSession`] pilote un stream de la plateforme au format fixe
//! 16kHz mono i16. [`CpalPlatform`] est la couche plateforme desktop.

mod cpal_backend;
mod platform;
mod session;

pub use cpal_backend::{CpalPlatform, CpalStream};
pub use platform::{AudioPlatform, CaptureFormat, NativeStream, PlatformError, StreamState};
pub use session::{CaptureError, CaptureSession};

#[cfg(test)]
pub(crate) use platform::{MockAudioPlatform, MockNativeStream};
