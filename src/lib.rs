//! micshim - capture microphone au format fixe
//!
//! Ouvre le microphone en PCM 16 bits signé, mono, 16kHz, fournit des blocs
//! d'échantillons à la demande et libère le périphérique à l'arrêt.

pub mod audio;
pub mod ipc;
pub mod pipeline;

pub use audio::{CaptureError, CaptureFormat, CaptureSession, CpalPlatform};
pub use pipeline::{CaptureWorker, WorkerConfig};
