//! Module de lecture de la capture
//!
//! Fait tourner une session de capture sur un thread dédié et diffuse ses blocs.

mod worker;

pub use worker::{CaptureWorker, WorkerConfig, WorkerError};
