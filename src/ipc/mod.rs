//! Module bridge
//!
//! Commandes à valeurs sentinelles pour les appelants de l'autre côté d'une
//! frontière native.

mod commands;

pub use commands::{
    buffer_size, get_status, is_recording, read_audio, sample_rate, start_recording,
    stop_recording, StatusResponse,
};
