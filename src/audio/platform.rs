//! Format de capture fixe et couche audio de la plateforme
//!
//! Une [`CaptureSession`](super::CaptureSession) ne parle jamais directement
//! à une API son. Elle passe par [`AudioPlatform`] pour dimensionner et
//! ouvrir les streams, puis par [`NativeStream`] pour piloter un stream ouvert.

use thiserror::Error;

/// Format de capture global : 16kHz, mono, PCM linéaire signé 16 bits
pub struct CaptureFormat;

impl CaptureFormat {
    /// Taux d'échantillonnage en Hz
    pub const SAMPLE_RATE: u32 = 16000;
    /// Nombre de canaux (mono)
    pub const CHANNELS: u16 = 1;
    /// Octets par échantillon (i16)
    pub const BYTES_PER_SAMPLE: usize = 2;
    /// Taille de buffer quand la plateforme ne donne pas de minimum : 1 seconde
    pub const FALLBACK_BUFFER_SIZE: usize = Self::SAMPLE_RATE as usize * Self::BYTES_PER_SAMPLE;
}

/// État d'un stream natif
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Construit mais inutilisable (config invalide, périphérique occupé, libéré)
    Uninitialized,
    /// Prêt à démarrer, lire et arrêter
    Initialized,
}

/// Erreurs de la couche audio de la plateforme
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Permission microphone refusée")]
    PermissionDenied,

    #[error("Aucun périphérique audio trouvé")]
    NoDevice,

    #[error("Configuration non supportée: {0}")]
    Unsupported(String),

    #[error("Erreur du périphérique: {0}")]
    Device(String),
}

/// Dépendance sortante : le sous-système de capture audio de la plateforme
#[cfg_attr(test, mockall::automock)]
pub trait AudioPlatform {
    /// Taille minimale du buffer d'entrée en octets pour [`CaptureFormat`]
    fn min_buffer_size(&self) -> Result<usize, PlatformError>;

    /// Construit un stream micro au [`CaptureFormat`] avec la taille de
    /// buffer donnée en octets. Le stream n'est pas démarré.
    fn open_input(&self, buffer_size: usize) -> Result<Box<dyn NativeStream>, PlatformError>;
}

/// Stream micro ouvert, possédé par une seule session
#[cfg_attr(test, mockall::automock)]
pub trait NativeStream {
    fn state(&self) -> StreamState;

    fn start(&mut self) -> Result<(), PlatformError>;

    /// Copie au plus `buf.len()` échantillons dans `buf` et retourne le
    /// nombre écrit. Bloque selon la sémantique de lecture de la plateforme.
    fn read(&mut self, buf: &mut [i16]) -> Result<usize, PlatformError>;

    fn stop(&mut self) -> Result<(), PlatformError>;

    /// Libère la ressource OS. Le stream est ensuite `Uninitialized`.
    fn release(&mut self);
}
