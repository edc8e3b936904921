//! Session de capture microphone
//!
//! Ouvre un stream de la plateforme au [`CaptureFormat`] fixe, fournit des
//! blocs d'échantillons à la demande et libère le stream à l'arrêt.
//!
//! Une session n'est pas `Sync` et ne verrouille rien : l'appelant enchaîne
//! `start`, des `read_audio` répétés puis `stop` depuis un seul thread.
//! [`CaptureWorker`](crate::pipeline::CaptureWorker) permet de lire depuis
//! un thread dédié.

use super::platform::{AudioPlatform, CaptureFormat, NativeStream, PlatformError, StreamState};
use thiserror::Error;

/// Erreurs de la session de capture
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Permission microphone refusée")]
    PermissionDenied,

    #[error("Échec d'initialisation du stream audio: {0}")]
    InitFailure(String),

    #[error("Échec de lecture audio: {0}")]
    ReadFailure(String),

    #[error("Échec de l'arrêt du stream audio: {0}")]
    StopFailure(String),

    #[error("Enregistrement non démarré")]
    NotRecording,

    #[error("Le nombre d'échantillons demandé doit être positif")]
    InvalidLength,
}

impl CaptureError {
    fn from_init(err: PlatformError) -> Self {
        match err {
            PlatformError::PermissionDenied => CaptureError::PermissionDenied,
            other => CaptureError::InitFailure(other.to_string()),
        }
    }
}

/// État de la session. Un handle existe si et seulement si on enregistre.
enum SessionState {
    Idle,
    Recording(Box<dyn NativeStream>),
}

/// Session de capture microphone sur un stream natif
pub struct CaptureSession<P: AudioPlatform> {
    platform: P,
    buffer_size: usize,
    state: SessionState,
}

impl<P: AudioPlatform> CaptureSession<P> {
    /// Crée une session inactive et calcule la taille du buffer une fois
    pub fn new(platform: P) -> Self {
        let buffer_size = match platform.min_buffer_size() {
            Ok(size) if size > 0 => size,
            Ok(_) => {
                tracing::warn!(
                    "Buffer minimum vide, taille de buffer de secours: {}",
                    CaptureFormat::FALLBACK_BUFFER_SIZE
                );
                CaptureFormat::FALLBACK_BUFFER_SIZE
            }
            Err(e) => {
                tracing::warn!(
                    "Échec de la requête de buffer minimum ({}), taille de secours: {}",
                    e,
                    CaptureFormat::FALLBACK_BUFFER_SIZE
                );
                CaptureFormat::FALLBACK_BUFFER_SIZE
            }
        };

        tracing::info!("Session de capture initialisée, taille du buffer: {}", buffer_size);

        Self {
            platform,
            buffer_size,
            state: SessionState::Idle,
        }
    }

    /// Ouvre et démarre un nouveau stream micro
    ///
    /// Un stream restant d'un `start` précédent est arrêté et libéré avant
    /// l'ouverture du nouveau : au plus un stream existe.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if let SessionState::Recording(stale) = std::mem::replace(&mut self.state, SessionState::Idle) {
            tracing::debug!("Libération du stream précédent avant redémarrage");
            shutdown(stale).unwrap_or_else(|e| tracing::warn!("Stream précédent: {}", e));
        }

        let mut stream = self.platform.open_input(self.buffer_size).map_err(|e| {
            tracing::error!("Échec d'ouverture du stream audio: {}", e);
            CaptureError::from_init(e)
        })?;

        if stream.state() != StreamState::Initialized {
            tracing::error!("Le stream audio n'a pas pu s'initialiser");
            stream.release();
            return Err(CaptureError::InitFailure(
                "stream non initialisé".to_string(),
            ));
        }

        if let Err(e) = stream.start() {
            tracing::error!("Échec du démarrage de l'enregistrement: {}", e);
            stream.release();
            return Err(CaptureError::from_init(e));
        }

        self.state = SessionState::Recording(stream);
        tracing::info!("Enregistrement démarré");
        Ok(())
    }

    /// Lit au plus `num_samples` échantillons depuis le stream
    ///
    /// Retourne moins d'échantillons si moins étaient disponibles ; le
    /// résultat n'est jamais complété.
    pub fn read_audio(&mut self, num_samples: usize) -> Result<Vec<i16>, CaptureError> {
        let stream = match &mut self.state {
            SessionState::Recording(stream) => stream,
            SessionState::Idle => {
                tracing::warn!("Lecture audio impossible: enregistrement non démarré");
                return Err(CaptureError::NotRecording);
            }
        };

        if num_samples == 0 {
            return Err(CaptureError::InvalidLength);
        }

        let mut buffer = vec![0i16; num_samples];
        let read = stream.read(&mut buffer).map_err(|e| {
            tracing::error!("Erreur de lecture audio: {}", e);
            CaptureError::ReadFailure(e.to_string())
        })?;
        let read = read.min(num_samples);

        if read < num_samples {
            tracing::debug!("Lecture partielle: {} sur {} échantillons", read, num_samples);
            buffer.truncate(read);
        }

        Ok(buffer)
    }

    /// Arrête l'enregistrement et libère le stream
    ///
    /// La session est inactive au retour, même en cas d'erreur. Sans effet
    /// si la session est déjà inactive.
    pub fn stop(&mut self) -> Result<(), CaptureError> {
        let stream = match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Recording(stream) => stream,
            SessionState::Idle => return Ok(()),
        };

        match shutdown(stream) {
            Ok(()) => {
                tracing::info!("Enregistrement arrêté, ressources libérées");
                Ok(())
            }
            Err(e) => {
                tracing::error!("Erreur à l'arrêt de l'enregistrement: {}", e);
                Err(e)
            }
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, SessionState::Recording(_))
    }

    /// Taux d'échantillonnage en Hz
    pub fn sample_rate(&self) -> u32 {
        CaptureFormat::SAMPLE_RATE
    }

    /// Taille du buffer en octets
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}

impl<P: AudioPlatform> Drop for CaptureSession<P> {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Arrête un stream initialisé, puis le libère toujours
fn shutdown(mut stream: Box<dyn NativeStream>) -> Result<(), CaptureError> {
    let result = if stream.state() == StreamState::Initialized {
        stream
            .stop()
            .map_err(|e| CaptureError::StopFailure(e.to_string()))
    } else {
        Ok(())
    };
    stream.release();
    result
}
