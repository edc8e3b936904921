//! Commandes du bridge natif
//!
//! Points d'entrée à plat pour un appelant natif (JNI, FFI, commandes UI)
//! qui ne connaît que des booléens, des tableaux nullables et des entiers.
//! Chaque échec est loggé puis réduit à `false` / `None`.

use crate::audio::{AudioPlatform, CaptureError, CaptureSession};

/// Réponse de statut pour l'appelant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    pub is_recording: bool,
    pub sample_rate: i32,
    pub buffer_size: i32,
}

/// Démarre l'enregistrement
///
/// Retourne `false` si la permission est refusée ou si l'initialisation échoue.
pub fn start_recording<P: AudioPlatform>(session: &mut CaptureSession<P>) -> bool {
    match session.start() {
        Ok(()) => true,
        Err(CaptureError::PermissionDenied) => {
            tracing::error!("Permission refusée pour l'enregistrement audio");
            false
        }
        Err(e) => {
            tracing::error!("Échec du démarrage de l'enregistrement: {}", e);
            false
        }
    }
}

/// Lit au plus `num_samples` échantillons
///
/// Retourne `None` hors enregistrement, sur erreur de lecture ou si
/// `num_samples` n'est pas positif. Une lecture partielle donne un tableau
/// plus court.
pub fn read_audio<P: AudioPlatform>(
    session: &mut CaptureSession<P>,
    num_samples: i32,
) -> Option<Vec<i16>> {
    let Ok(num_samples) = usize::try_from(num_samples) else {
        tracing::warn!("Lecture audio impossible: nombre d'échantillons négatif {}", num_samples);
        return None;
    };

    session.read_audio(num_samples).ok()
}

/// Arrête l'enregistrement ; n'échoue jamais
pub fn stop_recording<P: AudioPlatform>(session: &mut CaptureSession<P>) {
    if let Err(e) = session.stop() {
        tracing::warn!("Erreur à l'arrêt, session inactive: {}", e);
    }
}

pub fn is_recording<P: AudioPlatform>(session: &CaptureSession<P>) -> bool {
    session.is_recording()
}

/// Taux d'échantillonnage en Hz
pub fn sample_rate<P: AudioPlatform>(session: &CaptureSession<P>) -> i32 {
    i32::try_from(session.sample_rate()).unwrap_or(i32::MAX)
}

/// Taille du buffer en octets
pub fn buffer_size<P: AudioPlatform>(session: &CaptureSession<P>) -> i32 {
    i32::try_from(session.buffer_size()).unwrap_or(i32::MAX)
}

/// Retourne le statut actuel
pub fn get_status<P: AudioPlatform>(session: &CaptureSession<P>) -> StatusResponse {
    StatusResponse {
        is_recording: is_recording(session),
        sample_rate: sample_rate(session),
        buffer_size: buffer_size(session),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{MockAudioPlatform, MockNativeStream, NativeStream, PlatformError, StreamState};

    fn session_with_stream(stream: Option<MockNativeStream>) -> CaptureSession<MockAudioPlatform> {
        let mut platform = MockAudioPlatform::new();
        platform
            .expect_min_buffer_size()
            .returning(|| Err(PlatformError::NoDevice));
        match stream {
            Some(stream) => {
                platform
                    .expect_open_input()
                    .return_once(move |_| Ok(Box::new(stream) as Box<dyn NativeStream>));
            }
            None => {
                platform
                    .expect_open_input()
                    .returning(|_| Err(PlatformError::PermissionDenied));
            }
        }
        CaptureSession::new(platform)
    }

    fn stream_reading(count: usize) -> MockNativeStream {
        let mut stream = MockNativeStream::new();
        stream.expect_state().return_const(StreamState::Initialized);
        stream.expect_start().returning(|| Ok(()));
        stream.expect_read().returning(move |buf| {
            let n = count.min(buf.len());
            buf[..n].fill(9);
            Ok(n)
        });
        stream
            .expect_stop()
            .returning(|| Err(PlatformError::Device("déjà arrêté".into())));
        stream.expect_release().return_const(());
        stream
    }

    #[test]
    fn test_start_read_stop() {
        let mut session = session_with_stream(Some(stream_reading(1000)));

        assert!(start_recording(&mut session));
        assert!(is_recording(&session));
        assert_eq!(read_audio(&mut session, 480), Some(vec![9; 480]));

        stop_recording(&mut session);
        assert!(!is_recording(&session));
        stop_recording(&mut session);
        assert!(!is_recording(&session));
    }

    #[test]
    fn test_start_denied_is_false() {
        let mut session = session_with_stream(None);
        assert!(!start_recording(&mut session));
        assert!(!is_recording(&session));
    }

    #[test]
    fn test_read_sentinels() {
        let mut session = session_with_stream(Some(stream_reading(100)));
        assert_eq!(read_audio(&mut session, 480), None);

        assert!(start_recording(&mut session));
        assert_eq!(read_audio(&mut session, -1), None);
        assert_eq!(read_audio(&mut session, 0), None);
        assert_eq!(read_audio(&mut session, 480).map(|s| s.len()), Some(100));
    }

    #[test]
    fn test_status() {
        let session = session_with_stream(None);
        assert_eq!(
            get_status(&session),
            StatusResponse {
                is_recording: false,
                sample_rate: 16000,
                buffer_size: 32000,
            }
        );
    }
}
