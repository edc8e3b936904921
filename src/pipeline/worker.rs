//! Worker de capture sur thread dédié
//!
//! Possède une [`CaptureSession`] sur son propre thread et la lit par blocs
//! de taille fixe. Les streams cpal ne sont pas `Send` : la plateforme est
//! construite sur le thread de capture depuis une factory. Les blocs sont
//! transmis sur un canal tokio.

use crate::audio::{AudioPlatform, CaptureError, CaptureSession};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tokio::sync::mpsc;

/// Configuration du worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Échantillons demandés par lecture (480 = 30ms @ 16kHz)
    pub chunk_samples: usize,
    /// Blocs en attente dans le canal. Canal plein : les nouveaux blocs sont
    /// perdus (les plus récents) et comptés dans
    /// [`CaptureWorker::dropped_chunks`].
    pub channel_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            chunk_samples: 480,
            channel_capacity: 64,
        }
    }
}

/// Erreurs du worker
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Erreur audio: {0}")]
    Capture(#[from] CaptureError),

    #[error("Configuration du worker invalide: {0}")]
    Config(String),

    #[error("Impossible de lancer le thread de capture: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Thread de capture terminé avant le démarrage")]
    ThreadExited,
}

/// Handle vers un thread de capture en cours
pub struct CaptureWorker {
    running: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    thread_handle: Option<JoinHandle<()>>,
}

impl CaptureWorker {
    /// Démarre une session sur un nouveau thread
    ///
    /// Bloque le thread appelant jusqu'à ce que le périphérique soit ouvert
    /// (depuis un runtime async, passer par `spawn_blocking`). L'erreur de
    /// démarrage de la session est retournée telle quelle, pour distinguer
    /// [`CaptureError::PermissionDenied`].
    pub fn spawn<P, F>(
        make_platform: F,
        config: WorkerConfig,
    ) -> Result<(Self, mpsc::Receiver<Vec<i16>>), WorkerError>
    where
        P: AudioPlatform + 'static,
        F: FnOnce() -> P + Send + 'static,
    {
        if config.chunk_samples == 0 {
            return Err(WorkerError::Config("chunk_samples doit être positif".to_string()));
        }
        if config.channel_capacity == 0 {
            return Err(WorkerError::Config("channel_capacity doit être positif".to_string()));
        }

        let (chunk_tx, chunk_rx) = mpsc::channel(config.channel_capacity);
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<(), CaptureError>>(1);

        let running = Arc::new(AtomicBool::new(true));
        let running_flag = Arc::clone(&running);
        let dropped = Arc::new(AtomicU64::new(0));
        let dropped_count = Arc::clone(&dropped);
        let chunk_samples = config.chunk_samples;

        let thread_handle = thread::Builder::new()
            .name("micshim-capture".to_string())
            .spawn(move || {
                let mut session = CaptureSession::new(make_platform());
                let started = session.start();
                let is_started = started.is_ok();
                let _ = ready_tx.send(started);

                if is_started {
                    run_capture_loop(
                        &mut session,
                        chunk_samples,
                        &chunk_tx,
                        &running_flag,
                        &dropped_count,
                    );
                }

                running_flag.store(false, Ordering::Release);
                if let Err(e) = session.stop() {
                    tracing::warn!("Thread de capture: {}", e);
                }
            })?;

        let mut worker = Self {
            running,
            dropped,
            thread_handle: Some(thread_handle),
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {
                tracing::info!("Worker de capture démarré ({} échantillons par bloc)", chunk_samples);
                Ok((worker, chunk_rx))
            }
            Ok(Err(e)) => {
                worker.stop();
                Err(e.into())
            }
            Err(_) => {
                worker.stop();
                Err(WorkerError::ThreadExited)
            }
        }
    }

    /// Vrai jusqu'à `stop` ou la fin de la boucle de capture
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Nombre de blocs perdus parce que le canal était plein
    pub fn dropped_chunks(&self) -> u64 {
        self.dropped.load(Ordering::Acquire)
    }

    /// Signale l'arrêt au thread de capture et attend qu'il libère le stream
    ///
    /// Retourne après au plus une lecture en cours.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                tracing::error!("Le thread de capture a paniqué");
            }
            tracing::info!("Worker de capture arrêté");
        }
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Lit la session jusqu'à l'arrêt, la fermeture du récepteur ou une erreur
fn run_capture_loop<P: AudioPlatform>(
    session: &mut CaptureSession<P>,
    chunk_samples: usize,
    chunk_tx: &mpsc::Sender<Vec<i16>>,
    running: &AtomicBool,
    dropped: &AtomicU64,
) {
    while running.load(Ordering::Acquire) {
        let chunk = match session.read_audio(chunk_samples) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::error!("Boucle de capture arrêtée: {}", e);
                break;
            }
        };

        if chunk.is_empty() {
            continue;
        }

        // Jamais de send bloquant : `stop` doit pouvoir terminer la boucle
        // même si le récepteur ne lit plus
        match chunk_tx.try_send(chunk) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(chunk)) => {
                let total = dropped.fetch_add(1, Ordering::AcqRel) + 1;
                tracing::warn!(
                    "Canal plein, {} échantillons perdus ({} blocs au total)",
                    chunk.len(),
                    total
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("Récepteur des blocs fermé");
                break;
            }
        }
    }
}
