//! micshim - capture le microphone pendant quelques secondes
//!
//! Usage : `micshim [secondes] [périphérique]`

use anyhow::{Context, Result};
use micshim::{CaptureFormat, CaptureWorker, CpalPlatform, WorkerConfig};
use tokio::time::{sleep, Duration};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_SECONDS: u64 = 3;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "micshim=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("micshim v{}", env!("CARGO_PKG_VERSION"));

    let mut args = std::env::args().skip(1);
    let seconds = match args.next() {
        Some(arg) => arg
            .parse::<u64>()
            .with_context(|| format!("Durée invalide: {}", arg))?,
        None => DEFAULT_SECONDS,
    };
    let device = args.next();

    let devices = CpalPlatform::list_devices();
    tracing::info!("Périphériques d'entrée: {:?}", devices);

    let make_platform = move || match device {
        Some(name) => CpalPlatform::with_device(name),
        None => CpalPlatform::new(),
    };

    // `spawn` bloque jusqu'à l'ouverture du périphérique
    let (mut worker, mut chunks) = tokio::task::spawn_blocking(move || {
        CaptureWorker::spawn(make_platform, WorkerConfig::default())
    })
    .await?
    .context("Impossible de démarrer la capture")?;

    let deadline = sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);

    let mut total = 0usize;
    let mut peak = 0i16;
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            chunk = chunks.recv() => match chunk {
                Some(chunk) => {
                    total += chunk.len();
                    peak = chunk.iter().fold(peak, |p, s| p.max(s.saturating_abs()));
                }
                None => {
                    tracing::warn!("Capture terminée prématurément");
                    break;
                }
            },
        }
    }

    let dropped = worker.dropped_chunks();
    tokio::task::spawn_blocking(move || worker.stop()).await?;

    println!(
        "{} échantillons capturés ({:.2}s à {}Hz), crête {}, {} blocs perdus",
        total,
        total as f64 / CaptureFormat::SAMPLE_RATE as f64,
        CaptureFormat::SAMPLE_RATE,
        peak,
        dropped
    );
    Ok(())
}
