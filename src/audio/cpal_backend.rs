//! Capture microphone via cpal
//!
//! Utilise cpal pour la capture cross-platform et ringbuf pour le buffering
//! entre le callback audio et `read`. Le stream est ouvert directement au
//! format de capture (16kHz mono i16) : ni rééchantillonnage ni négociation
//! de format. Un périphérique incapable de le fournir échoue à l'ouverture.

use super::platform::{AudioPlatform, CaptureFormat, NativeStream, PlatformError, StreamState};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BuildStreamError, Device, SampleFormat, SampleRate, Stream, StreamConfig,
    SupportedBufferSize, SupportedStreamConfigRange,
};
use ringbuf::{traits::*, HeapCons, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Attente maximale de `read` pour le premier échantillon
pub(crate) const READ_TIMEOUT: Duration = Duration::from_millis(100);

const READ_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Plateforme audio sur l'hôte cpal par défaut
#[derive(Debug, Clone, Default)]
pub struct CpalPlatform {
    device_name: Option<String>,
}

impl CpalPlatform {
    /// Utilise le périphérique d'entrée par défaut de l'hôte
    pub fn new() -> Self {
        Self::default()
    }

    /// Utilise le périphérique correspondant à `name` : exact, puis sans
    /// casse, puis sous-chaîne
    pub fn with_device(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
        }
    }

    /// Liste les périphériques d'entrée disponibles
    pub fn list_devices() -> Vec<String> {
        let host = cpal::default_host();
        host.input_devices()
            .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
            .unwrap_or_default()
    }

    fn device(&self) -> Result<Device, PlatformError> {
        let host = cpal::default_host();

        let Some(wanted) = &self.device_name else {
            return host.default_input_device().ok_or(PlatformError::NoDevice);
        };

        let devices: Vec<Device> = host
            .input_devices()
            .map_err(|e| PlatformError::Device(e.to_string()))?
            .collect();
        let names: Vec<String> = devices
            .iter()
            .map(|d| d.name().unwrap_or_default())
            .collect();

        let index = match_device(&names, wanted).ok_or_else(|| {
            tracing::error!("Périphérique audio '{}' introuvable, disponibles: {:?}", wanted, names);
            PlatformError::NoDevice
        })?;

        tracing::debug!("Périphérique audio utilisé: {}", names[index]);
        devices.into_iter().nth(index).ok_or(PlatformError::NoDevice)
    }
}

impl AudioPlatform for CpalPlatform {
    fn min_buffer_size(&self) -> Result<usize, PlatformError> {
        let device = self.device()?;
        let ranges: Vec<SupportedStreamConfigRange> = device
            .supported_input_configs()
            .map_err(|e| PlatformError::Unsupported(e.to_string()))?
            .collect();
        min_buffer_bytes(&ranges)
    }

    fn open_input(&self, buffer_size: usize) -> Result<Box<dyn NativeStream>, PlatformError> {
        let device = self.device()?;
        tracing::info!("Périphérique audio: {:?}", device.name());

        let stream_config = StreamConfig {
            channels: CaptureFormat::CHANNELS,
            sample_rate: SampleRate(CaptureFormat::SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };

        let rb = HeapRb::<i16>::new(ring_capacity(buffer_size));
        let (mut producer, consumer) = rb.split();

        let failed = Arc::new(AtomicBool::new(false));
        let failed_flag = Arc::clone(&failed);

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    // En cas de débordement, les échantillons les plus récents sont perdus
                    let _ = producer.push_slice(data);
                },
                move |err| {
                    tracing::error!("Erreur stream audio: {}", err);
                    failed_flag.store(true, Ordering::Release);
                },
                None,
            )
            .map_err(build_error)?;

        Ok(Box::new(CpalStream {
            stream: Some(stream),
            consumer,
            failed,
            running: false,
        }))
    }
}

/// Stream d'entrée cpal ouvert et côté consommateur de son ring buffer
pub struct CpalStream {
    stream: Option<Stream>,
    consumer: HeapCons<i16>,
    failed: Arc<AtomicBool>,
    running: bool,
}

impl NativeStream for CpalStream {
    fn state(&self) -> StreamState {
        if self.stream.is_some() {
            StreamState::Initialized
        } else {
            StreamState::Uninitialized
        }
    }

    fn start(&mut self) -> Result<(), PlatformError> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| PlatformError::Device("stream libéré".to_string()))?;
        stream.play().map_err(|e| classify(e.to_string()))?;
        self.running = true;
        Ok(())
    }

    /// Attend un échantillon, l'arrêt du stream, une erreur du stream ou
    /// l'expiration de [`READ_TIMEOUT`], puis vide au plus `buf.len()`
    /// échantillons
    fn read(&mut self, buf: &mut [i16]) -> Result<usize, PlatformError> {
        let deadline = Instant::now() + READ_TIMEOUT;

        loop {
            if self.failed.load(Ordering::Acquire) {
                return Err(PlatformError::Device(
                    "le stream a signalé une erreur".to_string(),
                ));
            }
            if !self.consumer.is_empty() || !self.running || Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(READ_POLL_INTERVAL);
        }

        Ok(self.consumer.pop_slice(buf))
    }

    fn stop(&mut self) -> Result<(), PlatformError> {
        self.running = false;
        if let Some(ref stream) = self.stream {
            stream.pause().map_err(|e| classify(e.to_string()))?;
        }
        Ok(())
    }

    fn release(&mut self) {
        self.running = false;
        self.stream = None;
    }
}

/// Cherche `wanted` dans `names` : exact, puis sans casse, puis sous-chaîne
fn match_device(names: &[String], wanted: &str) -> Option<usize> {
    let lower = wanted.to_lowercase();
    names
        .iter()
        .position(|n| n == wanted)
        .or_else(|| names.iter().position(|n| n.to_lowercase() == lower))
        .or_else(|| names.iter().position(|n| n.to_lowercase().contains(&lower)))
}

/// Plus petit buffer, en octets, parmi les configs d'entrée capables de
/// fournir le format de capture
fn min_buffer_bytes(ranges: &[SupportedStreamConfigRange]) -> Result<usize, PlatformError> {
    let rate = CaptureFormat::SAMPLE_RATE;

    ranges
        .iter()
        .filter(|r| {
            r.channels() == CaptureFormat::CHANNELS
                && r.sample_format() == SampleFormat::I16
                && r.min_sample_rate().0 <= rate
                && rate <= r.max_sample_rate().0
        })
        .filter_map(|r| match r.buffer_size() {
            SupportedBufferSize::Range { min, .. } => Some(*min as usize),
            SupportedBufferSize::Unknown => None,
        })
        .min()
        .map(|frames| frames * CaptureFormat::CHANNELS as usize * CaptureFormat::BYTES_PER_SAMPLE)
        .ok_or_else(|| {
            PlatformError::Unsupported("aucun buffer minimum pour 16kHz mono i16".to_string())
        })
}

/// Capacité du ring buffer en échantillons : la taille du buffer, au moins une seconde
fn ring_capacity(buffer_size: usize) -> usize {
    (buffer_size / CaptureFormat::BYTES_PER_SAMPLE).max(CaptureFormat::SAMPLE_RATE as usize)
}

fn build_error(err: BuildStreamError) -> PlatformError {
    match err {
        BuildStreamError::DeviceNotAvailable => PlatformError::NoDevice,
        BuildStreamError::StreamConfigNotSupported => PlatformError::Unsupported(err.to_string()),
        other => classify(other.to_string()),
    }
}

/// cpal n'a pas d'erreur de permission ; les backends la signalent dans le message
fn classify(message: String) -> PlatformError {
    if is_permission_error(&message) {
        PlatformError::PermissionDenied
    } else {
        PlatformError::Device(message)
    }
}

fn is_permission_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("permission") || lower.contains("denied")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(
        channels: u16,
        min_rate: u32,
        max_rate: u32,
        buffer_size: SupportedBufferSize,
        format: SampleFormat,
    ) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            SampleRate(min_rate),
            SampleRate(max_rate),
            buffer_size,
            format,
        )
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_match_device_exact() {
        let devices = names(&["default", "USB Mic", "usb mic"]);
        assert_eq!(match_device(&devices, "usb mic"), Some(2));
    }

    #[test]
    fn test_match_device_case_insensitive() {
        let devices = names(&["default", "USB Mic"]);
        assert_eq!(match_device(&devices, "usb mic"), Some(1));
    }

    #[test]
    fn test_match_device_substring() {
        let devices = names(&["default", "alsa_input.pci-0000_00_1f.3.analog-stereo"]);
        assert_eq!(match_device(&devices, "Analog-Stereo"), Some(1));
    }

    #[test]
    fn test_match_device_missing() {
        let devices = names(&["default"]);
        assert_eq!(match_device(&devices, "webcam"), None);
    }

    #[test]
    fn test_min_buffer_picks_smallest_matching() {
        let ranges = vec![
            range(1, 8000, 48000, SupportedBufferSize::Range { min: 256, max: 4096 }, SampleFormat::I16),
            range(1, 8000, 48000, SupportedBufferSize::Range { min: 64, max: 4096 }, SampleFormat::F32),
            range(2, 8000, 48000, SupportedBufferSize::Range { min: 32, max: 4096 }, SampleFormat::I16),
            range(1, 16000, 16000, SupportedBufferSize::Range { min: 1024, max: 4096 }, SampleFormat::I16),
        ];
        assert_eq!(min_buffer_bytes(&ranges), Ok(512));
    }

    #[test]
    fn test_min_buffer_rate_out_of_range() {
        let ranges = vec![range(
            1,
            44100,
            48000,
            SupportedBufferSize::Range { min: 256, max: 4096 },
            SampleFormat::I16,
        )];
        assert!(matches!(min_buffer_bytes(&ranges), Err(PlatformError::Unsupported(_))));
    }

    #[test]
    fn test_min_buffer_unknown_size() {
        let ranges = vec![range(1, 8000, 48000, SupportedBufferSize::Unknown, SampleFormat::I16)];
        assert!(min_buffer_bytes(&ranges).is_err());
    }

    #[test]
    fn test_min_buffer_no_configs() {
        assert!(min_buffer_bytes(&[]).is_err());
    }

    #[test]
    fn test_ring_capacity_at_least_one_second() {
        assert_eq!(ring_capacity(3840), 16000);
        assert_eq!(ring_capacity(64000), 32000);
    }

    #[test]
    fn test_permission_errors_are_classified() {
        assert_eq!(
            classify("Access denied by the system".to_string()),
            PlatformError::PermissionDenied
        );
        assert_eq!(
            classify("Microphone Permission not granted".to_string()),
            PlatformError::PermissionDenied
        );
        assert_eq!(
            classify("device busy".to_string()),
            PlatformError::Device("device busy".to_string())
        );
    }

    #[test]
    fn test_build_error_mapping() {
        assert_eq!(build_error(BuildStreamError::DeviceNotAvailable), PlatformError::NoDevice);
        assert!(matches!(
            build_error(BuildStreamError::StreamConfigNotSupported),
            PlatformError::Unsupported(_)
        ));
    }
}
