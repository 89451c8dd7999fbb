//! Audio delivery into the analyzer
//!
//! Live input comes from a cpal capture stream; `--wav` plays a file in real
//! time from a background thread instead. Either way each chunk is
//! downmixed to mono and handed straight to the analyzer on the delivering
//! thread.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SampleRate, SizedSample, StreamConfig};
use log::{error, info, warn};
use thiserror::Error;

use super::WakeSignal;
use super::analyzer::SpectralAnalyzer;
use crate::app::Shutdown;
use crate::error::WavError;

/// Capture rate the loudness curve and default resolution are tuned for
const PREFERRED_SAMPLE_RATE: u32 = 44100;

/// File playback delivers this many chunks per second
const PLAYBACK_CHUNKS_PER_SECOND: u32 = 100;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No default input device")]
    NoDefaultDevice,
    #[error("No input device named {0:?}")]
    DeviceNotFound(String),
    #[error("Failed to enumerate input devices: {0}")]
    Devices(#[from] cpal::DevicesError),
    #[error("Failed to query input configuration: {0}")]
    Config(String),
    #[error("Unsupported sample format {0:?}")]
    UnsupportedFormat(SampleFormat),
    #[error("Failed to build input stream: {0}")]
    Build(#[from] cpal::BuildStreamError),
    #[error("Failed to start input stream: {0}")]
    Play(#[from] cpal::PlayStreamError),
    #[error("Failed to read {path}: {source}")]
    Wav {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
    #[error("{0} contains no samples")]
    EmptyWav(PathBuf),
    #[error("Failed to spawn playback thread: {0}")]
    Thread(#[from] std::io::Error),
}

#[derive(Debug)]
pub struct InputDeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub sample_rates: Vec<u32>,
}

pub fn list_devices() -> Result<Vec<InputDeviceInfo>, CaptureError> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let mut infos = Vec::new();
    for device in host.input_devices()? {
        let name = device.name().unwrap_or_else(|_| "Unknown Device".to_string());
        let mut sample_rates: Vec<u32> = device
            .supported_input_configs()
            .map(|configs| {
                configs
                    .flat_map(|c| [c.min_sample_rate().0, c.max_sample_rate().0])
                    .collect()
            })
            .unwrap_or_default();
        sample_rates.sort_unstable();
        sample_rates.dedup();

        infos.push(InputDeviceInfo {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
            sample_rates,
        });
    }
    Ok(infos)
}

/// Where samples come from, opened but not yet started
pub enum AudioSource {
    Device {
        device: Device,
        config: StreamConfig,
        format: SampleFormat,
    },
    File {
        samples: Vec<f32>,
        sample_rate: u32,
    },
}

impl AudioSource {
    /// Open the WAV file if given, otherwise the named or default input
    pub fn open(device: Option<&str>, wav: Option<&Path>) -> Result<Self, CaptureError> {
        if let Some(path) = wav {
            let (samples, sample_rate) = decode_wav(path)?;
            info!(
                "Playing {} ({} samples at {sample_rate} Hz)",
                path.display(),
                samples.len()
            );
            return Ok(Self::File {
                samples,
                sample_rate,
            });
        }

        let host = cpal::default_host();
        let device = match device {
            Some(name) => host
                .input_devices()?
                .find(|d| d.name().is_ok_and(|n| n == name))
                .ok_or_else(|| CaptureError::DeviceNotFound(name.to_string()))?,
            None => host
                .default_input_device()
                .ok_or(CaptureError::NoDefaultDevice)?,
        };
        let supported = pick_config(&device)?;
        let format = supported.sample_format();
        let config: StreamConfig = supported.into();

        info!(
            "Capturing from {} ({} Hz, {} channel(s), {format:?})",
            device.name().unwrap_or_else(|_| "Unknown Device".to_string()),
            config.sample_rate.0,
            config.channels
        );
        Ok(Self::Device {
            device,
            config,
            format,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        match self {
            Self::Device { config, .. } => config.sample_rate.0,
            Self::File { sample_rate, .. } => *sample_rate,
        }
    }

    /// Start delivering into `analyzer`; samples flow until the returned
    /// handle is dropped
    pub fn start<W>(
        self,
        analyzer: SpectralAnalyzer,
        wake: W,
        shutdown: Shutdown,
    ) -> Result<Capture, CaptureError>
    where
        W: WakeSignal + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        match self {
            Self::Device {
                device,
                config,
                format,
            } => {
                let stream = match format {
                    SampleFormat::F32 => {
                        build_stream::<f32, W>(&device, &config, analyzer, wake, shutdown)?
                    }
                    SampleFormat::I16 => {
                        build_stream::<i16, W>(&device, &config, analyzer, wake, shutdown)?
                    }
                    SampleFormat::U16 => {
                        build_stream::<u16, W>(&device, &config, analyzer, wake, shutdown)?
                    }
                    other => return Err(CaptureError::UnsupportedFormat(other)),
                };
                stream.play()?;
                Ok(Capture {
                    stream: Some(stream),
                    playback: None,
                    stop,
                })
            }
            Self::File {
                samples,
                sample_rate,
            } => {
                let playback = spawn_playback(
                    samples,
                    sample_rate,
                    analyzer,
                    wake,
                    shutdown,
                    Arc::clone(&stop),
                )?;
                Ok(Capture {
                    stream: None,
                    playback: Some(playback),
                    stop,
                })
            }
        }
    }
}

/// Running capture; dropping it stops delivery
pub struct Capture {
    stream: Option<cpal::Stream>,
    playback: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl Drop for Capture {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.stream.take();
        if let Some(handle) = self.playback.take() {
            if handle.join().is_err() {
                warn!("Playback thread panicked");
            }
        }
    }
}

/// Prefer a 44.1 kHz configuration in a format we can convert, otherwise
/// take the device default.
fn pick_config(device: &Device) -> Result<cpal::SupportedStreamConfig, CaptureError> {
    let preferred = SampleRate(PREFERRED_SAMPLE_RATE);
    let ranges = device
        .supported_input_configs()
        .map_err(|e| CaptureError::Config(e.to_string()))?;

    let matching = ranges
        .filter(|range| range.min_sample_rate() <= preferred && preferred <= range.max_sample_rate())
        .filter_map(|range| format_rank(range.sample_format()).map(|rank| (rank, range)))
        .min_by_key(|(rank, _)| *rank);

    match matching {
        Some((_, range)) => Ok(range.with_sample_rate(preferred)),
        None => {
            warn!("No {PREFERRED_SAMPLE_RATE} Hz input configuration; using the device default");
            device
                .default_input_config()
                .map_err(|e| CaptureError::Config(e.to_string()))
        }
    }
}

fn format_rank(format: SampleFormat) -> Option<u8> {
    match format {
        SampleFormat::F32 => Some(0),
        SampleFormat::I16 => Some(1),
        SampleFormat::U16 => Some(2),
        _ => None,
    }
}

fn build_stream<T, W>(
    device: &Device,
    config: &StreamConfig,
    mut analyzer: SpectralAnalyzer,
    wake: W,
    shutdown: Shutdown,
) -> Result<cpal::Stream, CaptureError>
where
    T: SizedSample + Send + 'static,
    f32: FromSample<T>,
    W: WakeSignal + 'static,
{
    let channels = usize::from(config.channels.max(1));
    let mut mono = Vec::new();

    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            downmix(data, channels, &mut mono);
            deliver(&mut analyzer, &mono, &wake, &shutdown);
        },
        |err| {
            warn!("Audio stream error: {err}");
        },
        None,
    )?;

    Ok(stream)
}

fn deliver(
    analyzer: &mut SpectralAnalyzer,
    samples: &[f32],
    wake: &dyn WakeSignal,
    shutdown: &Shutdown,
) -> bool {
    match analyzer.process(samples, wake) {
        Ok(()) => true,
        Err(err) => {
            if err.is_fatal() {
                shutdown.fail(format!("Audio analysis failed: {err}"));
                return false;
            }
            error!("Audio analysis failed: {err}");
            true
        }
    }
}

/// Average interleaved frames into `out`, replacing its contents
fn downmix<T>(data: &[T], channels: usize, out: &mut Vec<f32>)
where
    T: Sample,
    f32: FromSample<T>,
{
    out.clear();
    out.extend(data.chunks(channels).map(|frame| {
        frame.iter().map(|&s| f32::from_sample(s)).sum::<f32>() / frame.len() as f32
    }));
}

fn decode_wav(path: &Path) -> Result<(Vec<f32>, u32), CaptureError> {
    let wav_error = |source| CaptureError::Wav {
        path: path.to_path_buf(),
        source,
    };

    let reader = hound::WavReader::open(path).map_err(wav_error)?;
    let spec = reader.spec();
    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(wav_error)?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()
                .map_err(wav_error)?
        }
    };

    let mut mono = Vec::new();
    downmix(&interleaved, usize::from(spec.channels.max(1)), &mut mono);
    if mono.is_empty() {
        return Err(CaptureError::EmptyWav(path.to_path_buf()));
    }
    Ok((mono, spec.sample_rate))
}

/// Feed `samples` in real-time paced chunks, looping until stopped
fn spawn_playback<W>(
    samples: Vec<f32>,
    sample_rate: u32,
    mut analyzer: SpectralAnalyzer,
    wake: W,
    shutdown: Shutdown,
    stop: Arc<AtomicBool>,
) -> Result<JoinHandle<()>, CaptureError>
where
    W: WakeSignal + 'static,
{
    let chunk = (sample_rate / PLAYBACK_CHUNKS_PER_SECOND).max(1) as usize;
    let period = Duration::from_secs_f64(chunk as f64 / f64::from(sample_rate.max(1)));

    let handle = thread::Builder::new()
        .name("wav-playback".into())
        .spawn(move || {
            let mut next = Instant::now();
            for block in samples.chunks(chunk).cycle() {
                if stop.load(Ordering::Acquire) || shutdown.is_requested() {
                    break;
                }
                if !deliver(&mut analyzer, block, &wake, &shutdown) {
                    break;
                }
                next += period;
                if let Some(wait) = next.checked_duration_since(Instant::now()) {
                    thread::sleep(wait);
                }
            }
        })?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};
    use tempfile::TempDir;

    #[test]
    fn test_downmix_averages_frames() {
        let mut out = vec![9.0];
        downmix(&[0.5f32, -0.5, 1.0, 0.0], 2, &mut out);
        assert_eq!(out, vec![0.0, 0.5]);
    }

    #[test]
    fn test_downmix_converts_integer_samples() {
        let mut out = Vec::new();
        downmix(&[16384i16, 16384, -16384, -16384], 2, &mut out);
        assert_eq!(out, vec![0.5, -0.5]);
    }

    #[test]
    fn test_downmix_mono_is_passthrough() {
        let mut out = Vec::new();
        downmix(&[0.25f32, -0.75], 1, &mut out);
        assert_eq!(out, vec![0.25, -0.75]);
    }

    #[test]
    fn test_decode_stereo_wav() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for sample in [16384i16, 0, -16384, -16384] {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();

        let (samples, sample_rate) = decode_wav(&path).unwrap();
        assert_eq!(sample_rate, 22050);
        assert_eq!(samples, vec![0.25, -0.5]);
    }

    #[test]
    fn test_decode_empty_wav_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        WavWriter::create(&path, spec).unwrap().finalize().unwrap();

        assert!(matches!(decode_wav(&path), Err(CaptureError::EmptyWav(_))));
    }

    #[test]
    fn test_decode_missing_wav_fails() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            decode_wav(&dir.path().join("missing.wav")),
            Err(CaptureError::Wav { .. })
        ));
    }

    #[test]
    fn test_format_rank_prefers_float() {
        assert!(format_rank(SampleFormat::F32) < format_rank(SampleFormat::I16));
        assert!(format_rank(SampleFormat::I16) < format_rank(SampleFormat::U16));
        assert_eq!(format_rank(SampleFormat::I8), None);
    }
}
