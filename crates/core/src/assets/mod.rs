use std::{
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use hound::{SampleFormat, WavReader};

use crate::Result;

/// Environment variable that points at the sleep sound used for breath samples.
pub const SLEEP_SOUND_ENV: &str = "MEDITATION_SLEEP_SOUND";
pub const DEFAULT_SLEEP_SOUND: &str = "assets/go_sleep.wav";

static SLEEP_SOUND: OnceLock<Arc<SampleAsset>> = OnceLock::new();

/// Lazily loaded mono sample buffer.
///
/// The file is read at most once. A failed load is remembered as absent so
/// later lookups never touch the filesystem again.
#[derive(Debug)]
pub struct SampleAsset {
    path: PathBuf,
    samples: OnceLock<Option<Vec<f32>>>,
}

impl SampleAsset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            samples: OnceLock::new(),
        }
    }

    /// An asset that is already known to be missing.
    pub fn absent() -> Self {
        let asset = Self::new(PathBuf::new());
        let _ = asset.samples.set(None);
        asset
    }

    /// An asset backed by samples that are already in memory.
    pub fn from_samples(samples: Vec<f32>) -> Self {
        let asset = Self::new(PathBuf::new());
        let _ = asset.samples.set(Some(samples));
        asset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.samples.get().is_some()
    }

    /// Returns the decoded samples, loading them on first use.
    pub fn samples(&self) -> Option<&[f32]> {
        self.samples
            .get_or_init(|| match load_mono_wav(&self.path) {
                Ok(samples) => {
                    tracing::info!(
                        path = %self.path.display(),
                        samples = samples.len(),
                        "loaded breath sample"
                    );
                    Some(samples)
                }
                Err(err) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %err,
                        "breath sample unavailable, using synthesized fallback"
                    );
                    None
                }
            })
            .as_deref()
    }
}

/// Installs the process-wide sleep sound location. Returns `false` if the
/// asset was already configured or used.
pub fn install_sleep_sound(path: impl Into<PathBuf>) -> bool {
    SLEEP_SOUND.set(Arc::new(SampleAsset::new(path))).is_ok()
}

/// Process-wide sleep sound, resolved from [`SLEEP_SOUND_ENV`] or the default
/// location when nothing was installed.
pub fn sleep_sound() -> Arc<SampleAsset> {
    SLEEP_SOUND
        .get_or_init(|| {
            let path = std::env::var_os(SLEEP_SOUND_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SLEEP_SOUND));
            Arc::new(SampleAsset::new(path))
        })
        .clone()
}

/// Decodes a PCM WAV file into mono `f32` samples in `[-1, 1]`.
pub fn load_mono_wav(path: &Path) -> Result<Vec<f32>> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = int_full_scale(spec.bits_per_sample);
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    Ok(downmix(&interleaved, channels))
}

/// Largest positive value representable by a signed integer sample.
fn int_full_scale(bits: u16) -> f32 {
    let bits = bits.clamp(2, 32);
    ((1_u64 << (bits - 1)) - 1) as f32
}

fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.iter().map(|s| s.clamp(-1.0, 1.0)).collect();
    }

    interleaved
        .chunks_exact(channels)
        .map(|frame| (frame.iter().sum::<f32>() / channels as f32).clamp(-1.0, 1.0))
        .collect()
}
