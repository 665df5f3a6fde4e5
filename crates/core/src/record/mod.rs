use std::{
    path::PathBuf,
    sync::{Mutex, MutexGuard},
};

use hound::{SampleFormat, WavSpec, WavWriter};
use serde::{Deserialize, Serialize};

use crate::{
    synth::{resample, BASE_SAMPLE_RATE},
    AudioBuffer, AudioSink, MeditationError, Result,
};

/// Configuration options for capturing session audio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSettings {
    pub output_path: PathBuf,
    pub sample_rate: u32,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("session.wav"),
            sample_rate: BASE_SAMPLE_RATE,
        }
    }
}

/// Audio sink that appends every pushed buffer to a single track and writes
/// it out as a 16-bit mono WAV file.
#[derive(Debug)]
pub struct Recorder {
    settings: RecordingSettings,
    track: Mutex<Vec<f32>>,
}

impl Recorder {
    pub fn new(settings: RecordingSettings) -> Self {
        Self {
            settings,
            track: Mutex::new(Vec::new()),
        }
    }

    pub fn settings(&self) -> &RecordingSettings {
        &self.settings
    }

    /// Number of samples captured so far.
    pub fn captured(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    /// Writes the captured track and returns the number of samples written.
    pub fn finish(&self) -> Result<usize> {
        let track = self.lock()?;
        write_wav(&self.settings, &track)?;
        tracing::info!(
            path = %self.settings.output_path.display(),
            samples = track.len(),
            "session audio written"
        );
        Ok(track.len())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<f32>>> {
        self.track
            .lock()
            .map_err(|_| MeditationError::msg("recorder track has been poisoned"))
    }
}

impl AudioSink for Recorder {
    fn output_sample_rate(&self) -> Result<u32> {
        Ok(self.settings.sample_rate)
    }

    fn start_playing(&self) -> Result<()> {
        Ok(())
    }

    fn push_samples(&self, buffer: &AudioBuffer) -> Result<()> {
        let mut track = self.lock()?;
        if buffer.sample_rate == self.settings.sample_rate {
            track.extend_from_slice(&buffer.samples);
        } else {
            let target = (buffer.duration_seconds() * f64::from(self.settings.sample_rate))
                .round() as usize;
            track.extend(resample(&buffer.samples, target));
        }
        Ok(())
    }
}

/// Writes mono samples as a 16-bit PCM WAV file.
pub fn write_wav(settings: &RecordingSettings, samples: &[f32]) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: settings.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(&settings.output_path, spec)?;
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        writer.write_sample(value)?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::load_mono_wav;
    use approx::assert_abs_diff_eq;

    #[test]
    fn captures_and_writes_track() {
        let dir = tempfile::tempdir().unwrap();
        let settings = RecordingSettings {
            output_path: dir.path().join("capture.wav"),
            sample_rate: 8_000,
        };
        let recorder = Recorder::new(settings.clone());

        recorder.start_playing().unwrap();
        recorder
            .push_samples(&AudioBuffer::new(vec![0.5; 800], 8_000))
            .unwrap();
        recorder
            .push_samples(&AudioBuffer::new(vec![-0.5; 1_600], 16_000))
            .unwrap();
        assert_eq!(recorder.captured().unwrap(), 1_600);

        assert_eq!(recorder.finish().unwrap(), 1_600);
        let samples = load_mono_wav(&settings.output_path).unwrap();
        assert_eq!(samples.len(), 1_600);
        assert_abs_diff_eq!(samples[0], 0.5, epsilon = 1e-3);
        assert_abs_diff_eq!(samples[1_599], -0.5, epsilon = 1e-3);
    }
}
