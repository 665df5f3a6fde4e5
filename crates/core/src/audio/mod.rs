use std::sync::{Arc, Mutex, MutexGuard};

use crate::{synth::BASE_SAMPLE_RATE, AudioBuffer, MeditationError, Result};

/// Streaming audio output, e.g. the robot's speaker.
///
/// Implementations own their playback; `push_samples` must not wait for the
/// buffer to finish playing.
pub trait AudioSink: Send + Sync {
    /// Rate the sink plays at. Generated buffers are resampled to match.
    fn output_sample_rate(&self) -> Result<u32>;

    /// Makes sure the output stream is running. Safe to call repeatedly.
    fn start_playing(&self) -> Result<()>;

    fn push_samples(&self, buffer: &AudioBuffer) -> Result<()>;
}

/// In-memory sink that keeps every pushed buffer.
#[derive(Clone)]
pub struct MemorySink {
    sample_rate: u32,
    shared: Arc<Mutex<MemorySinkState>>,
}

#[derive(Debug, Default)]
struct MemorySinkState {
    started: bool,
    buffers: Vec<AudioBuffer>,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new(BASE_SAMPLE_RATE)
    }
}

impl MemorySink {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            shared: Arc::new(Mutex::new(MemorySinkState::default())),
        }
    }

    pub fn is_playing(&self) -> Result<bool> {
        Ok(self.lock()?.started)
    }

    /// Returns a copy of every buffer pushed so far.
    pub fn buffers(&self) -> Result<Vec<AudioBuffer>> {
        Ok(self.lock()?.buffers.clone())
    }

    pub fn buffer_count(&self) -> Result<usize> {
        Ok(self.lock()?.buffers.len())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemorySinkState>> {
        self.shared
            .lock()
            .map_err(|_| MeditationError::msg("memory sink has been poisoned"))
    }
}

impl AudioSink for MemorySink {
    fn output_sample_rate(&self) -> Result<u32> {
        Ok(self.sample_rate)
    }

    fn start_playing(&self) -> Result<()> {
        self.lock()?.started = true;
        Ok(())
    }

    fn push_samples(&self, buffer: &AudioBuffer) -> Result<()> {
        if buffer.is_empty() {
            return Ok(());
        }

        let mut state = self.lock()?;
        if !state.started {
            return Err(MeditationError::msg("memory sink is not playing"));
        }
        state.buffers.push(buffer.clone());
        Ok(())
    }
}

impl std::fmt::Debug for MemorySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySink")
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}
