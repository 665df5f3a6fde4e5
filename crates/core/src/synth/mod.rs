use std::{
    f64::consts::{PI, TAU},
    sync::Arc,
};

use rand::Rng;

use crate::{assets, MeditationError, Phase, Result, SampleAsset, SoundType};

/// Internal synthesis rate; the sampled asset is assumed to use it as well.
pub const BASE_SAMPLE_RATE: u32 = 44_100;

const AMBIENT_FUNDAMENTAL_HZ: f64 = 220.0;
const AMBIENT_PARTIALS: [(f64, f32); 4] = [(1.0, 0.5), (2.0, 0.3), (3.0, 0.15), (4.0, 0.08)];
const AMBIENT_FADE_SECONDS: f32 = 0.3;

const OCEAN_WAVE_HZ: f64 = 0.2;
const NOISE_FADE_SECONDS: f32 = 0.25;
const BREATH_MOD_HZ: f64 = 0.15;

const EXHALE_FADE_SECONDS: f32 = 0.3;
const EXHALE_TAIL_GAIN: f32 = 0.3;
const INHALE_FADE_SECONDS: f32 = 0.2;

/// Block of mono samples in `[-1, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0_f32, |peak, s| peak.max(s.abs()))
    }
}

/// Parameters for a single breath sound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoundRequest {
    pub duration_seconds: f32,
    pub intensity: f32,
    pub sound_type: SoundType,
    /// When set, the sampled breath routine wins over `sound_type`.
    pub phase: Option<Phase>,
    /// Output rate; `None` keeps [`BASE_SAMPLE_RATE`].
    pub sample_rate: Option<u32>,
}

impl SoundRequest {
    pub fn new(duration_seconds: f32, intensity: f32) -> Self {
        Self {
            duration_seconds,
            intensity,
            sound_type: SoundType::default(),
            phase: None,
            sample_rate: None,
        }
    }

    pub fn with_sound_type(mut self, sound_type: SoundType) -> Self {
        self.sound_type = sound_type;
        self
    }

    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }
}

/// Breath sound generator backed by the sampled sleep sound.
#[derive(Debug, Clone)]
pub struct BreathSynth {
    asset: Arc<SampleAsset>,
}

impl Default for BreathSynth {
    fn default() -> Self {
        Self::new(assets::sleep_sound())
    }
}

impl BreathSynth {
    pub fn new(asset: Arc<SampleAsset>) -> Self {
        Self { asset }
    }

    /// Generates the requested sound using the thread-local RNG.
    pub fn generate(&self, request: &SoundRequest) -> AudioBuffer {
        self.generate_with(request, &mut rand::rng())
    }

    /// Generates the requested sound. Never fails: any synthesis error
    /// degrades to [`white_noise_breath`].
    pub fn generate_with<R: Rng + ?Sized>(&self, request: &SoundRequest, rng: &mut R) -> AudioBuffer {
        let duration = request.duration_seconds;
        let samples = match self.synthesize(request, rng) {
            Ok(samples) => samples,
            Err(err) => {
                tracing::error!(
                    sound_type = %request.sound_type,
                    error = %err,
                    "breath sound synthesis failed, using white noise"
                );
                white_noise_breath(duration, request.intensity, rng)
            }
        };

        match request.sample_rate {
            Some(rate) if rate != BASE_SAMPLE_RATE => {
                let resampled = resample(&samples, sample_count(duration, rate));
                AudioBuffer::new(resampled, rate)
            }
            _ => AudioBuffer::new(samples, BASE_SAMPLE_RATE),
        }
    }

    fn synthesize<R: Rng + ?Sized>(&self, request: &SoundRequest, rng: &mut R) -> Result<Vec<f32>> {
        let (duration, intensity) = (request.duration_seconds, request.intensity);
        match (request.phase, request.sound_type) {
            (Some(Phase::Exhale), _) => self.exhale_sound(duration, intensity, rng),
            (Some(Phase::Inhale), _) => self.inhale_sound(duration, intensity, rng),
            (None, SoundType::Ambient) => ambient_tone(duration, intensity),
            (None, SoundType::Ocean) => ocean_sound(duration, intensity, rng),
            (None, SoundType::WhiteNoise) => Ok(white_noise_breath(duration, intensity, rng)),
        }
    }

    /// Sleep sound stretched to `duration`, with a partial fade-out tail.
    /// Falls back to [`ocean_sound`] when the sample is unavailable.
    pub fn exhale_sound<R: Rng + ?Sized>(
        &self,
        duration: f32,
        intensity: f32,
        rng: &mut R,
    ) -> Result<Vec<f32>> {
        let Some(source) = self.asset.samples() else {
            return ocean_sound(duration, intensity, rng);
        };
        check_duration(duration)?;
        if source.is_empty() {
            return Err(MeditationError::InvalidInput("breath sample is empty"));
        }

        let mut samples = resample(source, sample_count(duration, BASE_SAMPLE_RATE));
        let fade = seconds_to_samples(EXHALE_FADE_SECONDS);
        let len = samples.len();
        if fade > 0 && fade < len {
            for (i, sample) in samples[len - fade..].iter_mut().enumerate() {
                *sample *= lerp(1.0, EXHALE_TAIL_GAIN, ramp_position(i, fade));
            }
        }

        scale(&mut samples, intensity);
        Ok(samples)
    }

    /// Time-reversed exhale with a soft onset. Without the sleep sample this is
    /// the plain ocean fallback.
    pub fn inhale_sound<R: Rng + ?Sized>(
        &self,
        duration: f32,
        intensity: f32,
        rng: &mut R,
    ) -> Result<Vec<f32>> {
        if self.asset.samples().is_none() {
            return ocean_sound(duration, intensity, rng);
        }

        let mut samples = self.exhale_sound(duration, intensity, rng)?;
        samples.reverse();

        let fade = seconds_to_samples(INHALE_FADE_SECONDS);
        if fade > 0 && fade < samples.len() {
            for (i, sample) in samples[..fade].iter_mut().enumerate() {
                *sample *= lerp(EXHALE_TAIL_GAIN, 1.0, ramp_position(i, fade));
            }
        }
        Ok(samples)
    }
}

/// Soft harmonic tone reminiscent of a singing bowl.
pub fn ambient_tone(duration: f32, intensity: f32) -> Result<Vec<f32>> {
    check_duration(duration)?;
    let n = sample_count(duration, BASE_SAMPLE_RATE);
    let rate = f64::from(BASE_SAMPLE_RATE);

    let mut signal: Vec<f32> = (0..n)
        .map(|i| {
            let t = i as f64 / rate;
            AMBIENT_PARTIALS
                .iter()
                .map(|&(ratio, amp)| {
                    amp * (TAU * AMBIENT_FUNDAMENTAL_HZ * ratio * t).sin() as f32
                })
                .sum::<f32>()
        })
        .collect();

    peak_normalize(&mut signal);
    apply_edge_fades(&mut signal, AMBIENT_FADE_SECONDS);
    scale(&mut signal, intensity);
    Ok(signal)
}

/// Noise swelling and receding like slow waves.
pub fn ocean_sound<R: Rng + ?Sized>(duration: f32, intensity: f32, rng: &mut R) -> Result<Vec<f32>> {
    check_duration(duration)?;
    let n = sample_count(duration, BASE_SAMPLE_RATE);
    let mut signal = modulated_noise(n, rng, |t| 0.5 + 0.5 * (TAU * OCEAN_WAVE_HZ * t).sin());

    peak_normalize(&mut signal);
    apply_edge_fades(&mut signal, NOISE_FADE_SECONDS);
    scale(&mut signal, intensity);
    Ok(signal)
}

/// Gently modulated noise. This is the last-resort sound and cannot fail.
pub fn white_noise_breath<R: Rng + ?Sized>(duration: f32, intensity: f32, rng: &mut R) -> Vec<f32> {
    let n = sample_count(duration, BASE_SAMPLE_RATE);
    let mut signal = modulated_noise(n, rng, |t| 0.6 + 0.4 * (TAU * BREATH_MOD_HZ * t).sin());

    peak_normalize(&mut signal);
    apply_edge_fades(&mut signal, NOISE_FADE_SECONDS);
    scale(&mut signal, intensity);
    signal
}

/// Linear index-interpolation resampling to exactly `target_len` samples.
///
/// No band limiting is applied.
pub fn resample(samples: &[f32], target_len: usize) -> Vec<f32> {
    if samples.len() == target_len {
        return samples.to_vec();
    }
    if samples.is_empty() {
        return vec![0.0; target_len];
    }

    let last = samples.len() - 1;
    let step = if target_len > 1 {
        last as f64 / (target_len - 1) as f64
    } else {
        0.0
    };

    (0..target_len)
        .map(|i| {
            let position = i as f64 * step;
            let lo = (position.floor() as usize).min(last);
            let hi = (lo + 1).min(last);
            let frac = (position - lo as f64) as f32;
            samples[lo] + (samples[hi] - samples[lo]) * frac
        })
        .collect()
}

/// Number of samples for `duration` seconds at `rate`, at least one.
pub fn sample_count(duration: f32, rate: u32) -> usize {
    let count = (f64::from(duration) * f64::from(rate)).round();
    if count.is_finite() && count >= 1.0 {
        count as usize
    } else {
        1
    }
}

fn check_duration(duration: f32) -> Result<()> {
    if duration.is_finite() && duration > 0.0 {
        Ok(())
    } else {
        Err(MeditationError::InvalidInput(
            "breath sound duration must be positive",
        ))
    }
}

fn seconds_to_samples(seconds: f32) -> usize {
    (f64::from(seconds) * f64::from(BASE_SAMPLE_RATE)).round() as usize
}

fn modulated_noise<R, F>(n: usize, rng: &mut R, modulation: F) -> Vec<f32>
where
    R: Rng + ?Sized,
    F: Fn(f64) -> f64,
{
    let rate = f64::from(BASE_SAMPLE_RATE);
    (0..n)
        .map(|i| (standard_normal(rng) * modulation(i as f64 / rate)) as f32)
        .collect()
}

/// Unit-variance Gaussian sample (Box-Muller).
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1 = 1.0 - rng.random::<f64>();
    let u2 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

fn peak_normalize(signal: &mut [f32]) {
    let peak = signal.iter().fold(0.0_f32, |peak, s| peak.max(s.abs()));
    if peak > f32::EPSILON {
        signal.iter_mut().for_each(|s| *s /= peak);
    }
}

/// Linear fade in and out, capped at half the signal so they never overlap.
fn apply_edge_fades(signal: &mut [f32], seconds: f32) {
    let n = signal.len();
    let fade = seconds_to_samples(seconds).min(n / 2);
    for i in 0..fade {
        let gain = ramp_position(i, fade);
        signal[i] *= gain;
        signal[n - 1 - i] *= gain;
    }
}

/// Position `i` of a `len`-point ramp from 0 to 1 inclusive.
fn ramp_position(i: usize, len: usize) -> f32 {
    if len <= 1 {
        0.0
    } else {
        i as f32 / (len - 1) as f32
    }
}

fn lerp(from: f32, to: f32, fraction: f32) -> f32 {
    from + (to - from) * fraction
}

fn gain(intensity: f32) -> f32 {
    if intensity.is_finite() {
        intensity.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn scale(signal: &mut [f32], intensity: f32) {
    let gain = gain(intensity);
    signal.iter_mut().for_each(|s| *s *= gain);
}
