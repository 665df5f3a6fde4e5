//! Guided breathing move.
//!
//! [`BreathingMove`] turns elapsed session time into a head pose and antenna
//! target, and fires breath sounds and spoken cues as the session crosses
//! phase and second boundaries.

use std::{f64::consts::FRAC_PI_2, fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    AudioSink, BreathSynth, PoseSample, Result, SessionConfig, SoundRequest, SpeechSink,
    Utterance,
};

pub const INHALE_PITCH_DEG: f64 = -6.0;
pub const EXHALE_PITCH_DEG: f64 = 8.0;
pub const INHALE_Z: f64 = 0.01;
pub const EXHALE_Z: f64 = -0.005;
pub const INHALE_ANTENNAS_DEG: [f64; 2] = [18.0, -18.0];
pub const EXHALE_ANTENNAS_DEG: [f64; 2] = [6.0, -6.0];

const INHALE_INTENSITY: f32 = 0.06;
const EXHALE_INTENSITY: f32 = 0.08;

const YAW_SWAY_DEG: f64 = 2.0;
const YAW_SWAY_RATE: f64 = 0.6;
const ROLL_SWAY_DEG: f64 = 1.0;
const ROLL_SWAY_RATE: f64 = 0.9;

/// Half of a breathing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Inhale,
    Exhale,
}

impl Phase {
    /// Capitalised word spoken when the phase begins.
    pub fn label(self) -> &'static str {
        match self {
            Phase::Inhale => "Inhale",
            Phase::Exhale => "Exhale",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Something the motion scheduler can play back over time.
pub trait Move {
    /// Nominal length in seconds.
    fn duration(&self) -> f64;

    /// Target for local time `t` seconds since the move started.
    fn evaluate(&mut self, t: f64) -> PoseSample;
}

/// Where a point in time falls within the breathing pattern.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreathPosition {
    pub cycle_index: u32,
    pub phase: Phase,
    /// Progress through the phase in `[0, 1]`.
    pub phase_fraction: f64,
    pub time_in_phase: f64,
    /// Whole seconds elapsed in the phase.
    pub current_second: u32,
}

/// Edge-detection memory between two `evaluate` calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluatorState {
    pub last_phase: Option<Phase>,
    pub last_cycle_index: Option<u32>,
    pub last_second_in_phase: Option<u32>,
}

/// Breathing session evaluated as a pure function of time for the pose, with
/// exactly-once sound and speech triggers.
pub struct BreathingMove {
    config: SessionConfig,
    total_cycles: u32,
    state: EvaluatorState,
    synth: BreathSynth,
    audio: Option<Arc<dyn AudioSink>>,
    speech: Option<Arc<dyn SpeechSink>>,
}

impl BreathingMove {
    /// Validates `config` and prepares a fresh session.
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let total_cycles = config.total_cycles();

        tracing::info!(
            minutes = config.duration_minutes,
            inhale = config.inhale_seconds,
            exhale = config.exhale_seconds,
            cycles = total_cycles,
            antennas = config.antennas_enabled,
            breath_sound = config.breath_sound_enabled,
            voice_guidance = config.voice_guidance,
            "breathing move initialized"
        );

        Ok(Self {
            config,
            total_cycles,
            state: EvaluatorState::default(),
            synth: BreathSynth::default(),
            audio: None,
            speech: None,
        })
    }

    /// Routes breath sounds to `audio`.
    pub fn with_audio(mut self, audio: Arc<dyn AudioSink>) -> Self {
        self.audio = Some(audio);
        self
    }

    /// Routes spoken cues to `speech`.
    pub fn with_speech(mut self, speech: Arc<dyn SpeechSink>) -> Self {
        self.speech = Some(speech);
        self
    }

    /// Replaces the breath sound generator.
    pub fn with_synth(mut self, synth: BreathSynth) -> Self {
        self.synth = synth;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn total_cycles(&self) -> u32 {
        self.total_cycles
    }

    pub fn state(&self) -> &EvaluatorState {
        &self.state
    }

    /// Decomposes `t` into cycle and phase. Times past the session end hold
    /// at the end of the last cycle.
    pub fn position_at(&self, t: f64) -> BreathPosition {
        let inhale = self.config.inhale_seconds;
        let exhale = self.config.exhale_seconds;
        let cycle_seconds = self.config.cycle_seconds();
        let t = if t.is_nan() { 0.0 } else { t.max(0.0) };

        let last_cycle = self.total_cycles.saturating_sub(1);
        let cycle = (t / cycle_seconds).floor();
        let cycle_index = if cycle >= f64::from(last_cycle) {
            last_cycle
        } else {
            cycle as u32
        };
        let t_in_cycle = (t - f64::from(cycle_index) * cycle_seconds).clamp(0.0, cycle_seconds);

        let (phase, time_in_phase, phase_seconds) = if t_in_cycle < inhale {
            (Phase::Inhale, t_in_cycle, inhale)
        } else {
            (Phase::Exhale, t_in_cycle - inhale, exhale)
        };

        // Holding at the very end must not announce an extra count.
        let last_second = (phase_seconds.ceil() as u32).saturating_sub(1);

        BreathPosition {
            cycle_index,
            phase,
            phase_fraction: (time_in_phase / phase_seconds).clamp(0.0, 1.0),
            time_in_phase,
            current_second: (time_in_phase.floor() as u32).min(last_second),
        }
    }

    /// Pose for a position, independent of trigger state.
    pub fn pose_at(&self, position: &BreathPosition) -> PoseSample {
        let (base_yaw, base_roll) = sway(position.cycle_index);
        let ease = (position.phase_fraction * FRAC_PI_2).sin();

        let (from, to, antennas) = match position.phase {
            Phase::Inhale => (
                Shape::default(),
                Shape {
                    pitch: INHALE_PITCH_DEG,
                    z: INHALE_Z,
                    yaw: base_yaw,
                    roll: base_roll,
                },
                INHALE_ANTENNAS_DEG,
            ),
            Phase::Exhale => (
                Shape {
                    pitch: INHALE_PITCH_DEG,
                    z: INHALE_Z,
                    yaw: base_yaw,
                    roll: base_roll,
                },
                Shape {
                    pitch: EXHALE_PITCH_DEG,
                    z: EXHALE_Z,
                    yaw: -base_yaw,
                    roll: -base_roll,
                },
                EXHALE_ANTENNAS_DEG,
            ),
        };

        let antennas = if self.config.antennas_enabled {
            antennas
        } else {
            [0.0; 2]
        };

        PoseSample::new(
            [0.0, 0.0, lerp(from.z, to.z, ease)],
            lerp(from.roll, to.roll, ease),
            lerp(from.pitch, to.pitch, ease),
            lerp(from.yaw, to.yaw, ease),
        )
        .with_antennas_deg(antennas)
    }

    fn trigger_breath_sound(&self, phase: Phase) {
        let Some(audio) = &self.audio else {
            tracing::debug!(%phase, "breath sound skipped, no audio output");
            return;
        };

        if let Err(err) = self.play_breath_sound(audio.as_ref(), phase) {
            tracing::debug!(%phase, error = %err, "breath sound failed (non-critical)");
        }
    }

    fn play_breath_sound(&self, audio: &dyn AudioSink, phase: Phase) -> Result<()> {
        let (duration, intensity) = match phase {
            Phase::Inhale => (self.config.inhale_seconds, INHALE_INTENSITY),
            Phase::Exhale => (self.config.exhale_seconds, EXHALE_INTENSITY),
        };

        let request = SoundRequest::new(duration as f32, intensity)
            .with_sound_type(self.config.sound_type)
            .with_phase(phase)
            .with_sample_rate(audio.output_sample_rate()?);
        let buffer = self.synth.generate(&request);

        audio.start_playing()?;
        audio.push_samples(&buffer)?;
        tracing::debug!(%phase, samples = buffer.len(), "breath sound playing");
        Ok(())
    }

    fn say(&self, utterance: Utterance) {
        let Some(speech) = &self.speech else {
            return;
        };
        let text = utterance.text.clone();
        if let Err(err) = speech.speak(utterance) {
            tracing::debug!(%text, error = %err, "voice cue failed (non-critical)");
        }
    }
}

impl Move for BreathingMove {
    fn duration(&self) -> f64 {
        self.config.total_seconds()
    }

    fn evaluate(&mut self, t: f64) -> PoseSample {
        let position = self.position_at(t);
        let entered_phase = self.state.last_phase != Some(position.phase)
            || self.state.last_cycle_index != Some(position.cycle_index);

        if entered_phase {
            if self.config.breath_sound_enabled {
                self.trigger_breath_sound(position.phase);
            }
            if self.config.voice_guidance {
                self.say(Utterance::phase_word(position.phase));
            }
        } else if self.config.voice_guidance
            && position.current_second > 0
            && self.state.last_second_in_phase != Some(position.current_second)
        {
            self.say(Utterance::count(position.current_second));
        }

        self.state = EvaluatorState {
            last_phase: Some(position.phase),
            last_cycle_index: Some(position.cycle_index),
            last_second_in_phase: Some(position.current_second),
        };

        self.pose_at(&position)
    }
}

impl fmt::Debug for BreathingMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreathingMove")
            .field("config", &self.config)
            .field("total_cycles", &self.total_cycles)
            .field("state", &self.state)
            .field("audio", &self.audio.is_some())
            .field("speech", &self.speech.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Shape {
    pitch: f64,
    z: f64,
    yaw: f64,
    roll: f64,
}

/// Per-cycle yaw and roll variation in degrees.
fn sway(cycle_index: u32) -> (f64, f64) {
    let k = f64::from(cycle_index);
    (
        YAW_SWAY_DEG * (k * YAW_SWAY_RATE).sin(),
        ROLL_SWAY_DEG * (k * ROLL_SWAY_RATE).sin(),
    )
}

fn lerp(from: f64, to: f64, fraction: f64) -> f64 {
    from + (to - from) * fraction
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MeditationError, MemorySink, RecordingSpeaker, SampleAsset, SoundType};
    use approx::assert_abs_diff_eq;

    fn config() -> SessionConfig {
        SessionConfig {
            voice_guidance: false,
            ..SessionConfig::new(3, 5.0, 8.0).unwrap()
        }
    }

    fn silent_synth() -> BreathSynth {
        BreathSynth::new(Arc::new(SampleAsset::absent()))
    }

    fn assert_pose_close(a: &PoseSample, b: &PoseSample, epsilon: f64) {
        assert_abs_diff_eq!(a.pitch_deg, b.pitch_deg, epsilon = epsilon);
        assert_abs_diff_eq!(a.yaw_deg, b.yaw_deg, epsilon = epsilon);
        assert_abs_diff_eq!(a.roll_deg, b.roll_deg, epsilon = epsilon);
        for axis in 0..3 {
            assert_abs_diff_eq!(a.position[axis], b.position[axis], epsilon = epsilon);
        }
    }

    fn ticks(until: f64, dt: f64) -> impl Iterator<Item = f64> {
        (0..).map(move |i| i as f64 * dt).take_while(move |t| *t < until)
    }

    struct BrokenAudio;

    impl AudioSink for BrokenAudio {
        fn output_sample_rate(&self) -> Result<u32> {
            Ok(16_000)
        }

        fn start_playing(&self) -> Result<()> {
            Err(MeditationError::msg("speaker unplugged"))
        }

        fn push_samples(&self, _buffer: &crate::AudioBuffer) -> Result<()> {
            Err(MeditationError::msg("speaker unplugged"))
        }
    }

    struct BrokenSpeech;

    impl SpeechSink for BrokenSpeech {
        fn speak(&self, _utterance: Utterance) -> Result<()> {
            Err(MeditationError::msg("no voice"))
        }
    }

    #[test]
    fn decomposes_time_into_cycles_and_phases() {
        let breathing = BreathingMove::new(config()).unwrap();
        assert_eq!(breathing.total_cycles(), 13);
        assert_eq!(breathing.duration(), 180.0);

        let start = breathing.position_at(0.0);
        assert_eq!((start.cycle_index, start.phase), (0, Phase::Inhale));
        assert_eq!(start.phase_fraction, 0.0);

        let mid_inhale = breathing.position_at(2.5);
        assert_eq!(mid_inhale.phase, Phase::Inhale);
        assert_abs_diff_eq!(mid_inhale.phase_fraction, 0.5);
        assert_eq!(mid_inhale.current_second, 2);

        let exhale = breathing.position_at(15.0 + 7.0);
        assert_eq!((exhale.cycle_index, exhale.phase), (1, Phase::Exhale));
        assert_abs_diff_eq!(exhale.time_in_phase, 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(exhale.phase_fraction, 0.5, epsilon = 1e-12);
        assert_eq!(exhale.current_second, 4);

        let negative = breathing.position_at(-3.0);
        assert_eq!((negative.cycle_index, negative.phase), (0, Phase::Inhale));
    }

    #[test]
    fn holds_final_exhale_past_session_end() {
        let mut breathing = BreathingMove::new(config()).unwrap();
        let position = breathing.position_at(200.0);
        assert_eq!(position.cycle_index, 12);
        assert_eq!(position.phase, Phase::Exhale);
        assert_eq!(position.phase_fraction, 1.0);
        assert_eq!(position.current_second, 7);

        let pose = breathing.evaluate(200.0);
        let base_yaw = 2.0 * (12.0_f64 * 0.6).sin();
        let base_roll = (12.0_f64 * 0.9).sin();
        assert_abs_diff_eq!(pose.pitch_deg, EXHALE_PITCH_DEG, epsilon = 1e-12);
        assert_abs_diff_eq!(pose.position[2], EXHALE_Z, epsilon = 1e-12);
        assert_abs_diff_eq!(pose.yaw_deg, -base_yaw, epsilon = 1e-12);
        assert_abs_diff_eq!(pose.roll_deg, -base_roll, epsilon = 1e-12);
        assert_eq!(pose, breathing.evaluate(f64::INFINITY));
    }

    #[test]
    fn pose_depends_only_on_time() {
        let mut warmed = BreathingMove::new(config()).unwrap();
        for t in ticks(40.0, 0.1) {
            warmed.evaluate(t);
        }

        for t in [0.0, 3.3, 7.9, 40.0, 99.5] {
            let mut fresh = BreathingMove::new(config()).unwrap();
            assert_eq!(fresh.evaluate(t), warmed.evaluate(t));
        }
    }

    #[test]
    fn pose_is_continuous_from_inhale_into_exhale() {
        let mut breathing = BreathingMove::new(config()).unwrap();
        let eps = 1e-9;
        for boundary in [5.0, 18.0, 13.0 * 7.0 + 5.0] {
            let before = breathing.evaluate(boundary - eps);
            let after = breathing.evaluate(boundary + eps);
            assert_pose_close(&before, &after, 1e-6);
        }
    }

    #[test]
    fn every_inhale_eases_from_neutral() {
        let mut breathing = BreathingMove::new(config()).unwrap();
        let start = breathing.evaluate(13.0);
        assert_pose_close(&start, &PoseSample::new([0.0; 3], 0.0, 0.0, 0.0), 1e-12);

        let ease = (0.5 * FRAC_PI_2).sin();
        let (base_yaw, base_roll) = (2.0 * 0.6_f64.sin(), 0.9_f64.sin());
        let mid = breathing.evaluate(15.5);
        assert_abs_diff_eq!(mid.pitch_deg, INHALE_PITCH_DEG * ease, epsilon = 1e-12);
        assert_abs_diff_eq!(mid.position[2], INHALE_Z * ease, epsilon = 1e-12);
        assert_abs_diff_eq!(mid.yaw_deg, base_yaw * ease, epsilon = 1e-12);
        assert_abs_diff_eq!(mid.roll_deg, base_roll * ease, epsilon = 1e-12);
    }

    #[test]
    fn first_inhale_rises_from_neutral() {
        let mut breathing = BreathingMove::new(config()).unwrap();
        let start = breathing.evaluate(0.0);
        assert_eq!(start.pitch_deg, 0.0);
        assert_eq!(start.position, [0.0; 3]);
        assert_eq!(start.antennas_deg, INHALE_ANTENNAS_DEG);
        assert_abs_diff_eq!(start.antennas[0], 18.0_f64.to_radians());

        let peak = breathing.evaluate(5.0 - 1e-9);
        assert_abs_diff_eq!(peak.pitch_deg, INHALE_PITCH_DEG, epsilon = 1e-6);
        assert_abs_diff_eq!(peak.position[2], INHALE_Z, epsilon = 1e-9);

        let exhale = breathing.evaluate(9.0);
        assert_eq!(exhale.antennas_deg, EXHALE_ANTENNAS_DEG);
        assert_eq!(exhale.body_yaw, 0.0);
    }

    #[test]
    fn easing_moves_monotonically_within_phase() {
        let mut breathing = BreathingMove::new(config()).unwrap();
        let pitches: Vec<f64> = ticks(5.0, 0.25).map(|t| breathing.evaluate(t).pitch_deg).collect();
        assert!(pitches.windows(2).all(|w| w[1] <= w[0]));

        let pitches: Vec<f64> = ticks(8.0, 0.25)
            .map(|t| breathing.evaluate(5.0 + t).pitch_deg)
            .collect();
        assert!(pitches.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn disabled_antennas_stay_still() {
        let config = SessionConfig {
            antennas_enabled: false,
            ..config()
        };
        let mut breathing = BreathingMove::new(config).unwrap();
        assert_eq!(breathing.evaluate(1.0).antennas, [0.0; 2]);
        assert_eq!(breathing.evaluate(8.0).antennas, [0.0; 2]);
    }

    #[test]
    fn speaks_phase_words_then_counts() {
        let speaker = Arc::new(RecordingSpeaker::new());
        let config = SessionConfig {
            voice_guidance: true,
            ..config()
        };
        let mut breathing = BreathingMove::new(config).unwrap().with_speech(speaker.clone());

        let mut spoken = 0;
        for t in ticks(26.0, 0.05) {
            breathing.evaluate(t);
            let now = speaker.utterances().unwrap().len();
            assert!(now - spoken <= 1, "more than one cue at t={t}");
            spoken = now;
        }

        let one_cycle = [
            "Inhale", "one", "two", "three", "four", "Exhale", "one", "two", "three", "four",
            "five", "six", "seven",
        ];
        let expected: Vec<&str> = one_cycle.iter().chain(one_cycle.iter()).copied().collect();
        assert_eq!(speaker.texts().unwrap(), expected);
    }

    #[test]
    fn repeated_time_does_not_retrigger() {
        let speaker = Arc::new(RecordingSpeaker::new());
        let config = SessionConfig {
            voice_guidance: true,
            ..config()
        };
        let mut breathing = BreathingMove::new(config).unwrap().with_speech(speaker.clone());

        breathing.evaluate(0.0);
        breathing.evaluate(0.0);
        breathing.evaluate(1.2);
        breathing.evaluate(1.2);
        breathing.evaluate(3.7);
        assert_eq!(speaker.texts().unwrap(), vec!["Inhale", "one", "three"]);
    }

    #[test]
    fn plays_one_breath_sound_per_phase() {
        let sink = Arc::new(MemorySink::new(16_000));
        let config = SessionConfig {
            breath_sound_enabled: true,
            sound_type: SoundType::Ocean,
            ..config()
        };
        let mut breathing = BreathingMove::new(config)
            .unwrap()
            .with_synth(silent_synth())
            .with_audio(sink.clone());

        for t in ticks(26.0, 0.1) {
            breathing.evaluate(t);
        }

        let buffers = sink.buffers().unwrap();
        assert_eq!(buffers.len(), 4);
        assert_eq!(buffers[0].len(), 80_000);
        assert_eq!(buffers[1].len(), 128_000);
        assert!(buffers.iter().all(|b| b.sample_rate == 16_000));
        assert!(buffers[0].peak() <= INHALE_INTENSITY + 1e-6);
        assert!(buffers[1].peak() <= EXHALE_INTENSITY + 1e-6);
    }

    #[test]
    fn silent_session_emits_nothing() {
        let sink = Arc::new(MemorySink::default());
        let speaker = Arc::new(RecordingSpeaker::new());
        let mut breathing = BreathingMove::new(config())
            .unwrap()
            .with_audio(sink.clone())
            .with_speech(speaker.clone());

        for t in ticks(30.0, 0.5) {
            breathing.evaluate(t);
        }
        assert_eq!(sink.buffer_count().unwrap(), 0);
        assert!(speaker.utterances().unwrap().is_empty());
    }

    #[test]
    fn output_failures_never_interrupt_motion() {
        let config = SessionConfig {
            breath_sound_enabled: true,
            voice_guidance: true,
            ..config()
        };
        let mut breathing = BreathingMove::new(config)
            .unwrap()
            .with_synth(silent_synth())
            .with_audio(Arc::new(BrokenAudio))
            .with_speech(Arc::new(BrokenSpeech));

        let mut reference = BreathingMove::new(self::config()).unwrap();
        for t in ticks(14.0, 0.5) {
            assert_eq!(breathing.evaluate(t), reference.evaluate(t));
        }
        assert_eq!(breathing.state().last_phase, Some(Phase::Inhale));
        assert_eq!(breathing.state().last_cycle_index, Some(1));
    }

    #[test]
    fn rejects_invalid_configuration() {
        let config = SessionConfig {
            exhale_seconds: 0.0,
            ..config()
        };
        let err = BreathingMove::new(config).unwrap_err();
        assert_eq!(err.field(), Some("exhale_seconds"));
    }
}
