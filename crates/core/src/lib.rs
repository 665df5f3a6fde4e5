//! Core library for the meditation guide.
//!
//! A [`BreathingMove`] maps elapsed session time to a head pose and antenna
//! target for the robot, triggering breath sounds and spoken counts as the
//! session crosses phase and second boundaries. The [`synth`] module renders
//! those breath sounds, and the remaining modules provide the settings, sinks
//! and scheduling needed to run a session end to end.

pub mod assets;
pub mod audio;
pub mod breathing;
pub mod config;
pub mod error;
pub mod pose;
pub mod record;
pub mod speech;
pub mod synth;
pub mod timeline;

pub use assets::SampleAsset;
pub use audio::{AudioSink, MemorySink};
pub use breathing::{BreathPosition, BreathingMove, EvaluatorState, Move, Phase};
pub use config::{
    MeditationSettings, SessionConfig, SessionRequest, SettingsStore, SettingsUpdate, SoundType,
};
pub use error::{MeditationError, Result};
pub use pose::{HeadPose, PoseSample, PoseSink, TracingPoseSink};
pub use record::{Recorder, RecordingSettings};
pub use speech::{EspeakSpeaker, RecordingSpeaker, SpeechSink, Utterance, VoiceProfile};
pub use synth::{AudioBuffer, BreathSynth, SoundRequest};
pub use timeline::{MoveQueue, PlaybackClock, SessionHandle};
