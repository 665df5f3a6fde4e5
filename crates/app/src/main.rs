use std::{
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, ValueEnum};
use meditation_core::{
    assets, record::write_wav, BreathSynth, BreathingMove, EspeakSpeaker, MeditationSettings,
    MoveQueue, Phase, Recorder, RecordingSettings, SessionConfig, SessionRequest, SettingsStore,
    SettingsUpdate, SoundRequest, SoundType, TracingPoseSink,
};
use tracing_subscriber::EnvFilter;

fn main() -> meditation_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    if let Some(path) = &cli.sleep_sound {
        use_sleep_sound(path);
    }

    match cli.command {
        Commands::Run(args) => run_session(args),
        Commands::Render(args) => render_sound(args),
    }
}

fn run_session(args: RunArgs) -> meditation_core::Result<()> {
    let settings = match &args.settings {
        Some(path) => load_settings(path)?,
        None => MeditationSettings::default(),
    };
    let store = SettingsStore::new(settings);
    let update = args.settings_update();
    if !update.is_empty() {
        store.update(&update)?;
    }

    let request = SessionRequest {
        breath_sound: args.breath_sound.then_some(true),
        custom_inhale_s: args.inhale,
        custom_exhale_s: args.exhale,
        ..SessionRequest::new(args.minutes)
    };
    let config = store.session_config(&request)?;
    tracing::info!(?config, realtime = args.realtime, "starting meditation session");

    let mut breathing = BreathingMove::new(config.clone())?;
    if config.voice_guidance {
        breathing = breathing.with_speech(Arc::new(EspeakSpeaker::new(&args.speech_program)));
    }
    let recorder = args.record.as_ref().map(|path| {
        Arc::new(Recorder::new(RecordingSettings {
            output_path: path.clone(),
            ..RecordingSettings::default()
        }))
    });
    if let Some(recorder) = &recorder {
        breathing = breathing.with_audio(recorder.clone());
    }
    if breath_sound_unheard(&config, recorder.is_some()) {
        tracing::warn!("breath sound enabled without an audio output, sounds are dropped");
    }

    let mut queue = MoveQueue::new();
    queue.queue_move(Box::new(breathing));

    let tick = Duration::from_millis(args.tick_ms.max(1));
    let mut sink = TracingPoseSink::new();
    while queue.drive(tick.as_secs_f64(), &mut sink)? {
        if args.realtime {
            thread::sleep(tick);
        }
    }
    tracing::info!(ticks = sink.applied(), "meditation session complete");

    if let Some(recorder) = recorder {
        recorder.finish()?;
    }
    Ok(())
}

fn render_sound(args: RenderArgs) -> meditation_core::Result<()> {
    let mut request = SoundRequest::new(args.duration, args.intensity)
        .with_sound_type(args.sound_type)
        .with_sample_rate(args.rate);
    if let Some(phase) = args.phase {
        request = request.with_phase(phase.into());
    }

    let buffer = BreathSynth::default().generate(&request);
    let settings = RecordingSettings {
        output_path: args.output.clone(),
        sample_rate: buffer.sample_rate,
    };
    write_wav(&settings, &buffer.samples)?;
    tracing::info!(
        output = ?args.output,
        samples = buffer.len(),
        peak = buffer.peak(),
        "breath sound rendered"
    );
    Ok(())
}

/// Installs `path` as the sleep sound. Returns `false` when another sound was
/// already in place.
fn use_sleep_sound(path: &Path) -> bool {
    let installed = assets::install_sleep_sound(path);
    if !installed {
        tracing::warn!(path = ?path, "sleep sound already configured, ignoring --sleep-sound");
    }
    installed
}

fn breath_sound_unheard(config: &SessionConfig, has_audio: bool) -> bool {
    config.breath_sound_enabled && !has_audio
}

fn load_settings(path: &Path) -> meditation_core::Result<MeditationSettings> {
    let text = std::fs::read_to_string(path)?;
    MeditationSettings::from_json(&text)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Guided breathing for the meditation robot", long_about = None)]
struct Cli {
    /// WAV file used for sampled inhale/exhale sounds.
    #[arg(long, global = true)]
    sleep_sound: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a guided breathing session.
    Run(RunArgs),
    /// Render a single breath sound to a WAV file.
    Render(RenderArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Session length in minutes (3, 5 or 10).
    #[arg(short, long, default_value_t = 3)]
    minutes: u32,
    /// Inhale duration in seconds for this session only.
    #[arg(long)]
    inhale: Option<f64>,
    /// Exhale duration in seconds for this session only.
    #[arg(long)]
    exhale: Option<f64>,
    /// JSON settings snapshot to start from.
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Play breath sounds.
    #[arg(long)]
    breath_sound: bool,
    /// Sound used when no sampled breath is available.
    #[arg(long)]
    sound_type: Option<SoundType>,
    /// Keep the antennas still.
    #[arg(long)]
    no_antennas: bool,
    /// Disable spoken phase words and counts.
    #[arg(long)]
    no_voice: bool,
    /// Text-to-speech program invoked for voice cues.
    #[arg(long, default_value = "espeak")]
    speech_program: String,
    /// Animation tick in milliseconds.
    #[arg(long, default_value_t = 20)]
    tick_ms: u64,
    /// Pace ticks against the wall clock instead of running as fast as possible.
    #[arg(long)]
    realtime: bool,
    /// Capture breath sounds to this WAV file.
    #[arg(long)]
    record: Option<PathBuf>,
}

impl RunArgs {
    fn settings_update(&self) -> SettingsUpdate {
        SettingsUpdate {
            sound_type: self.sound_type,
            enable_antennas: self.no_antennas.then_some(false),
            voice_guidance: self.no_voice.then_some(false),
            ..SettingsUpdate::default()
        }
    }
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Destination WAV file.
    output: PathBuf,
    #[arg(long, default_value_t = 5.0)]
    duration: f32,
    #[arg(long, default_value_t = 0.08)]
    intensity: f32,
    #[arg(long, default_value_t = SoundType::Ambient)]
    sound_type: SoundType,
    /// Use the sampled breath for this phase instead of `sound_type`.
    #[arg(long, value_enum)]
    phase: Option<PhaseArg>,
    /// Output sample rate in Hz.
    #[arg(long, default_value_t = 44_100)]
    rate: u32,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum PhaseArg {
    Inhale,
    Exhale,
}

impl From<PhaseArg> for Phase {
    fn from(value: PhaseArg) -> Self {
        match value {
            PhaseArg::Inhale => Phase::Inhale,
            PhaseArg::Exhale => Phase::Exhale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breath_sound_needs_an_audio_output() {
        let config = SessionConfig {
            breath_sound_enabled: true,
            ..SessionConfig::default()
        };
        assert!(breath_sound_unheard(&config, false));
        assert!(!breath_sound_unheard(&config, true));

        let quiet = SessionConfig {
            breath_sound_enabled: false,
            ..SessionConfig::default()
        };
        assert!(!breath_sound_unheard(&quiet, false));
    }

    #[test]
    fn second_sleep_sound_is_refused() {
        assert!(use_sleep_sound(Path::new("first.wav")));
        assert!(!use_sleep_sound(Path::new("second.wav")));
        assert_eq!(assets::sleep_sound().path(), Path::new("first.wav"));
    }
}
