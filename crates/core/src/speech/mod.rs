use std::{
    borrow::Cow,
    ffi::OsString,
    process::{Command, ExitStatus, Stdio},
    sync::{Arc, Mutex, MutexGuard},
    thread,
    time::{Duration, Instant},
};

use crate::{MeditationError, Phase, Result};

const NUMBER_WORDS: [&str; 15] = [
    "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten", "eleven",
    "twelve", "thirteen", "fourteen", "fifteen",
];

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How a cue is voiced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceProfile {
    /// Very slow, clear voice for "Inhale" / "Exhale".
    Instruction,
    /// Softer, slightly faster voice for counting seconds.
    Count,
}

impl VoiceProfile {
    /// `espeak` rate, pitch, amplitude and word gap arguments.
    pub fn espeak_args(self) -> [&'static str; 8] {
        match self {
            VoiceProfile::Instruction => ["-s", "80", "-p", "30", "-a", "180", "-g", "10"],
            VoiceProfile::Count => ["-s", "90", "-p", "35", "-a", "130", "-g", "5"],
        }
    }

    /// Hard limit after which the speech process is killed.
    pub fn timeout(self) -> Duration {
        match self {
            VoiceProfile::Instruction => Duration::from_secs(4),
            VoiceProfile::Count => Duration::from_secs(3),
        }
    }

    /// Quiet time kept by the speech task after the word is spoken.
    pub fn trailing_pause(self) -> Duration {
        match self {
            VoiceProfile::Instruction => Duration::from_millis(300),
            VoiceProfile::Count => Duration::ZERO,
        }
    }
}

/// One spoken cue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub text: String,
    pub voice: VoiceProfile,
}

impl Utterance {
    /// "Inhale" or "Exhale".
    pub fn phase_word(phase: Phase) -> Self {
        Self {
            text: phase.label().to_string(),
            voice: VoiceProfile::Instruction,
        }
    }

    pub fn count(second: u32) -> Self {
        Self {
            text: count_word(second).into_owned(),
            voice: VoiceProfile::Count,
        }
    }
}

/// Spoken form of a count: words for 1 to 15, digits otherwise.
pub fn count_word(n: u32) -> Cow<'static, str> {
    match n {
        1..=15 => Cow::Borrowed(NUMBER_WORDS[n as usize - 1]),
        _ => Cow::Owned(n.to_string()),
    }
}

/// Fire-and-forget speech output.
pub trait SpeechSink: Send + Sync {
    /// Submits an utterance and returns without waiting for it to be spoken.
    fn speak(&self, utterance: Utterance) -> Result<()>;
}

/// Speaks through the `espeak` command line tool, one background thread per
/// utterance. Threads are detached; an utterance that overruns its voice
/// timeout has its process killed.
#[derive(Debug, Clone)]
pub struct EspeakSpeaker {
    program: OsString,
}

impl Default for EspeakSpeaker {
    fn default() -> Self {
        Self::new("espeak")
    }
}

impl EspeakSpeaker {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, utterance: &Utterance) -> Command {
        let mut command = Command::new(&self.program);
        command.args(utterance.voice.espeak_args()).arg(&utterance.text);
        command
    }
}

impl SpeechSink for EspeakSpeaker {
    fn speak(&self, utterance: Utterance) -> Result<()> {
        let command = self.command(&utterance);
        thread::Builder::new()
            .name("speech".into())
            .spawn(move || {
                match run_with_timeout(command, utterance.voice.timeout()) {
                    Ok(status) => tracing::debug!(text = %utterance.text, %status, "voice cue"),
                    Err(err) => {
                        tracing::debug!(text = %utterance.text, error = %err, "voice cue failed")
                    }
                }
                thread::sleep(utterance.voice.trailing_pause());
            })?;
        Ok(())
    }
}

/// Runs `command` with its output discarded, killing it once `timeout`
/// elapses.
pub fn run_with_timeout(mut command: Command, timeout: Duration) -> Result<ExitStatus> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    let deadline = Instant::now() + timeout;

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(MeditationError::msg(format!(
                "speech timed out after {timeout:?}"
            )));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Speech sink that remembers utterances instead of voicing them.
#[derive(Debug, Clone, Default)]
pub struct RecordingSpeaker {
    spoken: Arc<Mutex<Vec<Utterance>>>,
}

impl RecordingSpeaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn utterances(&self) -> Result<Vec<Utterance>> {
        Ok(self.lock()?.clone())
    }

    /// Spoken texts in order.
    pub fn texts(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.iter().map(|u| u.text.clone()).collect())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Utterance>>> {
        self.spoken
            .lock()
            .map_err(|_| MeditationError::msg("recording speaker has been poisoned"))
    }
}

impl SpeechSink for RecordingSpeaker {
    fn speak(&self, utterance: Utterance) -> Result<()> {
        self.lock()?.push(utterance);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_use_words_then_digits() {
        assert_eq!(count_word(1), "one");
        assert_eq!(count_word(15), "fifteen");
        assert_eq!(count_word(16), "16");
        assert_eq!(count_word(0), "0");
    }

    #[test]
    fn builds_phase_and_count_utterances() {
        let word = Utterance::phase_word(Phase::Exhale);
        assert_eq!(word.text, "Exhale");
        assert_eq!(word.voice, VoiceProfile::Instruction);

        let count = Utterance::count(3);
        assert_eq!(count.text, "three");
        assert_eq!(count.voice, VoiceProfile::Count);
        assert!(VoiceProfile::Count.timeout() < VoiceProfile::Instruction.timeout());
    }

    #[test]
    fn espeak_command_carries_voice_parameters() {
        let speaker = EspeakSpeaker::default();
        let command = speaker.command(&Utterance::count(2));
        let args: Vec<_> = command.get_args().collect();
        assert_eq!(command.get_program(), "espeak");
        assert_eq!(args.len(), 9);
        assert_eq!(args[1], "90");
        assert_eq!(args[8], "two");
    }

    #[test]
    fn missing_program_does_not_fail_submission() {
        let speaker = EspeakSpeaker::new("definitely-not-a-speech-binary");
        assert!(speaker.speak(Utterance::count(1)).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn kills_commands_that_overrun() {
        let mut command = Command::new("sleep");
        command.arg("5");
        let started = Instant::now();
        let err = run_with_timeout(command, Duration::from_millis(100)).unwrap_err();
        assert!(format!("{err}").contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[cfg(unix)]
    #[test]
    fn reports_exit_status_of_quick_commands() {
        let status = run_with_timeout(Command::new("true"), Duration::from_secs(2)).unwrap();
        assert!(status.success());
    }

    #[test]
    fn recording_speaker_keeps_order() {
        let speaker = RecordingSpeaker::new();
        speaker.speak(Utterance::phase_word(Phase::Inhale)).unwrap();
        speaker.speak(Utterance::count(1)).unwrap();
        assert_eq!(speaker.texts().unwrap(), vec!["Inhale", "one"]);
    }
}
