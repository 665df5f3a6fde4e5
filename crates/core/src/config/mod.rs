use std::{
    fmt,
    str::FromStr,
    sync::{Mutex, MutexGuard},
};

use serde::{Deserialize, Serialize};

use crate::{MeditationError, Result};

/// Session lengths offered to the user, in minutes.
pub const SESSION_MINUTES: [u32; 3] = [3, 5, 10];
pub const INHALE_RANGE: (f64, f64) = (2.0, 15.0);
pub const EXHALE_RANGE: (f64, f64) = (3.0, 20.0);

pub const DEFAULT_INHALE_SECONDS: f64 = 5.0;
pub const DEFAULT_EXHALE_SECONDS: f64 = 8.0;

/// Flavour of breath sound used when no breathing phase selects a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundType {
    #[default]
    Ambient,
    Ocean,
    WhiteNoise,
}

impl SoundType {
    pub fn as_str(self) -> &'static str {
        match self {
            SoundType::Ambient => "ambient",
            SoundType::Ocean => "ocean",
            SoundType::WhiteNoise => "white_noise",
        }
    }
}

impl fmt::Display for SoundType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SoundType {
    type Err = MeditationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ambient" => Ok(SoundType::Ambient),
            "ocean" => Ok(SoundType::Ocean),
            "white_noise" => Ok(SoundType::WhiteNoise),
            other => Err(MeditationError::invalid_config(
                "sound_type",
                format!("`{other}` is not one of 'ambient', 'ocean', 'white_noise'"),
            )),
        }
    }
}

/// Immutable parameters of one breathing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub duration_minutes: u32,
    pub inhale_seconds: f64,
    pub exhale_seconds: f64,
    pub antennas_enabled: bool,
    pub breath_sound_enabled: bool,
    pub sound_type: SoundType,
    pub voice_guidance: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        MeditationSettings::default().snapshot_for(SESSION_MINUTES[0])
    }
}

impl SessionConfig {
    /// Builds a validated configuration with default switches.
    pub fn new(duration_minutes: u32, inhale_seconds: f64, exhale_seconds: f64) -> Result<Self> {
        let config = Self {
            duration_minutes,
            inhale_seconds,
            exhale_seconds,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects the first field that falls outside its accepted range.
    pub fn validate(&self) -> Result<()> {
        validate_minutes(self.duration_minutes)?;
        validate_seconds("inhale_seconds", self.inhale_seconds, INHALE_RANGE)?;
        validate_seconds("exhale_seconds", self.exhale_seconds, EXHALE_RANGE)?;
        Ok(())
    }

    pub fn cycle_seconds(&self) -> f64 {
        self.inhale_seconds + self.exhale_seconds
    }

    pub fn total_seconds(&self) -> f64 {
        f64::from(self.duration_minutes) * 60.0
    }

    /// Number of complete breathing cycles that fit in the session.
    pub fn total_cycles(&self) -> u32 {
        let cycle = self.cycle_seconds();
        if cycle <= 0.0 {
            return 0;
        }
        (self.total_seconds() / cycle).floor() as u32
    }
}

fn validate_minutes(minutes: u32) -> Result<()> {
    if SESSION_MINUTES.contains(&minutes) {
        Ok(())
    } else {
        Err(MeditationError::invalid_config(
            "duration_minutes",
            format!("{minutes} must be 3, 5, or 10"),
        ))
    }
}

fn validate_seconds(field: &'static str, value: f64, (min, max): (f64, f64)) -> Result<()> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(MeditationError::invalid_config(
            field,
            format!("{value} must be between {min} and {max}"),
        ))
    }
}

/// Current user preferences, kept in memory for the process lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeditationSettings {
    pub inhale_seconds: f64,
    pub exhale_seconds: f64,
    pub antennas_enabled: bool,
    pub breath_sound_enabled: bool,
    pub sound_type: SoundType,
    pub voice_guidance: bool,
}

impl Default for MeditationSettings {
    fn default() -> Self {
        Self {
            inhale_seconds: DEFAULT_INHALE_SECONDS,
            exhale_seconds: DEFAULT_EXHALE_SECONDS,
            antennas_enabled: true,
            breath_sound_enabled: false,
            sound_type: SoundType::Ambient,
            voice_guidance: true,
        }
    }
}

impl MeditationSettings {
    /// Parses a JSON settings snapshot and validates the breathing ranges.
    pub fn from_json(text: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(text)?;
        validate_seconds("inhale_seconds", settings.inhale_seconds, INHALE_RANGE)?;
        validate_seconds("exhale_seconds", settings.exhale_seconds, EXHALE_RANGE)?;
        Ok(settings)
    }

    fn snapshot_for(&self, duration_minutes: u32) -> SessionConfig {
        SessionConfig {
            duration_minutes,
            inhale_seconds: self.inhale_seconds,
            exhale_seconds: self.exhale_seconds,
            antennas_enabled: self.antennas_enabled,
            breath_sound_enabled: self.breath_sound_enabled,
            sound_type: self.sound_type,
            voice_guidance: self.voice_guidance,
        }
    }

    /// Merges a start request with these settings into a session configuration.
    pub fn session_config(&self, request: &SessionRequest) -> Result<SessionConfig> {
        let mut config = self.snapshot_for(request.duration_minutes);
        if let Some(inhale) = request.custom_inhale_s {
            config.inhale_seconds = inhale;
        }
        if let Some(exhale) = request.custom_exhale_s {
            config.exhale_seconds = exhale;
        }
        if let Some(sound) = request.breath_sound {
            config.breath_sound_enabled = sound;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Partial settings change; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inhale_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exhale_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_antennas: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_breath_sound: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound_type: Option<SoundType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_guidance: Option<bool>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Applies every present field, or nothing at all if any field is invalid.
    pub fn apply_to(&self, settings: &mut MeditationSettings) -> Result<()> {
        if let Some(inhale) = self.inhale_seconds {
            validate_seconds("inhale_seconds", inhale, INHALE_RANGE)?;
        }
        if let Some(exhale) = self.exhale_seconds {
            validate_seconds("exhale_seconds", exhale, EXHALE_RANGE)?;
        }

        if let Some(inhale) = self.inhale_seconds {
            settings.inhale_seconds = inhale;
        }
        if let Some(exhale) = self.exhale_seconds {
            settings.exhale_seconds = exhale;
        }
        if let Some(antennas) = self.enable_antennas {
            settings.antennas_enabled = antennas;
        }
        if let Some(sound) = self.enable_breath_sound {
            settings.breath_sound_enabled = sound;
        }
        if let Some(sound_type) = self.sound_type {
            settings.sound_type = sound_type;
        }
        if let Some(voice) = self.voice_guidance {
            settings.voice_guidance = voice;
        }
        Ok(())
    }
}

/// Request to begin a session, optionally overriding the stored settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub duration_minutes: u32,
    #[serde(default)]
    pub breath_sound: Option<bool>,
    #[serde(default)]
    pub custom_inhale_s: Option<f64>,
    #[serde(default)]
    pub custom_exhale_s: Option<f64>,
}

impl SessionRequest {
    pub fn new(duration_minutes: u32) -> Self {
        Self {
            duration_minutes,
            breath_sound: None,
            custom_inhale_s: None,
            custom_exhale_s: None,
        }
    }
}

/// Thread-safe owner of the process-wide "current settings".
#[derive(Debug, Default)]
pub struct SettingsStore {
    current: Mutex<MeditationSettings>,
}

impl SettingsStore {
    pub fn new(settings: MeditationSettings) -> Self {
        Self {
            current: Mutex::new(settings),
        }
    }

    pub fn snapshot(&self) -> Result<MeditationSettings> {
        Ok(self.lock()?.clone())
    }

    /// Applies an update and returns the resulting settings.
    pub fn update(&self, update: &SettingsUpdate) -> Result<MeditationSettings> {
        let mut current = self.lock()?;
        update.apply_to(&mut current)?;
        tracing::info!(?update, "meditation settings updated");
        Ok(current.clone())
    }

    pub fn reset_to_defaults(&self) -> Result<()> {
        *self.lock()? = MeditationSettings::default();
        tracing::info!("meditation settings reset to defaults");
        Ok(())
    }

    /// Snapshots the current settings into a configuration for a new session.
    pub fn session_config(&self, request: &SessionRequest) -> Result<SessionConfig> {
        self.lock()?.session_config(request)
    }

    fn lock(&self) -> Result<MutexGuard<'_, MeditationSettings>> {
        self.current
            .lock()
            .map_err(|_| MeditationError::msg("settings store has been poisoned"))
    }
}
