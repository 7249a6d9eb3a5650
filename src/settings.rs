use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const AVAILABLE_MODELS: &[&str] = &["gpt-4.1-nano", "gpt-4.1-mini", "gpt-4o-mini"];

pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

pub const TEMPERATURE_RANGE: (f32, f32) = (0.0, 1.0);
pub const TEMPERATURE_STEP: f32 = 0.1;
pub const MAX_TOKENS_RANGE: (u32, u32) = (500, 3000);
pub const MAX_TOKENS_STEP: u32 = 100;

#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("unknown model '{0}'")]
    UnknownModel(String),
}

/// Per-session model settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl Settings {
    /// Builds settings the way the settings tab's sliders would: values are
    /// clamped into range and snapped to the slider step.
    pub fn new(model: &str, temperature: f32, max_tokens: u32) -> Result<Self, SettingsError> {
        if !AVAILABLE_MODELS.contains(&model) {
            return Err(SettingsError::UnknownModel(model.to_string()));
        }
        Ok(Self {
            model: model.to_string(),
            temperature: snap_temperature(temperature),
            max_tokens: snap_max_tokens(max_tokens),
        })
    }

    pub fn normalized(&self) -> Result<Self, SettingsError> {
        Self::new(&self.model, self.temperature, self.max_tokens)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn snap_temperature(value: f32) -> f32 {
    let (min, max) = TEMPERATURE_RANGE;
    let value = if value.is_nan() { DEFAULT_TEMPERATURE } else { value };
    let steps = (value.clamp(min, max) / TEMPERATURE_STEP).round();
    // Keep one decimal so 0.7 serializes as 0.7, not 0.70000005.
    (steps * TEMPERATURE_STEP * 10.0).round() / 10.0
}

fn snap_max_tokens(value: u32) -> u32 {
    let (min, max) = MAX_TOKENS_RANGE;
    let clamped = value.clamp(min, max);
    let snapped = ((clamped + MAX_TOKENS_STEP / 2) / MAX_TOKENS_STEP) * MAX_TOKENS_STEP;
    snapped.clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.model, "gpt-4.1-nano");
        assert_eq!(settings.temperature, 0.7);
        assert_eq!(settings.max_tokens, 2000);
    }

    #[test]
    fn test_values_are_clamped_and_snapped() {
        let settings = Settings::new("gpt-4o-mini", 1.7, 120).unwrap();
        assert_eq!(settings.temperature, 1.0);
        assert_eq!(settings.max_tokens, 500);

        let settings = Settings::new("gpt-4.1-mini", 0.34, 2449).unwrap();
        assert_eq!(settings.temperature, 0.3);
        assert_eq!(settings.max_tokens, 2400);

        let settings = Settings::new("gpt-4.1-mini", -3.0, 9000).unwrap();
        assert_eq!(settings.temperature, 0.0);
        assert_eq!(settings.max_tokens, 3000);
    }

    #[test]
    fn test_unknown_model_rejected() {
        let err = Settings::new("gpt-2", 0.5, 1000).unwrap_err();
        assert_eq!(err, SettingsError::UnknownModel("gpt-2".to_string()));
    }

    #[test]
    fn test_reset() {
        let mut settings = Settings::new("gpt-4o-mini", 0.2, 800).unwrap();
        settings.reset();
        assert_eq!(settings, Settings::default());
    }
}
