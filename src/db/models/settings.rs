use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MILESTONE_THRESHOLD: Decimal = dec!(3600);

#[inline]
const fn default_threshold() -> Decimal {
    DEFAULT_MILESTONE_THRESHOLD
}

#[inline]
const fn default_sound_enabled() -> bool {
    true
}

#[inline]
const fn default_display_duration() -> u32 {
    10
}

/// Operator-controlled display settings, read once per poll tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlideshowConfig {
    #[serde(default = "default_threshold")]
    pub milestone_threshold: Decimal,
    #[serde(default = "default_sound_enabled")]
    pub sound_enabled: bool,
    #[serde(default)]
    pub standard_sound_url: Option<String>,
    #[serde(default)]
    pub milestone_sound_url: Option<String>,
    /// Seconds each board stays on screen before the display rotates
    #[serde(default = "default_display_duration")]
    pub display_duration: u32,
}

impl Default for SlideshowConfig {
    fn default() -> Self {
        Self {
            milestone_threshold: default_threshold(),
            sound_enabled: default_sound_enabled(),
            standard_sound_url: None,
            milestone_sound_url: None,
            display_duration: default_display_duration(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_partial_settings_take_defaults() {
        let config: SlideshowConfig =
            serde_json::from_str(r#"{"milestoneSoundUrl":"https://snd/m.mp3"}"#).unwrap();

        assert_eq!(config.milestone_threshold, dec!(3600));
        assert!(config.sound_enabled);
        assert_eq!(config.display_duration, 10);
        assert_eq!(config.milestone_sound_url.as_deref(), Some("https://snd/m.mp3"));
    }
}
