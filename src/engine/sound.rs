use crate::db::prelude::SlideshowConfig;
use crate::engine::milestone::CrossingEvent;

pub struct SoundSelector;
impl SoundSelector {
    /// Picks the audio asset for a crossing, or `None` for "no audio, no notification".
    ///
    /// Below the threshold the standard sound is used. A crossing always lands at or above the
    /// threshold, so in practice the choice is the agent's personal sound, then the configured
    /// milestone sound. Empty urls count as unset.
    pub fn select<'a>(event: &'a CrossingEvent, config: &'a SlideshowConfig) -> Option<&'a str> {
        if !config.sound_enabled {
            return None;
        }

        if event.current_total < config.milestone_threshold {
            return non_empty(config.standard_sound_url.as_deref());
        }

        non_empty(event.agent.personal_sound_url.as_deref())
            .or_else(|| non_empty(config.milestone_sound_url.as_deref()))
    }
}

fn non_empty(url: Option<&str>) -> Option<&str> {
    url.filter(|u| !u.trim().is_empty())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::stats::StatsAggregator;
    use crate::engine::stats::test::{agent, lead};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn event(personal: Option<&str>, total: Decimal) -> CrossingEvent {
        let mut roster = agent(1, "a");
        roster.personal_sound_url = personal.map(str::to_string);

        let standings = StatsAggregator::aggregate(&[lead(1, total, None, 0)], &[roster]);
        CrossingEvent {
            agent: standings.rows()[0].clone(),
            previous_total: Decimal::ZERO,
            current_total: total,
        }
    }

    fn config() -> SlideshowConfig {
        SlideshowConfig {
            standard_sound_url: Some(String::from("https://snd/standard.mp3")),
            milestone_sound_url: Some(String::from("https://snd/milestone.mp3")),
            ..SlideshowConfig::default()
        }
    }

    #[test]
    fn test_personal_sound_wins() {
        let crossing = event(Some("https://snd/agent_1.mp3"), dec!(3600));
        assert_eq!(
            SoundSelector::select(&crossing, &config()),
            Some("https://snd/agent_1.mp3")
        );
    }

    #[test]
    fn test_milestone_sound_fallback() {
        let crossing = event(None, dec!(4000));
        assert_eq!(
            SoundSelector::select(&crossing, &config()),
            Some("https://snd/milestone.mp3")
        );

        let blank = event(Some(""), dec!(4000));
        assert_eq!(
            SoundSelector::select(&blank, &config()),
            Some("https://snd/milestone.mp3")
        );
    }

    #[test]
    fn test_below_threshold_uses_standard_sound() {
        let crossing = event(Some("https://snd/agent_1.mp3"), dec!(100));
        assert_eq!(
            SoundSelector::select(&crossing, &config()),
            Some("https://snd/standard.mp3")
        );
    }

    #[test]
    fn test_disabled_or_unset_is_none() {
        let crossing = event(Some("https://snd/agent_1.mp3"), dec!(4000));
        let disabled = SlideshowConfig {
            sound_enabled: false,
            ..config()
        };
        assert_eq!(SoundSelector::select(&crossing, &disabled), None);

        let unset = event(None, dec!(4000));
        assert_eq!(SoundSelector::select(&unset, &SlideshowConfig::default()), None);
    }
}
