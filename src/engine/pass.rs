use rust_decimal::Decimal;
use serde::Serialize;
use tracing::instrument;

use crate::db::prelude::{Agent, AgentId, Lead, SlideshowConfig, TimePeriod};
use crate::engine::milestone::{CrossingEvent, MilestoneTracker};
use crate::engine::sound::SoundSelector;
use crate::engine::stats::{Standings, StatsAggregator};

/// Display payload for a crossing that resolved to a sound.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub user_id: AgentId,
    pub name: String,
    pub profile_image_url: Option<String>,
    pub previous_total: Decimal,
    pub total_earnings: Decimal,
    pub sound_url: String,
}

impl Notification {
    fn new(event: &CrossingEvent, sound_url: &str) -> Self {
        Self {
            user_id: event.agent.user_id,
            name: event.agent.name.clone(),
            profile_image_url: event.agent.profile_image_url.clone(),
            previous_total: event.previous_total,
            total_earnings: event.current_total,
            sound_url: sound_url.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PassOutcome {
    pub standings: Standings,
    pub notifications: Vec<Notification>,
}

/// Runs one aggregation pass for a board against its tracker.
///
/// Aggregates and ranks, colors every row for `period`, detects crossings of the configured
/// milestone threshold and keeps the crossings that resolve to a sound. The tracker's snapshot
/// holds the new totals afterwards.
#[instrument(skip_all, fields(lead_count = leads.len(), agent_count = agents.len(), %period))]
pub fn run_pass(
    leads: &[Lead],
    agents: &[Agent],
    period: TimePeriod,
    config: &SlideshowConfig,
    tracker: &mut MilestoneTracker,
) -> PassOutcome {
    let mut standings = StatsAggregator::aggregate(leads, agents);
    standings.annotate(period);

    let crossings = tracker.detect_crossings(&standings, config.milestone_threshold);
    let notifications: Vec<Notification> = crossings
        .iter()
        .filter_map(|event| {
            let sound = SoundSelector::select(event, config);
            if sound.is_none() {
                tracing::debug!(user_id = %event.agent.user_id, "crossing without sound, skipped");
            }

            sound.map(|url| Notification::new(event, url))
        })
        .collect();

    tracing::info!(
        rows = standings.len(),
        crossing_count = crossings.len(),
        notification_count = notifications.len(),
        "pass complete"
    );

    PassOutcome {
        standings,
        notifications,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::color::EarningsColor;
    use crate::engine::stats::test::{agent, lead};
    use rust_decimal_macros::dec;

    fn config() -> SlideshowConfig {
        SlideshowConfig {
            milestone_sound_url: Some(String::from("https://snd/milestone.mp3")),
            ..SlideshowConfig::default()
        }
    }

    #[test]
    fn test_pass_notifies_on_crossing_only() {
        let mut star = agent(1, "star");
        star.personal_sound_url = Some(String::from("https://snd/agent_1.mp3"));
        let agents = vec![star, agent(2, "steady")];
        let mut tracker = MilestoneTracker::new();

        let first = run_pass(
            &[lead(1, dec!(2000), None, 0), lead(2, dec!(100), None, 0)],
            &agents,
            TimePeriod::Day,
            &config(),
            &mut tracker,
        );
        assert!(first.notifications.is_empty());
        assert_eq!(first.standings.rows()[0].color, Some(EarningsColor::Orange));

        let leads = vec![
            lead(1, dec!(2000), None, 0),
            lead(1, dec!(1700), None, 0),
            lead(2, dec!(3600), None, 0),
        ];
        let second = run_pass(&leads, &agents, TimePeriod::Day, &config(), &mut tracker);

        // notifications follow rank order
        assert_eq!(second.notifications.len(), 2);
        let personal = &second.notifications[0];
        assert_eq!(personal.user_id, AgentId(1));
        assert_eq!(personal.previous_total, dec!(2000));
        assert_eq!(personal.total_earnings, dec!(3700));
        assert_eq!(personal.sound_url, "https://snd/agent_1.mp3");

        let fallback = &second.notifications[1];
        assert_eq!(fallback.user_id, AgentId(2));
        assert_eq!(fallback.sound_url, "https://snd/milestone.mp3");

        let third = run_pass(&leads, &agents, TimePeriod::Day, &config(), &mut tracker);
        assert!(third.notifications.is_empty());
    }

    #[test]
    fn test_pass_without_sound_still_updates_snapshot() {
        let agents = vec![agent(1, "a")];
        let mut tracker = MilestoneTracker::new();
        let silent = SlideshowConfig {
            sound_enabled: false,
            ..config()
        };

        let outcome = run_pass(
            &[lead(1, dec!(5000), None, 0)],
            &agents,
            TimePeriod::Week,
            &silent,
            &mut tracker,
        );

        assert!(outcome.notifications.is_empty());
        assert_eq!(tracker.previous_total(AgentId(1)), dec!(5000));
        assert_eq!(outcome.standings.rows()[0].color, Some(EarningsColor::Black));
    }
}
