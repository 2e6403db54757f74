use std::collections::HashMap;

use rust_decimal::Decimal;
use tracing::instrument;

use crate::db::prelude::AgentId;
use crate::engine::stats::{AgentStats, Standings};

/// An agent's total moved from below the threshold to at/above it since the previous pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossingEvent {
    pub agent: AgentStats,
    pub previous_total: Decimal,
    pub current_total: Decimal,
}

/// Last observed total per agent, kept only to detect crossings between passes.
///
/// One tracker belongs to one leaderboard session and is owned by whoever drives the passes;
/// passes over the same tracker must not interleave. Agents that leave the roster keep their
/// last entry, so an agent re-added later is compared against that stale total.
#[derive(Debug, Default)]
pub struct MilestoneTracker {
    snapshot: HashMap<AgentId, Decimal>,
}

impl MilestoneTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every upward crossing of `threshold`, then records the current totals.
    ///
    /// A crossing fires iff `previous < threshold <= current`, where an agent never seen before
    /// has a previous total of zero. All crossings are computed against the snapshot as it was
    /// before this call.
    #[instrument(skip(self, standings), fields(rows = standings.len(), %threshold))]
    pub fn detect_crossings(
        &mut self,
        standings: &Standings,
        threshold: Decimal,
    ) -> Vec<CrossingEvent> {
        let crossings: Vec<CrossingEvent> = standings
            .iter()
            .filter_map(|agent| {
                let previous_total = self.previous_total(agent.user_id);
                let current_total = agent.total_earnings();

                (previous_total < threshold && threshold <= current_total).then(|| CrossingEvent {
                    agent: agent.clone(),
                    previous_total,
                    current_total,
                })
            })
            .collect();

        for agent in standings.iter() {
            self.snapshot.insert(agent.user_id, agent.total_earnings());
        }

        if !crossings.is_empty() {
            tracing::debug!(crossing_count = crossings.len(), "milestone crossings detected");
        }

        crossings
    }

    pub fn previous_total(&self, agent: AgentId) -> Decimal {
        self.snapshot.get(&agent).copied().unwrap_or(Decimal::ZERO)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::prelude::Lead;
    use crate::engine::stats::StatsAggregator;
    use crate::engine::stats::test::{agent, lead};
    use rust_decimal_macros::dec;

    fn standings(totals: &[(u64, Decimal)]) -> Standings {
        let agents: Vec<_> = totals.iter().map(|(id, _)| agent(*id, "agent")).collect();
        let leads: Vec<Lead> = totals
            .iter()
            .filter(|(_, total)| !total.is_zero())
            .map(|(id, total)| lead(*id, *total, None, 0))
            .collect();

        StatsAggregator::aggregate(&leads, &agents)
    }

    #[test]
    fn test_fires_once_per_upward_crossing() {
        let mut tracker = MilestoneTracker::new();
        let threshold = dec!(3600);
        let totals = [dec!(0), dec!(3000), dec!(3600), dec!(3000), dec!(4000)];

        let fired: Vec<usize> = totals
            .iter()
            .enumerate()
            .filter(|(_, total)| {
                !tracker
                    .detect_crossings(&standings(&[(1, **total)]), threshold)
                    .is_empty()
            })
            .map(|(step, _)| step + 1)
            .collect();

        assert_eq!(fired, vec![3, 5]);
        assert_eq!(tracker.previous_total(AgentId(1)), dec!(4000));
    }

    #[test]
    fn test_staying_above_does_not_refire() {
        let mut tracker = MilestoneTracker::new();
        let threshold = dec!(3600);

        let first = tracker.detect_crossings(&standings(&[(1, dec!(3700))]), threshold);
        let second = tracker.detect_crossings(&standings(&[(1, dec!(5000))]), threshold);

        assert_eq!(first.len(), 1);
        assert_eq!(first[0].previous_total, Decimal::ZERO);
        assert_eq!(first[0].current_total, dec!(3700));
        assert!(second.is_empty());
    }

    #[test]
    fn test_new_agent_above_threshold_fires() {
        let mut tracker = MilestoneTracker::new();
        let threshold = dec!(3600);

        tracker.detect_crossings(&standings(&[(1, dec!(100))]), threshold);
        let crossings =
            tracker.detect_crossings(&standings(&[(1, dec!(200)), (2, dec!(9000))]), threshold);

        assert_eq!(crossings.len(), 1);
        assert_eq!(crossings[0].agent.user_id, AgentId(2));
    }

    #[test]
    fn test_snapshot_updated_for_every_agent() {
        let mut tracker = MilestoneTracker::new();

        tracker.detect_crossings(
            &standings(&[(1, dec!(10)), (2, dec!(0)), (3, dec!(4000))]),
            dec!(3600),
        );

        assert_eq!(tracker.snapshot.len(), 3);
        assert_eq!(tracker.previous_total(AgentId(1)), dec!(10));
        assert_eq!(tracker.previous_total(AgentId(2)), Decimal::ZERO);
        assert_eq!(tracker.previous_total(AgentId(42)), Decimal::ZERO);
    }
}
