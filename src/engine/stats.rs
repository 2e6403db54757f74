use std::collections::HashMap;
use std::collections::hash_map::Entry;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::instrument;

use crate::db::prelude::{Agent, AgentId, CampaignAssignment, Lead, TimePeriod};
use crate::engine::bonus::BonusResolver;
use crate::engine::color::{EarningsClassifier, EarningsColor};

/// One scoreboard row, recomputed from scratch on every pass.
///
/// `commission`, `bonus` and `total_earnings` are only written while a row is being aggregated,
/// so `total_earnings == commission + bonus` always holds for a row handed out of this module.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStats {
    pub user_id: AgentId,
    pub name: String,
    pub profile_image_url: Option<String>,
    pub personal_sound_url: Option<String>,
    pub deals: u32,
    commission: Decimal,
    pub sms_sent: u32,
    pub sms_success_rate: u32,
    pub campaign_deals: HashMap<String, u32>,
    bonus: Decimal,
    total_earnings: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<EarningsColor>,
}

impl AgentStats {
    fn empty(agent: &Agent) -> Self {
        Self {
            user_id: agent.user_id,
            name: agent.name.clone(),
            profile_image_url: agent.profile_image_url.clone(),
            personal_sound_url: agent.personal_sound_url.clone(),
            deals: 0,
            commission: Decimal::ZERO,
            sms_sent: 0,
            sms_success_rate: 0,
            campaign_deals: HashMap::new(),
            bonus: Decimal::ZERO,
            total_earnings: Decimal::ZERO,
            color: None,
        }
    }

    fn record(&mut self, lead: &Lead) {
        self.deals = self.deals.saturating_add(1);
        self.commission += lead.commission;
        self.sms_sent = self.sms_sent.saturating_add(lead.sms_count);

        if let Some(campaign) = &lead.campaign {
            let count = self.campaign_deals.entry(campaign.clone()).or_insert(0);
            *count = count.saturating_add(1);
        }
    }

    fn settle(&mut self, assignments: &[CampaignAssignment]) {
        self.sms_success_rate = success_rate(self.deals, self.sms_sent);
        self.bonus = BonusResolver::resolve(&self.campaign_deals, assignments);
        self.total_earnings = self.commission + self.bonus;
    }

    pub fn commission(&self) -> Decimal {
        self.commission
    }

    pub fn bonus(&self) -> Decimal {
        self.bonus
    }

    pub fn total_earnings(&self) -> Decimal {
        self.total_earnings
    }
}

/// Percentage of sms sent that turned into a deal, rounded half up and capped at `u32::MAX`.
fn success_rate(deals: u32, sms_sent: u32) -> u32 {
    if sms_sent == 0 {
        return 0;
    }

    let (deals, sms_sent) = (u64::from(deals), u64::from(sms_sent));
    u32::try_from((deals * 200 + sms_sent) / (sms_sent * 2)).unwrap_or(u32::MAX)
}

/// Ranked rows for a complete roster.
///
/// Only [`StatsAggregator::aggregate`] builds this, so holding a `Standings` means every agent of
/// the roster is present.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Standings {
    rows: Vec<AgentStats>,
}

impl Standings {
    /// Sets each row's display color for the board's period.
    pub fn annotate(&mut self, period: TimePeriod) {
        self.rows.iter_mut().for_each(|row| {
            row.color = Some(EarningsClassifier::classify(row.total_earnings, period));
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentStats> {
        self.rows.iter()
    }

    pub fn rows(&self) -> &[AgentStats] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub struct StatsAggregator;
impl StatsAggregator {
    /// Folds `leads` into one row per agent of `agents`, ranked by total earnings (descending).
    ///
    /// Leads for agents outside the roster are dropped. Equal totals keep roster order, and an
    /// agent id listed twice in the roster only gets the first entry.
    #[instrument(skip_all, fields(lead_count = leads.len(), agent_count = agents.len()))]
    pub fn aggregate(leads: &[Lead], agents: &[Agent]) -> Standings {
        let mut index: HashMap<AgentId, usize> = HashMap::with_capacity(agents.len());
        let mut roster: Vec<(AgentStats, &[CampaignAssignment])> = Vec::with_capacity(agents.len());

        for agent in agents {
            if let Entry::Vacant(slot) = index.entry(agent.user_id) {
                slot.insert(roster.len());
                roster.push((AgentStats::empty(agent), &agent.bonus_assignments));
            }
        }

        let mut dropped = 0usize;
        for lead in leads {
            match index.get(&lead.user_id) {
                Some(&idx) => roster[idx].0.record(lead),
                None => dropped += 1,
            }
        }

        let mut rows: Vec<AgentStats> = roster
            .into_iter()
            .map(|(mut stats, assignments)| {
                stats.settle(assignments);
                stats
            })
            .collect();

        // stable: ties keep roster order
        rows.sort_by(|a, b| b.total_earnings.cmp(&a.total_earnings));

        tracing::debug!(dropped_leads = dropped, rows = rows.len(), "aggregated leads");
        Standings { rows }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::db::prelude::BonusTier;
    use rust_decimal_macros::dec;

    pub(crate) fn agent(id: u64, name: &str) -> Agent {
        Agent {
            user_id: AgentId(id),
            name: name.to_string(),
            profile_image_url: None,
            personal_sound_url: None,
            bonus_assignments: Vec::new(),
        }
    }

    pub(crate) fn lead(user_id: u64, commission: Decimal, campaign: Option<&str>, sms: u32) -> Lead {
        Lead {
            id: format!("lead-{user_id}-{commission}"),
            user_id: AgentId(user_id),
            commission,
            campaign: campaign.map(str::to_string),
            sms_count: sms,
        }
    }

    fn order(standings: &Standings) -> Vec<u64> {
        standings.iter().map(|s| s.user_id.0).collect()
    }

    #[test]
    fn test_ranking_ties_keep_roster_order() {
        let agents = vec![agent(1, "a"), agent(2, "b"), agent(3, "c")];
        let leads = vec![
            lead(1, dec!(500), None, 0),
            lead(2, dec!(500), None, 0),
            lead(3, dec!(900), None, 0),
        ];

        let standings = StatsAggregator::aggregate(&leads, &agents);
        assert_eq!(order(&standings), vec![3, 1, 2]);
    }

    #[test]
    fn test_unknown_agents_are_dropped() {
        let agents = vec![agent(1, "a"), agent(2, "b")];
        let leads = vec![
            lead(1, dec!(100), None, 2),
            lead(99, dec!(10000), None, 5),
            lead(2, dec!(50), None, 1),
            lead(1, dec!(25), None, 0),
        ];

        let standings = StatsAggregator::aggregate(&leads, &agents);
        let total_deals: u32 = standings.iter().map(|s| s.deals).sum();

        assert_eq!(standings.len(), 2);
        assert!(total_deals as usize <= leads.len());
        assert_eq!(total_deals, 3);

        let first = &standings.rows()[0];
        assert_eq!(first.user_id, AgentId(1));
        assert_eq!(first.commission(), dec!(125));
        assert_eq!(first.sms_sent, 2);
        assert_eq!(standings.rows()[1].commission(), dec!(50));
    }

    #[test]
    fn test_agents_without_leads_still_ranked() {
        let agents = vec![agent(1, "a"), agent(2, "b")];
        let standings = StatsAggregator::aggregate(&[lead(2, dec!(1), None, 0)], &agents);

        assert_eq!(order(&standings), vec![2, 1]);
        assert_eq!(standings.rows()[1].deals, 0);
        assert_eq!(standings.rows()[1].total_earnings(), Decimal::ZERO);
    }

    #[test]
    fn test_sms_success_rate() {
        assert_eq!(success_rate(0, 0), 0);
        assert_eq!(success_rate(3, 0), 0);
        assert_eq!(success_rate(1, 3), 33);
        assert_eq!(success_rate(2, 3), 67);
        assert_eq!(success_rate(1, 8), 13);
        assert_eq!(success_rate(5, 4), 125);
        assert_eq!(success_rate(u32::MAX, 1), u32::MAX);
        assert_eq!(success_rate(u32::MAX, u32::MAX), 100);
    }

    #[test]
    fn test_sms_count_saturates() {
        let agents = vec![agent(1, "a")];
        let leads = vec![
            lead(1, dec!(1), None, u32::MAX),
            lead(1, dec!(1), None, u32::MAX),
            lead(1, dec!(1), None, 7),
        ];

        let standings = StatsAggregator::aggregate(&leads, &agents);
        let row = &standings.rows()[0];

        assert_eq!(row.deals, 3);
        assert_eq!(row.sms_sent, u32::MAX);
        assert_eq!(row.sms_success_rate, 0);
    }

    #[test]
    fn test_bonus_and_total_earnings() {
        let mut fiber = agent(1, "a");
        fiber.bonus_assignments = vec![CampaignAssignment {
            campaign_name: String::from("fiber"),
            bonus_tiers: vec![
                BonusTier {
                    deals_required: 3,
                    bonus_per_deal: dec!(600),
                },
                BonusTier {
                    deals_required: 4,
                    bonus_per_deal: dec!(800),
                },
            ],
        }];

        let leads: Vec<Lead> = (0..4)
            .map(|_| lead(1, dec!(250.25), Some("fiber"), 3))
            .chain(std::iter::once(lead(1, dec!(10), None, 0)))
            .collect();

        let standings = StatsAggregator::aggregate(&leads, &[fiber, agent(2, "b")]);
        let row = &standings.rows()[0];

        assert_eq!(row.deals, 5);
        assert_eq!(row.campaign_deals.get("fiber"), Some(&4));
        assert_eq!(row.bonus(), dec!(3200));
        assert_eq!(row.commission(), dec!(1011));
        assert_eq!(row.sms_success_rate, 42);

        for row in standings.iter() {
            assert_eq!(row.total_earnings(), row.commission() + row.bonus());
        }
    }

    #[test]
    fn test_duplicate_roster_entries_collapse() {
        let agents = vec![agent(1, "first"), agent(1, "second"), agent(2, "b")];
        let standings = StatsAggregator::aggregate(&[lead(1, dec!(5), None, 0)], &agents);

        assert_eq!(standings.len(), 2);
        assert_eq!(standings.rows()[0].name, "first");
        assert_eq!(standings.rows()[0].deals, 1);
    }

    #[test]
    fn test_annotate_sets_colors() {
        let agents = vec![agent(1, "a"), agent(2, "b")];
        let mut standings = StatsAggregator::aggregate(&[lead(1, dec!(3400), None, 0)], &agents);
        standings.annotate(TimePeriod::Day);

        assert_eq!(standings.rows()[0].color, Some(EarningsColor::Green));
        assert_eq!(standings.rows()[1].color, Some(EarningsColor::Red));
    }
}
