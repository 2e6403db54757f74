use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::db::prelude::{BonusTier, CampaignAssignment};

pub struct BonusResolver;
impl BonusResolver {
    /// Bonus earned across every assigned campaign.
    ///
    /// Per campaign, the qualifying tier with the largest `deals_required` wins and the *whole*
    /// deal count is paid at that tier's rate. Tiers are not cumulative, and campaigns with no
    /// qualifying tier contribute nothing.
    pub fn resolve(
        campaign_deals: &HashMap<String, u32>,
        assignments: &[CampaignAssignment],
    ) -> Decimal {
        assignments
            .iter()
            .map(|assignment| {
                let deals = campaign_deals
                    .get(&assignment.campaign_name)
                    .copied()
                    .unwrap_or(0);

                Self::campaign_bonus(deals, &assignment.bonus_tiers)
            })
            .sum()
    }

    fn campaign_bonus(deals: u32, tiers: &[BonusTier]) -> Decimal {
        if deals == 0 {
            return Decimal::ZERO;
        }

        tiers
            .iter()
            .filter(|tier| tier.deals_required <= deals)
            .max_by_key(|tier| tier.deals_required)
            .map(|tier| Decimal::from(deals) * tier.bonus_per_deal)
            .unwrap_or(Decimal::ZERO)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rust_decimal_macros::dec;

    fn tier(deals_required: u32, bonus_per_deal: Decimal) -> BonusTier {
        BonusTier {
            deals_required,
            bonus_per_deal,
        }
    }

    fn assignment(campaign: &str, tiers: Vec<BonusTier>) -> CampaignAssignment {
        CampaignAssignment {
            campaign_name: campaign.to_string(),
            bonus_tiers: tiers,
        }
    }

    fn deals(pairs: &[(&str, u32)]) -> HashMap<String, u32> {
        pairs.iter().map(|(c, n)| (c.to_string(), *n)).collect()
    }

    fn standard_tiers() -> Vec<BonusTier> {
        // deliberately unsorted
        vec![
            tier(5, dec!(1000)),
            tier(3, dec!(600)),
            tier(4, dec!(800)),
        ]
    }

    #[test]
    fn test_highest_qualifying_tier_pays_every_deal() {
        let assignments = vec![assignment("fiber", standard_tiers())];

        let bonus = BonusResolver::resolve(&deals(&[("fiber", 4)]), &assignments);
        assert_eq!(bonus, dec!(3200));

        let bonus = BonusResolver::resolve(&deals(&[("fiber", 9)]), &assignments);
        assert_eq!(bonus, dec!(9000));
    }

    #[test]
    fn test_below_lowest_tier_earns_nothing() {
        let assignments = vec![assignment("fiber", standard_tiers())];
        let bonus = BonusResolver::resolve(&deals(&[("fiber", 2)]), &assignments);

        assert_eq!(bonus, Decimal::ZERO);
    }

    #[test]
    fn test_bonus_sums_across_campaigns() {
        let assignments = vec![
            assignment("fiber", standard_tiers()),
            assignment("mobile", vec![tier(1, dec!(50.5))]),
            assignment("unsold", vec![tier(1, dec!(999))]),
        ];

        let bonus = BonusResolver::resolve(
            &deals(&[("fiber", 3), ("mobile", 2), ("unassigned", 40)]),
            &assignments,
        );

        assert_eq!(bonus, dec!(1800) + dec!(101));
    }

    #[test]
    fn test_empty_assignments_or_tiers() {
        assert_eq!(
            BonusResolver::resolve(&deals(&[("fiber", 10)]), &[]),
            Decimal::ZERO
        );

        let no_tiers = vec![assignment("fiber", Vec::new())];
        assert_eq!(
            BonusResolver::resolve(&deals(&[("fiber", 10)]), &no_tiers),
            Decimal::ZERO
        );
    }
}
