use std::collections::HashMap;

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use rust_decimal::Decimal;
use tracing::instrument;

use crate::db::prelude::{BonusTier, CampaignAssignment, RedisErr, RedisResult};
use crate::db::redis::redis_pool::{RedisKey, RedisPool};

/// Tier schedules, one hash per campaign
#[derive(Debug, Clone, Copy)]
pub struct BonusTierRepository {
    pool: &'static RedisPool,
}

impl BonusTierRepository {
    pub fn new(pool: &'static RedisPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> ConnectionManager {
        self.pool.conn()
    }

    #[instrument(skip(self))]
    pub async fn tiers(&self, campaign: &str) -> RedisResult<Vec<BonusTier>> {
        let mut conn = self.conn();
        let raw: HashMap<String, String> = conn
            .hgetall(RedisKey::CampaignTiers(campaign.to_string()).to_string())
            .await?;

        parse_tiers(raw)
    }

    /// Every campaign with a stored schedule, ordered by name.
    #[instrument(skip(self))]
    pub async fn all(&self) -> RedisResult<Vec<CampaignAssignment>> {
        let mut conn = self.conn();
        let mut campaigns: Vec<String> = conn.smembers(RedisKey::Campaigns.to_string()).await?;
        campaigns.sort();

        self.assignments(campaigns).await
    }

    /// Replaces the campaign's schedule with `tiers`. An empty schedule removes the campaign.
    #[instrument(skip(self, tiers), fields(tier_count = tiers.len()))]
    pub async fn upsert(&self, campaign: &str, tiers: &[BonusTier]) -> RedisResult<()> {
        let mut conn = self.conn();
        let key = RedisKey::CampaignTiers(campaign.to_string()).to_string();
        let fields: Vec<(String, String)> = tiers
            .iter()
            .map(|t| (t.deals_required.to_string(), t.bonus_per_deal.to_string()))
            .collect();

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.del(&key).ignore();
        if fields.is_empty() {
            pipe.srem(RedisKey::Campaigns.to_string(), campaign).ignore();
        } else {
            pipe.hset_multiple(&key, &fields).ignore();
            pipe.sadd(RedisKey::Campaigns.to_string(), campaign).ignore();
        }

        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    /// Removes the campaign's schedule, returning whether one was stored. Agent assignments to
    /// the campaign are kept and resolve to no bonus.
    #[instrument(skip(self))]
    pub async fn delete(&self, campaign: &str) -> RedisResult<bool> {
        let mut conn = self.conn();

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.del(RedisKey::CampaignTiers(campaign.to_string()).to_string());
        pipe.srem(RedisKey::Campaigns.to_string(), campaign).ignore();

        let (removed,): (u64,) = pipe.query_async(&mut conn).await?;
        Ok(removed > 0)
    }

    /// Joins each campaign name with its stored schedule; campaigns without one get no tiers.
    #[instrument(skip(self))]
    pub async fn assignments(&self, campaigns: Vec<String>) -> RedisResult<Vec<CampaignAssignment>> {
        if campaigns.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn();
        let mut pipe = redis::pipe();
        for campaign in &campaigns {
            pipe.hgetall(RedisKey::CampaignTiers(campaign.clone()).to_string());
        }

        let raw: Vec<HashMap<String, String>> = pipe.query_async(&mut conn).await?;
        campaigns
            .into_iter()
            .zip(raw)
            .map(|(campaign_name, fields)| {
                Ok(CampaignAssignment {
                    campaign_name,
                    bonus_tiers: parse_tiers(fields)?,
                })
            })
            .collect()
    }
}

/// Parses a `dealsRequired -> bonusPerDeal` hash into tiers ordered by deal count.
fn parse_tiers(raw: HashMap<String, String>) -> RedisResult<Vec<BonusTier>> {
    let mut tiers = raw
        .into_iter()
        .map(|(deals, bonus)| {
            let deals_required = deals
                .trim()
                .parse::<u32>()
                .map_err(|_| RedisErr::BadValue(deals.clone()))?;
            let bonus_per_deal = bonus
                .trim()
                .parse::<Decimal>()
                .map_err(|_| RedisErr::BadValue(bonus.clone()))?;

            Ok(BonusTier {
                deals_required,
                bonus_per_deal,
            })
        })
        .collect::<RedisResult<Vec<_>>>()?;

    tiers.sort_by_key(|t| t.deals_required);
    Ok(tiers)
}

#[cfg(test)]
mod test {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_tiers() {
        let raw = HashMap::from([
            (String::from("5"), String::from("1000")),
            (String::from("3"), String::from("600")),
            (String::from("4"), String::from("800.50")),
        ]);

        let tiers = parse_tiers(raw).unwrap();
        assert_eq!(
            tiers,
            vec![
                BonusTier { deals_required: 3, bonus_per_deal: dec!(600) },
                BonusTier { deals_required: 4, bonus_per_deal: dec!(800.50) },
                BonusTier { deals_required: 5, bonus_per_deal: dec!(1000) },
            ]
        );

        assert!(parse_tiers(HashMap::new()).unwrap().is_empty());
    }

    #[test]
    fn test_parse_tiers_rejects_garbage() {
        let raw = HashMap::from([(String::from("three"), String::from("600"))]);
        assert!(matches!(parse_tiers(raw), Err(RedisErr::BadValue(v)) if v == "three"));
    }
}
