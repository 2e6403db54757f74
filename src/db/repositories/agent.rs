use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::instrument;

use crate::db::prelude::{AgentId, AgentMedia, AgentRecord, RedisResult, Repository};
use crate::db::redis::redis_pool::{RedisKey, RedisPool};

#[derive(Debug, Clone, Copy)]
pub struct AgentRepository {
    pool: &'static RedisPool,
}

impl Repository for AgentRepository {
    type Ident = AgentId;
    type Output = AgentRecord;

    const INDEX: RedisKey = RedisKey::Agents;

    fn new(pool: &'static RedisPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> ConnectionManager {
        self.pool.conn()
    }

    fn record_key(id: &AgentId) -> String {
        RedisKey::Agent(id.0).to_string()
    }

    fn ident_of(item: &AgentRecord) -> AgentId {
        item.user_id
    }
}

impl AgentRepository {
    /// All agents, or the agents of one group, ordered by name.
    #[instrument(skip(self))]
    pub async fn list(&self, group_id: Option<u64>) -> RedisResult<Vec<AgentRecord>> {
        let records = self.get_all().await?;
        Ok(filter_and_order(records, group_id))
    }

    /// Stores `record`, keeping the stored image and sound urls where `record` has none.
    #[instrument(skip(self, record), fields(user_id = %record.user_id))]
    pub async fn upsert(&self, record: AgentRecord) -> RedisResult<AgentRecord> {
        let merged = match self.get_by_id(&record.user_id).await? {
            Some(existing) => record.merge_media(&existing),
            None => record,
        };

        self.insert(&merged).await?;
        Ok(merged)
    }

    /// Updates the agent's media urls, returning `None` for an unknown agent.
    #[instrument(skip(self))]
    pub async fn set_media(
        &self,
        id: AgentId,
        media: &AgentMedia,
    ) -> RedisResult<Option<AgentRecord>> {
        let Some(stored) = self.get_by_id(&id).await? else {
            return Ok(None);
        };

        let updated = stored.apply_media(media);
        self.insert(&updated).await?;

        Ok(Some(updated))
    }

    #[instrument(skip(self))]
    pub async fn campaigns(&self, id: AgentId) -> RedisResult<Vec<String>> {
        let mut conn = self.conn();
        let mut campaigns: Vec<String> =
            conn.smembers(RedisKey::AgentCampaigns(id.0).to_string()).await?;

        campaigns.sort();
        Ok(campaigns)
    }

    #[instrument(skip(self))]
    pub async fn assign_campaign(&self, id: AgentId, campaign: &str) -> RedisResult<()> {
        let mut conn = self.conn();
        let _: () = conn
            .sadd(RedisKey::AgentCampaigns(id.0).to_string(), campaign)
            .await?;

        Ok(())
    }

    /// Removes `campaign` from the agent's assignments, returning whether it was assigned.
    #[instrument(skip(self))]
    pub async fn unassign_campaign(&self, id: AgentId, campaign: &str) -> RedisResult<bool> {
        let mut conn = self.conn();
        let removed: u64 = conn
            .srem(RedisKey::AgentCampaigns(id.0).to_string(), campaign)
            .await?;

        Ok(removed > 0)
    }
}

fn filter_and_order(mut records: Vec<AgentRecord>, group_id: Option<u64>) -> Vec<AgentRecord> {
    if let Some(group) = group_id {
        records.retain(|r| r.group_id == Some(group));
    }

    records.sort_by(|a, b| a.name.cmp(&b.name).then(a.user_id.cmp(&b.user_id)));
    records
}
